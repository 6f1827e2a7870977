// This module defines the instruction stream the lowering backends produce. A Prog is one
// emitted instruction: an opcode (As) plus a source operand, an optional middle register and a
// destination operand, in the operand order of the Plan 9 style assemblers downstream. As is
// either a generic pseudo-op shared by every target (JMP, CALL, RET, UNDEF) or a target opcode
// carried in the target's own vocabulary: riscv64 Mnemonics, loong64 and mips64 Op enums, and
// iced-x86 Code values for amd64. Progs is the append-only stream of one function; its storage
// lives in the lowering worker's bumpalo arena and instructions are addressed by ProgId so
// branch targets can be patched after all blocks are emitted. LinkArch describes a target to
// the object writer (object::Architecture, endianness, sizes, register naming).

//! Prog streams and link-level target descriptions.

use crate::symtab::LinkSym;
use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use std::fmt;
use std::sync::Arc;

/// Register id. Numbering is per target; [`REG_NONE`] means no register.
pub type RegId = i16;

pub const REG_NONE: RegId = 0;

/// Link-level description of a target.
#[derive(Debug)]
pub struct LinkArch {
    /// Target name as selected on the command line.
    pub name: &'static str,
    pub arch: object::Architecture,
    pub endian: object::Endianness,
    pub ptr_size: u8,
    pub reg_size: u8,
    /// Minimum instruction length in bytes.
    pub min_lc: u8,
    /// Bytes at the bottom of each frame reserved for the saved link register.
    pub fixed_frame_size: i64,
    /// Register name for a register id.
    pub rconv: fn(RegId) -> String,
    /// Register id for a register name.
    pub reg_by_name: fn(&str) -> Option<RegId>,
}

impl LinkArch {
    pub fn reg_name(&self, r: RegId) -> String {
        (self.rconv)(r)
    }
}

/// Opcode of one Prog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum As {
    Jmp,
    Call,
    Ret,
    Undef,
    Riscv(crate::riscv64::Mnemonic),
    Loong64(crate::loong64::Op),
    Mips64(crate::mips64::Op),
    X86(iced_x86::Code),
}

impl fmt::Display for As {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            As::Jmp => f.write_str("JMP"),
            As::Call => f.write_str("CALL"),
            As::Ret => f.write_str("RET"),
            As::Undef => f.write_str("UNDEF"),
            As::Riscv(m) => write!(f, "{m}"),
            As::Loong64(op) => write!(f, "{op}"),
            As::Mips64(op) => write!(f, "{op}"),
            As::X86(code) => write!(f, "{}", crate::x64::code_name(*code)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddrType {
    #[default]
    None,
    Reg,
    Const,
    FConst,
    Mem,
    Branch,
}

/// Symbolic base of a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddrName {
    #[default]
    None,
    /// Local stack slot.
    Auto,
    /// Incoming argument slot.
    Param,
    /// Global symbol.
    Extern,
}

/// Index of a Prog within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgId(pub u32);

/// One instruction operand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Addr {
    pub ty: AddrType,
    pub reg: RegId,
    pub offset: i64,
    pub name: AddrName,
    pub sym: Option<Arc<LinkSym>>,
    /// Resolved branch target.
    pub target: Option<ProgId>,
    pub fval: f64,
}

impl Addr {
    pub fn reg(reg: RegId) -> Addr {
        Addr { ty: AddrType::Reg, reg, ..Addr::default() }
    }

    pub fn constant(offset: i64) -> Addr {
        Addr { ty: AddrType::Const, offset, ..Addr::default() }
    }

    pub fn fconst(fval: f64) -> Addr {
        Addr { ty: AddrType::FConst, fval, ..Addr::default() }
    }

    /// Memory at `offset(reg)`.
    pub fn mem(reg: RegId, offset: i64) -> Addr {
        Addr { ty: AddrType::Mem, reg, offset, ..Addr::default() }
    }

    /// Stack memory with a symbolic base.
    pub fn stack(reg: RegId, name: AddrName, offset: i64) -> Addr {
        Addr { ty: AddrType::Mem, reg, offset, name, ..Addr::default() }
    }

    /// A global symbol.
    pub fn extern_sym(sym: Arc<LinkSym>) -> Addr {
        Addr { ty: AddrType::Mem, name: AddrName::Extern, sym: Some(sym), ..Addr::default() }
    }

    pub fn is_reg(&self) -> bool {
        self.ty == AddrType::Reg
    }

    pub fn is_mem(&self) -> bool {
        self.ty == AddrType::Mem
    }

    pub fn is_const(&self) -> bool {
        self.ty == AddrType::Const
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, arch: &LinkArch) -> fmt::Result {
        match self.ty {
            AddrType::None => Ok(()),
            AddrType::Reg => f.write_str(&arch.reg_name(self.reg)),
            AddrType::Const => write!(f, "${}", self.offset),
            AddrType::FConst => write!(f, "$({:?})", self.fval),
            AddrType::Branch => match self.target {
                Some(ProgId(t)) => write!(f, "{t}(PC)"),
                None => f.write_str("?(PC)"),
            },
            AddrType::Mem => {
                if let Some(sym) = &self.sym {
                    write!(f, "{}", sym.name)?;
                    if self.offset != 0 {
                        write!(f, "{:+}", self.offset)?;
                    }
                    return f.write_str("(SB)");
                }
                if self.offset != 0 {
                    write!(f, "{}", self.offset)?;
                }
                write!(f, "({})", arch.reg_name(self.reg))
            }
        }
    }
}

/// One emitted instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prog {
    pub as_: As,
    pub from: Addr,
    /// Middle register operand (second source).
    pub reg: RegId,
    pub to: Addr,
    /// Target-specific marks.
    pub mark: u16,
}

impl Prog {
    pub fn new(as_: As) -> Prog {
        Prog { as_, from: Addr::default(), reg: REG_NONE, to: Addr::default(), mark: 0 }
    }

    /// Render the instruction in assembler syntax.
    pub fn display<'a>(&'a self, arch: &'a LinkArch) -> ProgDisplay<'a> {
        ProgDisplay { prog: self, arch }
    }
}

pub struct ProgDisplay<'a> {
    prog: &'a Prog,
    arch: &'a LinkArch,
}

impl fmt::Display for ProgDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.prog;
        write!(f, "{}", p.as_)?;
        let mut sep = "\t";
        if p.from.ty != AddrType::None {
            f.write_str(sep)?;
            p.from.write(f, self.arch)?;
            sep = ", ";
        }
        if p.reg != REG_NONE {
            f.write_str(sep)?;
            f.write_str(&self.arch.reg_name(p.reg))?;
            sep = ", ";
        }
        if p.to.ty != AddrType::None {
            f.write_str(sep)?;
            p.to.write(f, self.arch)?;
        }
        Ok(())
    }
}

/// Append-only instruction stream of one function.
pub struct Progs<'bump> {
    arch: &'static LinkArch,
    progs: BumpVec<'bump, Prog>,
}

impl<'bump> Progs<'bump> {
    pub fn new_in(arena: &'bump Bump, arch: &'static LinkArch) -> Self {
        Self { arch, progs: BumpVec::new_in(arena) }
    }

    pub fn arch(&self) -> &'static LinkArch {
        self.arch
    }

    /// Append a fresh instruction and return it for operand setup.
    pub fn prog(&mut self, as_: As) -> &mut Prog {
        let id = self.push(Prog::new(as_));
        &mut self.progs[id.0 as usize]
    }

    pub fn push(&mut self, prog: Prog) -> ProgId {
        log::trace!("{}: {}", self.progs.len(), prog.display(self.arch));
        let id = self.next_id();
        self.progs.push(prog);
        id
    }

    /// Id the next appended instruction will get.
    pub fn next_id(&self) -> ProgId {
        ProgId(self.progs.len() as u32)
    }

    pub fn last_id(&self) -> Option<ProgId> {
        self.progs.len().checked_sub(1).map(|i| ProgId(i as u32))
    }

    pub fn get(&self, id: ProgId) -> Option<&Prog> {
        self.progs.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ProgId) -> Option<&mut Prog> {
        self.progs.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.progs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.progs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prog> {
        self.progs.iter()
    }

    pub fn as_slice(&self) -> &[Prog] {
        &self.progs
    }
}

impl fmt::Display for Progs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.progs.iter().enumerate() {
            writeln!(f, "{:05} {}", i, p.display(self.arch))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Progs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progs")
            .field("arch", &self.arch.name)
            .field("len", &self.progs.len())
            .finish()
    }
}
