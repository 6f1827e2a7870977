// This module turns an amd64 Prog stream into machine code with iced-x86. Each Prog becomes
// one iced Instruction: the operand kinds come from the Code's own operand list (r64, rm32,
// xmmm128, imm32, CL, ...), which fixes the register width for each register id, and operands
// are given in Intel order (destination `to` first, then `from`). Instructions are assigned
// synthetic consecutive IPs so intra-function branches can name their target instruction;
// BlockEncoder then picks short or near branch forms and lays the code out. Calls to external
// symbols are encoded with a zero displacement and reported as relocations.

//! amd64 machine code emission.

use super::backend::MARK_LOCK;
use super::{gp_register, xmm_register, Width};
use crate::core::error::{CompileError, CompileResult};
use crate::core::prog::{Addr, AddrType, As, Prog, ProgId, Progs};
use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Code, IcedError, Instruction, InstructionBlock, MemoryOperand,
    Register,
};

/// Synthetic address of the first instruction.
const BASE_IP: u64 = 0x1000;

/// Relocation against an external symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloc {
    /// Offset of the 32-bit PC-relative field in the code.
    pub offset: u32,
    pub sym: String,
}

/// Encoded function body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembled {
    pub code: Vec<u8>,
    pub relocs: Vec<Reloc>,
}

enum Operand {
    Reg(Register),
    Mem(MemoryOperand),
    Imm(i64),
}

struct Encoder<'f> {
    func: &'f str,
}

impl Encoder<'_> {
    fn err(&self, p: &Prog, reason: impl std::fmt::Display) -> CompileError {
        CompileError::CodeGeneration {
            func: self.func.to_string(),
            reason: format!("{}: {reason}", p.as_),
        }
    }

    fn iced(&self, p: &Prog, e: IcedError) -> CompileError {
        self.err(p, e)
    }

    /// Convert `a` for the operand slot described by `kind` (`r64`, `rm8`, `xmmm128`, ...).
    fn operand(&self, p: &Prog, kind: &str, a: &Addr) -> CompileResult<Operand> {
        if kind == "CL" {
            return Ok(Operand::Reg(Register::CL));
        }
        match a.ty {
            AddrType::Reg => {
                let reg = if kind.starts_with("xmm") {
                    xmm_register(a.reg)
                } else {
                    let width = match kind.trim_start_matches("rm").trim_start_matches('r') {
                        "8" => Width::W8,
                        "16" => Width::W16,
                        "32" => Width::W32,
                        _ => Width::W64,
                    };
                    gp_register(a.reg, width)
                };
                reg.map(Operand::Reg)
                    .ok_or_else(|| self.err(p, format!("register {} not valid as {kind}", a.reg)))
            }
            AddrType::Mem if a.sym.is_none() => {
                let base = gp_register(a.reg, Width::W64)
                    .ok_or_else(|| self.err(p, format!("bad base register {}", a.reg)))?;
                Ok(Operand::Mem(MemoryOperand::with_base_displ(base, a.offset)))
            }
            AddrType::Const => Ok(Operand::Imm(a.offset)),
            _ => Err(self.err(p, format!("unsupported {kind} operand {:?}", a.ty))),
        }
    }

    fn instruction(&self, p: &Prog, code: Code) -> CompileResult<Instruction> {
        let name = format!("{code:?}");
        let kinds: Vec<&str> = name.split('_').skip(1).collect();
        let slots: Vec<&Addr> = match kinds.len() {
            0 => Vec::new(),
            1 if p.to.ty == AddrType::None => vec![&p.from],
            1 => vec![&p.to],
            _ => vec![&p.to, &p.from],
        };
        let mut ops = Vec::with_capacity(slots.len());
        for (kind, a) in kinds.iter().zip(slots) {
            ops.push(self.operand(p, kind, a)?);
        }

        let unsigned = |c: i64| -> CompileResult<u32> {
            u32::try_from(c).map_err(|_| self.err(p, format!("immediate {c} out of range")))
        };
        let wide = kinds.get(1).is_some_and(|k| *k == "imm64");

        let ins = match ops.as_slice() {
            [] => Instruction::with(code),
            [Operand::Reg(r)] => Instruction::with1(code, *r).map_err(|e| self.iced(p, e))?,
            [Operand::Mem(m)] => Instruction::with1(code, *m).map_err(|e| self.iced(p, e))?,
            [Operand::Reg(a), Operand::Reg(b)] => Instruction::with2(code, *a, *b).map_err(|e| self.iced(p, e))?,
            [Operand::Reg(a), Operand::Mem(m)] => Instruction::with2(code, *a, *m).map_err(|e| self.iced(p, e))?,
            [Operand::Mem(m), Operand::Reg(b)] => Instruction::with2(code, *m, *b).map_err(|e| self.iced(p, e))?,
            [Operand::Reg(a), Operand::Imm(c)] if wide => {
                Instruction::with2(code, *a, *c as u64).map_err(|e| self.iced(p, e))?
            }
            [Operand::Reg(a), Operand::Imm(c)] => match i32::try_from(*c) {
                Ok(c) => Instruction::with2(code, *a, c),
                Err(_) => Instruction::with2(code, *a, unsigned(*c)?),
            }
            .map_err(|e| self.iced(p, e))?,
            [Operand::Mem(m), Operand::Imm(c)] => match i32::try_from(*c) {
                Ok(c) => Instruction::with2(code, *m, c),
                Err(_) => Instruction::with2(code, *m, unsigned(*c)?),
            }
            .map_err(|e| self.iced(p, e))?,
            _ => return Err(self.err(p, "unsupported operand combination")),
        };
        Ok(ins)
    }

    fn branch(&self, p: &Prog, code: Code) -> CompileResult<Instruction> {
        let target = match p.to.target {
            Some(ProgId(t)) => BASE_IP + u64::from(t),
            None => return Err(self.err(p, "unresolved branch")),
        };
        Instruction::with_branch(code, target).map_err(|e| self.iced(p, e))
    }
}

/// Encode the Prog stream of `func`.
pub fn assemble(func: &str, pp: &Progs<'_>) -> CompileResult<Assembled> {
    let enc = Encoder { func };
    let mut instrs = Vec::with_capacity(pp.len());
    let mut calls = Vec::new();

    for (i, p) in pp.iter().enumerate() {
        let mut ins = match p.as_ {
            As::Jmp => enc.branch(p, Code::Jmp_rel32_64)?,
            As::Call => match &p.to.sym {
                Some(sym) => {
                    calls.push((i, sym.name.to_string()));
                    // Points at its own start; the displacement is patched by the relocation.
                    Instruction::with_branch(Code::Call_rel32_64, BASE_IP + i as u64)
                        .map_err(|e| enc.iced(p, e))?
                }
                None => return Err(enc.err(p, "call without a symbol")),
            },
            As::Ret => Instruction::with(Code::Retnq),
            As::Undef => Instruction::with(Code::Ud2),
            As::X86(code) if p.to.ty == AddrType::Branch => enc.branch(p, code)?,
            As::X86(code) => enc.instruction(p, code)?,
            _ => {
                return Err(CompileError::MissingEncoding { arch: "amd64", mnemonic: p.as_.to_string() });
            }
        };
        if p.mark & MARK_LOCK != 0 {
            ins.set_has_lock_prefix(true);
        }
        ins.set_ip(BASE_IP + i as u64);
        instrs.push(ins);
    }

    let block = InstructionBlock::new(&instrs, BASE_IP);
    let result = BlockEncoder::encode(64, block, BlockEncoderOptions::RETURN_NEW_INSTRUCTION_OFFSETS)
        .map_err(|e| CompileError::CodeGeneration { func: func.to_string(), reason: e.to_string() })?;
    let mut code = result.code_buffer;

    let mut relocs = Vec::with_capacity(calls.len());
    for (i, sym) in calls {
        let offset = result.new_instruction_offsets.get(i).copied().unwrap_or(u32::MAX);
        let field = offset as usize + 1;
        match code.get_mut(field..field + 4) {
            Some(disp) => disp.fill(0),
            None => {
                return Err(CompileError::CodeGeneration {
                    func: func.to_string(),
                    reason: format!("call to {sym} lost during encoding"),
                })
            }
        }
        relocs.push(Reloc { offset: offset + 1, sym });
    }
    log::trace!("{func}: {} bytes, {} relocations", code.len(), relocs.len());
    Ok(Assembled { code, relocs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compiler::Backend;
    use crate::symtab::SymbolTable;
    use crate::x64::backend::Amd64Backend;
    use crate::x64::{LINK_AMD64, REG_AX, REG_CX, REG_SP};
    use bumpalo::Bump;

    fn progs(arena: &Bump) -> Progs<'_> {
        Progs::new_in(arena, &LINK_AMD64)
    }

    #[test]
    fn test_nop_bytes() {
        let arena = Bump::new();
        let mut pp = progs(&arena);
        Amd64Backend.ginsnop(&mut pp);
        assert_eq!(assemble("f", &pp).unwrap().code, [0x87, 0xC0]);
    }

    #[test]
    fn test_register_add() {
        let arena = Bump::new();
        let mut pp = progs(&arena);
        let p = pp.prog(As::X86(Code::Add_rm64_r64));
        p.from = Addr::reg(REG_CX);
        p.to = Addr::reg(REG_AX);
        pp.prog(As::Ret);
        // add rax, rcx; ret
        assert_eq!(assemble("f", &pp).unwrap().code, [0x48, 0x01, 0xC8, 0xC3]);
    }

    #[test]
    fn test_store_immediate() {
        let arena = Bump::new();
        let mut pp = progs(&arena);
        let p = pp.prog(As::X86(Code::Mov_rm64_imm32));
        p.from = Addr::constant(0);
        p.to = Addr::mem(REG_SP, 8);
        // mov qword ptr [rsp+8], 0
        assert_eq!(
            assemble("f", &pp).unwrap().code,
            [0x48, 0xC7, 0x44, 0x24, 0x08, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_backward_branch_is_short() {
        let arena = Bump::new();
        let mut pp = progs(&arena);
        Amd64Backend.ginsnop(&mut pp);
        let p = pp.prog(As::Jmp);
        p.to.ty = AddrType::Branch;
        p.to.target = Some(ProgId(0));
        // xchg eax, eax; jmp short -4
        assert_eq!(assemble("f", &pp).unwrap().code, [0x87, 0xC0, 0xEB, 0xFC]);
    }

    #[test]
    fn test_call_relocation() {
        let arena = Bump::new();
        let mut pp = progs(&arena);
        Amd64Backend.ginsnop(&mut pp);
        let symtab = SymbolTable::new("main", "main");
        pp.prog(As::Call).to = Addr::extern_sym(symtab.runtime_func("panicIndex").unwrap());
        let out = assemble("f", &pp).unwrap();
        assert_eq!(out.code, [0x87, 0xC0, 0xE8, 0, 0, 0, 0]);
        assert_eq!(out.relocs, [Reloc { offset: 3, sym: "runtime.panicIndex".to_string() }]);
    }

    #[test]
    fn test_foreign_opcode_rejected() {
        let arena = Bump::new();
        let mut pp = progs(&arena);
        pp.prog(As::Riscv(crate::riscv64::Mnemonic::Add));
        assert!(matches!(
            assemble("f", &pp),
            Err(CompileError::MissingEncoding { arch: "amd64", .. })
        ));
    }
}
