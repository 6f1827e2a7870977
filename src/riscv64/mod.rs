// This module is the riscv64 target: its register file, link-level description and the
// initializer the target registry calls. Submodules hold the instruction encoding table
// (inst), the generator that derives that table from the riscv-opcodes description
// (opcodes), the mapping from emitted Progs to the real instruction the assembler encodes
// (asm) and the lowering backend (backend). Register ids 1..=32 are the integer registers
// X0..X31 and 33..=64 the float registers F0..F31; 0 is reserved for "no register".

//! RISC-V 64-bit target.

pub mod asm;
pub mod backend;
pub mod inst;
pub mod opcodes;

pub use asm::resolve;
pub use inst::{encode, encode_or_err, ImmSlot, Inst, Mnemonic, OpcodeClass};

use crate::core::compiler::ArchInfo;
use crate::core::config::BuildConfig;
use crate::core::prog::{LinkArch, RegId};

pub const REG_X0: RegId = 1;
pub const REG_X31: RegId = REG_X0 + 31;
pub const REG_F0: RegId = 33;
pub const REG_F31: RegId = REG_F0 + 31;

pub const REG_ZERO: RegId = REG_X0;
/// Link register.
pub const REG_RA: RegId = REG_X0 + 1;
pub const REG_SP: RegId = REG_X0 + 2;
/// Goroutine pointer, never allocated.
pub const REG_G: RegId = REG_X0 + 27;
/// Assembler and backend scratch register.
pub const REG_TMP: RegId = REG_X31;

/// Integer register `Xn`.
pub const fn x(n: u8) -> RegId {
    REG_X0 + n as RegId
}

/// Float register `Fn`.
pub const fn f(n: u8) -> RegId {
    REG_F0 + n as RegId
}

pub fn is_int_reg(r: RegId) -> bool {
    (REG_X0..=REG_X31).contains(&r)
}

pub fn is_float_reg(r: RegId) -> bool {
    (REG_F0..=REG_F31).contains(&r)
}

/// Hardware register number (0..=31) encoded in instruction words.
pub fn reg_num(r: RegId) -> Option<u32> {
    if is_int_reg(r) {
        Some((r - REG_X0) as u32)
    } else if is_float_reg(r) {
        Some((r - REG_F0) as u32)
    } else {
        None
    }
}

fn rconv(r: RegId) -> String {
    match r {
        REG_ZERO => "ZERO".to_string(),
        REG_SP => "SP".to_string(),
        _ if is_int_reg(r) => format!("X{}", r - REG_X0),
        _ if is_float_reg(r) => format!("F{}", r - REG_F0),
        _ => format!("R???{r}"),
    }
}

fn reg_by_name(name: &str) -> Option<RegId> {
    match name {
        "ZERO" => return Some(REG_ZERO),
        "RA" => return Some(REG_RA),
        "SP" => return Some(REG_SP),
        "TMP" => return Some(REG_TMP),
        _ => {}
    }
    let (base, num) = match name.as_bytes().first()? {
        b'X' => (REG_X0, &name[1..]),
        b'F' => (REG_F0, &name[1..]),
        _ => return None,
    };
    let n: u8 = num.parse().ok()?;
    (n < 32).then(|| base + n as RegId)
}

pub static LINK_RISCV64: LinkArch = LinkArch {
    name: "riscv64",
    arch: object::Architecture::Riscv64,
    endian: object::Endianness::Little,
    ptr_size: 8,
    reg_size: 8,
    min_lc: 4,
    fixed_frame_size: 8,
    rconv,
    reg_by_name,
};

/// Capability table for riscv64.
pub fn init(_cfg: &BuildConfig) -> ArchInfo {
    ArchInfo {
        link_arch: &LINK_RISCV64,
        reg_sp: REG_SP,
        max_width: 1 << 50,
        soft_float: false,
        gen: Box::new(backend::Riscv64Backend),
    }
}
