//! amd64 target.
//!
//! Instructions are iced-x86 [`Code`]s carried in the shared Prog stream, so
//! the backend picks the exact operand form (`Add_rm64_r64`, `Mov_rm32_imm32`)
//! and [`encoder`] only maps register ids and operands. Register ids follow the
//! hardware numbering: 1..=16 are AX, CX, DX, BX, SP, BP, SI, DI, R8..R15 and
//! 17..=32 are X0..X15.
//!
//! X15 is kept zero and R14 holds the goroutine pointer, as in the register
//! ABI; R11 is the backend's scratch register.

pub mod backend;
pub mod encoder;

pub use encoder::{assemble, Assembled, Reloc};

use crate::core::compiler::ArchInfo;
use crate::core::config::BuildConfig;
use crate::core::prog::{LinkArch, RegId};
use iced_x86::{Code, Register};

pub const REG_AX: RegId = 1;
pub const REG_CX: RegId = 2;
pub const REG_DX: RegId = 3;
pub const REG_BX: RegId = 4;
pub const REG_SP: RegId = 5;
pub const REG_BP: RegId = 6;
pub const REG_SI: RegId = 7;
pub const REG_DI: RegId = 8;
pub const REG_R8: RegId = 9;
pub const REG_R11: RegId = REG_R8 + 3;
pub const REG_R14: RegId = REG_R8 + 6;
pub const REG_R15: RegId = REG_R8 + 7;
pub const REG_X0: RegId = 17;
pub const REG_X15: RegId = REG_X0 + 15;

pub const REG_G: RegId = REG_R14;
pub const REG_TMP: RegId = REG_R11;
/// Always holds zero.
pub const REG_X_ZERO: RegId = REG_X15;

const GP_NAMES: [&str; 16] = [
    "AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI", "R8", "R9", "R10", "R11", "R12", "R13",
    "R14", "R15",
];

const GP64: [Register; 16] = [
    Register::RAX,
    Register::RCX,
    Register::RDX,
    Register::RBX,
    Register::RSP,
    Register::RBP,
    Register::RSI,
    Register::RDI,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

const GP32: [Register; 16] = [
    Register::EAX,
    Register::ECX,
    Register::EDX,
    Register::EBX,
    Register::ESP,
    Register::EBP,
    Register::ESI,
    Register::EDI,
    Register::R8D,
    Register::R9D,
    Register::R10D,
    Register::R11D,
    Register::R12D,
    Register::R13D,
    Register::R14D,
    Register::R15D,
];

const GP16: [Register; 16] = [
    Register::AX,
    Register::CX,
    Register::DX,
    Register::BX,
    Register::SP,
    Register::BP,
    Register::SI,
    Register::DI,
    Register::R8W,
    Register::R9W,
    Register::R10W,
    Register::R11W,
    Register::R12W,
    Register::R13W,
    Register::R14W,
    Register::R15W,
];

const GP8: [Register; 16] = [
    Register::AL,
    Register::CL,
    Register::DL,
    Register::BL,
    Register::SPL,
    Register::BPL,
    Register::SIL,
    Register::DIL,
    Register::R8L,
    Register::R9L,
    Register::R10L,
    Register::R11L,
    Register::R12L,
    Register::R13L,
    Register::R14L,
    Register::R15L,
];

const XMM: [Register; 16] = [
    Register::XMM0,
    Register::XMM1,
    Register::XMM2,
    Register::XMM3,
    Register::XMM4,
    Register::XMM5,
    Register::XMM6,
    Register::XMM7,
    Register::XMM8,
    Register::XMM9,
    Register::XMM10,
    Register::XMM11,
    Register::XMM12,
    Register::XMM13,
    Register::XMM14,
    Register::XMM15,
];

pub fn is_int_reg(r: RegId) -> bool {
    (REG_AX..=REG_R15).contains(&r)
}

pub fn is_float_reg(r: RegId) -> bool {
    (REG_X0..=REG_X15).contains(&r)
}

/// Operand width of a general purpose register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

/// iced register for general purpose register `r` accessed at `width`.
pub fn gp_register(r: RegId, width: Width) -> Option<Register> {
    if !is_int_reg(r) {
        return None;
    }
    let i = (r - REG_AX) as usize;
    Some(match width {
        Width::W8 => GP8[i],
        Width::W16 => GP16[i],
        Width::W32 => GP32[i],
        Width::W64 => GP64[i],
    })
}

pub fn xmm_register(r: RegId) -> Option<Register> {
    is_float_reg(r).then(|| XMM[(r - REG_X0) as usize])
}

/// Assembler name of an instruction code (`ADD`, `MOVUPS`).
pub fn code_name(code: Code) -> String {
    format!("{:?}", code.mnemonic()).to_uppercase()
}

fn rconv(r: RegId) -> String {
    if is_int_reg(r) {
        GP_NAMES[(r - REG_AX) as usize].to_string()
    } else if is_float_reg(r) {
        format!("X{}", r - REG_X0)
    } else {
        format!("R???{r}")
    }
}

fn reg_by_name(name: &str) -> Option<RegId> {
    if let Some(i) = GP_NAMES.iter().position(|&n| n == name) {
        return Some(REG_AX + i as RegId);
    }
    let n: u8 = name.strip_prefix('X')?.parse().ok()?;
    (n < 16).then(|| REG_X0 + n as RegId)
}

pub static LINK_AMD64: LinkArch = LinkArch {
    name: "amd64",
    arch: object::Architecture::X86_64,
    endian: object::Endianness::Little,
    ptr_size: 8,
    reg_size: 8,
    min_lc: 1,
    fixed_frame_size: 0,
    rconv,
    reg_by_name,
};

/// Capability table for amd64.
pub fn init(_cfg: &BuildConfig) -> ArchInfo {
    ArchInfo {
        link_arch: &LINK_AMD64,
        reg_sp: REG_SP,
        max_width: 1 << 50,
        soft_float: false,
        gen: Box::new(backend::Amd64Backend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_names() {
        assert_eq!(rconv(REG_AX), "AX");
        assert_eq!(rconv(REG_R15), "R15");
        assert_eq!(rconv(REG_X0 + 3), "X3");
        assert_eq!(reg_by_name("SP"), Some(REG_SP));
        assert_eq!(reg_by_name("X15"), Some(REG_X15));
        assert_eq!(reg_by_name("X16"), None);
        assert_eq!(reg_by_name("EAX"), None);
    }

    #[test]
    fn test_iced_registers() {
        assert_eq!(gp_register(REG_R11, Width::W64), Some(Register::R11));
        assert_eq!(gp_register(REG_CX, Width::W8), Some(Register::CL));
        assert_eq!(gp_register(REG_X0, Width::W64), None);
        assert_eq!(xmm_register(REG_X15), Some(Register::XMM15));
    }

    #[test]
    fn test_code_names() {
        assert_eq!(code_name(Code::Add_rm64_r64), "ADD");
        assert_eq!(code_name(Code::Movups_xmmm128_xmm), "MOVUPS");
    }
}
