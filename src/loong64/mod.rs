//! LoongArch 64-bit target.
//!
//! Register ids 1..=32 are R0..R31 and 33..=64 are F0..F31.

pub mod backend;

use crate::core::compiler::ArchInfo;
use crate::core::config::BuildConfig;
use crate::core::prog::{LinkArch, RegId};
use strum::{Display, EnumIter};

/// Assembler opcodes used by the loong64 backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Op {
    Noop,
    Addvu,
    Subvu,
    Negv,
    And,
    Or,
    Xor,
    Nor,
    Mulv,
    Divv,
    Divvu,
    Remv,
    Remvu,
    Sllv,
    Srlv,
    Srav,
    Sgt,
    Sgtu,
    Movv,
    Movw,
    Movwu,
    Movh,
    Movhu,
    Movb,
    Movbu,
    Movf,
    Movd,
    Addf,
    Addd,
    Subf,
    Subd,
    Mulf,
    Muld,
    Divf,
    Divd,
    Sqrtf,
    Sqrtd,
    Truncfw,
    Truncfv,
    Truncdw,
    Truncdv,
    Movwf,
    Movwd,
    Movvf,
    Movvd,
    Amadddbw,
    Amadddbv,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
}

pub const REG_R0: RegId = 1;
pub const REG_R31: RegId = REG_R0 + 31;
pub const REG_F0: RegId = 33;
pub const REG_F31: RegId = REG_F0 + 31;

pub const REG_ZERO: RegId = REG_R0;
pub const REG_LINK: RegId = REG_R0 + 1;
pub const REG_SP: RegId = REG_R0 + 3;
/// Loop registers of block zeroing.
pub const REG_RT1: RegId = REG_R0 + 20;
pub const REG_RT2: RegId = REG_R0 + 21;
pub const REG_G: RegId = REG_R0 + 22;
pub const REG_TMP: RegId = REG_R0 + 30;

/// Integer register `Rn`.
pub const fn r(n: u8) -> RegId {
    REG_R0 + n as RegId
}

/// Float register `Fn`.
pub const fn f(n: u8) -> RegId {
    REG_F0 + n as RegId
}

fn rconv(reg: RegId) -> String {
    match reg {
        REG_R0..=REG_R31 => format!("R{}", reg - REG_R0),
        REG_F0..=REG_F31 => format!("F{}", reg - REG_F0),
        _ => format!("R???{reg}"),
    }
}

fn reg_by_name(name: &str) -> Option<RegId> {
    match name {
        "SP" => return Some(REG_SP),
        "g" => return Some(REG_G),
        _ => {}
    }
    let (base, num) = match name.as_bytes().first()? {
        b'R' => (REG_R0, &name[1..]),
        b'F' => (REG_F0, &name[1..]),
        _ => return None,
    };
    let n: u8 = num.parse().ok()?;
    (n < 32).then(|| base + n as RegId)
}

pub static LINK_LOONG64: LinkArch = LinkArch {
    name: "loong64",
    arch: object::Architecture::LoongArch64,
    endian: object::Endianness::Little,
    ptr_size: 8,
    reg_size: 8,
    min_lc: 4,
    fixed_frame_size: 8,
    rconv,
    reg_by_name,
};

/// Capability table for loong64.
pub fn init(_cfg: &BuildConfig) -> ArchInfo {
    ArchInfo {
        link_arch: &LINK_LOONG64,
        reg_sp: REG_SP,
        max_width: 1 << 50,
        soft_float: false,
        gen: Box::new(backend::Loong64Backend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(Op::Amadddbv.to_string(), "AMADDDBV");
        assert_eq!(Op::Movvd.to_string(), "MOVVD");
        assert_eq!(rconv(REG_SP), "R3");
        assert_eq!(reg_by_name("SP"), Some(REG_SP));
        assert_eq!(reg_by_name("F31"), Some(REG_F31));
        assert_eq!(reg_by_name("R32"), None);
    }
}
