//! MIPS64 targets, big-endian (`mips64`) and little-endian (`mips64le`).
//!
//! Register ids 1..=32 are R0..R31, 33..=64 are F0..F31, followed by the
//! multiply/divide result registers HI and LO.

pub mod backend;

use crate::core::compiler::ArchInfo;
use crate::core::config::{BuildConfig, FloatAbi};
use crate::core::prog::{LinkArch, RegId};
use strum::{Display, EnumIter};

/// Assembler opcodes used by the mips64 backend.
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
    Mulvu,
    Divv,
    Divvu,
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
    Ll,
    Llv,
    Sc,
    Scv,
    Sync,
    Beq,
    Bne,
}

pub const REG_R0: RegId = 1;
pub const REG_R31: RegId = REG_R0 + 31;
pub const REG_F0: RegId = 33;
pub const REG_F31: RegId = REG_F0 + 31;
pub const REG_HI: RegId = 65;
pub const REG_LO: RegId = 66;

pub const REG_ZERO: RegId = REG_R0;
pub const REG_RT1: RegId = REG_R0 + 1;
pub const REG_RT2: RegId = REG_R0 + 2;
pub const REG_TMP: RegId = REG_R0 + 23;
pub const REG_SP: RegId = REG_R0 + 29;
pub const REG_G: RegId = REG_R0 + 30;
pub const REG_LINK: RegId = REG_R0 + 31;

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
        REG_HI => "HI".to_string(),
        REG_LO => "LO".to_string(),
        _ => format!("R???{reg}"),
    }
}

fn reg_by_name(name: &str) -> Option<RegId> {
    match name {
        "SP" => return Some(REG_SP),
        "g" => return Some(REG_G),
        "HI" => return Some(REG_HI),
        "LO" => return Some(REG_LO),
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

pub static LINK_MIPS64: LinkArch = LinkArch {
    name: "mips64",
    arch: object::Architecture::Mips64,
    endian: object::Endianness::Big,
    ptr_size: 8,
    reg_size: 8,
    min_lc: 4,
    fixed_frame_size: 8,
    rconv,
    reg_by_name,
};

pub static LINK_MIPS64LE: LinkArch = LinkArch {
    name: "mips64le",
    arch: object::Architecture::Mips64,
    endian: object::Endianness::Little,
    ptr_size: 8,
    reg_size: 8,
    min_lc: 4,
    fixed_frame_size: 8,
    rconv,
    reg_by_name,
};

/// Capability table for mips64 and mips64le, selected by `cfg.arch`.
pub fn init(cfg: &BuildConfig) -> ArchInfo {
    let link_arch = if cfg.arch == "mips64le" { &LINK_MIPS64LE } else { &LINK_MIPS64 };
    ArchInfo {
        link_arch,
        reg_sp: REG_SP,
        max_width: 1 << 50,
        soft_float: cfg.mips64_float == FloatAbi::Soft,
        gen: Box::new(backend::Mips64Backend),
    }
}
