//! Reader for the riscv-opcodes instruction description format.
//!
//! Each line names an instruction, its variable operand fields and the fixed
//! bit ranges that identify it:
//!
//! ```text
//! add rd rs1 rs2 31..25=0 14..12=0 6..2=0x0C 1..0=3
//! $pseudo_op zicsr::csrrs rdcycle rd 19..15=0 31..20=0xC00 14..12=2 6..2=0x1C 1..0=3
//! ```
//!
//! The fixed ranges give the match word, from which [`Inst::from_match`]
//! derives the table descriptor. `instgen` uses this module to regenerate and
//! check the rows of the encoding table.

use super::inst::Inst;
use crate::core::error::{CompileError, CompileResult};
use std::collections::BTreeMap;

/// One parsed instruction line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeLine {
    pub name: String,
    /// Variable operand fields (`rd`, `rs1`, `imm12`, ...).
    pub operands: Vec<String>,
    pub match_bits: u32,
    pub mask: u32,
    /// Base instruction this pseudo-op is an alias of (`zicsr::csrrs`).
    pub pseudo_of: Option<String>,
}

impl OpcodeLine {
    pub fn inst(&self) -> Inst {
        Inst::from_match(self.match_bits)
    }

    pub fn is_pseudo(&self) -> bool {
        self.pseudo_of.is_some()
    }
}

fn parse_err(line: usize, reason: impl Into<String>) -> CompileError {
    CompileError::Parse { line, reason: reason.into() }
}

fn parse_num(line: usize, s: &str) -> CompileResult<u32> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| parse_err(line, format!("bad number {s:?}")))
}

/// Parse one line. Blank lines, comments and `$import` lines yield `None`.
pub fn parse_line(line_no: usize, text: &str) -> CompileResult<Option<OpcodeLine>> {
    let text = text.split('#').next().unwrap_or("").trim();
    let mut words = text.split_whitespace();
    let Some(first) = words.next() else { return Ok(None) };

    let (name, pseudo_of) = match first {
        "$import" => return Ok(None),
        "$pseudo_op" => {
            let base = words.next().ok_or_else(|| parse_err(line_no, "$pseudo_op without base"))?;
            let name = words.next().ok_or_else(|| parse_err(line_no, "$pseudo_op without name"))?;
            (name, Some(base.to_string()))
        }
        _ if first.starts_with('$') => return Err(parse_err(line_no, format!("unknown directive {first}"))),
        _ => (first, None),
    };

    let mut operands = Vec::new();
    let mut match_bits = 0u32;
    let mut mask = 0u32;
    for w in words {
        let Some((range, value)) = w.split_once('=') else {
            operands.push(w.to_string());
            continue;
        };
        let (hi, lo) = match range.split_once("..") {
            Some((hi, lo)) => (parse_num(line_no, hi)?, parse_num(line_no, lo)?),
            None => {
                let bit = parse_num(line_no, range)?;
                (bit, bit)
            }
        };
        if hi > 31 || lo > hi {
            return Err(parse_err(line_no, format!("bad bit range {range}")));
        }
        if value == "ignore" {
            continue;
        }
        let value = parse_num(line_no, value)?;
        let width = hi - lo + 1;
        let field = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
        if value > field {
            return Err(parse_err(line_no, format!("{w}: value does not fit")));
        }
        if mask & (field << lo) != 0 {
            return Err(parse_err(line_no, format!("{w}: overlapping bit range")));
        }
        mask |= field << lo;
        match_bits |= value << lo;
    }

    if mask & 0x7f != 0x7f {
        return Err(parse_err(line_no, format!("{name}: opcode bits not fixed")));
    }
    Ok(Some(OpcodeLine { name: name.to_string(), operands, match_bits, mask, pseudo_of }))
}

/// Parse a whole file.
pub fn parse_file(src: &str) -> CompileResult<Vec<OpcodeLine>> {
    let mut out = Vec::new();
    for (i, text) in src.lines().enumerate() {
        if let Some(line) = parse_line(i + 1, text)? {
            out.push(line);
        }
    }
    Ok(out)
}

/// Merge lines from several files into one entry per name, sorted by name.
/// A real definition replaces a pseudo-op of the same name.
pub fn merge(lines: impl IntoIterator<Item = OpcodeLine>) -> Vec<OpcodeLine> {
    let mut by_name: BTreeMap<String, OpcodeLine> = BTreeMap::new();
    for line in lines {
        match by_name.get(&line.name) {
            Some(prev) if !prev.is_pseudo() && line.is_pseudo() => {}
            _ => {
                by_name.insert(line.name.clone(), line);
            }
        }
    }
    by_name.into_values().collect()
}

/// Enum variant name for a dotted ISA name: `fcvt.d.lu` is `FcvtDLu`.
pub fn variant_name(isa: &str) -> String {
    isa.split('.')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// One row of the encoding table.
pub fn table_row(line: &OpcodeLine) -> String {
    let i = line.inst();
    format!(
        "{} \"{}\" => ({:#x}, {:#x}, {:#x}, {}, {:#x}),",
        variant_name(&line.name),
        line.name,
        i.opcode,
        i.funct3,
        i.rs2,
        i.csr,
        i.funct7
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riscv64::inst::{encode, Mnemonic};

    #[test]
    fn test_parse_add() {
        let line = parse_line(1, "add rd rs1 rs2 31..25=0 14..12=0 6..2=0x0C 1..0=3").unwrap().unwrap();
        assert_eq!(line.operands, ["rd", "rs1", "rs2"]);
        assert_eq!(line.match_bits, 0x33);
        assert_eq!(line.mask, 0xfe00_707f);
        assert_eq!(Some(&line.inst()), encode(Mnemonic::Add));
        assert_eq!(table_row(&line), "Add \"add\" => (0x33, 0x0, 0x0, 0, 0x0),");
    }

    #[test]
    fn test_parse_conversion() {
        let line = parse_line(3, "fcvt.d.l rd rs1 24..20=2 31..27=0x1A rm 26..25=1 6..2=0x14 1..0=3")
            .unwrap()
            .unwrap();
        assert_eq!(line.match_bits, 0xd220_0053);
        assert_eq!(Some(&line.inst()), encode(Mnemonic::FcvtDL));
        assert_eq!(variant_name(&line.name), "FcvtDL");
    }

    #[test]
    fn test_parse_pseudo_op() {
        let line = parse_line(
            7,
            "$pseudo_op zicsr::csrrs rdcycle rd 19..15=0 31..20=0xC00 14..12=2 6..2=0x1C 1..0=3",
        )
        .unwrap()
        .unwrap();
        assert_eq!(line.name, "rdcycle");
        assert_eq!(line.pseudo_of.as_deref(), Some("zicsr::csrrs"));
        assert_eq!(line.inst().csr, -1024);
        assert_eq!(Some(&line.inst()), encode(Mnemonic::Rdcycle));
    }

    #[test]
    fn test_skipped_and_bad_lines() {
        assert_eq!(parse_line(1, "").unwrap(), None);
        assert_eq!(parse_line(2, "# comment").unwrap(), None);
        assert_eq!(parse_line(3, "$import rv32_i::lui").unwrap(), None);
        assert!(matches!(parse_line(4, "add rd 6..2=0x40 1..0=3"), Err(CompileError::Parse { line: 4, .. })));
        assert!(parse_line(5, "add rd 6..2=0x0C").is_err());
        assert!(parse_line(6, "add 6..0=0x33 3..0=1").is_err());
    }

    #[test]
    fn test_merge_prefers_real() {
        let src = "\
$pseudo_op rv64_i::slli slli rd rs1 31..25=0 shamtw 14..12=1 6..2=0x04 1..0=3
slli rd rs1 31..26=0 shamtd 14..12=1 6..2=0x04 1..0=3
addi rd rs1 imm12 14..12=0 6..2=0x04 1..0=3
";
        let merged = merge(parse_file(src).unwrap());
        let names: Vec<&str> = merged.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["addi", "slli"]);
        assert!(!merged[1].is_pseudo());
    }
}
