//! Mapping from emitted Progs to the machine instructions that encode them.
//!
//! The backend emits assembler-level forms: register-register opcodes that
//! take a constant first operand, the MOV family, and pseudo-instructions such
//! as `NEG` or `BEQZ`. [`resolve`] picks the real instruction the assembler
//! uses for each of them, so every Prog the backend produces can be checked
//! against the encoding table. [`encode_word`] goes one step further for the
//! forms whose operands are fully known (no symbols or branch targets).

use super::inst::{encode_or_err, Inst, Mnemonic, OpcodeClass};
use super::{is_float_reg, reg_num, REG_RA, REG_ZERO};
use crate::core::error::{CompileError, CompileResult};
use crate::core::prog::{Addr, AddrType, As, Prog, REG_NONE};

fn missing(as_: As) -> CompileError {
    CompileError::MissingEncoding { arch: "riscv64", mnemonic: as_.to_string() }
}

fn fits_imm12(c: i64) -> bool {
    (-2048..2048).contains(&c)
}

/// Immediate form of a register-register opcode.
fn immediate_form(m: Mnemonic) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match m {
        Add | Sub => Addi,
        Addw | Subw => Addiw,
        And => Andi,
        Or => Ori,
        Xor => Xori,
        Sll => Slli,
        Srl => Srli,
        Sra => Srai,
        Sllw => Slliw,
        Srlw => Srliw,
        Sraw => Sraiw,
        Slt => Slti,
        Sltu => Sltiu,
        _ => return None,
    })
}

/// Load, store and register forms of one MOV variant.
struct MoveForms {
    load: Mnemonic,
    store: Mnemonic,
    reg: Mnemonic,
}

fn move_forms(m: Mnemonic) -> Option<MoveForms> {
    use Mnemonic::*;
    let (load, store, reg) = match m {
        Mov => (Ld, Sd, Addi),
        Movb => (Lb, Sb, Slli),
        Movbu => (Lbu, Sb, Andi),
        Movh => (Lh, Sh, Slli),
        Movhu => (Lhu, Sh, Slli),
        Movw => (Lw, Sw, Addiw),
        Movwu => (Lwu, Sw, Slli),
        Movf => (Flw, Fsw, FsgnjS),
        Movd => (Fld, Fsd, FsgnjD),
        _ => return None,
    };
    Some(MoveForms { load, store, reg })
}

fn resolve_move(p: &Prog, m: Mnemonic, forms: MoveForms) -> CompileResult<Mnemonic> {
    if p.to.is_mem() {
        return Ok(forms.store);
    }
    match p.from.ty {
        // Float constants are loaded from the constant pool.
        AddrType::Mem | AddrType::FConst => Ok(forms.load),
        AddrType::Const if m == Mnemonic::Mov => {
            let c = p.from.offset;
            Ok(if fits_imm12(c) {
                Mnemonic::Addi
            } else if i32::try_from(c).is_ok() {
                Mnemonic::Lui
            } else {
                Mnemonic::Auipc
            })
        }
        AddrType::Reg if m == Mnemonic::Movd || m == Mnemonic::Movf => {
            let single = m == Mnemonic::Movf;
            Ok(match (is_float_reg(p.from.reg), is_float_reg(p.to.reg)) {
                (true, true) => forms.reg,
                (false, true) if single => Mnemonic::FmvWX,
                (false, true) => Mnemonic::FmvDX,
                (true, false) if single => Mnemonic::FmvXW,
                (true, false) => Mnemonic::FmvXD,
                (false, false) => return Err(missing(p.as_)),
            })
        }
        AddrType::Reg => Ok(forms.reg),
        _ => Err(missing(p.as_)),
    }
}

/// The table instruction that encodes `p`.
pub fn resolve(p: &Prog) -> CompileResult<(Mnemonic, &'static Inst)> {
    use Mnemonic::*;
    let m = match p.as_ {
        As::Jmp | As::Call => Jal,
        As::Ret => Jalr,
        As::Undef => Ebreak,
        As::Riscv(m) => match m {
            Neg => Sub,
            Negw => Subw,
            Not => Xori,
            Seqz => Sltiu,
            Snez => Sltu,
            Beqz => Beq,
            Bnez => Bne,
            Fnegd => FsgnjnD,
            _ => {
                if let Some(forms) = move_forms(m) {
                    resolve_move(p, m, forms)?
                } else if p.from.is_const() {
                    immediate_form(m).unwrap_or(m)
                } else {
                    m
                }
            }
        },
        _ => return Err(missing(p.as_)),
    };
    let inst = encode_or_err(m)?;
    Ok((m, inst))
}

fn operand_reg(a: &Addr) -> Option<u32> {
    match a.ty {
        AddrType::Reg => reg_num(a.reg),
        _ => None,
    }
}

/// Float ops with a single register source in rs1.
fn is_unary_fp(m: Mnemonic) -> bool {
    m.isa_name()
        .is_some_and(|n| n.starts_with("fcvt.") || n.starts_with("fmv.") || n.starts_with("fsqrt."))
}

/// Round-toward-zero in the rm field of an OP-FP word.
const RM_RTZ: u32 = 1;

/// Descriptor with the rounding mode the assembler uses for `m`.
///
/// Conversions to an integer truncate; everything else keeps the table's
/// rm bits.
fn with_rounding_mode(m: Mnemonic, inst: &Inst) -> Inst {
    let to_int = m
        .isa_name()
        .is_some_and(|n| ["fcvt.w.", "fcvt.wu.", "fcvt.l.", "fcvt.lu."].iter().any(|p| n.starts_with(p)));
    if to_int {
        Inst { funct3: RM_RTZ, ..*inst }
    } else {
        *inst
    }
}

/// Assemble an S-type word.
fn encode_s(inst: &Inst, rs1: u32, rs2: u32, imm: i64) -> u32 {
    let imm = (imm & 0xfff) as u32;
    (imm >> 5) << 25 | rs2 << 20 | rs1 << 15 | inst.funct3 << 12 | (imm & 0x1f) << 7 | inst.opcode
}

/// Machine word for `p`, if it can be encoded without relocation.
///
/// Returns `Ok(None)` for control transfers, symbol references and constants
/// that need more than one instruction.
pub fn encode_word(p: &Prog) -> CompileResult<Option<u32>> {
    let (m, inst) = resolve(p)?;
    if p.to.sym.is_some() || p.from.sym.is_some() {
        return Ok(None);
    }

    let word = match inst.class() {
        Some(OpcodeClass::Op | OpcodeClass::Op32 | OpcodeClass::OpFp) => {
            let Some(rd) = operand_reg(&p.to) else { return Ok(None) };
            let Some(rs2) = operand_reg(&p.from) else { return Ok(None) };
            if matches!(p.as_, As::Riscv(Mnemonic::Neg | Mnemonic::Negw | Mnemonic::Snez)) {
                // Pseudo forms with an implicit ZERO first source.
                inst.encode_r(rd, 0, rs2)
            } else if is_unary_fp(m) {
                with_rounding_mode(m, inst).encode_r(rd, rs2, 0)
            } else if matches!(p.as_, As::Riscv(Mnemonic::Movf | Mnemonic::Movd | Mnemonic::Fnegd)) {
                inst.encode_r(rd, rs2, rs2)
            } else {
                let rs1 = if p.reg == REG_NONE { Some(rd) } else { reg_num(p.reg) };
                let Some(rs1) = rs1 else { return Ok(None) };
                inst.encode_r(rd, rs1, rs2)
            }
        }
        Some(OpcodeClass::OpImm | OpcodeClass::OpImm32) => {
            let Some(rd) = operand_reg(&p.to) else { return Ok(None) };
            let (rs1, imm) = match (p.as_, p.from.ty) {
                (As::Riscv(Mnemonic::Not), AddrType::Reg) => (operand_reg(&p.from), -1),
                (As::Riscv(Mnemonic::Seqz), AddrType::Reg) => (operand_reg(&p.from), 1),
                (As::Riscv(Mnemonic::Mov | Mnemonic::Movw), AddrType::Reg) => (operand_reg(&p.from), 0),
                (As::Riscv(Mnemonic::Movbu), AddrType::Reg) => (operand_reg(&p.from), 0xff),
                (As::Riscv(Mnemonic::Mov), AddrType::Const) => (Some(0), p.from.offset),
                (As::Riscv(Mnemonic::Sub | Mnemonic::Subw), AddrType::Const) => {
                    (if p.reg == REG_NONE { Some(rd) } else { reg_num(p.reg) }, -p.from.offset)
                }
                (_, AddrType::Const) => (if p.reg == REG_NONE { Some(rd) } else { reg_num(p.reg) }, p.from.offset),
                _ => return Ok(None),
            };
            let Some(rs1) = rs1 else { return Ok(None) };
            if !fits_imm12(imm) {
                return Ok(None);
            }
            inst.encode_i(rd, rs1, imm)
        }
        Some(OpcodeClass::Load | OpcodeClass::LoadFp) => {
            let (Some(rd), AddrType::Mem) = (operand_reg(&p.to), p.from.ty) else { return Ok(None) };
            let Some(rs1) = reg_num(p.from.reg) else { return Ok(None) };
            if !fits_imm12(p.from.offset) {
                return Ok(None);
            }
            inst.encode_i(rd, rs1, p.from.offset)
        }
        Some(OpcodeClass::Store | OpcodeClass::StoreFp) => {
            let (Some(rs2), AddrType::Mem) = (operand_reg(&p.from), p.to.ty) else { return Ok(None) };
            let Some(rs1) = reg_num(p.to.reg) else { return Ok(None) };
            if !fits_imm12(p.to.offset) {
                return Ok(None);
            }
            encode_s(inst, rs1, rs2, p.to.offset)
        }
        Some(OpcodeClass::Jalr) if m == Mnemonic::Jalr => {
            // RET is JALR ZERO, 0(RA).
            let ra = reg_num(REG_RA).unwrap_or(1);
            let zero = reg_num(REG_ZERO).unwrap_or(0);
            inst.encode_i(zero, ra, 0)
        }
        Some(OpcodeClass::System) if p.as_ == As::Undef => inst.encode_i(0, 0, 0),
        _ => return Ok(None),
    };
    Ok(Some(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riscv64::x;

    fn prog(as_: As, from: Addr, reg: crate::core::prog::RegId, to: Addr) -> Prog {
        let mut p = Prog::new(as_);
        p.from = from;
        p.reg = reg;
        p.to = to;
        p
    }

    #[test]
    fn test_nop_is_addi() {
        let p = prog(As::Riscv(Mnemonic::Add), Addr::constant(0), REG_ZERO, Addr::reg(REG_ZERO));
        assert_eq!(resolve(&p).unwrap().0, Mnemonic::Addi);
        assert_eq!(encode_word(&p).unwrap(), Some(0x0000_0013));
    }

    #[test]
    fn test_register_add() {
        let p = prog(As::Riscv(Mnemonic::Add), Addr::reg(x(3)), x(2), Addr::reg(x(1)));
        assert_eq!(encode_word(&p).unwrap(), Some(0x0031_00b3));
    }

    #[test]
    fn test_mov_forms() {
        let small = prog(As::Riscv(Mnemonic::Mov), Addr::constant(42), REG_NONE, Addr::reg(x(10)));
        assert_eq!(resolve(&small).unwrap().0, Mnemonic::Addi);
        let word = prog(As::Riscv(Mnemonic::Mov), Addr::constant(1 << 20), REG_NONE, Addr::reg(x(10)));
        assert_eq!(resolve(&word).unwrap().0, Mnemonic::Lui);
        let wide = prog(As::Riscv(Mnemonic::Mov), Addr::constant(1 << 40), REG_NONE, Addr::reg(x(10)));
        assert_eq!(resolve(&wide).unwrap().0, Mnemonic::Auipc);
        let store = prog(As::Riscv(Mnemonic::Movh), Addr::reg(REG_ZERO), REG_NONE, Addr::mem(x(2), 8));
        assert_eq!(resolve(&store).unwrap().0, Mnemonic::Sh);
        let load = prog(As::Riscv(Mnemonic::Movwu), Addr::mem(x(2), 8), REG_NONE, Addr::reg(x(5)));
        assert_eq!(resolve(&load).unwrap().0, Mnemonic::Lwu);
    }

    #[test]
    fn test_store_word() {
        // sd zero, 16(sp)
        let p = prog(As::Riscv(Mnemonic::Mov), Addr::reg(REG_ZERO), REG_NONE, Addr::mem(x(2), 16));
        assert_eq!(encode_word(&p).unwrap(), Some(0x0001_3823));
    }

    #[test]
    fn test_pseudos() {
        let neg = prog(As::Riscv(Mnemonic::Neg), Addr::reg(x(5)), REG_NONE, Addr::reg(x(6)));
        assert_eq!(resolve(&neg).unwrap().0, Mnemonic::Sub);
        // sub x6, zero, x5
        assert_eq!(encode_word(&neg).unwrap(), Some(0x4050_0333));
        let bnez = prog(As::Riscv(Mnemonic::Bnez), Addr::reg(x(5)), REG_NONE, Addr::default());
        assert_eq!(resolve(&bnez).unwrap().0, Mnemonic::Bne);
        assert_eq!(resolve(&Prog::new(As::Ret)).unwrap().0, Mnemonic::Jalr);
        assert_eq!(encode_word(&Prog::new(As::Ret)).unwrap(), Some(0x0000_8067));
    }

    #[test]
    fn test_foreign_opcode() {
        let p = Prog::new(As::Mips64(crate::mips64::Op::Nor));
        assert!(matches!(resolve(&p), Err(CompileError::MissingEncoding { arch: "riscv64", .. })));
    }
}
