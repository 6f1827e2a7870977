// This module is the riscv64 lowering backend. Values are lowered in the operand order of the
// Plan 9 style RISC-V assembler (source, middle register, destination), using the assembler's
// pseudo-instructions (MOV and friends, NEG, NOT, SEQZ, SNEZ, BEQZ, BNEZ) wherever the
// assembler expands them; everything emitted here must resolve to a table descriptor through
// asm::resolve. Stack zeroing stores the hardwired ZERO register: unrolled doubleword stores
// for small ranges, a pointer-bump loop for large ones, then one halfword/word/byte store per
// set bit of the remainder. Conditional blocks prefer falling through to the next block in
// layout and use the static prediction to pick which side gets the explicit jump.

//! riscv64 code generation.

use super::inst::Mnemonic;
use super::{REG_SP, REG_TMP, REG_ZERO};
use crate::core::compiler::{check_zero_range, tail_widths, Backend, RegSlotHook, State};
use crate::core::error::CompileResult;
use crate::core::prog::{Addr, AddrName, AddrType, As, ProgId, Progs, RegId};
use crate::ssa::{Block, BlockId, BlockKind, Cond, Likely, Op, RegSlot, Type, Value};

const PTR_SIZE: i64 = 8;
const FIXED_FRAME_SIZE: i64 = 8;

/// Largest number of doubleword stores emitted without a loop.
const MAX_UNROLLED_WORDS: i64 = 8;

/// Loop counters used by block zeroing.
const REG_T0: RegId = super::x(5);
const REG_T1: RegId = super::x(6);

pub struct Riscv64Backend;

fn rv(m: Mnemonic) -> As {
    As::Riscv(m)
}

/// Load instruction for a value of type `t`.
pub fn load_by_type(t: &Type) -> Mnemonic {
    if t.is_float() {
        return if t.size == 4 { Mnemonic::Movf } else { Mnemonic::Movd };
    }
    match (t.size, t.is_signed()) {
        (1, true) => Mnemonic::Movb,
        (1, false) => Mnemonic::Movbu,
        (2, true) => Mnemonic::Movh,
        (2, false) => Mnemonic::Movhu,
        (4, true) => Mnemonic::Movw,
        (4, false) => Mnemonic::Movwu,
        _ => Mnemonic::Mov,
    }
}

/// Store instruction for a value of type `t`.
pub fn store_by_type(t: &Type) -> Mnemonic {
    if t.is_float() {
        return if t.size == 4 { Mnemonic::Movf } else { Mnemonic::Movd };
    }
    match t.size {
        1 => Mnemonic::Movb,
        2 => Mnemonic::Movh,
        4 => Mnemonic::Movw,
        _ => Mnemonic::Mov,
    }
}

fn store_by_width(w: i64) -> Mnemonic {
    match w {
        1 => Mnemonic::Movb,
        2 => Mnemonic::Movh,
        4 => Mnemonic::Movw,
        _ => Mnemonic::Mov,
    }
}

/// Clear `cnt` bytes at `off(base)`.
fn zero_block(pp: &mut Progs<'_>, base: RegId, off: i64, cnt: i64) {
    let words = cnt / PTR_SIZE;
    let mut off = off;

    if words <= MAX_UNROLLED_WORDS {
        for _ in 0..words {
            let p = pp.prog(rv(Mnemonic::Mov));
            p.from = Addr::reg(REG_ZERO);
            p.to = Addr::mem(base, off);
            off += PTR_SIZE;
        }
    } else {
        // ADDI $off, base, T0
        // ADDI $(words*8), T0, T1
        // loop: MOV ZERO, (T0); ADDI $8, T0, T0; BNE T0, T1, loop
        let p = pp.prog(rv(Mnemonic::Addi));
        p.from = Addr::constant(off);
        p.reg = base;
        p.to = Addr::reg(REG_T0);
        let p = pp.prog(rv(Mnemonic::Addi));
        p.from = Addr::constant(words * PTR_SIZE);
        p.reg = REG_T0;
        p.to = Addr::reg(REG_T1);

        let top = pp.next_id();
        let p = pp.prog(rv(Mnemonic::Mov));
        p.from = Addr::reg(REG_ZERO);
        p.to = Addr::mem(REG_T0, 0);
        let p = pp.prog(rv(Mnemonic::Addi));
        p.from = Addr::constant(PTR_SIZE);
        p.reg = REG_T0;
        p.to = Addr::reg(REG_T0);
        let p = pp.prog(rv(Mnemonic::Bne));
        p.from = Addr::reg(REG_T1);
        p.reg = REG_T0;
        p.to.ty = AddrType::Branch;
        p.to.target = Some(top);

        off += words * PTR_SIZE;
    }

    for w in tail_widths(cnt % PTR_SIZE) {
        let p = pp.prog(rv(store_by_width(w)));
        p.from = Addr::reg(REG_ZERO);
        p.to = Addr::mem(base, off);
        off += w;
    }
}

fn load_reg_result(pp: &mut Progs<'_>, slot: &RegSlot) -> ProgId {
    let id = pp.next_id();
    let p = pp.prog(rv(load_by_type(&slot.ty)));
    p.from = Addr::stack(REG_SP, AddrName::Auto, slot.off);
    p.to = Addr::reg(slot.reg);
    id
}

fn spill_arg_reg(pp: &mut Progs<'_>, slot: &RegSlot) -> ProgId {
    let id = pp.next_id();
    let p = pp.prog(rv(store_by_type(&slot.ty)));
    p.from = Addr::reg(slot.reg);
    p.to = Addr::stack(REG_SP, AddrName::Param, slot.off);
    id
}

/// Register-register form of a binary op.
fn binary_op(v: &Value) -> Option<Mnemonic> {
    use Mnemonic::*;
    let word = v.ty.size == 4;
    let single = v.ty.size == 4;
    Some(match v.op {
        Op::Add => Add,
        Op::Sub => Sub,
        Op::And => And,
        Op::Or => Or,
        Op::Xor => Xor,
        Op::Mul if word => Mulw,
        Op::Mul => Mul,
        Op::Div if word => Divw,
        Op::Div => Div,
        Op::Divu if word => Divuw,
        Op::Divu => Divu,
        Op::Rem if word => Remw,
        Op::Rem => Rem,
        Op::Remu if word => Remuw,
        Op::Remu => Remu,
        Op::Shl if word => Sllw,
        Op::Shl => Sll,
        Op::Shr if word => Srlw,
        Op::Shr => Srl,
        Op::Sar if word => Sraw,
        Op::Sar => Sra,
        Op::Less => Slt,
        Op::LessU => Sltu,
        Op::FAdd if single => FaddS,
        Op::FAdd => FaddD,
        Op::FSub if single => FsubS,
        Op::FSub => FsubD,
        Op::FMul if single => FmulS,
        Op::FMul => FmulD,
        Op::FDiv if single => FdivS,
        Op::FDiv => FdivD,
        _ => return None,
    })
}

/// Float to integer conversion, truncating.
fn float_to_int(from: &Type, to: &Type) -> Mnemonic {
    use Mnemonic::*;
    match (from.size, to.size == 4, to.is_signed()) {
        (4, true, true) => FcvtWS,
        (4, true, false) => FcvtWuS,
        (4, false, true) => FcvtLS,
        (4, false, false) => FcvtLuS,
        (_, true, true) => FcvtWD,
        (_, true, false) => FcvtWuD,
        (_, false, true) => FcvtLD,
        (_, false, false) => FcvtLuD,
    }
}

fn int_to_float(from: &Type, to: &Type) -> Mnemonic {
    use Mnemonic::*;
    match (to.size, from.size == 4, from.is_signed()) {
        (4, true, true) => FcvtSW,
        (4, true, false) => FcvtSWu,
        (4, false, true) => FcvtSL,
        (4, false, false) => FcvtSLu,
        (_, true, true) => FcvtDW,
        (_, true, false) => FcvtDWu,
        (_, false, true) => FcvtDL,
        (_, false, false) => FcvtDLu,
    }
}

fn branch_for(cond: Cond) -> Mnemonic {
    match cond {
        Cond::Eq => Mnemonic::Beq,
        Cond::Ne => Mnemonic::Bne,
        Cond::Lt => Mnemonic::Blt,
        Cond::Ge => Mnemonic::Bge,
        Cond::Ltu => Mnemonic::Bltu,
        Cond::Geu => Mnemonic::Bgeu,
    }
}

fn succ(s: &State<'_, '_>, b: &Block, i: usize) -> CompileResult<BlockId> {
    b.succs.get(i).copied().ok_or_else(|| s.unhandled_block(b))
}

impl Backend for Riscv64Backend {
    fn ginsnop(&self, pp: &mut Progs<'_>) -> ProgId {
        // The hardware nop is ADD $0, ZERO, ZERO, encoded as ADDI.
        let id = pp.next_id();
        let p = pp.prog(rv(Mnemonic::Add));
        p.from = Addr::constant(0);
        p.reg = REG_ZERO;
        p.to = Addr::reg(REG_ZERO);
        id
    }

    fn zero_range(&self, pp: &mut Progs<'_>, off: i64, cnt: i64) -> CompileResult<()> {
        check_zero_range(off, cnt)?;
        zero_block(pp, REG_SP, off + FIXED_FRAME_SIZE, cnt);
        Ok(())
    }

    fn ssa_gen_value(&self, s: &mut State<'_, '_>, v: &Value) -> CompileResult<()> {
        if s.arch.soft_float && v.op.is_float() {
            return Err(s.unhandled_value(v));
        }

        match v.op {
            Op::InitMem | Op::Arg => {}
            Op::Phi => s.check_lowered_phi(v)?,
            Op::Copy => {
                if v.ty.is_mem() {
                    return Ok(());
                }
                let rs = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                if rs != rd {
                    let m = if v.ty.is_float() { Mnemonic::Movd } else { Mnemonic::Mov };
                    let p = s.prog(rv(m));
                    p.from = Addr::reg(rs);
                    p.to = Addr::reg(rd);
                }
            }
            Op::LoadReg => {
                let slot = s.slot_of(s.arg(v, 0)?)?;
                let rd = s.reg_of(v)?;
                let p = s.prog(rv(load_by_type(&v.ty)));
                p.from = Addr::stack(REG_SP, AddrName::Auto, slot);
                p.to = Addr::reg(rd);
            }
            Op::StoreReg => {
                let rs = s.arg_reg(v, 0)?;
                let slot = s.slot_of(v)?;
                let p = s.prog(rv(store_by_type(&v.ty)));
                p.from = Addr::reg(rs);
                p.to = Addr::stack(REG_SP, AddrName::Auto, slot);
            }
            Op::Const => {
                let rd = s.reg_of(v)?;
                let p = s.prog(rv(Mnemonic::Mov));
                p.from = Addr::constant(v.aux_int);
                p.to = Addr::reg(rd);
            }
            Op::ConstFloat => {
                let rd = s.reg_of(v)?;
                let m = if v.ty.size == 4 { Mnemonic::Movf } else { Mnemonic::Movd };
                let p = s.prog(rv(m));
                p.from = Addr::fconst(v.aux_float);
                p.to = Addr::reg(rd);
            }
            Op::AddConst => {
                let r = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                let m = if v.ty.size == 4 { Mnemonic::Addiw } else { Mnemonic::Addi };
                let p = s.prog(rv(m));
                p.from = Addr::constant(v.aux_int);
                p.reg = r;
                p.to = Addr::reg(rd);
            }
            Op::Neg | Op::Not | Op::EqZero | Op::NeqZero | Op::FSqrt => {
                let m = match v.op {
                    Op::Neg if v.ty.size == 4 => Mnemonic::Negw,
                    Op::Neg => Mnemonic::Neg,
                    Op::Not => Mnemonic::Not,
                    Op::EqZero => Mnemonic::Seqz,
                    Op::NeqZero => Mnemonic::Snez,
                    _ if v.ty.size == 4 => Mnemonic::FsqrtS,
                    _ => Mnemonic::FsqrtD,
                };
                let rs = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                let p = s.prog(rv(m));
                p.from = Addr::reg(rs);
                p.to = Addr::reg(rd);
            }
            Op::FloatToInt | Op::IntToFloat => {
                let src = s.arg(v, 0)?;
                let m = if v.op == Op::FloatToInt {
                    float_to_int(&src.ty, &v.ty)
                } else {
                    int_to_float(&src.ty, &v.ty)
                };
                let rs = s.reg_of(src)?;
                let rd = s.reg_of(v)?;
                let p = s.prog(rv(m));
                p.from = Addr::reg(rs);
                p.to = Addr::reg(rd);
            }
            Op::Load => {
                let base = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                let p = s.prog(rv(load_by_type(&v.ty)));
                p.from = Addr::mem(base, v.aux_int);
                p.to = Addr::reg(rd);
            }
            Op::Store => {
                let base = s.arg_reg(v, 0)?;
                let val = s.arg(v, 1)?;
                let rs = s.reg_of(val)?;
                let p = s.prog(rv(store_by_type(&val.ty)));
                p.from = Addr::reg(rs);
                p.to = Addr::mem(base, v.aux_int);
            }
            Op::Zero => {
                let base = s.arg_reg(v, 0)?;
                if v.aux_int < 0 {
                    return Err(s.error(format!("{v}: negative size {}", v.aux_int)));
                }
                zero_block(&mut s.pp, base, 0, v.aux_int);
            }
            Op::AtomicAdd => {
                // AMOADD leaves the old value in TMP; the result is old + delta.
                let ptr = s.arg_reg(v, 0)?;
                let delta = s.arg_reg(v, 1)?;
                let rd = s.reg_of(v)?;
                let m = if v.ty.size == 4 { Mnemonic::AmoaddW } else { Mnemonic::AmoaddD };
                let p = s.prog(rv(m));
                p.from = Addr::reg(delta);
                p.reg = REG_TMP;
                p.to = Addr::mem(ptr, 0);
                let m = if v.ty.size == 4 { Mnemonic::Addw } else { Mnemonic::Add };
                let p = s.prog(rv(m));
                p.from = Addr::reg(REG_TMP);
                p.reg = delta;
                p.to = Addr::reg(rd);
            }
            Op::StaticCall => {
                let sym = s.call_target(v)?;
                s.prog(As::Call).to = Addr::extern_sym(sym);
            }
            Op::PanicBounds => {
                let sym = s.bounds_target(v)?;
                s.prog(As::Call).to = Addr::extern_sym(sym);
            }
            Op::NilCheck => {
                let ptr = s.arg_reg(v, 0)?;
                let p = s.prog(rv(Mnemonic::Movb));
                p.from = Addr::mem(ptr, 0);
                p.to = Addr::reg(REG_ZERO);
            }
            _ => {
                let m = binary_op(v).ok_or_else(|| s.unhandled_value(v))?;
                let x = s.arg_reg(v, 0)?;
                let y = s.arg_reg(v, 1)?;
                let rd = s.reg_of(v)?;
                let p = s.prog(rv(m));
                p.from = Addr::reg(y);
                p.reg = x;
                p.to = Addr::reg(rd);
            }
        }
        Ok(())
    }

    fn ssa_gen_block(&self, s: &mut State<'_, '_>, b: &Block, next: Option<&Block>) -> CompileResult<()> {
        let next_id = next.map(|n| n.id);

        let (br, inv) = match b.kind {
            BlockKind::Plain => {
                let to = succ(s, b, 0)?;
                if next_id != Some(to) {
                    s.br(As::Jmp, to);
                }
                return Ok(());
            }
            BlockKind::Exit => return Ok(()),
            BlockKind::Ret => {
                s.prog(As::Ret);
                return Ok(());
            }
            BlockKind::If => (Mnemonic::Bnez, Mnemonic::Beqz),
            BlockKind::Branch(c) => (branch_for(c), branch_for(c.invert())),
        };

        let (yes, no) = (succ(s, b, 0)?, succ(s, b, 1)?);
        let (as_, target, jmp) = if next_id == Some(yes) {
            (inv, no, None)
        } else if next_id == Some(no) {
            (br, yes, None)
        } else if b.likely != Likely::Unlikely {
            (br, yes, Some(no))
        } else {
            (inv, no, Some(yes))
        };

        let (first, second) = match b.kind {
            BlockKind::If => (s.control_reg(b, 0)?, None),
            _ => (s.control_reg(b, 0)?, Some(s.control_reg(b, 1)?)),
        };
        let p = s.br(rv(as_), target);
        match second {
            Some(second) => {
                p.reg = first;
                p.from = Addr::reg(second);
            }
            None => p.from = Addr::reg(first),
        }
        if let Some(other) = jmp {
            s.br(As::Jmp, other);
        }
        Ok(())
    }

    fn load_reg_result(&self) -> Option<RegSlotHook> {
        Some(load_reg_result)
    }

    fn spill_arg_reg(&self) -> Option<RegSlotHook> {
        Some(spill_arg_reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prog::AddrType;
    use crate::riscv64::LINK_RISCV64;
    use bumpalo::Bump;

    #[test]
    fn test_large_zero_range_uses_loop() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_RISCV64);
        Riscv64Backend.zero_range(&mut pp, 0, 8 * 20 + 3).unwrap();
        let ops: Vec<String> = pp.iter().map(|p| p.as_.to_string()).collect();
        assert_eq!(ops, ["ADDI", "ADDI", "MOV", "ADDI", "BNE", "MOVH", "MOVB"]);
        let bne = pp.get(ProgId(4)).unwrap();
        assert_eq!(bne.to.ty, AddrType::Branch);
        assert_eq!(bne.to.target, Some(ProgId(2)));
        // Tail follows the 160 looped bytes, above the saved link register.
        assert_eq!(pp.get(ProgId(5)).unwrap().to.offset, 8 + 160);
        assert_eq!(pp.get(ProgId(6)).unwrap().to.offset, 8 + 162);
    }

    #[test]
    fn test_zero_range_rejects_negative() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_RISCV64);
        assert!(Riscv64Backend.zero_range(&mut pp, 0, -8).is_err());
        assert!(pp.is_empty());
    }

    #[test]
    fn test_load_store_by_type() {
        assert_eq!(load_by_type(&Type::UINT8), Mnemonic::Movbu);
        assert_eq!(load_by_type(&Type::INT32), Mnemonic::Movw);
        assert_eq!(load_by_type(&Type::FLOAT32), Mnemonic::Movf);
        assert_eq!(load_by_type(&Type::PTR), Mnemonic::Mov);
        assert_eq!(store_by_type(&Type::UINT16), Mnemonic::Movh);
        assert_eq!(store_by_type(&Type::FLOAT64), Mnemonic::Movd);
    }
}
