// mips64 has no three-register multiply or divide: MULV and DIVV leave their results in the
// HI/LO pair and a MOVV copies the wanted half out. Conditional branches only compare two
// registers for (in)equality, so ordered comparisons first materialize SGT/SGTU into the
// temporary register and branch on it. The atomic add is a load-linked/store-conditional loop
// fenced by SYNC. With the soft-float ABI every float operation must already have been
// rewritten into runtime calls; one reaching this backend is an error.

//! mips64 code generation.

use super::{Op as M, REG_HI, REG_LO, REG_RT1, REG_RT2, REG_SP, REG_TMP, REG_ZERO};
use crate::core::compiler::{check_zero_range, tail_widths, Backend, State};
use crate::core::error::CompileResult;
use crate::core::prog::{Addr, AddrName, AddrType, As, ProgId, Progs, RegId};
use crate::ssa::{Block, BlockId, BlockKind, Cond, Likely, Op, Type, Value};

const PTR_SIZE: i64 = 8;
const FIXED_FRAME_SIZE: i64 = 8;

pub struct Mips64Backend;

fn ma(op: M) -> As {
    As::Mips64(op)
}

pub fn load_by_type(t: &Type) -> M {
    if t.is_float() {
        return if t.size == 4 { M::Movf } else { M::Movd };
    }
    match (t.size, t.is_signed()) {
        (1, true) => M::Movb,
        (1, false) => M::Movbu,
        (2, true) => M::Movh,
        (2, false) => M::Movhu,
        (4, true) => M::Movw,
        (4, false) => M::Movwu,
        _ => M::Movv,
    }
}

pub fn store_by_type(t: &Type) -> M {
    if t.is_float() {
        return if t.size == 4 { M::Movf } else { M::Movd };
    }
    match t.size {
        1 => M::Movb,
        2 => M::Movh,
        4 => M::Movw,
        _ => M::Movv,
    }
}

fn op3(pp: &mut Progs<'_>, op: M, from: Addr, reg: RegId, to: RegId) {
    let p = pp.prog(ma(op));
    p.from = from;
    p.reg = reg;
    p.to = Addr::reg(to);
}

fn mov(pp: &mut Progs<'_>, op: M, from: Addr, to: Addr) {
    let p = pp.prog(ma(op));
    p.from = from;
    p.to = to;
}

/// Clear `cnt` bytes at `off(base)`.
///
/// Fewer than four words are stored directly. Larger blocks use a loop that
/// pre-increments RT1 until it reaches RT2.
fn zero_block(pp: &mut Progs<'_>, base: RegId, off: i64, cnt: i64) {
    let words = cnt / PTR_SIZE;
    let mut off = off;
    if words < 4 {
        for _ in 0..words {
            mov(pp, M::Movv, Addr::reg(REG_ZERO), Addr::mem(base, off));
            off += PTR_SIZE;
        }
    } else {
        op3(pp, M::Addvu, Addr::constant(off - PTR_SIZE), base, REG_RT1);
        op3(pp, M::Addvu, Addr::constant(words * PTR_SIZE), REG_RT1, REG_RT2);
        let top = pp.next_id();
        mov(pp, M::Movv, Addr::reg(REG_ZERO), Addr::mem(REG_RT1, PTR_SIZE));
        op3(pp, M::Addvu, Addr::constant(PTR_SIZE), REG_RT1, REG_RT1);
        let p = pp.prog(ma(M::Bne));
        p.from = Addr::reg(REG_RT1);
        p.reg = REG_RT2;
        p.to.ty = AddrType::Branch;
        p.to.target = Some(top);
        off += words * PTR_SIZE;
    }
    for w in tail_widths(cnt % PTR_SIZE) {
        let op = match w {
            4 => M::Movw,
            2 => M::Movh,
            _ => M::Movb,
        };
        mov(pp, op, Addr::reg(REG_ZERO), Addr::mem(base, off));
        off += w;
    }
}

fn binary_op(v: &Value) -> Option<M> {
    let single = v.ty.size == 4;
    Some(match v.op {
        Op::Add => M::Addvu,
        Op::Sub => M::Subvu,
        Op::And => M::And,
        Op::Or => M::Or,
        Op::Xor => M::Xor,
        Op::Shl => M::Sllv,
        Op::Shr => M::Srlv,
        Op::Sar => M::Srav,
        Op::FAdd if single => M::Addf,
        Op::FAdd => M::Addd,
        Op::FSub if single => M::Subf,
        Op::FSub => M::Subd,
        Op::FMul if single => M::Mulf,
        Op::FMul => M::Muld,
        Op::FDiv if single => M::Divf,
        Op::FDiv => M::Divd,
        _ => return None,
    })
}

/// Multiply or divide through HI/LO, then copy the requested half.
fn gen_hilo(s: &mut State<'_, '_>, v: &Value) -> CompileResult<()> {
    let (op, half) = match v.op {
        Op::Mul => (M::Mulv, REG_LO),
        Op::Div => (M::Divv, REG_LO),
        Op::Divu => (M::Divvu, REG_LO),
        Op::Rem => (M::Divv, REG_HI),
        _ => (M::Divvu, REG_HI),
    };
    let (x, y, rd) = (s.arg_reg(v, 0)?, s.arg_reg(v, 1)?, s.reg_of(v)?);
    let p = s.prog(ma(op));
    p.from = Addr::reg(y);
    p.reg = x;
    mov(&mut s.pp, M::Movv, Addr::reg(half), Addr::reg(rd));
    Ok(())
}

/// `rd = atomically(*ptr += delta)`, returning the new value.
fn gen_atomic_add(s: &mut State<'_, '_>, v: &Value) -> CompileResult<()> {
    let (ptr, delta, rd) = (s.arg_reg(v, 0)?, s.arg_reg(v, 1)?, s.reg_of(v)?);
    if rd == ptr || rd == delta {
        return Err(s.error(format!("{v}: result register overlaps an input")));
    }
    let (ll, sc) = if v.ty.size == 4 { (M::Ll, M::Sc) } else { (M::Llv, M::Scv) };

    s.prog(ma(M::Sync));
    let top = s.pp.next_id();
    mov(&mut s.pp, ll, Addr::mem(ptr, 0), Addr::reg(rd));
    op3(&mut s.pp, M::Addvu, Addr::reg(delta), rd, REG_TMP);
    mov(&mut s.pp, sc, Addr::reg(REG_TMP), Addr::mem(ptr, 0));
    // SC leaves zero in TMP when the reservation was lost.
    let p = s.prog(ma(M::Beq));
    p.from = Addr::reg(REG_TMP);
    p.to.ty = AddrType::Branch;
    p.to.target = Some(top);
    s.prog(ma(M::Sync));
    op3(&mut s.pp, M::Addvu, Addr::reg(delta), rd, rd);
    Ok(())
}

fn cond_branch(s: &mut State<'_, '_>, eq: bool, (first, second): (RegId, Option<RegId>), target: BlockId) {
    let p = s.br(ma(if eq { M::Beq } else { M::Bne }), target);
    p.from = Addr::reg(first);
    if let Some(second) = second {
        p.reg = second;
    }
}

impl Backend for Mips64Backend {
    fn ginsnop(&self, pp: &mut Progs<'_>) -> ProgId {
        let id = pp.next_id();
        pp.prog(ma(M::Noop));
        id
    }

    fn zero_range(&self, pp: &mut Progs<'_>, off: i64, cnt: i64) -> CompileResult<()> {
        check_zero_range(off, cnt)?;
        zero_block(pp, REG_SP, off + FIXED_FRAME_SIZE, cnt);
        Ok(())
    }

    fn ssa_gen_value(&self, s: &mut State<'_, '_>, v: &Value) -> CompileResult<()> {
        if s.arch.soft_float && (v.op.is_float() || v.ty.is_float()) {
            return Err(s.unhandled_value(v));
        }

        match v.op {
            Op::InitMem | Op::Arg => {}
            Op::Phi => s.check_lowered_phi(v)?,
            Op::Copy => {
                if v.ty.is_mem() {
                    return Ok(());
                }
                let (rs, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                if rs != rd {
                    let op = if v.ty.is_float() { M::Movd } else { M::Movv };
                    mov(&mut s.pp, op, Addr::reg(rs), Addr::reg(rd));
                }
            }
            Op::LoadReg => {
                let slot = s.slot_of(s.arg(v, 0)?)?;
                let rd = s.reg_of(v)?;
                mov(&mut s.pp, load_by_type(&v.ty), Addr::stack(REG_SP, AddrName::Auto, slot), Addr::reg(rd));
            }
            Op::StoreReg => {
                let rs = s.arg_reg(v, 0)?;
                let slot = s.slot_of(v)?;
                mov(&mut s.pp, store_by_type(&v.ty), Addr::reg(rs), Addr::stack(REG_SP, AddrName::Auto, slot));
            }
            Op::Const => {
                let rd = s.reg_of(v)?;
                mov(&mut s.pp, M::Movv, Addr::constant(v.aux_int), Addr::reg(rd));
            }
            Op::ConstFloat => {
                let rd = s.reg_of(v)?;
                let op = if v.ty.size == 4 { M::Movf } else { M::Movd };
                mov(&mut s.pp, op, Addr::fconst(v.aux_float), Addr::reg(rd));
            }
            Op::AddConst => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                op3(&mut s.pp, M::Addvu, Addr::constant(v.aux_int), x, rd);
            }
            Op::Mul | Op::Div | Op::Divu | Op::Rem | Op::Remu => gen_hilo(s, v)?,
            Op::Neg => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                mov(&mut s.pp, M::Negv, Addr::reg(x), Addr::reg(rd));
            }
            Op::Not => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                op3(&mut s.pp, M::Nor, Addr::reg(REG_ZERO), x, rd);
            }
            Op::Less | Op::LessU => {
                let (x, y, rd) = (s.arg_reg(v, 0)?, s.arg_reg(v, 1)?, s.reg_of(v)?);
                let op = if v.op == Op::Less { M::Sgt } else { M::Sgtu };
                op3(&mut s.pp, op, Addr::reg(x), y, rd);
            }
            Op::EqZero => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                op3(&mut s.pp, M::Sgtu, Addr::constant(1), x, rd);
            }
            Op::NeqZero => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                op3(&mut s.pp, M::Sgtu, Addr::reg(REG_ZERO), x, rd);
            }
            Op::Load => {
                let (base, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                mov(&mut s.pp, load_by_type(&v.ty), Addr::mem(base, v.aux_int), Addr::reg(rd));
            }
            Op::Store => {
                let base = s.arg_reg(v, 0)?;
                let val = s.arg(v, 1)?;
                if s.arch.soft_float && val.ty.is_float() {
                    return Err(s.unhandled_value(v));
                }
                let rs = s.reg_of(val)?;
                mov(&mut s.pp, store_by_type(&val.ty), Addr::reg(rs), Addr::mem(base, v.aux_int));
            }
            Op::Zero => {
                let base = s.arg_reg(v, 0)?;
                if v.aux_int < 0 {
                    return Err(s.error(format!("{v}: negative size {}", v.aux_int)));
                }
                zero_block(&mut s.pp, base, 0, v.aux_int);
            }
            Op::FSqrt => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                let op = if v.ty.size == 4 { M::Sqrtf } else { M::Sqrtd };
                mov(&mut s.pp, op, Addr::reg(x), Addr::reg(rd));
            }
            Op::FloatToInt => {
                let a = s.arg(v, 0)?;
                if !v.ty.is_signed() {
                    return Err(s.unhandled_value(v));
                }
                let op = match (a.ty.size, v.ty.size) {
                    (4, 4) => M::Truncfw,
                    (4, _) => M::Truncfv,
                    (_, 4) => M::Truncdw,
                    _ => M::Truncdv,
                };
                let (x, rd) = (s.reg_of(a)?, s.reg_of(v)?);
                mov(&mut s.pp, op, Addr::reg(x), Addr::reg(rd));
            }
            Op::IntToFloat => {
                let a = s.arg(v, 0)?;
                if !a.ty.is_signed() {
                    return Err(s.unhandled_value(v));
                }
                let op = match (a.ty.size, v.ty.size) {
                    (4, 4) => M::Movwf,
                    (4, _) => M::Movwd,
                    (_, 4) => M::Movvf,
                    _ => M::Movvd,
                };
                let (x, rd) = (s.reg_of(a)?, s.reg_of(v)?);
                mov(&mut s.pp, op, Addr::reg(x), Addr::reg(rd));
            }
            Op::AtomicAdd => gen_atomic_add(s, v)?,
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
                mov(&mut s.pp, M::Movb, Addr::mem(ptr, 0), Addr::reg(REG_ZERO));
            }
            _ => {
                let op = binary_op(v).ok_or_else(|| s.unhandled_value(v))?;
                let (x, y, rd) = (s.arg_reg(v, 0)?, s.arg_reg(v, 1)?, s.reg_of(v)?);
                op3(&mut s.pp, op, Addr::reg(y), x, rd);
            }
        }
        Ok(())
    }

    fn ssa_gen_block(&self, s: &mut State<'_, '_>, b: &Block, next: Option<&Block>) -> CompileResult<()> {
        let next_id = next.map(|n| n.id);
        let (yes, no) = match b.kind {
            BlockKind::Plain => {
                let to = *b.succs.first().ok_or_else(|| s.unhandled_block(b))?;
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
            BlockKind::If | BlockKind::Branch(_) => match b.succs[..] {
                [yes, no] => (yes, no),
                _ => return Err(s.unhandled_block(b)),
            },
        };

        // `eq` selects BEQ for the taken edge; ordered compares branch on SGT(U) in TMP.
        let (eq, controls) = match b.kind {
            BlockKind::Branch(cond @ (Cond::Eq | Cond::Ne)) => {
                (cond == Cond::Eq, (s.control_reg(b, 0)?, Some(s.control_reg(b, 1)?)))
            }
            BlockKind::Branch(cond) => {
                let (x, y) = (s.control_reg(b, 0)?, s.control_reg(b, 1)?);
                let op = if matches!(cond, Cond::Lt | Cond::Ge) { M::Sgt } else { M::Sgtu };
                op3(&mut s.pp, op, Addr::reg(x), y, REG_TMP);
                (matches!(cond, Cond::Ge | Cond::Geu), (REG_TMP, None))
            }
            _ => (false, (s.control_reg(b, 0)?, None)),
        };

        if next_id == Some(yes) {
            cond_branch(s, !eq, controls, no);
        } else if next_id == Some(no) {
            cond_branch(s, eq, controls, yes);
        } else if b.likely != Likely::Unlikely {
            cond_branch(s, eq, controls, yes);
            s.br(As::Jmp, no);
        } else {
            cond_branch(s, !eq, controls, no);
            s.br(As::Jmp, yes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mips64::LINK_MIPS64;
    use bumpalo::Bump;

    #[test]
    fn test_zero_range_shapes() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_MIPS64);
        Mips64Backend.zero_range(&mut pp, 8, 16).unwrap();
        assert_eq!(pp.to_string(), "00000 MOVV\tR0, 16(R29)\n00001 MOVV\tR0, 24(R29)\n");

        let mut pp = Progs::new_in(&arena, &LINK_MIPS64);
        Mips64Backend.zero_range(&mut pp, 0, 32 + 2).unwrap();
        let ops: Vec<String> = pp.iter().map(|p| p.as_.to_string()).collect();
        assert_eq!(ops, ["ADDVU", "ADDVU", "MOVV", "ADDVU", "BNE", "MOVH"]);
        // The loop stores at 8(RT1) after starting one word below the range.
        assert_eq!(pp.get(ProgId(0)).map(|p| p.from.offset), Some(0));
        assert_eq!(pp.get(ProgId(2)).map(|p| p.to.offset), Some(8));
        assert_eq!(pp.get(ProgId(5)).map(|p| p.to.offset), Some(8 + 32));
    }

    #[test]
    fn test_nop_and_register_names() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_MIPS64);
        Mips64Backend.ginsnop(&mut pp);
        assert_eq!(pp.to_string(), "00000 NOOP\n");
        assert!(Mips64Backend.load_reg_result().is_none());
        assert!(Mips64Backend.spill_arg_reg().is_none());
    }

    #[test]
    fn test_rejects_negative_range() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_MIPS64);
        assert!(Mips64Backend.zero_range(&mut pp, 0, -8).is_err());
        assert!(pp.is_empty());
    }
}
