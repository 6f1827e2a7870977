//! loong64 code generation.
//!
//! Integer arithmetic works on full 64-bit registers; narrower values are kept
//! sign- or zero-extended by their loads. Operands follow the assembler order
//! `OP from, reg, to` with `from` the second source.

use super::{Op as L, REG_RT1, REG_RT2, REG_SP, REG_TMP, REG_ZERO};
use crate::core::compiler::{check_zero_range, tail_widths, Backend, RegSlotHook, State};
use crate::core::error::CompileResult;
use crate::core::prog::{Addr, AddrName, AddrType, As, ProgId, Progs, RegId};
use crate::ssa::{Block, BlockId, BlockKind, Cond, Likely, Op, RegSlot, Type, Value};

const PTR_SIZE: i64 = 8;
const FIXED_FRAME_SIZE: i64 = 8;

pub struct Loong64Backend;

fn la(op: L) -> As {
    As::Loong64(op)
}

pub fn load_by_type(t: &Type) -> L {
    if t.is_float() {
        return if t.size == 4 { L::Movf } else { L::Movd };
    }
    match (t.size, t.is_signed()) {
        (1, true) => L::Movb,
        (1, false) => L::Movbu,
        (2, true) => L::Movh,
        (2, false) => L::Movhu,
        (4, true) => L::Movw,
        (4, false) => L::Movwu,
        _ => L::Movv,
    }
}

pub fn store_by_type(t: &Type) -> L {
    if t.is_float() {
        return if t.size == 4 { L::Movf } else { L::Movd };
    }
    match t.size {
        1 => L::Movb,
        2 => L::Movh,
        4 => L::Movw,
        _ => L::Movv,
    }
}

fn op3(pp: &mut Progs<'_>, op: L, from: Addr, reg: RegId, to: RegId) {
    let p = pp.prog(la(op));
    p.from = from;
    p.reg = reg;
    p.to = Addr::reg(to);
}

fn mov(pp: &mut Progs<'_>, op: L, from: Addr, to: Addr) {
    let p = pp.prog(la(op));
    p.from = from;
    p.to = to;
}

/// Clear `cnt` bytes at `off(base)`.
fn zero_block(pp: &mut Progs<'_>, base: RegId, off: i64, cnt: i64) {
    let words = cnt / PTR_SIZE;
    let mut off = off;
    if words < 4 {
        for _ in 0..words {
            mov(pp, L::Movv, Addr::reg(REG_ZERO), Addr::mem(base, off));
            off += PTR_SIZE;
        }
    } else {
        op3(pp, L::Addvu, Addr::constant(off), base, REG_RT1);
        op3(pp, L::Addvu, Addr::constant(words * PTR_SIZE), REG_RT1, REG_RT2);
        let top = pp.next_id();
        mov(pp, L::Movv, Addr::reg(REG_ZERO), Addr::mem(REG_RT1, 0));
        op3(pp, L::Addvu, Addr::constant(PTR_SIZE), REG_RT1, REG_RT1);
        let p = pp.prog(la(L::Bne));
        p.from = Addr::reg(REG_RT1);
        p.reg = REG_RT2;
        p.to.ty = AddrType::Branch;
        p.to.target = Some(top);
        off += words * PTR_SIZE;
    }
    for w in tail_widths(cnt % PTR_SIZE) {
        let op = match w {
            4 => L::Movw,
            2 => L::Movh,
            _ => L::Movb,
        };
        mov(pp, op, Addr::reg(REG_ZERO), Addr::mem(base, off));
        off += w;
    }
}

fn load_reg_result(pp: &mut Progs<'_>, slot: &RegSlot) -> ProgId {
    let id = pp.next_id();
    mov(pp, load_by_type(&slot.ty), Addr::stack(REG_SP, AddrName::Auto, slot.off), Addr::reg(slot.reg));
    id
}

fn spill_arg_reg(pp: &mut Progs<'_>, slot: &RegSlot) -> ProgId {
    let id = pp.next_id();
    mov(pp, store_by_type(&slot.ty), Addr::reg(slot.reg), Addr::stack(REG_SP, AddrName::Param, slot.off));
    id
}

fn binary_op(v: &Value) -> Option<L> {
    let single = v.ty.size == 4;
    Some(match v.op {
        Op::Add => L::Addvu,
        Op::Sub => L::Subvu,
        Op::And => L::And,
        Op::Or => L::Or,
        Op::Xor => L::Xor,
        Op::Mul => L::Mulv,
        Op::Div => L::Divv,
        Op::Divu => L::Divvu,
        Op::Rem => L::Remv,
        Op::Remu => L::Remvu,
        Op::Shl => L::Sllv,
        Op::Shr => L::Srlv,
        Op::Sar => L::Srav,
        Op::FAdd if single => L::Addf,
        Op::FAdd => L::Addd,
        Op::FSub if single => L::Subf,
        Op::FSub => L::Subd,
        Op::FMul if single => L::Mulf,
        Op::FMul => L::Muld,
        Op::FDiv if single => L::Divf,
        Op::FDiv => L::Divd,
        _ => return None,
    })
}

fn branch_for(cond: Cond) -> L {
    match cond {
        Cond::Eq => L::Beq,
        Cond::Ne => L::Bne,
        Cond::Lt => L::Blt,
        Cond::Ge => L::Bge,
        Cond::Ltu => L::Bltu,
        Cond::Geu => L::Bgeu,
    }
}

fn cond_branch(s: &mut State<'_, '_>, cond: Cond, (first, second): (RegId, Option<RegId>), target: BlockId) {
    let p = s.br(la(branch_for(cond)), target);
    p.from = Addr::reg(first);
    if let Some(second) = second {
        p.reg = second;
    }
}

impl Backend for Loong64Backend {
    fn ginsnop(&self, pp: &mut Progs<'_>) -> ProgId {
        let id = pp.next_id();
        pp.prog(la(L::Noop));
        id
    }

    fn zero_range(&self, pp: &mut Progs<'_>, off: i64, cnt: i64) -> CompileResult<()> {
        check_zero_range(off, cnt)?;
        zero_block(pp, REG_SP, off + FIXED_FRAME_SIZE, cnt);
        Ok(())
    }

    fn ssa_gen_value(&self, s: &mut State<'_, '_>, v: &Value) -> CompileResult<()> {
        match v.op {
            Op::InitMem | Op::Arg => {}
            Op::Phi => s.check_lowered_phi(v)?,
            Op::Copy => {
                if v.ty.is_mem() {
                    return Ok(());
                }
                let (rs, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                if rs != rd {
                    let op = if v.ty.is_float() { L::Movd } else { L::Movv };
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
                mov(&mut s.pp, L::Movv, Addr::constant(v.aux_int), Addr::reg(rd));
            }
            Op::ConstFloat => {
                let rd = s.reg_of(v)?;
                let op = if v.ty.size == 4 { L::Movf } else { L::Movd };
                mov(&mut s.pp, op, Addr::fconst(v.aux_float), Addr::reg(rd));
            }
            Op::AddConst => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                op3(&mut s.pp, L::Addvu, Addr::constant(v.aux_int), x, rd);
            }
            Op::Neg => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                mov(&mut s.pp, L::Negv, Addr::reg(x), Addr::reg(rd));
            }
            Op::Not => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                op3(&mut s.pp, L::Nor, Addr::reg(REG_ZERO), x, rd);
            }
            Op::Less | Op::LessU => {
                // SGT from, reg, to sets to = reg > from.
                let (x, y, rd) = (s.arg_reg(v, 0)?, s.arg_reg(v, 1)?, s.reg_of(v)?);
                let op = if v.op == Op::Less { L::Sgt } else { L::Sgtu };
                op3(&mut s.pp, op, Addr::reg(x), y, rd);
            }
            Op::EqZero => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                // The constant form computes from > reg.
                op3(&mut s.pp, L::Sgtu, Addr::constant(1), x, rd);
            }
            Op::NeqZero => {
                let (x, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                op3(&mut s.pp, L::Sgtu, Addr::reg(REG_ZERO), x, rd);
            }
            Op::Load => {
                let (base, rd) = (s.arg_reg(v, 0)?, s.reg_of(v)?);
                mov(&mut s.pp, load_by_type(&v.ty), Addr::mem(base, v.aux_int), Addr::reg(rd));
            }
            Op::Store => {
                let base = s.arg_reg(v, 0)?;
                let val = s.arg(v, 1)?;
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
                let op = if v.ty.size == 4 { L::Sqrtf } else { L::Sqrtd };
                mov(&mut s.pp, op, Addr::reg(x), Addr::reg(rd));
            }
            Op::FloatToInt => {
                let a = s.arg(v, 0)?;
                if !v.ty.is_signed() {
                    return Err(s.unhandled_value(v));
                }
                let op = match (a.ty.size, v.ty.size) {
                    (4, 4) => L::Truncfw,
                    (4, _) => L::Truncfv,
                    (_, 4) => L::Truncdw,
                    _ => L::Truncdv,
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
                    (4, 4) => L::Movwf,
                    (4, _) => L::Movwd,
                    (_, 4) => L::Movvf,
                    _ => L::Movvd,
                };
                let (x, rd) = (s.reg_of(a)?, s.reg_of(v)?);
                mov(&mut s.pp, op, Addr::reg(x), Addr::reg(rd));
            }
            Op::AtomicAdd => {
                // AMADD leaves the old value in TMP; the result is old + delta.
                let (ptr, delta, rd) = (s.arg_reg(v, 0)?, s.arg_reg(v, 1)?, s.reg_of(v)?);
                let op = if v.ty.size == 4 { L::Amadddbw } else { L::Amadddbv };
                let p = s.prog(la(op));
                p.from = Addr::reg(delta);
                p.reg = REG_TMP;
                p.to = Addr::mem(ptr, 0);
                op3(&mut s.pp, L::Addvu, Addr::reg(delta), REG_TMP, rd);
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
                mov(&mut s.pp, L::Movb, Addr::mem(ptr, 0), Addr::reg(REG_ZERO));
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

        // If compares its control against zero with the one-register form.
        let (cond, first, second) = match b.kind {
            BlockKind::Branch(cond) => (cond, s.control_reg(b, 0)?, Some(s.control_reg(b, 1)?)),
            _ => (Cond::Ne, s.control_reg(b, 0)?, None),
        };
        let controls = (first, second);

        if next_id == Some(yes) {
            cond_branch(s, cond.invert(), controls, no);
        } else if next_id == Some(no) {
            cond_branch(s, cond, controls, yes);
        } else if b.likely != Likely::Unlikely {
            cond_branch(s, cond, controls, yes);
            s.br(As::Jmp, no);
        } else {
            cond_branch(s, cond.invert(), controls, no);
            s.br(As::Jmp, yes);
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
    use crate::loong64::LINK_LOONG64;
    use bumpalo::Bump;

    #[test]
    fn test_small_zero_range_unrolled() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_LOONG64);
        Loong64Backend.zero_range(&mut pp, 0, 24).unwrap();
        assert_eq!(pp.to_string(), "00000 MOVV\tR0, 8(R3)\n00001 MOVV\tR0, 16(R3)\n00002 MOVV\tR0, 24(R3)\n");
    }

    #[test]
    fn test_large_zero_range_loops() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_LOONG64);
        Loong64Backend.zero_range(&mut pp, 0, 64 + 4).unwrap();
        let ops: Vec<String> = pp.iter().map(|p| p.as_.to_string()).collect();
        assert_eq!(ops, ["ADDVU", "ADDVU", "MOVV", "ADDVU", "BNE", "MOVW"]);
        assert_eq!(pp.get(ProgId(4)).and_then(|p| p.to.target), Some(ProgId(2)));
    }

    #[test]
    fn test_nop() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_LOONG64);
        Loong64Backend.ginsnop(&mut pp);
        assert_eq!(pp.to_string(), "00000 NOOP\n");
    }
}
