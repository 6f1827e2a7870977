// This module is the amd64 lowering backend. Every Prog carries the iced-x86 Code of the exact
// instruction form, with the destination in `to` and the source in `from`. x86 arithmetic is
// two-address: the result register is first loaded with the left operand, and when the result
// register already holds the right operand the backend either swaps commutative operands or
// goes through the R11 scratch register. Division follows the hardware contract (dividend in
// AX, remainder in DX), so AX and DX are clobbered by Div/Rem values; variable shifts take the
// count in CX. Stack zeroing stores the zero register X15 sixteen bytes at a time and finishes
// with immediate stores for the remainder.

//! amd64 code generation.

use super::{Width, REG_AX, REG_CX, REG_DX, REG_SP, REG_TMP, REG_X_ZERO};
use crate::core::compiler::{check_zero_range, tail_widths, Backend, RegSlotHook, State};
use crate::core::error::CompileResult;
use crate::core::prog::{Addr, AddrName, As, ProgId, Progs, RegId};
use crate::ssa::{Block, BlockKind, Cond, Likely, Op, RegSlot, Type, Value};
use iced_x86::Code;

/// Prog mark: emit with a LOCK prefix.
pub const MARK_LOCK: u16 = 1 << 0;

pub struct Amd64Backend;

fn x86(code: Code) -> As {
    As::X86(code)
}

pub fn width_of(size: i64) -> Width {
    match size {
        1 => Width::W8,
        2 => Width::W16,
        4 => Width::W32,
        _ => Width::W64,
    }
}

/// Load instruction for a value of type `t`.
pub fn load_by_type(t: &Type) -> Code {
    if t.is_float() {
        return if t.size == 4 { Code::Movss_xmm_xmmm32 } else { Code::Movsd_xmm_xmmm64 };
    }
    match (t.size, t.is_signed()) {
        (1, true) => Code::Movsx_r64_rm8,
        (1, false) => Code::Movzx_r32_rm8,
        (2, true) => Code::Movsx_r64_rm16,
        (2, false) => Code::Movzx_r32_rm16,
        (4, true) => Code::Movsxd_r64_rm32,
        (4, false) => Code::Mov_r32_rm32,
        _ => Code::Mov_r64_rm64,
    }
}

/// Store instruction for a value of type `t`.
pub fn store_by_type(t: &Type) -> Code {
    if t.is_float() {
        return if t.size == 4 { Code::Movss_xmmm32_xmm } else { Code::Movsd_xmmm64_xmm };
    }
    match t.size {
        1 => Code::Mov_rm8_r8,
        2 => Code::Mov_rm16_r16,
        4 => Code::Mov_rm32_r32,
        _ => Code::Mov_rm64_r64,
    }
}

fn emit(pp: &mut Progs<'_>, code: Code, from: Addr, to: Addr) {
    let p = pp.prog(x86(code));
    p.from = from;
    p.to = to;
}

fn move_reg(pp: &mut Progs<'_>, float: bool, from: RegId, to: RegId) {
    let code = if float { Code::Movups_xmm_xmmm128 } else { Code::Mov_rm64_r64 };
    emit(pp, code, Addr::reg(from), Addr::reg(to));
}

/// Clear `cnt` bytes at `off(base)` using the zero register.
fn zero_block(pp: &mut Progs<'_>, base: RegId, off: i64, cnt: i64) {
    let mut off = off;
    let mut left = cnt;
    while left >= 16 {
        emit(pp, Code::Movups_xmmm128_xmm, Addr::reg(REG_X_ZERO), Addr::mem(base, off));
        off += 16;
        left -= 16;
    }
    if left >= 8 {
        emit(pp, Code::Mov_rm64_imm32, Addr::constant(0), Addr::mem(base, off));
        off += 8;
        left -= 8;
    }
    for w in tail_widths(left) {
        let code = match w {
            4 => Code::Mov_rm32_imm32,
            2 => Code::Mov_rm16_imm16,
            _ => Code::Mov_rm8_imm8,
        };
        emit(pp, code, Addr::constant(0), Addr::mem(base, off));
        off += w;
    }
}

fn load_reg_result(pp: &mut Progs<'_>, slot: &RegSlot) -> ProgId {
    let id = pp.next_id();
    emit(pp, load_by_type(&slot.ty), Addr::stack(REG_SP, AddrName::Auto, slot.off), Addr::reg(slot.reg));
    id
}

fn spill_arg_reg(pp: &mut Progs<'_>, slot: &RegSlot) -> ProgId {
    let id = pp.next_id();
    emit(pp, store_by_type(&slot.ty), Addr::reg(slot.reg), Addr::stack(REG_SP, AddrName::Param, slot.off));
    id
}

/// Two-address form `rd = op(rd, y)` and whether the operands commute.
fn two_address(v: &Value) -> Option<(Code, bool)> {
    let w32 = v.ty.size <= 4;
    let single = v.ty.size == 4;
    let pick = |q: Code, l: Code| if w32 { l } else { q };
    let fp = |d: Code, s: Code| if single { s } else { d };
    Some(match v.op {
        Op::Add => (pick(Code::Add_rm64_r64, Code::Add_rm32_r32), true),
        Op::Sub => (pick(Code::Sub_rm64_r64, Code::Sub_rm32_r32), false),
        Op::And => (pick(Code::And_rm64_r64, Code::And_rm32_r32), true),
        Op::Or => (pick(Code::Or_rm64_r64, Code::Or_rm32_r32), true),
        Op::Xor => (pick(Code::Xor_rm64_r64, Code::Xor_rm32_r32), true),
        Op::Mul => (pick(Code::Imul_r64_rm64, Code::Imul_r32_rm32), true),
        Op::FAdd => (fp(Code::Addsd_xmm_xmmm64, Code::Addss_xmm_xmmm32), true),
        Op::FSub => (fp(Code::Subsd_xmm_xmmm64, Code::Subss_xmm_xmmm32), false),
        Op::FMul => (fp(Code::Mulsd_xmm_xmmm64, Code::Mulss_xmm_xmmm32), true),
        Op::FDiv => (fp(Code::Divsd_xmm_xmmm64, Code::Divss_xmm_xmmm32), false),
        _ => return None,
    })
}

fn jump_for(cond: Cond) -> Code {
    match cond {
        Cond::Eq => Code::Je_rel32_64,
        Cond::Ne => Code::Jne_rel32_64,
        Cond::Lt => Code::Jl_rel32_64,
        Cond::Ge => Code::Jge_rel32_64,
        Cond::Ltu => Code::Jb_rel32_64,
        Cond::Geu => Code::Jae_rel32_64,
    }
}

fn cmp_code(size: i64) -> Code {
    match size {
        1 => Code::Cmp_rm8_r8,
        2 => Code::Cmp_rm16_r16,
        4 => Code::Cmp_rm32_r32,
        _ => Code::Cmp_rm64_r64,
    }
}

fn test_code(size: i64) -> Code {
    match size {
        1 => Code::Test_rm8_r8,
        2 => Code::Test_rm16_r16,
        4 => Code::Test_rm32_r32,
        _ => Code::Test_rm64_r64,
    }
}

impl Amd64Backend {
    fn gen_two_address(&self, s: &mut State<'_, '_>, v: &Value, code: Code, commutes: bool) -> CompileResult<()> {
        let float = v.ty.is_float();
        let (mut x, mut y) = (s.arg_reg(v, 0)?, s.arg_reg(v, 1)?);
        let rd = s.reg_of(v)?;

        if rd == y && rd != x {
            if commutes {
                std::mem::swap(&mut x, &mut y);
            } else if float {
                return Err(s.error(format!("{v} ({}): result register holds the right operand", v.op)));
            } else {
                move_reg(&mut s.pp, false, x, REG_TMP);
                emit(&mut s.pp, code, Addr::reg(y), Addr::reg(REG_TMP));
                move_reg(&mut s.pp, false, REG_TMP, rd);
                return Ok(());
            }
        }
        if rd != x {
            move_reg(&mut s.pp, float, x, rd);
        }
        emit(&mut s.pp, code, Addr::reg(y), Addr::reg(rd));
        Ok(())
    }

    fn gen_divide(&self, s: &mut State<'_, '_>, v: &Value) -> CompileResult<()> {
        let w32 = v.ty.size <= 4;
        let signed = matches!(v.op, Op::Div | Op::Rem);
        let x = s.arg_reg(v, 0)?;
        let mut y = s.arg_reg(v, 1)?;
        let rd = s.reg_of(v)?;

        if y == REG_AX || y == REG_DX {
            move_reg(&mut s.pp, false, y, REG_TMP);
            y = REG_TMP;
        }
        if x != REG_AX {
            move_reg(&mut s.pp, false, x, REG_AX);
        }
        if signed {
            s.prog(x86(if w32 { Code::Cdq } else { Code::Cqo }));
        } else {
            emit(&mut s.pp, Code::Xor_r32_rm32, Addr::reg(REG_DX), Addr::reg(REG_DX));
        }
        let code = match (signed, w32) {
            (true, true) => Code::Idiv_rm32,
            (true, false) => Code::Idiv_rm64,
            (false, true) => Code::Div_rm32,
            (false, false) => Code::Div_rm64,
        };
        s.prog(x86(code)).to = Addr::reg(y);

        let result = if matches!(v.op, Op::Div | Op::Divu) { REG_AX } else { REG_DX };
        if rd != result {
            move_reg(&mut s.pp, false, result, rd);
        }
        Ok(())
    }

    fn gen_shift(&self, s: &mut State<'_, '_>, v: &Value) -> CompileResult<()> {
        let w32 = v.ty.size <= 4;
        let x = s.arg_reg(v, 0)?;
        let y = s.arg_reg(v, 1)?;
        let rd = s.reg_of(v)?;
        if rd == REG_CX {
            return Err(s.error(format!("{v} ({}): shift result cannot live in CX", v.op)));
        }

        if y != REG_CX {
            move_reg(&mut s.pp, false, y, REG_TMP);
        }
        if rd != x {
            move_reg(&mut s.pp, false, x, rd);
        }
        if y != REG_CX {
            move_reg(&mut s.pp, false, REG_TMP, REG_CX);
        }
        let code = match (v.op, w32) {
            (Op::Shl, false) => Code::Shl_rm64_CL,
            (Op::Shl, true) => Code::Shl_rm32_CL,
            (Op::Shr, false) => Code::Shr_rm64_CL,
            (Op::Shr, true) => Code::Shr_rm32_CL,
            (_, false) => Code::Sar_rm64_CL,
            (_, true) => Code::Sar_rm32_CL,
        };
        emit(&mut s.pp, code, Addr::reg(REG_CX), Addr::reg(rd));
        Ok(())
    }

    /// Materialize a flag condition as 0 or 1 in `rd`.
    fn set_flag(&self, s: &mut State<'_, '_>, set: Code, rd: RegId) {
        s.prog(x86(set)).to = Addr::reg(rd);
        emit(&mut s.pp, Code::Movzx_r32_rm8, Addr::reg(rd), Addr::reg(rd));
    }
}

impl Backend for Amd64Backend {
    fn ginsnop(&self, pp: &mut Progs<'_>) -> ProgId {
        // XCHGL AX, AX; a plain NOP could be taken for a prefix of the next instruction.
        let id = pp.next_id();
        emit(pp, Code::Xchg_rm32_r32, Addr::reg(REG_AX), Addr::reg(REG_AX));
        id
    }

    fn zero_range(&self, pp: &mut Progs<'_>, off: i64, cnt: i64) -> CompileResult<()> {
        check_zero_range(off, cnt)?;
        zero_block(pp, REG_SP, off, cnt);
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
                let rs = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                if rs != rd {
                    move_reg(&mut s.pp, v.ty.is_float(), rs, rd);
                }
            }
            Op::LoadReg => {
                let slot = s.slot_of(s.arg(v, 0)?)?;
                let rd = s.reg_of(v)?;
                emit(&mut s.pp, load_by_type(&v.ty), Addr::stack(REG_SP, AddrName::Auto, slot), Addr::reg(rd));
            }
            Op::StoreReg => {
                let rs = s.arg_reg(v, 0)?;
                let slot = s.slot_of(v)?;
                emit(&mut s.pp, store_by_type(&v.ty), Addr::reg(rs), Addr::stack(REG_SP, AddrName::Auto, slot));
            }
            Op::Const => {
                let rd = s.reg_of(v)?;
                let c = v.aux_int;
                if c == 0 {
                    emit(&mut s.pp, Code::Xor_r32_rm32, Addr::reg(rd), Addr::reg(rd));
                } else if i32::try_from(c).is_ok() {
                    emit(&mut s.pp, Code::Mov_rm64_imm32, Addr::constant(c), Addr::reg(rd));
                } else {
                    emit(&mut s.pp, Code::Mov_r64_imm64, Addr::constant(c), Addr::reg(rd));
                }
            }
            Op::ConstFloat => {
                let rd = s.reg_of(v)?;
                if v.aux_float.to_bits() == 0 {
                    emit(&mut s.pp, Code::Xorps_xmm_xmmm128, Addr::reg(rd), Addr::reg(rd));
                } else if v.ty.size == 4 {
                    let bits = (v.aux_float as f32).to_bits() as i64;
                    emit(&mut s.pp, Code::Mov_r32_imm32, Addr::constant(bits), Addr::reg(REG_TMP));
                    emit(&mut s.pp, Code::Movd_xmm_rm32, Addr::reg(REG_TMP), Addr::reg(rd));
                } else {
                    let bits = v.aux_float.to_bits() as i64;
                    emit(&mut s.pp, Code::Mov_r64_imm64, Addr::constant(bits), Addr::reg(REG_TMP));
                    emit(&mut s.pp, Code::Movq_xmm_rm64, Addr::reg(REG_TMP), Addr::reg(rd));
                }
            }
            Op::AddConst => {
                let x = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                if i32::try_from(v.aux_int).is_err() {
                    return Err(s.error(format!("{v}: addend {} out of range", v.aux_int)));
                }
                let code = if v.ty.size <= 4 { Code::Lea_r32_m } else { Code::Lea_r64_m };
                emit(&mut s.pp, code, Addr::mem(x, v.aux_int), Addr::reg(rd));
            }
            Op::Div | Op::Divu | Op::Rem | Op::Remu => self.gen_divide(s, v)?,
            Op::Shl | Op::Shr | Op::Sar => self.gen_shift(s, v)?,
            Op::Neg | Op::Not => {
                let x = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                if rd != x {
                    move_reg(&mut s.pp, false, x, rd);
                }
                let code = match (v.op, v.ty.size <= 4) {
                    (Op::Neg, false) => Code::Neg_rm64,
                    (Op::Neg, true) => Code::Neg_rm32,
                    (_, false) => Code::Not_rm64,
                    (_, true) => Code::Not_rm32,
                };
                s.prog(x86(code)).to = Addr::reg(rd);
            }
            Op::Less | Op::LessU => {
                let a = s.arg(v, 0)?;
                let (x, y) = (s.reg_of(a)?, s.arg_reg(v, 1)?);
                let rd = s.reg_of(v)?;
                emit(&mut s.pp, cmp_code(a.ty.size), Addr::reg(y), Addr::reg(x));
                let set = if v.op == Op::Less { Code::Setl_rm8 } else { Code::Setb_rm8 };
                self.set_flag(s, set, rd);
            }
            Op::EqZero | Op::NeqZero => {
                let a = s.arg(v, 0)?;
                let x = s.reg_of(a)?;
                let rd = s.reg_of(v)?;
                emit(&mut s.pp, test_code(a.ty.size), Addr::reg(x), Addr::reg(x));
                let set = if v.op == Op::EqZero { Code::Sete_rm8 } else { Code::Setne_rm8 };
                self.set_flag(s, set, rd);
            }
            Op::Load => {
                let base = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                emit(&mut s.pp, load_by_type(&v.ty), Addr::mem(base, v.aux_int), Addr::reg(rd));
            }
            Op::Store => {
                let base = s.arg_reg(v, 0)?;
                let val = s.arg(v, 1)?;
                let rs = s.reg_of(val)?;
                emit(&mut s.pp, store_by_type(&val.ty), Addr::reg(rs), Addr::mem(base, v.aux_int));
            }
            Op::Zero => {
                let base = s.arg_reg(v, 0)?;
                if v.aux_int < 0 {
                    return Err(s.error(format!("{v}: negative size {}", v.aux_int)));
                }
                zero_block(&mut s.pp, base, 0, v.aux_int);
            }
            Op::FSqrt => {
                let x = s.arg_reg(v, 0)?;
                let rd = s.reg_of(v)?;
                let code = if v.ty.size == 4 { Code::Sqrtss_xmm_xmmm32 } else { Code::Sqrtsd_xmm_xmmm64 };
                emit(&mut s.pp, code, Addr::reg(x), Addr::reg(rd));
            }
            Op::FloatToInt => {
                let a = s.arg(v, 0)?;
                if !v.ty.is_signed() {
                    return Err(s.unhandled_value(v));
                }
                let code = match (a.ty.size, v.ty.size <= 4) {
                    (4, true) => Code::Cvttss2si_r32_xmmm32,
                    (4, false) => Code::Cvttss2si_r64_xmmm32,
                    (_, true) => Code::Cvttsd2si_r32_xmmm64,
                    (_, false) => Code::Cvttsd2si_r64_xmmm64,
                };
                let (x, rd) = (s.reg_of(a)?, s.reg_of(v)?);
                emit(&mut s.pp, code, Addr::reg(x), Addr::reg(rd));
            }
            Op::IntToFloat => {
                let a = s.arg(v, 0)?;
                if !a.ty.is_signed() {
                    return Err(s.unhandled_value(v));
                }
                let code = match (v.ty.size, a.ty.size <= 4) {
                    (4, true) => Code::Cvtsi2ss_xmm_rm32,
                    (4, false) => Code::Cvtsi2ss_xmm_rm64,
                    (_, true) => Code::Cvtsi2sd_xmm_rm32,
                    (_, false) => Code::Cvtsi2sd_xmm_rm64,
                };
                let (x, rd) = (s.reg_of(a)?, s.reg_of(v)?);
                emit(&mut s.pp, code, Addr::reg(x), Addr::reg(rd));
            }
            Op::AtomicAdd => {
                // LOCK XADD leaves the old value in the source register.
                let ptr = s.arg_reg(v, 0)?;
                let delta = s.arg_reg(v, 1)?;
                let rd = s.reg_of(v)?;
                let w32 = v.ty.size <= 4;
                let acc = if rd == delta || rd == ptr { REG_TMP } else { rd };
                move_reg(&mut s.pp, false, delta, acc);
                let p = s.prog(x86(if w32 { Code::Xadd_rm32_r32 } else { Code::Xadd_rm64_r64 }));
                p.from = Addr::reg(acc);
                p.to = Addr::mem(ptr, 0);
                p.mark |= MARK_LOCK;
                let add = if w32 { Code::Add_rm32_r32 } else { Code::Add_rm64_r64 };
                emit(&mut s.pp, add, Addr::reg(delta), Addr::reg(acc));
                if acc != rd {
                    move_reg(&mut s.pp, false, acc, rd);
                }
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
                // TESTB AX, (ptr) faults on a nil pointer.
                let ptr = s.arg_reg(v, 0)?;
                emit(&mut s.pp, Code::Test_rm8_r8, Addr::reg(REG_AX), Addr::mem(ptr, 0));
            }
            _ => {
                let (code, commutes) = two_address(v).ok_or_else(|| s.unhandled_value(v))?;
                self.gen_two_address(s, v, code, commutes)?;
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

        let cond = match b.kind {
            BlockKind::Branch(cond) => {
                let a = s.value(*b.controls.first().ok_or_else(|| s.unhandled_block(b))?)?;
                let (x, y) = (s.reg_of(a)?, s.control_reg(b, 1)?);
                emit(&mut s.pp, cmp_code(a.ty.size), Addr::reg(y), Addr::reg(x));
                cond
            }
            _ => {
                let c = s.control_reg(b, 0)?;
                emit(&mut s.pp, Code::Test_rm8_r8, Addr::reg(c), Addr::reg(c));
                Cond::Ne
            }
        };

        if next_id == Some(yes) {
            s.br(x86(jump_for(cond.invert())), no);
        } else if next_id == Some(no) {
            s.br(x86(jump_for(cond)), yes);
        } else if b.likely != Likely::Unlikely {
            s.br(x86(jump_for(cond)), yes);
            s.br(As::Jmp, no);
        } else {
            s.br(x86(jump_for(cond.invert())), no);
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
    use crate::x64::LINK_AMD64;
    use bumpalo::Bump;

    #[test]
    fn test_zero_range_shapes() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_AMD64);
        Amd64Backend.zero_range(&mut pp, 16, 40 + 7).unwrap();
        let codes: Vec<As> = pp.iter().map(|p| p.as_).collect();
        assert_eq!(
            codes,
            [
                x86(Code::Movups_xmmm128_xmm),
                x86(Code::Movups_xmmm128_xmm),
                x86(Code::Mov_rm64_imm32),
                x86(Code::Mov_rm32_imm32),
                x86(Code::Mov_rm16_imm16),
                x86(Code::Mov_rm8_imm8),
            ]
        );
        let offsets: Vec<i64> = pp.iter().map(|p| p.to.offset).collect();
        assert_eq!(offsets, [16, 32, 48, 56, 60, 62]);
    }

    #[test]
    fn test_nop() {
        let arena = Bump::new();
        let mut pp = Progs::new_in(&arena, &LINK_AMD64);
        assert_eq!(Amd64Backend.ginsnop(&mut pp), ProgId(0));
        assert_eq!(pp.to_string(), "00000 XCHG\tAX, AX\n");
    }

    #[test]
    fn test_load_store_by_type() {
        assert_eq!(load_by_type(&Type::UINT8), Code::Movzx_r32_rm8);
        assert_eq!(load_by_type(&Type::INT32), Code::Movsxd_r64_rm32);
        assert_eq!(load_by_type(&Type::FLOAT64), Code::Movsd_xmm_xmmm64);
        assert_eq!(store_by_type(&Type::INT16), Code::Mov_rm16_r16);
        assert_eq!(store_by_type(&Type::FLOAT32), Code::Movss_xmmm32_xmm);
    }
}
