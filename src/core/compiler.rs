// This module defines the target-independent half of lowering. ArchInfo is the capability
// table the registry builds once at startup: link-level description, stack pointer, maximum
// operand width, soft-float flag and the target's Backend. The Backend trait has one
// implementation per target; its required methods (nop, stack zeroing, value and block
// lowering) have no defaults, so a target cannot exist with a required hook missing, while the
// optional register-argument hooks default to absent and the driver skips them. genssa walks
// one register-assigned IR function in layout order and asks the backend for instructions,
// then patches branch targets to the first instruction of each block. compile_functions runs
// genssa on a pool of scoped worker threads that share one CompilationSession; every worker
// owns one bumpalo arena that is reset between functions, and the first error stops the pool.

//! Lowering driver and the per-target backend interface.
//!
//! ```text
//! registry::init(cfg)  ->  ArchInfo { link_arch, reg_sp, gen: Box<dyn Backend>, .. }
//! for each function (on worker threads) {
//!     zero_range(..) for each ambiguously live stack range
//!     spill_arg_reg(..) for each register argument      (optional hook)
//!     for each block in layout order {
//!         ssa_gen_value(..) for each value
//!         load_reg_result(..) before returning          (optional hook)
//!         ssa_gen_block(block, next)
//!     }
//!     resolve branch targets
//! }
//! ```

use super::error::{CompileError, CompileResult};
use super::prog::{AddrType, As, LinkArch, Prog, ProgId, Progs, RegId};
use super::session::CompilationSession;
use crate::ssa::{Block, BlockId, BlockKind, BoundsKind, Func, Location, RegSlot, Value, ValueId};
use crate::symtab::LinkSym;
use bumpalo::Bump;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Optional hook moving one register argument or result between its
/// register and its home slot. Returns the emitted instruction.
pub type RegSlotHook = fn(&mut Progs<'_>, &RegSlot) -> ProgId;

/// Code generation hooks implemented once per target.
pub trait Backend: Send + Sync {
    /// Emit one real no-op instruction of the target.
    fn ginsnop(&self, pp: &mut Progs<'_>) -> ProgId;

    /// Clear `cnt` stack bytes starting `off` bytes above the fixed frame.
    fn zero_range(&self, pp: &mut Progs<'_>, off: i64, cnt: i64) -> CompileResult<()>;

    /// Lower one value using its assigned storage.
    fn ssa_gen_value(&self, s: &mut State<'_, '_>, v: &Value) -> CompileResult<()>;

    /// Emit the control transfer ending `b`. `next` is the block laid out after it.
    fn ssa_gen_block(&self, s: &mut State<'_, '_>, b: &Block, next: Option<&Block>) -> CompileResult<()>;

    /// Reload a register result from its home slot.
    fn load_reg_result(&self) -> Option<RegSlotHook> {
        None
    }

    /// Store a register argument to its home slot.
    fn spill_arg_reg(&self) -> Option<RegSlotHook> {
        None
    }
}

/// Per-target capability table, immutable after initialization.
pub struct ArchInfo {
    pub link_arch: &'static LinkArch,
    /// Stack pointer register.
    pub reg_sp: RegId,
    /// Largest object size in bytes the target can address.
    pub max_width: i64,
    /// Float operations are rewritten into runtime calls before lowering.
    pub soft_float: bool,
    pub gen: Box<dyn Backend>,
}

impl ArchInfo {
    pub fn name(&self) -> &'static str {
        self.link_arch.name
    }
}

impl fmt::Display for ArchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let la = self.link_arch;
        let hook = |present: bool| if present { "yes" } else { "no" };
        writeln!(f, "arch: {} ({:?}, {:?} endian)", la.name, la.arch, la.endian)?;
        writeln!(f, "  pointer size: {}, register size: {}", la.ptr_size, la.reg_size)?;
        writeln!(f, "  min instruction length: {}", la.min_lc)?;
        writeln!(f, "  fixed frame size: {}", la.fixed_frame_size)?;
        writeln!(f, "  stack pointer: {}", la.reg_name(self.reg_sp))?;
        writeln!(f, "  max width: {}", self.max_width)?;
        writeln!(f, "  soft float: {}", self.soft_float)?;
        writeln!(f, "  load_reg_result: {}", hook(self.gen.load_reg_result().is_some()))?;
        write!(f, "  spill_arg_reg: {}", hook(self.gen.spill_arg_reg().is_some()))
    }
}

impl fmt::Debug for ArchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchInfo")
            .field("arch", &self.link_arch.name)
            .field("reg_sp", &self.reg_sp)
            .field("max_width", &self.max_width)
            .field("soft_float", &self.soft_float)
            .finish()
    }
}

/// Lowering state of one function, owned by one worker.
pub struct State<'a, 'bump> {
    pub arch: &'a ArchInfo,
    pub ctx: &'a CompilationSession,
    pub func: &'a Func,
    pub pp: Progs<'bump>,
    bstart: HashMap<BlockId, ProgId>,
    branches: Vec<(ProgId, BlockId)>,
}

impl<'a, 'bump> State<'a, 'bump> {
    pub fn new(arch: &'a ArchInfo, ctx: &'a CompilationSession, func: &'a Func, arena: &'bump Bump) -> Self {
        Self {
            arch,
            ctx,
            func,
            pp: Progs::new_in(arena, arch.link_arch),
            bstart: HashMap::new(),
            branches: Vec::new(),
        }
    }

    /// Append an instruction.
    pub fn prog(&mut self, as_: As) -> &mut Prog {
        self.pp.prog(as_)
    }

    /// Append a branch to the start of block `target`.
    pub fn br(&mut self, as_: As, target: BlockId) -> &mut Prog {
        self.branches.push((self.pp.next_id(), target));
        let p = self.pp.prog(as_);
        p.to.ty = AddrType::Branch;
        p
    }

    pub fn value(&self, id: ValueId) -> CompileResult<&'a Value> {
        self.func.value(id).ok_or_else(|| self.error(format!("undefined value v{id}")))
    }

    /// The `i`th argument of `v`.
    pub fn arg(&self, v: &Value, i: usize) -> CompileResult<&'a Value> {
        let id = v.args.get(i).ok_or_else(|| self.error(format!("{v} ({}) has no argument {i}", v.op)))?;
        self.value(*id)
    }

    /// Register holding the `i`th argument of `v`.
    pub fn arg_reg(&self, v: &Value, i: usize) -> CompileResult<RegId> {
        let a = self.arg(v, i)?;
        self.reg_of(a)
    }

    /// Register assigned to `v`.
    pub fn reg_of(&self, v: &Value) -> CompileResult<RegId> {
        v.reg()
            .ok_or_else(|| self.error(format!("{v} ({}) is not in a register: {:?}", v.op, v.loc)))
    }

    /// Stack slot assigned to `v`.
    pub fn slot_of(&self, v: &Value) -> CompileResult<i64> {
        match v.loc {
            Location::Stack(off) => Ok(off),
            loc => Err(self.error(format!("{v} ({}) has no stack slot: {loc:?}", v.op))),
        }
    }

    /// Register of the `i`th control value of `b`.
    pub fn control_reg(&self, b: &Block, i: usize) -> CompileResult<RegId> {
        let id = b.controls.get(i).ok_or_else(|| self.error(format!("{b} has no control {i}")))?;
        let v = self.value(*id)?;
        self.reg_of(v)
    }

    /// Linker symbol of the callee of a static call.
    pub fn call_target(&self, v: &Value) -> CompileResult<Arc<LinkSym>> {
        let sym = v.sym.as_ref().ok_or_else(|| self.error(format!("{v} ({}) has no callee", v.op)))?;
        Ok(self.ctx.symtab().linksym(sym))
    }

    /// Runtime helper reporting the bounds failure of a `PanicBounds` value.
    pub fn bounds_target(&self, v: &Value) -> CompileResult<Arc<LinkSym>> {
        let kind = BoundsKind::from_aux(v.aux_int)
            .ok_or_else(|| self.error(format!("{v}: unknown bounds kind {}", v.aux_int)))?;
        let helper = self.ctx.symtab().runtime_func(kind.runtime_func())?;
        self.ctx.record_runtime_call(&helper.name);
        Ok(helper)
    }

    pub fn error(&self, reason: String) -> CompileError {
        CompileError::CodeGeneration { func: self.func.name.clone(), reason }
    }

    pub fn unhandled_value(&self, v: &Value) -> CompileError {
        CompileError::UnhandledValue {
            arch: self.arch.name(),
            func: self.func.name.clone(),
            value: v.to_string(),
            op: v.op.to_string(),
        }
    }

    pub fn unhandled_block(&self, b: &Block) -> CompileError {
        CompileError::UnhandledBlock {
            arch: self.arch.name(),
            func: self.func.name.clone(),
            block: b.to_string(),
            kind: b.kind.to_string(),
        }
    }

    /// Check that a lowered phi shares its register with all its arguments.
    pub fn check_lowered_phi(&self, v: &Value) -> CompileResult<()> {
        for &a in &v.args {
            let arg = self.value(a)?;
            if arg.loc != v.loc {
                return Err(self.error(format!(
                    "phi {v} at {:?} has argument {arg} at {:?}",
                    v.loc, arg.loc
                )));
            }
        }
        Ok(())
    }

    fn resolve_branches(&mut self) -> CompileResult<()> {
        let end = self.pp.next_id();
        for &(p, target) in &self.branches {
            let start = match self.bstart.get(&target) {
                Some(&start) if start != end => start,
                _ => {
                    return Err(self.error(format!("branch to b{target}, which has no code")));
                }
            };
            if let Some(prog) = self.pp.get_mut(p) {
                prog.to.target = Some(start);
            }
        }
        Ok(())
    }
}

/// Lower one function into a Prog stream allocated in `arena`.
pub fn genssa<'bump>(
    arch: &ArchInfo,
    ctx: &CompilationSession,
    func: &Func,
    arena: &'bump Bump,
) -> CompileResult<Progs<'bump>> {
    let mut s = State::new(arch, ctx, func, arena);
    let gen = &*arch.gen;

    for &(off, cnt) in &func.zero_ranges {
        gen.zero_range(&mut s.pp, off, cnt)?;
    }
    if let Some(spill) = gen.spill_arg_reg() {
        for slot in &func.spilled_args {
            spill(&mut s.pp, slot);
        }
    }

    for (i, b) in func.blocks.iter().enumerate() {
        s.bstart.insert(b.id, s.pp.next_id());
        for &id in &b.values {
            let v = s.value(id)?;
            gen.ssa_gen_value(&mut s, v)?;
        }
        if b.kind == BlockKind::Ret {
            if let Some(load) = gen.load_reg_result() {
                for slot in &func.result_slots {
                    load(&mut s.pp, slot);
                }
            }
        }
        gen.ssa_gen_block(&mut s, b, func.blocks.get(i + 1))?;
    }

    // A call that never returns must leave its return address inside the function.
    if func.blocks.last().is_some_and(|b| b.kind == BlockKind::Exit) {
        gen.ginsnop(&mut s.pp);
    }

    s.resolve_branches()?;
    log::debug!("{}: lowered {} to {} instructions", arch.name(), func.name, s.pp.len());
    Ok(s.pp)
}

/// Lower `funcs` on `workers` threads and pass each result to `emit`.
///
/// `emit` runs on the worker that lowered the function, in no particular
/// order. After the first failure no further functions are started and that
/// failure is returned.
pub fn compile_functions<F>(
    arch: &ArchInfo,
    ctx: &CompilationSession,
    funcs: &[Func],
    workers: usize,
    emit: F,
) -> CompileResult<()>
where
    F: Fn(&Func, &Progs<'_>) -> CompileResult<()> + Sync,
{
    let workers = workers.clamp(1, funcs.len().max(1));
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let first_err: Mutex<Option<CompileError>> = Mutex::new(None);
    log::debug!("{}: lowering {} functions on {} workers", arch.name(), funcs.len(), workers);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                let mut arena = Bump::new();
                while !failed.load(Ordering::Acquire) {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(func) = funcs.get(i) else { break };
                    let res = lower_one(arch, ctx, func, &arena, &emit);
                    arena.reset();
                    if let Err(e) = res {
                        failed.store(true, Ordering::Release);
                        first_err.lock().get_or_insert(e);
                        break;
                    }
                }
            });
        }
    });

    match first_err.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn lower_one<F>(arch: &ArchInfo, ctx: &CompilationSession, func: &Func, arena: &Bump, emit: &F) -> CompileResult<()>
where
    F: Fn(&Func, &Progs<'_>) -> CompileResult<()>,
{
    let pp = genssa(arch, ctx, func, arena)?;
    let names: Vec<String> = pp.iter().map(|p| p.as_.to_string()).collect();
    ctx.record_function_lowered(&func.name, names.iter().map(String::as_str));
    emit(func, &pp)
}

/// Widths of the scalar stores covering a `rem`-byte tail, widest first.
pub fn tail_widths(rem: i64) -> impl Iterator<Item = i64> {
    [4, 2, 1].into_iter().filter(move |w| rem & w != 0)
}

/// Reject negative zeroing ranges.
pub fn check_zero_range(off: i64, cnt: i64) -> CompileResult<()> {
    if off < 0 || cnt < 0 {
        return Err(CompileError::InvalidZeroRange { off, cnt });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_widths() {
        assert_eq!(tail_widths(0).collect::<Vec<_>>(), Vec::<i64>::new());
        assert_eq!(tail_widths(2).collect::<Vec<_>>(), vec![2]);
        assert_eq!(tail_widths(7).collect::<Vec<_>>(), vec![4, 2, 1]);
        assert_eq!(tail_widths(5).collect::<Vec<_>>(), vec![4, 1]);
    }

    #[test]
    fn test_check_zero_range() {
        assert!(check_zero_range(0, 0).is_ok());
        assert_eq!(
            check_zero_range(8, -1),
            Err(CompileError::InvalidZeroRange { off: 8, cnt: -1 })
        );
    }
}
