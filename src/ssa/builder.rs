//! Programmatic construction of [`Func`]s.
//!
//! Blocks are laid out in creation order. Values are appended to the current
//! block and numbered from 1 upwards.
//!
//! ```ignore
//! let mut b = FuncBuilder::new("add");
//! let entry = b.new_block();
//! b.set_block(entry);
//! let x = b.value(Op::Arg, Type::INT64, &[], Location::Reg(riscv64::x(10)));
//! b.end_ret();
//! let func = b.finish();
//! ```

use super::*;

pub struct FuncBuilder {
    func: Func,
    current: Option<usize>,
    next_value: ValueId,
}

impl FuncBuilder {
    pub fn new(name: &str) -> Self {
        Self { func: Func::new(name), current: None, next_value: 1 }
    }

    /// Append a new block to the layout without switching to it.
    pub fn new_block(&mut self) -> BlockId {
        let id = self.func.blocks.len() as BlockId + 1;
        self.func.blocks.push(Block::new(id, BlockKind::Plain));
        id
    }

    /// Make `id` the block new values are appended to.
    pub fn set_block(&mut self, id: BlockId) {
        self.current = self.func.blocks.iter().position(|b| b.id == id);
    }

    fn current(&mut self) -> &mut Block {
        let idx = match self.current {
            Some(idx) => idx,
            None => {
                let id = self.new_block();
                self.set_block(id);
                self.func.blocks.len() - 1
            }
        };
        &mut self.func.blocks[idx]
    }

    /// Append a value to the current block.
    pub fn value(&mut self, op: Op, ty: Type, args: &[ValueId], loc: Location) -> ValueId {
        self.value_aux(op, ty, 0, args, loc)
    }

    /// Append a value carrying an integer aux.
    pub fn value_aux(
        &mut self,
        op: Op,
        ty: Type,
        aux_int: i64,
        args: &[ValueId],
        loc: Location,
    ) -> ValueId {
        let id = self.next_value;
        self.next_value += 1;
        let mut v = Value::new(id, op, ty);
        v.args = args.to_vec();
        v.aux_int = aux_int;
        v.loc = loc;
        self.push(v)
    }

    pub fn const_int(&mut self, ty: Type, c: i64, loc: Location) -> ValueId {
        self.value_aux(Op::Const, ty, c, &[], loc)
    }

    pub fn const_float(&mut self, ty: Type, c: f64, loc: Location) -> ValueId {
        let id = self.value(Op::ConstFloat, ty, &[], loc);
        self.last_value().aux_float = c;
        id
    }

    /// Static call of `callee`.
    pub fn call(&mut self, callee: Arc<Sym>, mem: ValueId) -> ValueId {
        callee.set_func(true);
        let id = self.value(Op::StaticCall, Type::MEM, &[mem], Location::None);
        self.last_value().sym = Some(callee);
        id
    }

    fn push(&mut self, v: Value) -> ValueId {
        let id = v.id;
        self.current().values.push(id);
        self.func.add_value(v);
        id
    }

    fn last_value(&mut self) -> &mut Value {
        let id = self.next_value - 1;
        let idx = self.func.index[&id];
        &mut self.func.values[idx]
    }

    fn terminate(&mut self, kind: BlockKind, controls: &[ValueId], succs: &[BlockId], likely: Likely) {
        let b = self.current();
        b.kind = kind;
        b.controls = controls.to_vec();
        b.succs = succs.to_vec();
        b.likely = likely;
        self.current = None;
    }

    pub fn end_plain(&mut self, to: BlockId) {
        self.terminate(BlockKind::Plain, &[], &[to], Likely::Unknown);
    }

    pub fn end_if(&mut self, cond: ValueId, then: BlockId, els: BlockId, likely: Likely) {
        self.terminate(BlockKind::If, &[cond], &[then, els], likely);
    }

    pub fn end_branch(&mut self, cond: Cond, a: ValueId, b: ValueId, then: BlockId, els: BlockId) {
        self.terminate(BlockKind::Branch(cond), &[a, b], &[then, els], Likely::Unknown);
    }

    pub fn end_ret(&mut self) {
        self.terminate(BlockKind::Ret, &[], &[], Likely::Unknown);
    }

    pub fn end_exit(&mut self) {
        self.terminate(BlockKind::Exit, &[], &[], Likely::Unknown);
    }

    /// Request zeroing of `len` stack bytes at `off` on entry.
    pub fn zero_range(&mut self, off: i64, len: i64) {
        self.func.zero_ranges.push((off, len));
    }

    pub fn spill_arg(&mut self, slot: RegSlot) {
        self.func.spilled_args.push(slot);
    }

    pub fn result_slot(&mut self, slot: RegSlot) {
        self.func.result_slots.push(slot);
    }

    pub fn finish(self) -> Func {
        self.func
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_diamond() {
        let mut b = FuncBuilder::new("diamond");
        let entry = b.new_block();
        let then = b.new_block();
        let exit = b.new_block();

        b.set_block(entry);
        let mem = b.value(Op::InitMem, Type::MEM, &[], Location::None);
        let x = b.value_aux(Op::Arg, Type::INT64, 0, &[], Location::Reg(11));
        b.end_if(x, then, exit, Likely::Likely);

        b.set_block(then);
        let one = b.const_float(Type::FLOAT64, 1.5, Location::Reg(40));
        b.end_plain(exit);

        b.set_block(exit);
        b.end_ret();

        let f = b.finish();
        assert_eq!(f.blocks.len(), 3);
        assert_eq!(f.blocks[0].values, vec![mem, x]);
        assert_eq!(f.blocks[0].succs, vec![then, exit]);
        assert_eq!(f.blocks[0].likely, Likely::Likely);
        assert_eq!(f.value(one).map(|v| v.aux_float), Some(1.5));
        assert_eq!(f.blocks[2].kind, BlockKind::Ret);
    }
}
