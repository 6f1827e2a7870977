// This module defines the machine-independent IR the lowering backends consume. Upstream
// passes (parsing, type checking, SSA construction, optimization and register allocation)
// are outside this crate; what arrives here is a Func whose blocks are already in final layout
// order and whose values each carry the storage location the register allocator assigned to
// them (a register id of the target, a stack slot, or nothing for memory/control values). The
// op set is the small generic vocabulary every backend implements: integer and float
// arithmetic, comparisons, loads and stores, block zeroing, atomics, static and runtime calls,
// and the spill/restore values register allocation inserts. Blocks end in Plain, If,
// compare-and-branch, Ret or Exit control. FuncBuilder (builder) constructs functions in code;
// parse_funcs (parser) reads the textual form used by the CLI and tests.

//! Register-assigned IR consumed by the lowering backends.
//!
//! # Operand conventions
//!
//! | op                     | args               | aux                    |
//! |------------------------|--------------------|------------------------|
//! | `Arg`                  | none               | `aux_int` = arg index  |
//! | `LoadReg` / `StoreReg` | `[x]`              |                        |
//! | `Const` / `ConstFloat` | none               | `aux_int` / `aux_float`|
//! | `AddConst`             | `[x]`              | `aux_int` = addend     |
//! | binary ops             | `[x, y]`           |                        |
//! | `Load`                 | `[ptr, mem]`       | `aux_int` = offset     |
//! | `Store`                | `[ptr, val, mem]`  | `aux_int` = offset     |
//! | `Zero`                 | `[ptr, mem]`       | `aux_int` = byte count |
//! | `AtomicAdd`            | `[ptr, val, mem]`  | result is the new value|
//! | `StaticCall`           | `[mem]`            | `sym` = callee         |
//! | `PanicBounds`          | `[x, y, mem]`      | `aux_int` = [`BoundsKind`] |
//! | `NilCheck`             | `[ptr, mem]`       |                        |

pub mod builder;
pub mod parser;

pub use builder::FuncBuilder;
pub use parser::parse_funcs;

use crate::core::prog::RegId;
use crate::symtab::Sym;
use hashbrown::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

pub type ValueId = u32;
pub type BlockId = u32;

/// Generic IR operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Op {
    InitMem,
    Arg,
    Phi,
    Copy,
    LoadReg,
    StoreReg,
    Const,
    ConstFloat,
    Add,
    AddConst,
    Sub,
    And,
    Or,
    Xor,
    Mul,
    Div,
    Divu,
    Rem,
    Remu,
    Shl,
    Shr,
    Sar,
    Neg,
    Not,
    Less,
    LessU,
    EqZero,
    NeqZero,
    Load,
    Store,
    Zero,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FSqrt,
    FloatToInt,
    IntToFloat,
    AtomicAdd,
    StaticCall,
    PanicBounds,
    NilCheck,
}

impl Op {
    /// Operations that need a hardware floating point unit.
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Op::ConstFloat
                | Op::FAdd
                | Op::FSub
                | Op::FMul
                | Op::FDiv
                | Op::FSqrt
                | Op::FloatToInt
                | Op::IntToFloat
        )
    }

    /// Number of arguments the op takes, if fixed.
    pub fn arg_count(self) -> Option<usize> {
        use Op::*;
        Some(match self {
            InitMem | Arg | Const | ConstFloat => 0,
            Copy | LoadReg | StoreReg | AddConst | Neg | Not | EqZero | NeqZero | FSqrt
            | FloatToInt | IntToFloat | StaticCall => 1,
            Add | Sub | And | Or | Xor | Mul | Div | Divu | Rem | Remu | Shl | Shr | Sar | Less
            | LessU | FAdd | FSub | FMul | FDiv | Load | Zero | NilCheck => 2,
            Store | AtomicAdd | PanicBounds => 3,
            Phi => return None,
        })
    }
}

/// Which bounds check failed, stored in `aux_int` of `PanicBounds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsKind {
    Index,
    IndexU,
    SliceAlen,
    SliceB,
}

impl BoundsKind {
    pub fn from_aux(aux: i64) -> Option<BoundsKind> {
        Some(match aux {
            0 => BoundsKind::Index,
            1 => BoundsKind::IndexU,
            2 => BoundsKind::SliceAlen,
            3 => BoundsKind::SliceB,
            _ => return None,
        })
    }

    /// Runtime function reporting this failure.
    pub fn runtime_func(self) -> &'static str {
        match self {
            BoundsKind::Index => "panicIndex",
            BoundsKind::IndexU => "panicIndexU",
            BoundsKind::SliceAlen => "panicSliceAlen",
            BoundsKind::SliceB => "panicSliceB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int { signed: bool },
    Float,
    Ptr,
    Mem,
    Void,
}

/// Size and class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub size: i64,
    pub kind: TypeKind,
}

impl Type {
    pub const INT8: Type = Type::int(1, true);
    pub const INT16: Type = Type::int(2, true);
    pub const INT32: Type = Type::int(4, true);
    pub const INT64: Type = Type::int(8, true);
    pub const UINT8: Type = Type::int(1, false);
    pub const UINT16: Type = Type::int(2, false);
    pub const UINT32: Type = Type::int(4, false);
    pub const UINT64: Type = Type::int(8, false);
    pub const BOOL: Type = Type::UINT8;
    pub const FLOAT32: Type = Type { size: 4, kind: TypeKind::Float };
    pub const FLOAT64: Type = Type { size: 8, kind: TypeKind::Float };
    pub const PTR: Type = Type { size: 8, kind: TypeKind::Ptr };
    pub const MEM: Type = Type { size: 0, kind: TypeKind::Mem };
    pub const VOID: Type = Type { size: 0, kind: TypeKind::Void };

    pub const fn int(size: i64, signed: bool) -> Type {
        Type { size, kind: TypeKind::Int { signed } }
    }

    pub fn is_float(&self) -> bool {
        self.kind == TypeKind::Float
    }

    /// Signed integers; pointers and floats count as unsigned.
    pub fn is_signed(&self) -> bool {
        matches!(self.kind, TypeKind::Int { signed: true })
    }

    pub fn is_mem(&self) -> bool {
        self.kind == TypeKind::Mem
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Int { signed: true } => write!(f, "int{}", self.size * 8),
            TypeKind::Int { signed: false } => write!(f, "uint{}", self.size * 8),
            TypeKind::Float => write!(f, "float{}", self.size * 8),
            TypeKind::Ptr => f.write_str("ptr"),
            TypeKind::Mem => f.write_str("mem"),
            TypeKind::Void => f.write_str("void"),
        }
    }
}

impl FromStr for Type {
    type Err = String;

    fn from_str(s: &str) -> Result<Type, String> {
        Ok(match s {
            "int8" => Type::INT8,
            "int16" => Type::INT16,
            "int32" => Type::INT32,
            "int64" | "int" => Type::INT64,
            "uint8" | "bool" => Type::UINT8,
            "uint16" => Type::UINT16,
            "uint32" => Type::UINT32,
            "uint64" | "uint" | "uintptr" => Type::UINT64,
            "float32" => Type::FLOAT32,
            "float64" => Type::FLOAT64,
            "ptr" => Type::PTR,
            "mem" => Type::MEM,
            "void" => Type::VOID,
            _ => return Err(format!("unknown type {s:?}")),
        })
    }
}

/// Storage assigned to a value by the register allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    None,
    Reg(RegId),
    /// Stack slot at this offset in the local frame.
    Stack(i64),
}

#[derive(Debug, Clone)]
pub struct Value {
    pub id: ValueId,
    pub op: Op,
    pub ty: Type,
    pub args: Vec<ValueId>,
    pub aux_int: i64,
    pub aux_float: f64,
    pub sym: Option<Arc<Sym>>,
    pub loc: Location,
}

impl Value {
    pub fn new(id: ValueId, op: Op, ty: Type) -> Value {
        Value {
            id,
            op,
            ty,
            args: Vec::new(),
            aux_int: 0,
            aux_float: 0.0,
            sym: None,
            loc: Location::None,
        }
    }

    /// Assigned register, if the value lives in one.
    pub fn reg(&self) -> Option<RegId> {
        match self.loc {
            Location::Reg(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.id)
    }
}

/// Comparison of a two-operand conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

impl Cond {
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Ltu => Cond::Geu,
            Cond::Geu => Cond::Ltu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Unconditional transfer to `succs[0]`.
    Plain,
    /// To `succs[0]` if `controls[0]` is non-zero, else `succs[1]`.
    If,
    /// To `succs[0]` if `controls[0] <cond> controls[1]`, else `succs[1]`.
    Branch(Cond),
    Ret,
    /// No successor; the block ends in a call that does not return.
    Exit,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Plain => f.write_str("Plain"),
            BlockKind::If => f.write_str("If"),
            BlockKind::Branch(c) => write!(f, "Branch {c}"),
            BlockKind::Ret => f.write_str("Ret"),
            BlockKind::Exit => f.write_str("Exit"),
        }
    }
}

/// Static prediction of a two-way branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Likely {
    Unlikely,
    #[default]
    Unknown,
    Likely,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub controls: Vec<ValueId>,
    pub succs: Vec<BlockId>,
    pub values: Vec<ValueId>,
    pub likely: Likely,
}

impl Block {
    pub fn new(id: BlockId, kind: BlockKind) -> Block {
        Block {
            id,
            kind,
            controls: Vec::new(),
            succs: Vec::new(),
            values: Vec::new(),
            likely: Likely::Unknown,
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.id)
    }
}

/// A register-resident argument or result with its home stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegSlot {
    pub reg: RegId,
    pub ty: Type,
    /// Offset of the home slot in the argument area.
    pub off: i64,
}

/// One function ready for lowering.
#[derive(Debug, Clone, Default)]
pub struct Func {
    pub name: String,
    /// Blocks in final layout order.
    pub blocks: Vec<Block>,
    values: Vec<Value>,
    index: HashMap<ValueId, usize>,
    /// Stack ranges `(offset, length)` to clear on entry.
    pub zero_ranges: Vec<(i64, i64)>,
    /// Register arguments to store to their home slots on entry.
    pub spilled_args: Vec<RegSlot>,
    /// Results to reload into their registers before returning.
    pub result_slots: Vec<RegSlot>,
}

impl Func {
    pub fn new(name: &str) -> Func {
        Func { name: name.to_string(), ..Func::default() }
    }

    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.index.get(&id).map(|&i| &self.values[i])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Add a value; returns false if its id is already taken.
    pub fn add_value(&mut self, value: Value) -> bool {
        if self.index.contains_key(&value.id) {
            return false;
        }
        self.index.insert(value.id, self.values.len());
        self.values.push(value);
        true
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names_round_trip() {
        use strum::IntoEnumIterator;
        for op in Op::iter() {
            assert_eq!(op.to_string().parse::<Op>(), Ok(op));
        }
        assert!("Bogus".parse::<Op>().is_err());
    }

    #[test]
    fn test_types() {
        assert_eq!("int32".parse::<Type>(), Ok(Type::INT32));
        assert_eq!(Type::UINT16.to_string(), "uint16");
        assert_eq!(Type::FLOAT64.to_string(), "float64");
        assert!(Type::INT8.is_signed());
        assert!(!Type::PTR.is_signed());
        assert!("complex128".parse::<Type>().is_err());
    }

    #[test]
    fn test_bounds_kinds() {
        assert_eq!(BoundsKind::from_aux(1).map(BoundsKind::runtime_func), Some("panicIndexU"));
        assert_eq!(BoundsKind::from_aux(4), None);
    }

    #[test]
    fn test_func_value_ids() {
        let mut f = Func::new("f");
        assert!(f.add_value(Value::new(7, Op::InitMem, Type::MEM)));
        assert!(!f.add_value(Value::new(7, Op::Const, Type::INT64)));
        assert_eq!(f.value(7).map(|v| v.op), Some(Op::InitMem));
        assert!(f.value(1).is_none());
    }
}
