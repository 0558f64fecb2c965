//! Component B: the typed IR (spec §3.2).
//!
//! Dense integer handles into arena `Vec`s, not owning references (spec
//! §9's "arena + index handles"): `TempId`/`BlockId`/`FunctionId` are
//! `Copy` and index directly into the owning [`Function`]/[`Module`].

use std::fmt;

use serde::Serialize;

use crate::common::{Id, Map, Span};
use crate::types::Type;

use super::provenance::ProvenanceTable;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Debug)]
pub struct TempId(pub u32);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Debug)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Debug)]
pub struct FunctionId(pub u32);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// An operand: either a literal constant or a previously defined temp.
/// Addresses of globals go through [`Instruction::AddrOfGlobal`] rather
/// than being a third `Value` case, so that every pointer value a later
/// instruction touches has a provenance entry keyed by `TempId` (spec
/// §8.1's "type preservation" property).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Debug)]
pub enum Value {
    Const(i64),
    Temp(TempId),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(n) => write!(f, "{n}"),
            Value::Temp(t) => write!(f, "{t}"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Debug)]
pub enum IrBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Debug)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// One step of a [`Instruction::Gep`]: either a statically known struct
/// field offset (in cells) or a dynamically indexed array step, scaled by
/// the element size (in cells) at compile time (spec §4.6 step 1).
#[derive(Clone, PartialEq, Serialize, Debug)]
pub enum GepIndex {
    Field { offset_cells: i64 },
    Element { index: Value, elem_size_cells: i64 },
}

/// A single IR instruction. Every variant that produces a value names its
/// destination `dst: TempId`; each `TempId` is defined by exactly one
/// instruction (spec §3.2's SSA invariant — `Phi` is the only join).
#[derive(Clone, Serialize, Debug)]
pub enum Instruction {
    Alloca { dst: TempId, ty: Type },
    /// Materializes the address of a global or string-literal label as a
    /// pointer temp, so every pointer value is register-allocatable and
    /// provenance-tracked uniformly.
    AddrOfGlobal { dst: TempId, name: Id },
    /// `span` anchors the dereference so `back::gep`'s provenance check
    /// (spec §4.3's failure semantics) can point a diagnostic at it.
    Load { dst: TempId, ptr: Value, ty: Type, span: Span },
    Store { ptr: Value, value: Value, ty: Type, span: Span },
    Gep { dst: TempId, base: Value, indices: Vec<GepIndex>, result_ty: Type },
    BinOp { dst: TempId, op: IrBinOp, lhs: Value, rhs: Value, ty: Type },
    /// The only integer-pointer mixed ops allowed besides `Cast`/`GEP`
    /// (spec §3.2 invariant).
    PtrAdd { dst: TempId, ptr: Value, offset: Value },
    PtrSub { dst: TempId, lhs: Value, rhs: Value },
    Cmp { dst: TempId, op: CmpOp, lhs: Value, rhs: Value },
    PtrCmp { dst: TempId, op: CmpOp, lhs: Value, rhs: Value },
    Cast { dst: TempId, value: Value, to: Type },
    Phi { dst: TempId, incoming: Vec<(BlockId, Value)> },
    Select { dst: TempId, cond: Value, a: Value, b: Value },
    Call { dst: Option<TempId>, callee: Id, args: Vec<Value> },
}

impl Instruction {
    pub fn dst(&self) -> Option<TempId> {
        use Instruction::*;
        match self {
            Alloca { dst, .. }
            | AddrOfGlobal { dst, .. }
            | Load { dst, .. }
            | Gep { dst, .. }
            | BinOp { dst, .. }
            | PtrAdd { dst, .. }
            | PtrSub { dst, .. }
            | Cmp { dst, .. }
            | PtrCmp { dst, .. }
            | Cast { dst, .. }
            | Phi { dst, .. }
            | Select { dst, .. } => Some(*dst),
            Call { dst, .. } => *dst,
            Store { .. } => None,
        }
    }
}

#[derive(Clone, Serialize, Debug)]
pub enum Terminator {
    Br(BlockId),
    CondBr { cond: Value, then_bb: BlockId, else_bb: BlockId },
    Ret(Option<Value>),
}

#[derive(Clone, Serialize, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub insns: Vec<Instruction>,
    /// `None` only transiently while the builder is still filling the
    /// block; every block in a finished [`Function`] has a terminator.
    pub term: Option<Terminator>,
}

/// One function's IR: its signature, its dense temp table, and its
/// basic blocks in layout order (spec §3.2).
#[derive(Clone, Serialize, Debug)]
pub struct Function {
    pub name: Id,
    pub params: Vec<TempId>,
    pub ret: Type,
    pub entry: BlockId,
    /// Indexed by `TempId.0`.
    pub temps: Vec<Type>,
    /// Indexed by `BlockId.0`.
    pub blocks: Vec<BasicBlock>,
    pub span: Span,
}

impl Function {
    pub fn new_temp(&mut self, ty: Type) -> TempId {
        let id = TempId(self.temps.len() as u32);
        self.temps.push(ty);
        id
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { id, insns: Vec::new(), term: None });
        id
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn temp_type(&self, id: TempId) -> &Type {
        &self.temps[id.0 as usize]
    }
}

#[derive(Clone, Serialize, Debug)]
pub enum GlobalInit {
    Zero,
    Int(i64),
    /// A NUL-terminated byte string placed in the read-only region; equal
    /// literals share one label (spec §6's string-literal pooling).
    StringBytes(Vec<u8>),
}

#[derive(Clone, Serialize, Debug)]
pub struct Global {
    pub name: Id,
    pub ty: Type,
    pub init: GlobalInit,
}

/// An IR module: every function, every global, and the interned string
/// pool, in source declaration order (spec §3.2, §3.5).
///
/// `provenance` is keyed by function name rather than embedded in
/// `Function` directly so that `back::gep` can look a temp's region up
/// without borrowing the function it's consulting mutably at the same
/// time (it rewrites `blocks` while reading `provenance`).
#[derive(Clone, Serialize, Debug, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub provenance: Map<Id, ProvenanceTable>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }
}
