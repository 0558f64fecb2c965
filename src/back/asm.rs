//! The target instruction set and textual assembly emission (component G,
//! spec §4.7, §6).
//!
//! The target is a 16-bit banked-memory machine: every cell is one word,
//! every address is relative to a bank register, and the register file is
//! small and fixed-purpose rather than general (spec §4.4). Unlike the
//! teacher backend this core is adapted from — a single flat instruction
//! stream for one toy "program" — this target has real functions, so a
//! [`Program`] owns many [`Function`]s, each with its own basic blocks.
//!
//! This core does not define the downstream assembler's grammar (spec §1
//! treats the assembler as an external collaborator); [`Program::asm_code`]
//! only has to preserve the fixed-purpose register names, section
//! ordering, and string-literal pooling spec §6 calls out.

use derive_more::Display;

use crate::common::Id;

/// Registers for the target machine, in register-file order (spec §4.4).
/// `Pool0`..`Pool6` are `ALLOC_POOL`, the allocator's free list; every other
/// register is fixed-purpose and never allocated.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Register {
    #[display("zero")]
    Zero,
    #[display("link")]
    Link,
    #[display("linkb")]
    LinkBank,
    #[display("sb")]
    Sb,
    #[display("gb")]
    Gb,
    #[display("sp")]
    Sp,
    #[display("fp")]
    Fp,
    #[display("arg0")]
    Arg0,
    #[display("arg1")]
    Arg1,
    #[display("arg2")]
    Arg2,
    #[display("arg3")]
    Arg3,
    #[display("ret0")]
    Ret0,
    #[display("ret1")]
    Ret1,
    #[display("r0")]
    Pool0,
    #[display("r1")]
    Pool1,
    #[display("r2")]
    Pool2,
    #[display("r3")]
    Pool3,
    #[display("r4")]
    Pool4,
    #[display("r5")]
    Pool5,
    #[display("r6")]
    Pool6,
    #[display("scratch")]
    Scratch,
    /// A second scratch register, needed only where a fat pointer's
    /// address and bank must both be live at once (e.g. reloading a
    /// spilled `SpillPair`) and `Scratch` already holds the other half.
    #[display("scratch2")]
    Scratch2,
}

/// The allocator's free list, in LRU-fill order (spec §4.4: "a small fixed
/// set, the reference target provides 7 registers").
pub static ALLOC_POOL: [Register; 7] =
    [Register::Pool0, Register::Pool1, Register::Pool2, Register::Pool3, Register::Pool4, Register::Pool5, Register::Pool6];

/// Argument registers in ABI order (spec §4.5).
pub static ARG_REGISTERS: [Register; 4] = [Register::Arg0, Register::Arg1, Register::Arg2, Register::Arg3];

/// `2^BANK_SHIFT` cells per bank. Not fixed by the specification text, but
/// it requires a power of two so bank overflow reduces to shift+mask (spec
/// §4.6); this picks a representative reference-target size.
pub const BANK_SHIFT: u32 = 12;
pub const BANK_SIZE: i64 = 1 << BANK_SHIFT;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum ArithOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("div")]
    Div,
    #[display("mod")]
    Mod,
    #[display("and")]
    And,
    #[display("or")]
    Or,
    #[display("xor")]
    Xor,
    #[display("shl")]
    Shl,
    #[display("shr")]
    Shr,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum Condition {
    #[display("eq")]
    Equal,
    #[display("ne")]
    NotEqual,
    #[display("lt")]
    Less,
    #[display("le")]
    LessEq,
    #[display("gt")]
    Greater,
    #[display("ge")]
    GreaterEq,
}

/// Jump targets: a block within the current function, or a global symbol
/// (another function, or the runtime library for operations the target
/// lacks, spec §4.7).
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum JumpTarget {
    Local(BlockLabel),
    Global(Id),
}

impl std::fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JumpTarget::Local(b) => write!(f, "{b}"),
            JumpTarget::Global(name) => write!(f, "{name}"),
        }
    }
}

/// A basic block's emitted label, scoped to its owning function (mangled
/// at print time as `func.bbN` so labels never collide across functions).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct BlockLabel(pub u32);

impl std::fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// One target instruction. Every memory access names its bank register
/// explicitly — there is no "current bank" implicit state — because bank
/// selection is exactly the fact `back::gep` computed from provenance and
/// must not be lost between lowering and emission.
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    LoadImm { dst: Register, imm: i64 },
    Move { dst: Register, src: Register },
    Arith { op: ArithOp, dst: Register, lhs: Register, rhs: Register },
    ArithImm { op: ArithOp, dst: Register, lhs: Register, rhs: i32 },
    /// `dst = (lhs cond 0) ? 1 : 0`, a target pseudo-op for same-register
    /// compare-to-zero results (`Cmp`/`PtrCmp` lowering).
    SetIfCond { dst: Register, lhs: Register, rhs: Register, cond: Condition },
    /// Load one cell from `bank:base+offset` into `dst`.
    Load { dst: Register, bank: Register, base: Register, offset: i32 },
    /// Store `src` to `bank:base+offset`.
    Store { bank: Register, base: Register, offset: i32, src: Register },
    /// Materialize a symbol's intra-bank address (no bank component; the
    /// bank a symbol lives in is a link-time constant known to the
    /// assembler, not something this core computes).
    LoadSymbolAddr { dst: Register, symbol: Id, offset: i32 },
    Branch { cond: Condition, lhs: Register, rhs: Register, target: JumpTarget },
    Jump { target: JumpTarget },
    /// The whole cross-bank call sequence of spec §4.5 collapses to one
    /// pseudo-op: save caller bank to `linkb`, load callee's bank into the
    /// PC-bank register, jump-and-link. The downstream assembler expands
    /// this; this core never emits the discrete steps itself, matching
    /// how the existing pseudo-op convention (`call`, `la`) already
    /// delegates expansion to the assembler.
    Call { callee: Id },
    /// Jump indirect through `link`/`link_bank`, restoring the caller's
    /// bank (function epilogue's final instruction).
    Return,
    Comment(String),
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Instruction::*;
        match self {
            LoadImm { dst, imm } => write!(f, "li {dst}, {imm}"),
            Move { dst, src } => write!(f, "mov {dst}, {src}"),
            Arith { op, dst, lhs, rhs } => write!(f, "{op} {dst}, {lhs}, {rhs}"),
            ArithImm { op, dst, lhs, rhs } => write!(f, "{op}i {dst}, {lhs}, {rhs}"),
            SetIfCond { dst, lhs, rhs, cond } => write!(f, "set{cond} {dst}, {lhs}, {rhs}"),
            Load { dst, bank, base, offset } => write!(f, "ld {dst}, {offset}({base}):{bank}"),
            Store { bank, base, offset, src } => write!(f, "sd {src}, {offset}({base}):{bank}"),
            LoadSymbolAddr { dst, symbol, offset } if *offset == 0 => write!(f, "la {dst}, {symbol}"),
            LoadSymbolAddr { dst, symbol, offset } => write!(f, "la {dst}, {symbol}+{offset}"),
            Branch { cond, lhs, rhs, target } => write!(f, "b{cond} {lhs}, {rhs}, {target}"),
            Jump { target } => write!(f, "j {target}"),
            Call { callee } => write!(f, "call {callee}"),
            Return => write!(f, "ret"),
            Comment(s) => write!(f, "# {s}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub label: BlockLabel,
    pub insns: Vec<Instruction>,
}

/// One function's emitted body: its label, basic blocks in layout order,
/// and the frame shape the prologue/epilogue need (spec §3.4).
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Id,
    pub blocks: Vec<BasicBlock>,
    /// `L` — locals, in cells.
    pub frame_locals: u16,
    /// `S` — spill slots, in cells; grows lazily during allocation.
    pub frame_spills: u16,
    /// A leaf function that performs no calls may omit the link save
    /// (spec §4.5).
    pub is_leaf: bool,
}

impl Function {
    fn render(&self, out: &mut String) {
        out.push_str(&format!("{}:\n", self.name));
        for block in &self.blocks {
            out.push_str(&format!("{}.{}:\n", self.name, block.label));
            for insn in &block.insns {
                out.push_str(&format!("    {insn}\n"));
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum DataInit {
    /// Individual cell values, little-endian within a multi-cell item.
    Cells(Vec<i64>),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct DataItem {
    pub name: Id,
    pub init: DataInit,
}

/// A full assembled program: every function's text, and the three data
/// sections, in source declaration order (spec §3.5, §6).
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub functions: Vec<Function>,
    pub rodata: Vec<DataItem>,
    pub data: Vec<DataItem>,
    /// Zero-initialized globals: name and size in cells.
    pub bss: Vec<(Id, usize)>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Render the whole program as the textual assembly described in
    /// spec §6: `.text`/`.rodata`/`.data`/`.bss` sections, one instruction
    /// per line, declaration-order data layout.
    pub fn asm_code(&self) -> String {
        let mut out = String::new();

        out.push_str(".text\n");
        for function in &self.functions {
            function.render(&mut out);
        }

        out.push_str(".rodata\n");
        for item in &self.rodata {
            render_data_item(&mut out, item);
        }

        out.push_str(".data\n");
        for item in &self.data {
            render_data_item(&mut out, item);
        }

        out.push_str(".bss\n");
        for (name, cells) in &self.bss {
            out.push_str(&format!("{name}:\n    .zero {cells}\n"));
        }

        out
    }
}

fn render_data_item(out: &mut String, item: &DataItem) {
    out.push_str(&format!("{}:\n", item.name));
    match &item.init {
        DataInit::Cells(cells) => {
            let values = cells.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");
            out.push_str(&format!("    .cell {values}\n"));
        }
        DataInit::Bytes(bytes) => {
            let mut values: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
            values.push("0".to_string()); // NUL terminator (spec §6 string pooling)
            out.push_str(&format!("    .byte {}\n", values.join(", ")));
        }
    }
}
