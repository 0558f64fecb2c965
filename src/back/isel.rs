//! Component G (the rest of it): instruction selection — turning one IR
//! function, already register-allocated (`back::regalloc`), bank-resolved
//! (`back::gep`), and ABI-placed (`back::abi`), into actual target
//! instructions (spec §4.7).
//!
//! Two simplifications, both noted where they apply: `Phi` resolution
//! inserts copies unconditionally before a predecessor's terminator
//! rather than only on the specific edge that reaches the join — correct
//! for the CFG shapes `middle::builder` actually emits (every physical
//! edge carries at most one live definition to a given `Phi`), but not a
//! general phi-elimination pass. And a `BinOp`/`Cmp` with two constant
//! operands is folded right here rather than relying on `-O1` having
//! already done it, since `-O0` skips `middle::opt` entirely.

use crate::common::{Id, Map};
use crate::middle::ir::{BlockId, Function, GepIndex, Instruction, IrBinOp, Module, Terminator, Value};
use crate::middle::opt::{eval_binop, eval_cmp};
use crate::types::{IntWidth, Type, TypeTable};

use super::abi::{self, Frame, Signature};
use super::asm::{self, ArithOp, BlockLabel, Condition, JumpTarget, Register, BANK_SHIFT};
use super::gep::BankAssignment;
use super::regalloc::{Allocation, Slot};

fn arith_op(op: IrBinOp) -> ArithOp {
    match op {
        IrBinOp::Add => ArithOp::Add,
        IrBinOp::Sub => ArithOp::Sub,
        IrBinOp::Mul => ArithOp::Mul,
        IrBinOp::Div => ArithOp::Div,
        IrBinOp::Mod => ArithOp::Mod,
        IrBinOp::BitAnd => ArithOp::And,
        IrBinOp::BitOr => ArithOp::Or,
        IrBinOp::BitXor => ArithOp::Xor,
        IrBinOp::Shl => ArithOp::Shl,
        IrBinOp::Shr => ArithOp::Shr,
    }
}

fn cmp_cond(op: crate::middle::ir::CmpOp) -> Condition {
    use crate::middle::ir::CmpOp::*;
    match op {
        Lt => Condition::Less,
        Le => Condition::LessEq,
        Gt => Condition::Greater,
        Ge => Condition::GreaterEq,
        Eq => Condition::Equal,
        Ne => Condition::NotEqual,
    }
}

fn power_of_two(n: i64) -> Option<i32> {
    if n > 0 && (n & (n - 1)) == 0 {
        Some(n.trailing_zeros() as i32)
    } else {
        None
    }
}

/// Assign every `Alloca`'s local a frame-relative cell offset, bump-style
/// in declaration order (spec §3.4's `L` locals region).
fn compute_locals(function: &Function, types: &TypeTable) -> (Map<crate::middle::ir::TempId, u16>, u16) {
    let mut offsets = Map::new();
    let mut cursor: u16 = 0;
    for block in &function.blocks {
        for insn in &block.insns {
            if let Instruction::Alloca { dst, ty } = insn {
                offsets.insert(*dst, cursor);
                cursor += types.size_in_cells(ty).unwrap_or(1) as u16;
            }
        }
    }
    (offsets, cursor)
}

fn is_leaf(function: &Function) -> bool {
    function.blocks.iter().all(|b| b.insns.iter().all(|i| !matches!(i, Instruction::Call { .. })))
}

/// Per-function inputs the earlier back-end passes computed. `signature`
/// is this function's own ABI placement (used for its prologue, param
/// binding, and return); `signatures` is every function's, keyed by
/// name, so a `Call` site can place arguments according to the callee's
/// placement rather than its own.
pub struct FunctionContext<'a> {
    pub alloc: &'a Allocation,
    pub banks: &'a BankAssignment,
    pub signature: &'a Signature,
    pub signatures: &'a Map<Id, Signature>,
}

struct Lowering<'a> {
    function: &'a Function,
    ctx: &'a FunctionContext<'a>,
    locals: Map<crate::middle::ir::TempId, u16>,
    frame: Frame,
    phi_moves: Map<BlockId, Vec<(Register, Value)>>,
}

impl<'a> Lowering<'a> {
    /// Resolve an operand to a register, materializing constants through
    /// `Scratch` and reloading spilled temps through `Scratch` as well.
    fn operand(&self, value: &Value, out: &mut Vec<asm::Instruction>) -> Register {
        match value {
            Value::Const(imm) => {
                out.push(asm::Instruction::LoadImm { dst: Register::Scratch, imm: *imm });
                Register::Scratch
            }
            Value::Temp(t) => match self.ctx.alloc.slots.get(t) {
                Some(Slot::Reg(r)) | Some(Slot::RegPair(r, _)) => *r,
                Some(Slot::Spill(cell)) => {
                    out.push(asm::Instruction::Load { dst: Register::Scratch, bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(*cell) });
                    Register::Scratch
                }
                Some(Slot::SpillPair(cell)) => {
                    out.push(asm::Instruction::Load { dst: Register::Scratch, bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(*cell) });
                    Register::Scratch
                }
                None => Register::Zero,
            },
        }
    }

    /// Spill slots live after the locals region in the frame.
    fn frame_offset(&self, spill_cell: u16) -> i32 {
        let base = if self.frame.is_leaf { 0 } else { 3 };
        base as i32 + self.frame.locals_cells as i32 + spill_cell as i32
    }

    fn dst_reg(&self, dst: crate::middle::ir::TempId) -> Register {
        match self.ctx.alloc.slots.get(&dst) {
            Some(Slot::Reg(r)) | Some(Slot::RegPair(r, _)) => *r,
            _ => Register::Scratch,
        }
    }

    /// After computing a def's value into `computed_in`, make sure it
    /// lands wherever regalloc decided the temp lives.
    fn finish_dst(&self, dst: crate::middle::ir::TempId, computed_in: Register, out: &mut Vec<asm::Instruction>) {
        match self.ctx.alloc.slots.get(&dst) {
            Some(Slot::Reg(r)) => {
                if *r != computed_in {
                    out.push(asm::Instruction::Move { dst: *r, src: computed_in });
                }
            }
            Some(Slot::Spill(cell)) | Some(Slot::SpillPair(cell)) => {
                out.push(asm::Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(*cell), src: computed_in });
            }
            Some(Slot::RegPair(r, _)) => {
                if *r != computed_in {
                    out.push(asm::Instruction::Move { dst: *r, src: computed_in });
                }
            }
            None => {}
        }
    }

    /// Like `finish_dst`, but for a two-register source (e.g. a call
    /// returning a fat pointer via `ret0`/`ret1`): moves (or stores) both
    /// halves when `dst` is itself a fat pointer, register pair or
    /// spilled pair alike — never just the address half (spec §4.4's
    /// spill/reload atomicity).
    fn finish_dst_pair(&self, dst: crate::middle::ir::TempId, addr: Register, bank: Option<Register>, out: &mut Vec<asm::Instruction>) {
        match self.ctx.alloc.slots.get(&dst) {
            Some(Slot::RegPair(r0, r1)) => {
                if *r0 != addr {
                    out.push(asm::Instruction::Move { dst: *r0, src: addr });
                }
                if let Some(bank) = bank {
                    if *r1 != bank {
                        out.push(asm::Instruction::Move { dst: *r1, src: bank });
                    }
                }
            }
            Some(Slot::SpillPair(cell)) => {
                let cell = *cell;
                out.push(asm::Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(cell), src: addr });
                if let Some(bank) = bank {
                    out.push(asm::Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(cell + 1), src: bank });
                }
            }
            _ => self.finish_dst(dst, addr, out),
        }
    }

    fn bank_of(&self, ptr: &Value) -> Register {
        match ptr {
            Value::Temp(t) => self.ctx.banks.banks.get(t).copied().unwrap_or(Register::Gb),
            Value::Const(_) => Register::Gb,
        }
    }

    /// Accumulate a GEP's field/element offsets starting from `base_reg`,
    /// landing the running total in `Scratch2`. Deliberately never
    /// accumulates into `Scratch`: an `Element` step's index can itself
    /// be a spilled operand, and `operand()` reloads spills through
    /// `Scratch`, which would clobber a total building up there.
    fn accumulate_gep_offset(&self, base_reg: Register, indices: &[GepIndex], out: &mut Vec<asm::Instruction>) -> Register {
        let acc = Register::Scratch2;
        if acc != base_reg {
            out.push(asm::Instruction::Move { dst: acc, src: base_reg });
        }
        let mut const_offset: i64 = 0;
        for idx in indices {
            match idx {
                GepIndex::Field { offset_cells } => const_offset += offset_cells,
                GepIndex::Element { index, elem_size_cells } => {
                    let idx_reg = self.operand(index, out);
                    if let Some(shift) = power_of_two(*elem_size_cells) {
                        out.push(asm::Instruction::ArithImm { op: ArithOp::Shl, dst: Register::Scratch, lhs: idx_reg, rhs: shift });
                    } else {
                        out.push(asm::Instruction::LoadImm { dst: Register::Scratch, imm: *elem_size_cells });
                        out.push(asm::Instruction::Arith { op: ArithOp::Mul, dst: Register::Scratch, lhs: idx_reg, rhs: Register::Scratch });
                    }
                    out.push(asm::Instruction::Arith { op: ArithOp::Add, dst: acc, lhs: acc, rhs: Register::Scratch });
                }
            }
        }
        if const_offset != 0 {
            out.push(asm::Instruction::ArithImm { op: ArithOp::Add, dst: acc, lhs: acc, rhs: const_offset as i32 });
        }
        acc
    }

    /// Shift `addr_reg`'s overflow into `bank_reg` (added to the base
    /// pointer's own bank) and mask `addr_reg` down to an intra-bank
    /// address (spec §4.6 step 2's `new_bank`/`new_addr`, the same
    /// sequence `PtrAdd` and `Gep` both need for a fat-pointer result).
    /// Assumes the base pointer's own bank isn't itself mid-reload into
    /// the same scratch register `bank_reg` occupies — a GEP/`PtrAdd`
    /// whose base *and* result are both spilled fat pointers at once
    /// doesn't arise from anything this compiler currently generates.
    fn carry_bank_overflow(&self, addr_reg: Register, bank_reg: Register, base_ptr: &Value, out: &mut Vec<asm::Instruction>) {
        let base_bank = self.operand_bank(base_ptr, out);
        out.push(asm::Instruction::ArithImm { op: ArithOp::Shr, dst: bank_reg, lhs: addr_reg, rhs: BANK_SHIFT as i32 });
        out.push(asm::Instruction::Arith { op: ArithOp::Add, dst: bank_reg, lhs: base_bank, rhs: bank_reg });
        out.push(asm::Instruction::ArithImm { op: ArithOp::And, dst: addr_reg, lhs: addr_reg, rhs: (1i64 << BANK_SHIFT) as i32 - 1 });
    }

    fn lower_instruction(&self, insn: &Instruction, out: &mut Vec<asm::Instruction>) {
        match insn {
            Instruction::Alloca { dst, .. } => {
                let offset = *self.locals.get(dst).unwrap_or(&0) as i32 + if self.frame.is_leaf { 0 } else { 3 };
                let dreg = self.dst_reg(*dst);
                out.push(asm::Instruction::ArithImm { op: ArithOp::Add, dst: dreg, lhs: Register::Fp, rhs: offset });
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::AddrOfGlobal { dst, name } => {
                let dreg = self.dst_reg(*dst);
                out.push(asm::Instruction::LoadSymbolAddr { dst: dreg, symbol: *name, offset: 0 });
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::Load { dst, ptr, .. } => {
                let base = self.operand(ptr, out);
                let bank = self.bank_of(ptr);
                let dreg = self.dst_reg(*dst);
                out.push(asm::Instruction::Load { dst: dreg, bank, base, offset: 0 });
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::Store { ptr, value, .. } => {
                let base = self.operand(ptr, out);
                let bank = self.bank_of(ptr);
                let src = self.operand(value, out);
                out.push(asm::Instruction::Store { bank, base, offset: 0, src });
            }
            Instruction::Gep { dst, base, indices, .. } => {
                // This is the sole place bank overflow is handled (spec
                // §4.6's GEP glossary entry): a region being statically
                // known (`Global`/`Stack`) says which bank the *base*
                // lives in, not that the object fits in one bank, so
                // `regalloc` already flags any GEP whose offset isn't
                // provably small as needing a fat (`RegPair`/`SpillPair`)
                // result, and this lowering always carries the overflow
                // for that case rather than assuming it away.
                let base_reg = self.operand(base, out);
                match self.ctx.alloc.slots.get(dst) {
                    Some(Slot::RegPair(addr_reg, bank_reg)) => {
                        let (addr_reg, bank_reg) = (*addr_reg, *bank_reg);
                        let total = self.accumulate_gep_offset(base_reg, indices, out);
                        if addr_reg != total {
                            out.push(asm::Instruction::Move { dst: addr_reg, src: total });
                        }
                        self.carry_bank_overflow(addr_reg, bank_reg, base, out);
                    }
                    Some(Slot::SpillPair(cell)) => {
                        let cell = *cell;
                        let total = self.accumulate_gep_offset(base_reg, indices, out);
                        out.push(asm::Instruction::Move { dst: Register::Scratch, src: total });
                        self.carry_bank_overflow(Register::Scratch, Register::Scratch2, base, out);
                        out.push(asm::Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(cell), src: Register::Scratch });
                        out.push(asm::Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(cell + 1), src: Register::Scratch2 });
                    }
                    _ => {
                        let dreg = self.dst_reg(*dst);
                        let total = self.accumulate_gep_offset(base_reg, indices, out);
                        if dreg != total {
                            out.push(asm::Instruction::Move { dst: dreg, src: total });
                        }
                        self.finish_dst(*dst, dreg, out);
                    }
                }
            }
            Instruction::BinOp { dst, op, lhs, rhs, .. } => {
                let dreg = self.dst_reg(*dst);
                if let (Value::Const(a), Value::Const(b)) = (lhs, rhs) {
                    let folded = eval_binop(*op, *a, *b).unwrap_or(0);
                    out.push(asm::Instruction::LoadImm { dst: dreg, imm: folded });
                } else {
                    let lreg = self.operand(lhs, out);
                    let rreg = self.operand(rhs, out);
                    out.push(asm::Instruction::Arith { op: arith_op(*op), dst: dreg, lhs: lreg, rhs: rreg });
                }
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::PtrAdd { dst, ptr, offset } => {
                let base_reg = self.operand(ptr, out);
                let off_reg = self.operand(offset, out);
                match self.ctx.alloc.slots.get(dst) {
                    Some(Slot::RegPair(addr_reg, bank_reg)) => {
                        let (addr_reg, bank_reg) = (*addr_reg, *bank_reg);
                        // Fat-pointer result: carry the overflow into the
                        // bank half via shift+mask (spec §4.6).
                        out.push(asm::Instruction::Arith { op: ArithOp::Add, dst: addr_reg, lhs: base_reg, rhs: off_reg });
                        self.carry_bank_overflow(addr_reg, bank_reg, ptr, out);
                    }
                    Some(Slot::SpillPair(cell)) => {
                        let cell = *cell;
                        out.push(asm::Instruction::Arith { op: ArithOp::Add, dst: Register::Scratch, lhs: base_reg, rhs: off_reg });
                        self.carry_bank_overflow(Register::Scratch, Register::Scratch2, ptr, out);
                        out.push(asm::Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(cell), src: Register::Scratch });
                        out.push(asm::Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(cell + 1), src: Register::Scratch2 });
                    }
                    _ => {
                        let dreg = self.dst_reg(*dst);
                        out.push(asm::Instruction::Arith { op: ArithOp::Add, dst: dreg, lhs: base_reg, rhs: off_reg });
                        self.finish_dst(*dst, dreg, out);
                    }
                }
            }
            Instruction::PtrSub { dst, lhs, rhs } => {
                let dreg = self.dst_reg(*dst);
                let lreg = self.operand(lhs, out);
                let rreg = self.operand(rhs, out);
                out.push(asm::Instruction::Arith { op: ArithOp::Sub, dst: dreg, lhs: lreg, rhs: rreg });
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::Cmp { dst, op, lhs, rhs } | Instruction::PtrCmp { dst, op, lhs, rhs } => {
                let dreg = self.dst_reg(*dst);
                if let (Value::Const(a), Value::Const(b)) = (lhs, rhs) {
                    out.push(asm::Instruction::LoadImm { dst: dreg, imm: eval_cmp(*op, *a, *b) as i64 });
                } else {
                    let lreg = self.operand(lhs, out);
                    let rreg = self.operand(rhs, out);
                    out.push(asm::Instruction::SetIfCond { dst: dreg, lhs: lreg, rhs: rreg, cond: cmp_cond(*op) });
                }
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::Cast { dst, value, to } => {
                let dreg = self.dst_reg(*dst);
                let sreg = self.operand(value, out);
                if let Type::Integer { width: IntWidth::W8, signed: false } = to {
                    out.push(asm::Instruction::ArithImm { op: ArithOp::And, dst: dreg, lhs: sreg, rhs: 0xFF });
                } else if dreg != sreg {
                    out.push(asm::Instruction::Move { dst: dreg, src: sreg });
                }
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::Select { dst, cond, a, b } => {
                // No conditional-move in this instruction set and no
                // surface-language ternary ever produces a `Select`
                // (`front/ast.rs` has no such expression), so this is
                // lowered branchlessly rather than earning a block split:
                // dst = b ^ (mask & (a ^ b)), mask = 0 - cond.
                let dreg = self.dst_reg(*dst);
                let creg = self.operand(cond, out);
                out.push(asm::Instruction::Arith { op: ArithOp::Sub, dst: dreg, lhs: Register::Zero, rhs: creg });
                let areg = self.operand(a, out);
                let breg = self.operand(b, out);
                out.push(asm::Instruction::Arith { op: ArithOp::Xor, dst: Register::Scratch, lhs: areg, rhs: breg });
                out.push(asm::Instruction::Arith { op: ArithOp::And, dst: Register::Scratch, lhs: Register::Scratch, rhs: dreg });
                out.push(asm::Instruction::Arith { op: ArithOp::Xor, dst: dreg, lhs: breg, rhs: Register::Scratch });
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::Phi { dst, .. } => {
                // The value already arrived via a predecessor-inserted
                // move (see `phi_moves`); just make sure it's parked
                // wherever this temp is supposed to live.
                let dreg = self.dst_reg(*dst);
                self.finish_dst(*dst, dreg, out);
            }
            Instruction::Call { dst, callee, args } => {
                let arg_regs: Vec<Register> = args.iter().map(|a| self.operand(a, out)).collect();
                let callee_sig = self.ctx.signatures.get(callee);
                if let Some(sig) = callee_sig {
                    out.extend(abi::lower_call(sig, *callee, &arg_regs));
                    if let Some(dst) = dst {
                        let (r0, r1) = sig.ret.registers.unwrap_or((Register::Ret0, None));
                        self.finish_dst_pair(*dst, r0, r1, out);
                    }
                } else {
                    // A callee with no computed signature is an external
                    // runtime-library routine (spec §4.7's soft-float /
                    // wide-multiply fallback); these follow the same ABI
                    // with whatever arguments were already placed.
                    out.push(asm::Instruction::Call { callee: *callee });
                    if let Some(dst) = dst {
                        self.finish_dst(*dst, Register::Ret0, out);
                    }
                }
            }
        }
    }

    fn lower_terminator(&self, block_id: BlockId, term: &Terminator, out: &mut Vec<asm::Instruction>) {
        match term {
            Terminator::Br(target) => {
                self.emit_phi_moves(block_id, out);
                out.push(asm::Instruction::Jump { target: JumpTarget::Local(BlockLabel(target.0)) });
            }
            Terminator::CondBr { cond, then_bb, else_bb } => {
                self.emit_phi_moves(block_id, out);
                let creg = self.operand(cond, out);
                out.push(asm::Instruction::Branch { cond: Condition::NotEqual, lhs: creg, rhs: Register::Zero, target: JumpTarget::Local(BlockLabel(then_bb.0)) });
                out.push(asm::Instruction::Jump { target: JumpTarget::Local(BlockLabel(else_bb.0)) });
            }
            Terminator::Ret(value) => {
                if let Some(value) = value {
                    let reg = self.operand(value, out);
                    let (r0, _) = self.ctx.signature.ret.registers.unwrap_or((Register::Ret0, None));
                    if reg != r0 {
                        out.push(asm::Instruction::Move { dst: r0, src: reg });
                    }
                }
                out.extend(abi::epilogue(&self.frame));
            }
        }
    }

    fn emit_phi_moves(&self, block_id: BlockId, out: &mut Vec<asm::Instruction>) {
        if let Some(moves) = self.phi_moves.get(&block_id) {
            for (dst, value) in moves {
                let src = self.operand(value, out);
                if *dst != src {
                    out.push(asm::Instruction::Move { dst: *dst, src });
                }
            }
        }
    }

    fn operand_bank(&self, ptr: &Value, out: &mut Vec<asm::Instruction>) -> Register {
        if let Value::Temp(t) = ptr {
            match self.ctx.alloc.slots.get(t) {
                Some(Slot::RegPair(_, bank)) => return *bank,
                Some(Slot::SpillPair(cell)) => {
                    let cell = *cell;
                    out.push(asm::Instruction::Load { dst: Register::Scratch2, bank: Register::Sb, base: Register::Fp, offset: self.frame_offset(cell + 1) });
                    return Register::Scratch2;
                }
                _ => {}
            }
        }
        self.bank_of(ptr)
    }
}

fn collect_phi_moves(function: &Function, ctx: &FunctionContext) -> Map<BlockId, Vec<(Register, Value)>> {
    let mut phi_moves: Map<BlockId, Vec<(Register, Value)>> = Map::new();
    for block in &function.blocks {
        for insn in &block.insns {
            if let Instruction::Phi { dst, incoming } = insn {
                let dreg = match ctx.alloc.slots.get(dst) {
                    Some(Slot::Reg(r)) | Some(Slot::RegPair(r, _)) => *r,
                    _ => Register::Scratch,
                };
                for (from_block, value) in incoming {
                    phi_moves.entry(*from_block).or_default().push((dreg, value.clone()));
                }
            }
        }
    }
    phi_moves
}

/// Lower one IR function into its target-assembly form.
pub fn select_function(function: &Function, types: &TypeTable, ctx: &FunctionContext) -> asm::Function {
    let (locals, locals_cells) = compute_locals(function, types);
    let frame = Frame { locals_cells, spill_cells: ctx.alloc.spill_cells, is_leaf: is_leaf(function) };
    let phi_moves = collect_phi_moves(function, ctx);
    let lowering = Lowering { function, ctx, locals, frame, phi_moves };

    let mut blocks = Vec::with_capacity(function.blocks.len());
    for (i, block) in function.blocks.iter().enumerate() {
        let mut insns = Vec::new();
        if i == 0 {
            insns.extend(abi::prologue(&frame));
            insns.extend(abi::bind_params(ctx.signature, &param_slots(function, ctx)));
        }
        for insn in &block.insns {
            lowering.lower_instruction(insn, &mut insns);
        }
        if let Some(term) = &block.term {
            lowering.lower_terminator(block.id, term, &mut insns);
        }
        blocks.push(asm::BasicBlock { label: BlockLabel(block.id.0), insns });
    }

    asm::Function { name: function.name, blocks, frame_locals: frame.locals_cells, frame_spills: frame.spill_cells, is_leaf: frame.is_leaf }
}

fn param_slots(function: &Function, ctx: &FunctionContext) -> Vec<Slot> {
    function
        .params
        .iter()
        .map(|p| ctx.alloc.slots.get(p).copied().unwrap_or(Slot::Reg(Register::Scratch)))
        .collect()
}

/// Lower every function in `module` into a full target [`asm::Program`].
pub fn select_instructions(module: &Module, types: &TypeTable, contexts: &Map<Id, FunctionContext>) -> asm::Program {
    let mut program = asm::Program::new();
    for function in &module.functions {
        if let Some(ctx) = contexts.get(&function.name) {
            program.functions.push(select_function(function, types, ctx));
        }
    }
    for global in &module.globals {
        use crate::middle::ir::GlobalInit;
        match &global.init {
            GlobalInit::Zero => program.bss.push((global.name, types.size_in_cells(&global.ty).unwrap_or(1))),
            GlobalInit::Int(n) => program.data.push(asm::DataItem { name: global.name, init: asm::DataInit::Cells(vec![*n]) }),
            GlobalInit::StringBytes(bytes) => program.rodata.push(asm::DataItem { name: global.name, init: asm::DataInit::Bytes(bytes.clone()) }),
        }
    }
    program
}
