//! Component D: spill-based greedy-LRU register allocation (spec §4.4).
//!
//! A linear scan over each function's instructions in block-layout
//! order, not full interval-graph coloring — a deliberate simplification
//! that fits the register file's small, uniform pool (`ALLOC_POOL` is
//! seven interchangeable registers; there is no benefit to a coloring
//! allocator when every candidate register is equally good). On each
//! def, if the pool has no free register the least-recently-used
//! occupant is spilled to a new frame slot.
//!
//! A pointer-typed temp whose provenance (spec §3.3) is not resolved to
//! a single concrete region needs its bank carried at runtime alongside
//! its address — that is the "fat pointer" of spec §4.4 — and claims two
//! adjacent pool registers atomically: both are allocated together, and
//! eviction always spills (or reloads) the pair as a unit, never half
//! of one. A pointer whose region is already known (`Global`/`Stack`)
//! only ever needs its address; the bank is the corresponding fixed
//! register (`back::gep` picks it), not something this pass carries.

use crate::common::Map;
use crate::middle::ir::{Function, GepIndex, Instruction, TempId, Terminator, Value};
use crate::middle::provenance::ProvenanceTable;
use crate::region::RegionTag;

use super::asm::{Register, ALLOC_POOL, BANK_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Reg(Register),
    /// Two adjacent pool registers: `.0` holds the address, `.1` the bank.
    RegPair(Register, Register),
    Spill(u16),
    SpillPair(u16),
}

#[derive(Clone, Debug, Default)]
pub struct Allocation {
    pub slots: Map<TempId, Slot>,
    /// Total spill-slot cells this function's frame needs to reserve.
    pub spill_cells: u16,
}

/// Is `t` a pointer whose bank isn't resolved to a single fixed register?
fn is_fat_pointer(function: &Function, provenance: &ProvenanceTable, t: TempId) -> bool {
    if !function.temp_type(t).is_pointer() {
        return false;
    }
    match provenance.get(t).map(|p| p.region) {
        Some(RegionTag::Global) | Some(RegionTag::Stack) => false,
        _ => true,
    }
}

/// Does this GEP's cumulative offset fail to prove it stays inside one
/// bank? A concrete `Global`/`Stack` region names which bank the base
/// lives in, not which bank the *result* lives in once an offset is
/// added — an object can still outgrow `BANK_SIZE` (spec §4.6 step 2).
/// Conservative: any dynamically indexed step is assumed unbounded,
/// since nothing here tracks array-length facts to prove otherwise.
fn gep_needs_bank_carry(indices: &[GepIndex]) -> bool {
    let mut const_total: i64 = 0;
    for idx in indices {
        match idx {
            GepIndex::Field { offset_cells } => const_total += offset_cells,
            GepIndex::Element { index: Value::Const(n), elem_size_cells } => const_total += n * elem_size_cells,
            GepIndex::Element { index: Value::Temp(_), .. } => return true,
        }
    }
    const_total >= BANK_SIZE
}

/// Every operand slot an instruction or terminator reads, in the order
/// regalloc should consider them live.
fn operands(insn: &Instruction) -> Vec<TempId> {
    let mut out = Vec::new();
    let mut note = |v: &Value| {
        if let Value::Temp(t) = v {
            out.push(*t);
        }
    };
    match insn {
        Instruction::Alloca { .. } | Instruction::AddrOfGlobal { .. } => {}
        Instruction::Load { ptr, .. } => note(ptr),
        Instruction::Store { ptr, value, .. } => {
            note(ptr);
            note(value);
        }
        Instruction::Gep { base, indices, .. } => {
            note(base);
            for idx in indices {
                if let GepIndex::Element { index, .. } = idx {
                    note(index);
                }
            }
        }
        Instruction::BinOp { lhs, rhs, .. } | Instruction::Cmp { lhs, rhs, .. } | Instruction::PtrCmp { lhs, rhs, .. } => {
            note(lhs);
            note(rhs);
        }
        Instruction::PtrAdd { ptr, offset, .. } => {
            note(ptr);
            note(offset);
        }
        Instruction::PtrSub { lhs, rhs, .. } => {
            note(lhs);
            note(rhs);
        }
        Instruction::Cast { value, .. } => note(value),
        Instruction::Phi { incoming, .. } => {
            for (_, v) in incoming {
                note(v);
            }
        }
        Instruction::Select { cond, a, b, .. } => {
            note(cond);
            note(a);
            note(b);
        }
        Instruction::Call { args, .. } => {
            for a in args {
                note(a);
            }
        }
    }
    out
}

fn terminator_operands(term: &Terminator) -> Vec<TempId> {
    match term {
        Terminator::CondBr { cond: Value::Temp(t), .. } => vec![*t],
        Terminator::Ret(Some(Value::Temp(t))) => vec![*t],
        _ => vec![],
    }
}

/// Last textual position (flattened across blocks in layout order) at
/// which each temp is read. A temp with no recorded use is dead at
/// definition and never occupies a register.
fn compute_last_use(function: &Function) -> Map<TempId, usize> {
    let mut last_use = Map::new();
    let mut pos = 0usize;
    for block in &function.blocks {
        for insn in &block.insns {
            for t in operands(insn) {
                last_use.insert(t, pos);
            }
            pos += 1;
        }
        if let Some(term) = &block.term {
            for t in terminator_operands(term) {
                last_use.insert(t, pos);
            }
        }
        pos += 1;
    }
    last_use
}

struct Pool {
    /// Free registers, front = next to hand out.
    free: Vec<Register>,
    /// Currently occupied registers, oldest allocation first (LRU order).
    active: Vec<(Register, TempId)>,
}

impl Pool {
    fn new() -> Self {
        Pool { free: ALLOC_POOL.to_vec(), active: Vec::new() }
    }

    fn touch(&mut self, reg: Register) {
        if let Some(i) = self.active.iter().position(|(r, _)| *r == reg) {
            let entry = self.active.remove(i);
            self.active.push(entry);
        }
    }

    fn take_one(&mut self) -> Register {
        self.free.remove(0)
    }

    /// Evict the least-recently-used occupant and return its register
    /// and owning temp.
    fn evict_one(&mut self) -> (Register, TempId) {
        self.active.remove(0)
    }
}

/// Allocate registers for one function, spilling to frame slots as the
/// pool runs out.
pub fn allocate_registers(function: &Function, provenance: &ProvenanceTable) -> Allocation {
    let last_use = compute_last_use(function);
    let mut pool = Pool::new();
    let mut slots = Map::new();
    let mut next_spill: u16 = 0;
    let mut pos = 0usize;

    let mut expire = |pool: &mut Pool, pos: usize, slots: &Map<TempId, Slot>| {
        pool.active.retain(|(reg, t)| match slots.get(t) {
            Some(Slot::Reg(r)) if r == reg => last_use.get(t).copied().unwrap_or(0) > pos,
            Some(Slot::RegPair(a, b)) if a == reg || b == reg => last_use.get(t).copied().unwrap_or(0) > pos,
            _ => true,
        });
    };

    let mut allocate_def = |pool: &mut Pool, next_spill: &mut u16, slots: &mut Map<TempId, Slot>, dst: TempId, fat: bool| {
        if last_use.get(&dst).is_none() {
            // Never read again; still needs somewhere to live transiently,
            // but nothing downstream will ever look it up, so a spill slot
            // is wasted bookkeeping for no benefit. Give it a register if
            // one's free, otherwise just let it spill like anything else.
        }
        if fat {
            while pool.free.len() < 2 {
                let (_, victim) = pool.evict_one();
                spill_victim(slots, next_spill, victim, true);
            }
            let a = pool.take_one();
            let b = pool.take_one();
            slots.insert(dst, Slot::RegPair(a, b));
            pool.active.push((a, dst));
            pool.active.push((b, dst));
        } else {
            if pool.free.is_empty() {
                let (_, victim) = pool.evict_one();
                spill_victim(slots, next_spill, victim, false);
            }
            let r = pool.take_one();
            slots.insert(dst, Slot::Reg(r));
            pool.active.push((r, dst));
        }
    };

    fn spill_victim(slots: &mut Map<TempId, Slot>, next_spill: &mut u16, victim: TempId, pair: bool) {
        if pair {
            let cell = *next_spill;
            *next_spill += 2;
            slots.insert(victim, Slot::SpillPair(cell));
        } else {
            let cell = *next_spill;
            *next_spill += 1;
            slots.insert(victim, Slot::Spill(cell));
        }
    }

    for block in &function.blocks {
        for insn in &block.insns {
            for t in operands(insn) {
                if let Some(Slot::Reg(r)) | Some(Slot::RegPair(r, _)) = slots.get(&t) {
                    pool.touch(*r);
                }
            }
            if let Some(dst) = insn.dst() {
                let fat = is_fat_pointer(function, provenance, dst)
                    || matches!(insn, Instruction::Gep { indices, .. } if gep_needs_bank_carry(indices));
                allocate_def(&mut pool, &mut next_spill, &mut slots, dst, fat);
            }
            pos += 1;
            expire(&mut pool, pos, &slots);
        }
        pos += 1;
        expire(&mut pool, pos, &slots);
    }

    Allocation { slots, spill_cells: next_spill }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::middle::ir::BlockId;
    use crate::types::{IntWidth, Type};
    use proptest::prelude::*;

    fn sample_function(n_temps: usize) -> Function {
        let mut f = Function {
            name: internment::Intern::new("f".to_string()),
            params: vec![],
            ret: Type::Integer { width: IntWidth::W16, signed: true },
            entry: BlockId(0),
            temps: vec![],
            blocks: vec![],
            span: Span::synthetic(),
        };
        let bb = f.new_block();
        f.entry = bb;
        for _ in 0..n_temps {
            f.new_temp(Type::Integer { width: IntWidth::W16, signed: true });
        }
        f
    }

    #[test]
    fn scalar_temps_get_distinct_registers_while_pool_has_room() {
        let f = sample_function(3);
        let mut block_insns = Vec::new();
        for i in 0..3u32 {
            block_insns.push(Instruction::BinOp {
                dst: TempId(i),
                op: crate::middle::ir::IrBinOp::Add,
                lhs: Value::Const(1),
                rhs: Value::Const(1),
                ty: Type::Integer { width: IntWidth::W16, signed: true },
            });
        }
        let mut f = f;
        f.block_mut(f.entry).insns = block_insns;
        f.block_mut(f.entry).term = Some(Terminator::Ret(Some(Value::Temp(TempId(2)))));
        let alloc = allocate_registers(&f, &ProvenanceTable::new());
        let mut seen = std::collections::HashSet::new();
        for t in 0..3u32 {
            match alloc.slots.get(&TempId(t)) {
                Some(Slot::Reg(r)) => assert!(seen.insert(*r), "register reused while pool had room"),
                other => panic!("expected a register, found {other:?}"),
            }
        }
    }

    #[test]
    fn pool_exhaustion_spills_the_oldest_occupant() {
        // Eight live scalar temps, one more than ALLOC_POOL's seven slots.
        let mut f = sample_function(8);
        let mut insns = Vec::new();
        for i in 0..8u32 {
            insns.push(Instruction::BinOp {
                dst: TempId(i),
                op: crate::middle::ir::IrBinOp::Add,
                lhs: Value::Const(1),
                rhs: Value::Const(1),
                ty: Type::Integer { width: IntWidth::W16, signed: true },
            });
        }
        f.block_mut(f.entry).insns = insns;
        // Keep every temp live until the very end.
        f.block_mut(f.entry).term = Some(Terminator::Ret(Some(Value::Temp(TempId(7)))));
        for i in 0..7u32 {
            f.block_mut(f.entry).insns.push(Instruction::Cast {
                dst: f.new_temp(Type::Integer { width: IntWidth::W16, signed: true }),
                value: Value::Temp(TempId(i)),
                to: Type::Integer { width: IntWidth::W16, signed: true },
            });
        }
        let alloc = allocate_registers(&f, &ProvenanceTable::new());
        let spilled = alloc.slots.values().filter(|s| matches!(s, Slot::Spill(_))).count();
        assert!(spilled >= 1, "expected at least one spill with 8 live scalars and a 7-register pool");
    }

    /// Builds a function defining one temp per entry of `kinds` (`true` for
    /// a fat pointer of unresolved provenance, `false` for a plain scalar),
    /// then reads every one of them back at the very end so all stay live
    /// simultaneously for the whole function — the condition under which
    /// pool exhaustion and spilling actually happen.
    fn build_function(kinds: &[bool]) -> (Function, ProvenanceTable) {
        let mut f = sample_function(0);
        let mut provenance = ProvenanceTable::new();
        let int_ty = || Type::Integer { width: IntWidth::W16, signed: true };
        let mut insns = Vec::new();
        for &fat in kinds {
            let ty = if fat { Type::pointer_to(int_ty()) } else { int_ty() };
            let dst = f.new_temp(ty.clone());
            if fat {
                provenance.set(dst, RegionTag::Unknown, Span::synthetic());
            }
            insns.push(Instruction::Cast { dst, value: Value::Const(0), to: ty });
        }
        for i in 0..kinds.len() as u32 {
            let reload = f.new_temp(int_ty());
            insns.push(Instruction::Cast { dst: reload, value: Value::Temp(TempId(i)), to: int_ty() });
        }
        f.block_mut(f.entry).insns = insns;
        f.block_mut(f.entry).term = Some(Terminator::Ret(None));
        (f, provenance)
    }

    proptest! {
        /// Fat-pointer atomicity (spec §8.1): whatever mix of fat pointers
        /// and scalars is live at once, a fat pointer's slot is always a
        /// pair — `RegPair` with two distinct registers, or `SpillPair` —
        /// never a lone `Reg`/`Spill` that would leave its bank half
        /// behind, and a scalar never gets a pair it has no use for.
        #[test]
        fn fat_pointers_always_allocate_as_a_pair(kinds in proptest::collection::vec(any::<bool>(), 0..24)) {
            let (f, provenance) = build_function(&kinds);
            let alloc = allocate_registers(&f, &provenance);
            for (i, &fat) in kinds.iter().enumerate() {
                let slot = alloc.slots.get(&TempId(i as u32));
                if fat {
                    match slot {
                        Some(Slot::RegPair(a, b)) => prop_assert_ne!(a, b),
                        Some(Slot::SpillPair(_)) => {}
                        other => prop_assert!(false, "fat pointer temp {i} split into {other:?}"),
                    }
                } else {
                    match slot {
                        Some(Slot::Reg(_)) | Some(Slot::Spill(_)) => {}
                        other => prop_assert!(false, "scalar temp {i} got a fat-pointer slot {other:?}"),
                    }
                }
            }
        }

        /// Spill/reload symmetry (spec §8.1): every temp simultaneously
        /// live at the point of spilling gets its own non-overlapping
        /// frame cell(s) — a `SpillPair`'s two halves reserve `cell` and
        /// `cell + 1` together, and never collide with another temp's
        /// slot, matching the reload side always fetching both halves
        /// from the same two cells they were stored to.
        #[test]
        fn spilled_slots_never_overlap(kinds in proptest::collection::vec(any::<bool>(), 0..24)) {
            let (f, provenance) = build_function(&kinds);
            let alloc = allocate_registers(&f, &provenance);
            let mut ranges: Vec<(u16, u16)> = Vec::new();
            for i in 0..kinds.len() as u32 {
                match alloc.slots.get(&TempId(i)) {
                    Some(Slot::Spill(cell)) => ranges.push((*cell, *cell)),
                    Some(Slot::SpillPair(cell)) => ranges.push((*cell, *cell + 1)),
                    _ => {}
                }
            }
            for i in 0..ranges.len() {
                for j in (i + 1)..ranges.len() {
                    let (a0, a1) = ranges[i];
                    let (b0, b1) = ranges[j];
                    prop_assert!(a1 < b0 || b1 < a0, "overlapping spill cells {:?} vs {:?}", ranges[i], ranges[j]);
                }
            }
        }
    }
}
