//! `-O1` optimizations: constant folding, dead-code elimination, and a
//! small peephole pass over the typed IR (spec §1's explicit scope —
//! nothing beyond these three).
//!
//! Each pass is conservative about provenance: the per-function
//! provenance table is keyed by `TempId`, so deleting a dead
//! instruction just leaves its provenance entry unused rather than
//! dangling, and constant folding never touches a pointer-producing
//! instruction (`Gep`, `AddrOfGlobal`, `PtrAdd`, `PtrSub`) since those
//! carry provenance that has no constant-folded equivalent.

use super::ir::{CmpOp, Function, Instruction, IrBinOp, Module, Terminator, Value};

/// Run the optimizer over every function in `module`, in place.
pub fn optimize(module: &mut Module) {
    for function in &mut module.functions {
        fold_constants(function);
        eliminate_dead_code(function);
        peephole(function);
    }
}

/// Replace a `BinOp`/`Cmp` whose operands are both constants with the
/// literal result, leaving the instruction in place as `dst = const`
/// (spec §4.7's strength-reduction framing: this pass only ever removes
/// work, never adds an operation a later pass has to undo).
fn fold_constants(function: &mut Function) {
    for block in &mut function.blocks {
        for insn in &mut block.insns {
            match insn {
                Instruction::BinOp { dst, op, lhs: Value::Const(a), rhs: Value::Const(b), ty } => {
                    if let Some(folded) = eval_binop(*op, *a, *b) {
                        *insn = Instruction::Cast { dst: *dst, value: Value::Const(folded), to: ty.clone() };
                    }
                }
                Instruction::Cmp { dst, op, lhs: Value::Const(a), rhs: Value::Const(b) } => {
                    let folded = eval_cmp(*op, *a, *b);
                    *insn = Instruction::Cast { dst: *dst, value: Value::Const(folded as i64), to: crate::types::Type::Integer { width: crate::types::IntWidth::W16, signed: true } };
                }
                _ => {}
            }
        }
    }
}

/// Also used by `back::isel`, which has to fold the same `Const op Const`
/// shape defensively at `-O0` (this pass doesn't run then).
pub(crate) fn eval_binop(op: IrBinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        IrBinOp::Add => a.wrapping_add(b),
        IrBinOp::Sub => a.wrapping_sub(b),
        IrBinOp::Mul => a.wrapping_mul(b),
        IrBinOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        IrBinOp::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        IrBinOp::BitAnd => a & b,
        IrBinOp::BitOr => a | b,
        IrBinOp::BitXor => a ^ b,
        IrBinOp::Shl => a.wrapping_shl(b as u32),
        IrBinOp::Shr => a.wrapping_shr(b as u32),
    })
}

pub(crate) fn eval_cmp(op: CmpOp, a: i64, b: i64) -> bool {
    match op {
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
    }
}

/// Remove instructions whose destination temp is never read, keeping
/// anything that can affect memory or control flow (`Store`, `Call`)
/// regardless of whether its `dst` (if any) is used.
fn eliminate_dead_code(function: &mut Function) {
    loop {
        let used = collect_used_temps(function);
        let mut changed = false;
        for block in &mut function.blocks {
            block.insns.retain(|insn| {
                let keep = match insn {
                    Instruction::Store { .. } | Instruction::Call { .. } => true,
                    _ => match insn.dst() {
                        Some(dst) => used.contains(&dst),
                        None => true,
                    },
                };
                if !keep {
                    changed = true;
                }
                keep
            });
        }
        if !changed {
            break;
        }
    }
}

fn collect_used_temps(function: &Function) -> crate::common::Set<super::ir::TempId> {
    let mut used = crate::common::Set::new();
    let mut note = |v: &Value| {
        if let Value::Temp(t) = v {
            used.insert(*t);
        }
    };
    for block in &function.blocks {
        for insn in &block.insns {
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
                        if let super::ir::GepIndex::Element { index, .. } = idx {
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
        }
        match &block.term {
            Some(Terminator::CondBr { cond, .. }) => note(cond),
            Some(Terminator::Ret(Some(v))) => note(v),
            _ => {}
        }
    }
    used
}

/// A small strength-reduction peephole: `x * 2^k` and `x / 2^k` (for
/// unsigned-equivalent positive `k`) become shifts (spec §4.7). Only
/// folds the power-of-two case; anything else is left for instruction
/// selection's general multiply/divide lowering.
fn peephole(function: &mut Function) {
    for block in &mut function.blocks {
        for insn in &mut block.insns {
            if let Instruction::BinOp { dst, op, lhs, rhs: Value::Const(k), ty } = insn {
                if let Some(shift) = power_of_two(*k) {
                    match op {
                        IrBinOp::Mul => *insn = Instruction::BinOp { dst: *dst, op: IrBinOp::Shl, lhs: *lhs, rhs: Value::Const(shift), ty: ty.clone() },
                        IrBinOp::Div => *insn = Instruction::BinOp { dst: *dst, op: IrBinOp::Shr, lhs: *lhs, rhs: Value::Const(shift), ty: ty.clone() },
                        _ => {}
                    }
                }
            }
        }
    }
}

fn power_of_two(n: i64) -> Option<i64> {
    if n > 0 && (n & (n - 1)) == 0 {
        Some(n.trailing_zeros() as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::types::{IntWidth, Type};

    fn sample_function() -> Function {
        let mut f = Function {
            name: internment::Intern::new("f".to_string()),
            params: vec![],
            ret: Type::Integer { width: IntWidth::W16, signed: true },
            entry: super::super::ir::BlockId(0),
            temps: vec![],
            blocks: vec![],
            span: Span::synthetic(),
        };
        let bb = f.new_block();
        f.entry = bb;
        f
    }

    #[test]
    fn constant_binop_is_folded_to_a_cast_of_the_literal() {
        let mut f = sample_function();
        let ty = Type::Integer { width: IntWidth::W16, signed: true };
        let dst = f.new_temp(ty.clone());
        f.block_mut(f.entry).insns.push(Instruction::BinOp { dst, op: IrBinOp::Add, lhs: Value::Const(2), rhs: Value::Const(3), ty });
        fold_constants(&mut f);
        match &f.block_mut(f.entry).insns[0] {
            Instruction::Cast { value: Value::Const(n), .. } => assert_eq!(*n, 5),
            other => panic!("expected a folded constant, found {other:?}"),
        }
    }

    #[test]
    fn unused_temp_is_removed() {
        let mut f = sample_function();
        let ty = Type::Integer { width: IntWidth::W16, signed: true };
        let dead = f.new_temp(ty.clone());
        f.block_mut(f.entry).insns.push(Instruction::BinOp { dst: dead, op: IrBinOp::Add, lhs: Value::Const(1), rhs: Value::Const(1), ty });
        f.block_mut(f.entry).term = Some(Terminator::Ret(None));
        eliminate_dead_code(&mut f);
        assert!(f.block_mut(f.entry).insns.is_empty());
    }

    #[test]
    fn multiply_by_power_of_two_becomes_a_shift() {
        let mut f = sample_function();
        let ty = Type::Integer { width: IntWidth::W16, signed: true };
        let input = f.new_temp(ty.clone());
        let dst = f.new_temp(ty.clone());
        f.block_mut(f.entry).insns.push(Instruction::BinOp { dst, op: IrBinOp::Mul, lhs: Value::Temp(input), rhs: Value::Const(8), ty });
        peephole(&mut f);
        match &f.block_mut(f.entry).insns[0] {
            Instruction::BinOp { op: IrBinOp::Shl, rhs: Value::Const(3), .. } => {}
            other => panic!("expected a shift, found {other:?}"),
        }
    }
}
