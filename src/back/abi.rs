//! Component E: the calling convention — frame layout, parameter and
//! return placement, prologue/epilogue, and call-site argument shuffling
//! (spec §4.5). There is exactly one calling convention; it is not
//! selectable.
//!
//! Frame shape (spec §3.4), growing from `fp`:
//! ```text
//!   fp+0   saved link           (return address within bank)
//!   fp+1   saved link_bank      (return address's bank)
//!   fp+2   saved fp             (caller's frame pointer)
//!   fp+3.. locals (L cells), then spill slots (S cells)
//! ```
//! A leaf function — spec §4.5's "performs no calls" — omits the link
//! save and restore; it never clobbers `link`/`link_bank` so there is
//! nothing to protect.

use crate::common::Id;
use crate::types::{Type, TypeTable};

use super::asm::{ArithOp, Instruction, Register, ARG_REGISTERS};
use super::regalloc::{Allocation, Slot};

/// Cells a value of `ty` occupies when passed as an argument or
/// returned. A pointer always reserves two cells here even when its
/// bank later folds to a fixed register within the callee — the ABI
/// boundary can't assume the callee already knows the region the way a
/// local `back::gep` pass can (spec §4.4's fat-pointer framing).
pub fn abi_cells(types: &TypeTable, ty: &Type) -> usize {
    match ty {
        Type::Pointer { .. } => 2,
        _ => types.size_in_cells(ty).unwrap_or(1).max(1),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgSlot {
    Registers(Register, Option<Register>),
    /// Offset in cells from the stack pointer at the call instruction,
    /// pushed in reverse declaration order (spec §4.5).
    Stack(i32),
}

#[derive(Clone, Debug)]
pub struct ReturnPlacement {
    pub registers: Option<(Register, Option<Register>)>,
    /// `true` when the return value is too large for two registers and
    /// is instead written through a hidden pointer the caller passes as
    /// an extra leading argument (spec §4.5's `sret` convention).
    pub sret: bool,
}

#[derive(Clone, Debug)]
pub struct Signature {
    pub params: Vec<ArgSlot>,
    pub ret: ReturnPlacement,
    pub stack_args_cells: i32,
}

/// Compute where every parameter lands and how the return value is
/// carried, per spec §4.5's packing rule: values fill `ARG0..ARG3`
/// left to right, a value that would be split across the register
/// boundary is pushed whole to the stack instead, and everything after
/// the first stack argument is pushed in reverse order.
pub fn compute_signature(types: &TypeTable, params: &[Type], ret: &Type) -> Signature {
    let ret_cells = abi_cells(types, ret);
    let sret = ret_cells > 2;
    let ret = ReturnPlacement {
        registers: if sret {
            None
        } else if ret_cells == 1 {
            Some((Register::Ret0, None))
        } else {
            Some((Register::Ret0, Some(Register::Ret1)))
        },
        sret,
    };

    let mut reg_cursor = 0usize;
    let mut stack_cursor: i32 = 0;
    let mut slots = Vec::new();

    if sret {
        reg_cursor = 1; // ARG0 reserved for the hidden return pointer.
    }

    for param in params {
        let cells = abi_cells(types, param);
        if reg_cursor + cells <= ARG_REGISTERS.len() {
            let first = ARG_REGISTERS[reg_cursor];
            let second = if cells == 2 { Some(ARG_REGISTERS[reg_cursor + 1]) } else { None };
            slots.push(ArgSlot::Registers(first, second));
            reg_cursor += cells;
        } else {
            slots.push(ArgSlot::Stack(stack_cursor));
            stack_cursor += cells as i32;
        }
    }

    Signature { params: slots, ret, stack_args_cells: stack_cursor }
}

/// Frame cell layout for one function (spec §3.4).
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    pub locals_cells: u16,
    pub spill_cells: u16,
    pub is_leaf: bool,
}

impl Frame {
    /// Total cells the prologue must advance `sp` by.
    pub fn size_cells(&self) -> u16 {
        self.locals_cells + self.spill_cells
    }
}

pub fn compute_frame(locals_cells: u16, alloc: &Allocation, is_leaf: bool) -> Frame {
    Frame { locals_cells, spill_cells: alloc.spill_cells, is_leaf }
}

/// Emit the function prologue: save the return address pair and the
/// caller's frame pointer (skipped for leaf functions), set `fp`, then
/// reserve the frame.
pub fn prologue(frame: &Frame) -> Vec<Instruction> {
    let mut out = Vec::new();
    if !frame.is_leaf {
        out.push(Instruction::Store { bank: Register::Sb, base: Register::Sp, offset: 0, src: Register::Link });
        out.push(Instruction::Store { bank: Register::Sb, base: Register::Sp, offset: 1, src: Register::LinkBank });
        out.push(Instruction::Store { bank: Register::Sb, base: Register::Sp, offset: 2, src: Register::Fp });
    }
    out.push(Instruction::Move { dst: Register::Fp, src: Register::Sp });
    let frame_base = if frame.is_leaf { 0 } else { 3 };
    let size = frame_base + frame.size_cells() as i32;
    if size != 0 {
        out.push(Instruction::ArithImm { op: ArithOp::Add, dst: Register::Sp, lhs: Register::Sp, rhs: size });
    }
    out
}

/// Emit the function epilogue: tear the frame down, restore the saved
/// registers (skipped for leaf functions), and return.
pub fn epilogue(frame: &Frame) -> Vec<Instruction> {
    let mut out = Vec::new();
    out.push(Instruction::Move { dst: Register::Sp, src: Register::Fp });
    if !frame.is_leaf {
        out.push(Instruction::Load { dst: Register::Link, bank: Register::Sb, base: Register::Sp, offset: 0 });
        out.push(Instruction::Load { dst: Register::LinkBank, bank: Register::Sb, base: Register::Sp, offset: 1 });
        out.push(Instruction::Load { dst: Register::Fp, bank: Register::Sb, base: Register::Sp, offset: 2 });
    }
    out.push(Instruction::Return);
    out
}

/// Move incoming parameters from their ABI slots into wherever
/// `back::regalloc` decided each parameter temp should live, in the
/// order given (caller passes the IR `Function`'s `params`/`Allocation`
/// so every destination is already known).
pub fn bind_params(signature: &Signature, param_slots: &[Slot]) -> Vec<Instruction> {
    let mut out = Vec::new();
    for (arg, dst) in signature.params.iter().zip(param_slots) {
        match (arg, dst) {
            (ArgSlot::Registers(r0, r1), Slot::Reg(d)) => out.push(Instruction::Move { dst: *d, src: *r0 }),
            (ArgSlot::Registers(r0, r1), Slot::RegPair(d0, d1)) => {
                out.push(Instruction::Move { dst: *d0, src: *r0 });
                if let (Some(r1), d1) = (r1, d1) {
                    out.push(Instruction::Move { dst: *d1, src: *r1 });
                }
            }
            (ArgSlot::Registers(r0, _), Slot::Spill(cell)) => {
                out.push(Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: *cell as i32, src: *r0 });
            }
            (ArgSlot::Registers(r0, r1), Slot::SpillPair(cell)) => {
                out.push(Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: *cell as i32, src: *r0 });
                if let Some(r1) = r1 {
                    out.push(Instruction::Store { bank: Register::Sb, base: Register::Fp, offset: *cell as i32 + 1, src: *r1 });
                }
            }
            (ArgSlot::Stack(offset), Slot::Reg(d)) => {
                out.push(Instruction::Load { dst: *d, bank: Register::Sb, base: Register::Fp, offset: *offset });
            }
            (ArgSlot::Stack(offset), Slot::RegPair(d0, d1)) => {
                out.push(Instruction::Load { dst: *d0, bank: Register::Sb, base: Register::Fp, offset: *offset });
                out.push(Instruction::Load { dst: *d1, bank: Register::Sb, base: Register::Fp, offset: *offset + 1 });
            }
            (ArgSlot::Stack(_), Slot::Spill(_)) | (ArgSlot::Stack(_), Slot::SpillPair(_)) => {
                // Already sitting in the caller's argument area; nothing
                // needs copying anywhere. (Both halves would read through
                // `fp` at a fixed offset from the frame layout pass.)
            }
        }
    }
    out
}

/// One register-to-register move the call-site shuffle still needs to
/// perform, before cycle-breaking.
#[derive(Clone, Copy, Debug)]
struct PendingMove {
    dst: Register,
    src: Register,
}

/// Serialize a set of register-to-register moves that may alias (a
/// destination of one move may be the source of another), breaking
/// cycles through `Scratch` (spec §4.5: "argument shuffling via
/// permutation-cycle-breaking using scratch/spill").
fn serialize_moves(moves: Vec<PendingMove>) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut pending = moves;

    while !pending.is_empty() {
        // A move is safe to emit now if nothing else still pending reads
        // its destination as a source.
        if let Some(i) = pending.iter().position(|m| !pending.iter().any(|other| other.src == m.dst && other.dst != m.dst)) {
            let m = pending.remove(i);
            if m.src != m.dst {
                out.push(Instruction::Move { dst: m.dst, src: m.src });
            }
        } else {
            // Every remaining move is part of a cycle; break it by
            // routing the first one through the scratch register.
            let m = pending.remove(0);
            out.push(Instruction::Move { dst: Register::Scratch, src: m.src });
            for other in pending.iter_mut() {
                if other.src == m.dst {
                    other.src = Register::Scratch;
                }
            }
            pending.push(PendingMove { dst: m.dst, src: Register::Scratch });
        }
    }
    out
}

/// Lower one `Call` into the argument-placement moves, the call pseudo-op
/// itself, and the return-value placement, in that order. `arg_regs` is
/// each argument's current register (regalloc has already bound every
/// live IR value to one); spilled arguments are loaded by the caller
/// before this runs.
pub fn lower_call(signature: &Signature, callee: Id, arg_regs: &[Register]) -> Vec<Instruction> {
    let mut moves = Vec::new();
    for (slot, src) in signature.params.iter().zip(arg_regs) {
        if let ArgSlot::Registers(r0, _) = slot {
            moves.push(PendingMove { dst: *r0, src: *src });
        }
    }
    let mut out = serialize_moves(moves);
    out.push(Instruction::Call { callee });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntWidth;

    fn types() -> TypeTable {
        TypeTable::new()
    }

    #[test]
    fn four_scalar_params_all_land_in_registers() {
        let t = types();
        let params = vec![Type::Integer { width: IntWidth::W16, signed: true }; 4];
        let sig = compute_signature(&t, &params, &Type::Void);
        assert!(sig.params.iter().all(|p| matches!(p, ArgSlot::Registers(_, None))));
        assert_eq!(sig.stack_args_cells, 0);
    }

    #[test]
    fn a_pointer_that_would_split_the_register_boundary_spills_to_the_stack() {
        let t = types();
        let params = vec![
            Type::Integer { width: IntWidth::W16, signed: true },
            Type::Integer { width: IntWidth::W16, signed: true },
            Type::Integer { width: IntWidth::W16, signed: true },
            Type::pointer_to(Type::Integer { width: IntWidth::W16, signed: true }),
        ];
        let sig = compute_signature(&t, &params, &Type::Void);
        assert!(matches!(sig.params[3], ArgSlot::Stack(0)));
    }

    #[test]
    fn cyclic_argument_registers_are_broken_via_scratch() {
        let moves = vec![PendingMove { dst: Register::Arg0, src: Register::Arg1 }, PendingMove { dst: Register::Arg1, src: Register::Arg0 }];
        let out = serialize_moves(moves);
        assert!(out.iter().any(|i| matches!(i, Instruction::Move { dst: Register::Scratch, .. })));
    }
}
