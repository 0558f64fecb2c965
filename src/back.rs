//! The back end: target ISA and emission, register allocation, the
//! calling convention, GEP/memory lowering, and instruction selection
//! (components D through G, spec §4.4–§4.7).

pub mod abi;
pub mod asm;
pub mod gep;
pub mod isel;
pub mod regalloc;

pub use abi::{compute_signature, lower_call};
pub use asm::{Instruction, Program, Register};
pub use gep::lower_memory;
pub use isel::select_instructions;
pub use regalloc::allocate_registers;
