//! The middle end: typed IR, provenance tracking, the AST-to-IR builder,
//! and the optimizer (components B and C, spec §4.2–4.3).

pub mod builder;
pub mod ir;
pub mod opt;
pub mod provenance;

pub use builder::build_module;
pub use ir::{Function, Module};
pub use opt::optimize;
