//! Common definitions that are shared between different parts of the compiler.

use serde::{Deserialize, Serialize};

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers.
pub type Id = internment::Intern<String>;

/// A single point in the source text, 1-indexed in line and column to match
/// the `file:line:col` diagnostic format in spec §7.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
    pub offset: u32,
}

/// A half-open range of source text, used to anchor diagnostics and trace
/// artifacts back to the original input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Span { start, end }
    }

    /// A zero-width span used for synthesized nodes that have no source
    /// counterpart (e.g. implicit promotions).
    pub fn synthetic() -> Self {
        Span::default()
    }

    pub fn join(self, other: Span) -> Span {
        let start = if self.start <= other.start { self.start } else { other.start };
        let end = if self.end >= other.end { self.end } else { other.end };
        Span { start, end }
    }
}
