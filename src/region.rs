//! The pointer-provenance lattice (component C, spec §3.3).
//!
//! This module holds only the lattice itself: the four-element
//! [`RegionTag`] and its join. The per-temp bookkeeping (origin spans,
//! assignment rules at each IR instruction) lives in
//! [`crate::ir::provenance`], which is built on top of this.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The region a pointer value is known (or not known) to point into.
///
/// Ordering: `Unknown` is bottom (no information yet); `Global` and
/// `Stack` are incomparable middle elements; `Mixed` is top (known
/// conflicting information). There is no `Ord` impl because the lattice
/// is not a total order — use [`RegionTag::join`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionTag {
    Unknown,
    Global,
    Stack,
    Mixed,
}

impl RegionTag {
    /// Join two region tags per spec §3.3:
    /// `Unknown ∨ x = x`, `x ∨ x = x`, two distinct concrete regions join
    /// to `Mixed`, anything joined with `Mixed` stays `Mixed`.
    pub fn join(self, other: RegionTag) -> RegionTag {
        use RegionTag::*;
        match (self, other) {
            (Mixed, _) | (_, Mixed) => Mixed,
            (Unknown, x) | (x, Unknown) => x,
            (a, b) if a == b => a,
            _ => Mixed,
        }
    }

    /// A region is safe to dereference through iff it names a single
    /// concrete region (spec §4.3's failure semantics).
    pub fn is_dereferenceable(self) -> bool {
        matches!(self, RegionTag::Global | RegionTag::Stack)
    }
}

impl fmt::Display for RegionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegionTag::Unknown => "Unknown",
            RegionTag::Global => "Global",
            RegionTag::Stack => "Stack",
            RegionTag::Mixed => "Mixed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::RegionTag::*;

    #[test]
    fn unknown_is_identity() {
        assert_eq!(Unknown.join(Global), Global);
        assert_eq!(Stack.join(Unknown), Stack);
    }

    #[test]
    fn same_region_is_idempotent() {
        assert_eq!(Global.join(Global), Global);
        assert_eq!(Stack.join(Stack), Stack);
    }

    #[test]
    fn distinct_concrete_regions_join_to_mixed() {
        assert_eq!(Global.join(Stack), Mixed);
        assert_eq!(Stack.join(Global), Mixed);
    }

    #[test]
    fn mixed_is_absorbing() {
        assert_eq!(Mixed.join(Global), Mixed);
        assert_eq!(Unknown.join(Mixed), Mixed);
        assert_eq!(Mixed.join(Mixed), Mixed);
    }
}
