//! Component C: the per-temp provenance table (spec §4.3).
//!
//! Sits on top of the lattice in [`crate::region`]; this module adds the
//! per-`TempId` bookkeeping (origin spans, `join_phi`) that the builder
//! and the GEP/memory lowering pass (`crate::back::gep`) both consult.

use serde::Serialize;

use crate::common::{Map, Span};
use crate::region::RegionTag;

use super::ir::TempId;

/// `{region, origin_span}` for one pointer-valued temp (spec §3.3).
/// `origins` may hold more than one span once a `Phi` has joined
/// conflicting regions, so a `Mixed` diagnostic can name every
/// contributor (spec §4.3's failure semantics).
#[derive(Clone, Debug, Serialize)]
pub struct Provenance {
    pub region: RegionTag,
    pub origins: Vec<Span>,
}

impl Provenance {
    pub fn new(region: RegionTag, origin: Span) -> Self {
        Provenance { region, origins: vec![origin] }
    }
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ProvenanceTable {
    pub entries: Map<TempId, Provenance>,
}

impl ProvenanceTable {
    pub fn new() -> Self {
        ProvenanceTable::default()
    }

    pub fn set(&mut self, temp: TempId, region: RegionTag, origin: Span) {
        self.entries.insert(temp, Provenance::new(region, origin));
    }

    /// Directly install a provenance record, e.g. one copied forward from
    /// a local variable's currently-known region when its value is
    /// re-loaded from its stack slot (§builder's flow-sensitive local
    /// tracking, which supplements the conservative "loads are Unknown"
    /// default rule for the common un-aliased local case).
    pub fn set_record(&mut self, temp: TempId, record: Provenance) {
        self.entries.insert(temp, record);
    }

    pub fn get(&self, temp: TempId) -> Option<&Provenance> {
        self.entries.get(&temp)
    }

    /// Join the provenance of a `Phi`/`Select`'s incoming values into its
    /// result, per spec §3.3: `Unknown` is absorbed, two distinct concrete
    /// regions become `Mixed`, and every incoming origin span is kept so a
    /// later `Mixed` diagnostic can cite all of them.
    pub fn join_phi(&mut self, dst: TempId, incoming: &[(TempId, Span)]) {
        let mut region = RegionTag::Unknown;
        let mut origins = Vec::new();
        for (temp, fallback_span) in incoming {
            match self.entries.get(temp) {
                Some(p) => {
                    region = region.join(p.region);
                    origins.extend(p.origins.iter().copied());
                }
                None => {
                    region = region.join(RegionTag::Unknown);
                    origins.push(*fallback_span);
                }
            }
        }
        self.entries.insert(dst, Provenance { region, origins });
    }
}
