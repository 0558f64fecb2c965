//! Component F: GEP & memory lowering (spec §4.6).
//!
//! This is the pass that owns `Load`/`Store`'s failure semantics: a
//! dereference through a pointer whose provenance (spec §3.3) isn't a
//! single concrete region is rejected here, not in `middle::builder`
//! (see the "dereference rejection" decision in `DESIGN.md`). Every
//! pointer that *is* dereferenced and resolves cleanly is assigned the
//! fixed bank register its region implies — `Global` always reads
//! through `gb`, `Stack` always through `sb` — which `back::isel` reads
//! back out when it emits the actual `ld`/`sd`.

use crate::common::{Id, Map};
use crate::diag::{Code, Diagnostic, DiagnosticBag, Note};
use crate::middle::ir::{Function, Instruction, Module, TempId, Value};
use crate::middle::provenance::ProvenanceTable;
use crate::region::RegionTag;

use super::asm::Register;

/// The fixed bank register each dereferenced pointer temp resolves to,
/// keyed by the temp whose value is being loaded through or stored to.
#[derive(Clone, Debug, Default)]
pub struct BankAssignment {
    pub banks: Map<TempId, Register>,
}

fn bank_for_region(region: RegionTag) -> Option<Register> {
    match region {
        RegionTag::Global => Some(Register::Gb),
        RegionTag::Stack => Some(Register::Sb),
        RegionTag::Unknown | RegionTag::Mixed => None,
    }
}

/// Resolve every `Load`/`Store`'s bank register, rejecting any whose
/// pointer provenance doesn't name a single concrete region.
pub fn lower_memory(module: &Module) -> (Map<Id, BankAssignment>, DiagnosticBag) {
    let mut diags = DiagnosticBag::new();
    let mut result = Map::new();

    for function in &module.functions {
        let empty = ProvenanceTable::new();
        let table = module.provenance.get(&function.name).unwrap_or(&empty);
        let mut assignment = BankAssignment::default();
        check_function(function, table, &mut assignment, &mut diags);
        result.insert(function.name, assignment);
    }

    (result, diags)
}

fn check_function(function: &Function, table: &ProvenanceTable, assignment: &mut BankAssignment, diags: &mut DiagnosticBag) {
    for block in &function.blocks {
        for insn in &block.insns {
            match insn {
                Instruction::Load { ptr, span, .. } => resolve_deref(ptr, *span, table, assignment, diags),
                Instruction::Store { ptr, span, .. } => resolve_deref(ptr, *span, table, assignment, diags),
                _ => {}
            }
        }
    }
}

fn resolve_deref(ptr: &Value, span: crate::common::Span, table: &ProvenanceTable, assignment: &mut BankAssignment, diags: &mut DiagnosticBag) {
    let Value::Temp(t) = ptr else {
        // A literal address used directly as a pointer has no provenance
        // entry to consult; that's only reachable through an explicit
        // cast, which is its own diagnostic surface in front/typeck.
        return;
    };
    let provenance = table.get(*t);
    let region = provenance.map(|p| p.region).unwrap_or(RegionTag::Unknown);
    match bank_for_region(region) {
        Some(reg) => {
            assignment.banks.insert(*t, reg);
        }
        None => {
            let code = if region == RegionTag::Mixed { Code::DerefMixedProvenance } else { Code::DerefUnknownProvenance };
            let mut d = Diagnostic::error(code, span, format!("dereference of pointer with {region} provenance"));
            if let Some(p) = provenance {
                for origin in &p.origins {
                    d = d.with_note(Note::new(*origin, "region established here"));
                }
            }
            diags.push(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::middle::ir::{BlockId, Function, Module, Terminator};
    use crate::middle::provenance::Provenance;
    use crate::types::{IntWidth, Type};

    fn sample_function() -> Function {
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
        f
    }

    #[test]
    fn stack_provenance_resolves_to_the_stack_bank_register() {
        let mut f = sample_function();
        let ptr = f.new_temp(Type::pointer_to(Type::Integer { width: IntWidth::W16, signed: true }));
        let dst = f.new_temp(Type::Integer { width: IntWidth::W16, signed: true });
        f.block_mut(f.entry).insns.push(Instruction::Load { dst, ptr: Value::Temp(ptr), ty: Type::Integer { width: IntWidth::W16, signed: true }, span: Span::synthetic() });
        f.block_mut(f.entry).term = Some(Terminator::Ret(None));

        let mut table = ProvenanceTable::new();
        table.set_record(ptr, Provenance::new(RegionTag::Stack, Span::synthetic()));

        let mut module = Module::new();
        module.provenance.insert(f.name, table);
        module.functions.push(f);

        let (assignment, diags) = lower_memory(&module);
        assert!(diags.is_empty());
        let banks = &assignment[&internment::Intern::new("f".to_string())];
        assert_eq!(banks.banks.get(&ptr), Some(&Register::Sb));
    }

    #[test]
    fn unknown_provenance_is_rejected() {
        let mut f = sample_function();
        let ptr = f.new_temp(Type::pointer_to(Type::Integer { width: IntWidth::W16, signed: true }));
        let dst = f.new_temp(Type::Integer { width: IntWidth::W16, signed: true });
        f.block_mut(f.entry).insns.push(Instruction::Load { dst, ptr: Value::Temp(ptr), ty: Type::Integer { width: IntWidth::W16, signed: true }, span: Span::synthetic() });
        f.block_mut(f.entry).term = Some(Terminator::Ret(None));

        let mut module = Module::new();
        module.provenance.insert(f.name, ProvenanceTable::new());
        module.functions.push(f);

        let (_assignment, diags) = lower_memory(&module);
        assert!(diags.has_errors());
    }
}
