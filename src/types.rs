//! Component A: type system & layout (spec §4.1).
//!
//! Types are plain data (`Type` is a tagged union per spec §9, no
//! inheritance); layout (`size_in_cells`, `field_offset`) is computed
//! eagerly and cached the moment a struct is completed, per spec §3.1.

use serde::Serialize;

use crate::common::{Id, Map, Span};
use crate::diag::{Code, Diagnostic};
use crate::region::RegionTag;

/// Integer bit widths supported by the target (spec §3.1). `char` is
/// width 8 but, per spec §3.1, still occupies one full cell at runtime —
/// `width` here is the *value* width used for truncation/sign-extension,
/// not the storage width (storage width is always handled by
/// [`Type::size_in_cells`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
        }
    }

    /// How many cells this integer occupies: one for 8/16-bit values, two
    /// (little-endian) for 32-bit (`long`), per spec §3.1.
    pub fn cells(self) -> usize {
        match self {
            IntWidth::W8 | IntWidth::W16 => 1,
            IntWidth::W32 => 2,
        }
    }
}

/// A resolved C type. Typedef chains are fully expanded before this type
/// reaches the IR builder (spec §3.1's invariant); `TypeName` only exists
/// transiently during the front end's own resolution pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Type {
    Void,
    Integer {
        width: IntWidth,
        signed: bool,
    },
    /// A fat pointer per spec's glossary: two cells at runtime (address,
    /// bank). `region` is the statically-declared provenance, if any (set
    /// by `--assume-pointer-params`, spec §6); the authoritative,
    /// flow-sensitive provenance lives in `ir::provenance`, not here.
    Pointer {
        target: Box<Type>,
        region: Option<RegionTag>,
    },
    Array {
        element: Box<Type>,
        length: usize,
    },
    /// Resolved by name into the enclosing [`TypeTable`].
    Struct(Id),
    Function {
        ret: Box<Type>,
        params: Vec<Type>,
        variadic: bool,
    },
    /// An unresolved alias; must not survive past front-end typedef
    /// resolution (spec §3.1 invariant).
    TypeName(Id),
}

impl Type {
    pub fn pointer_to(target: Type) -> Type {
        Type::Pointer { target: Box::new(target), region: None }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Integer { .. })
    }

    pub fn is_scalar(&self) -> bool {
        self.is_integer() || self.is_pointer()
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// A completed struct's field list and cached layout.
#[derive(Clone, Debug, Serialize)]
pub struct StructDef {
    pub name: Id,
    /// `None` until `complete_struct` is called (two-pass resolution,
    /// spec §4.1).
    pub fields: Option<Vec<(Id, Type)>>,
    size_cells: usize,
    offsets: Vec<usize>,
}

impl StructDef {
    fn incomplete(name: Id) -> Self {
        StructDef { name, fields: None, size_cells: 0, offsets: Vec::new() }
    }

    pub fn is_complete(&self) -> bool {
        self.fields.is_some()
    }
}

/// Owns struct definitions and typedef aliases for one translation unit.
/// Per spec §5, one `TypeTable` belongs to exactly one compile and is
/// never shared across translation units.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TypeTable {
    structs: Map<Id, StructDef>,
    typedefs: Map<Id, Type>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable::default()
    }

    /// Register a struct's name ahead of knowing its fields (the first of
    /// the two passes in spec §4.1). Forward declarations and
    /// self-referential pointer fields rely on this existing before the
    /// struct body is processed.
    pub fn declare_struct(&mut self, name: Id) {
        self.structs.entry(name).or_insert_with(|| StructDef::incomplete(name));
    }

    /// Complete a previously declared struct: computes and caches
    /// `field_offset` for every field and the struct's total size, per
    /// spec §3.1 (`size(S) = sum(size(field_i))`, no padding).
    ///
    /// Fails with `RecursiveStructByValue` if any field embeds `name` by
    /// value (directly or transitively); fails with
    /// `IncompleteTypeByValue` if a field's struct type is declared but
    /// not yet completed.
    pub fn complete_struct(&mut self, name: Id, fields: Vec<(Id, Type)>, span: Span) -> Result<(), Diagnostic> {
        let mut seen_names = std::collections::HashSet::new();
        for (field_name, field_ty) in &fields {
            if !seen_names.insert(*field_name) {
                return Err(Diagnostic::error(
                    Code::IncompatibleTypes,
                    span,
                    format!("duplicate field name '{field_name}' in struct '{name}'"),
                ));
            }
            self.check_struct_field_type(name, field_ty, span)?;
        }

        let mut offsets = Vec::with_capacity(fields.len());
        let mut cursor = 0usize;
        for (_, field_ty) in &fields {
            offsets.push(cursor);
            cursor += self.size_in_cells(field_ty).map_err(|_| {
                Diagnostic::error(Code::IncompleteTypeByValue, span, format!("field of incomplete type in struct '{name}'"))
            })?;
        }

        self.structs.insert(
            name,
            StructDef { name, fields: Some(fields), size_cells: cursor, offsets },
        );
        Ok(())
    }

    /// Walk a field type rejecting by-value recursion through `owner`.
    /// By-value recursion through an array of the owner type is caught
    /// the same way as a direct field, since arrays don't break the
    /// cycle.
    fn check_struct_field_type(&self, owner: Id, field_ty: &Type, span: Span) -> Result<(), Diagnostic> {
        match field_ty {
            Type::Struct(inner) if *inner == owner => Err(Diagnostic::error(
                Code::RecursiveStructByValue,
                span,
                format!("struct '{owner}' contains itself by value"),
            )),
            Type::Struct(inner) => {
                let def = self.structs.get(inner).ok_or_else(|| {
                    Diagnostic::error(Code::UndeclaredIdentifier, span, format!("undeclared struct '{inner}'"))
                })?;
                if !def.is_complete() {
                    return Err(Diagnostic::error(
                        Code::IncompleteTypeByValue,
                        span,
                        format!("field uses incomplete struct '{inner}' by value"),
                    ));
                }
                Ok(())
            }
            Type::Array { element, .. } => self.check_struct_field_type(owner, element, span),
            _ => Ok(()),
        }
    }

    pub fn struct_def(&self, name: Id) -> Option<&StructDef> {
        self.structs.get(&name)
    }

    pub fn define_typedef(&mut self, alias: Id, target: Type) {
        self.typedefs.insert(alias, target);
    }

    /// Fully expand a typedef chain. Cycles (a typedef that (transitively)
    /// aliases itself) terminate after `structs.len() + typedefs.len() +
    /// 1` steps rather than looping forever; this is an internal-error
    /// condition the front end should never actually hit since it builds
    /// the typedef table incrementally.
    pub fn resolve_typedef(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        let budget = self.typedefs.len() + 1;
        for _ in 0..=budget {
            match current {
                Type::TypeName(name) => match self.typedefs.get(&name) {
                    Some(target) => current = target.clone(),
                    None => return Type::TypeName(name),
                },
                other => return other,
            }
        }
        current
    }

    /// Alignment in cells. The target has no sub-cell addressing, so
    /// everything aligns to one cell (spec §4.1).
    pub fn align_in_cells(&self, _ty: &Type) -> usize {
        1
    }

    /// Size in cells, per spec §3.1. Fails if `ty` names an incomplete
    /// struct (instantiating an incomplete type is rejected).
    pub fn size_in_cells(&self, ty: &Type) -> Result<usize, ()> {
        match self.resolve_typedef(ty) {
            Type::Void => Ok(0),
            Type::Integer { width, .. } => Ok(width.cells()),
            Type::Pointer { .. } => Ok(2), // fat pointer: address + bank
            Type::Array { element, length } => Ok(self.size_in_cells(&element)? * length),
            Type::Struct(name) => {
                let def = self.structs.get(&name).ok_or(())?;
                if def.is_complete() {
                    Ok(def.size_cells)
                } else {
                    Err(())
                }
            }
            Type::Function { .. } => Err(()),
            Type::TypeName(_) => Err(()),
        }
    }

    /// Field offset in cells, computed once at struct completion and
    /// cached (spec §4.1).
    pub fn field_offset(&self, struct_name: Id, field: Id) -> Option<usize> {
        let def = self.structs.get(&struct_name)?;
        let fields = def.fields.as_ref()?;
        let index = fields.iter().position(|(name, _)| *name == field)?;
        def.offsets.get(index).copied()
    }

    pub fn field_type(&self, struct_name: Id, field: Id) -> Option<Type> {
        let def = self.structs.get(&struct_name)?;
        let fields = def.fields.as_ref()?;
        fields.iter().find(|(name, _)| *name == field).map(|(_, ty)| ty.clone())
    }

    /// Integer promotion per the usual C rules, restricted to this
    /// target's widths: anything narrower than `int` (16-bit here)
    /// promotes to `int`; `int` and `long` are unaffected.
    pub fn integer_promote(&self, ty: &Type) -> Type {
        match self.resolve_typedef(ty) {
            Type::Integer { width: IntWidth::W8, signed } => Type::Integer { width: IntWidth::W16, signed },
            other => other,
        }
    }

    /// Array-to-pointer decay (spec §4.1): `T[n]` used as a value becomes
    /// a `T*`.
    pub fn pointer_decay(&self, ty: &Type) -> Type {
        match self.resolve_typedef(ty) {
            Type::Array { element, .. } => Type::Pointer { target: element, region: None },
            other => other,
        }
    }

    /// Whether a value of type `from` may be assigned/converted to a
    /// variable of type `to` without an explicit cast. Scalars of the
    /// same kind are mutually assignable (no narrowing check here — that
    /// is a `-W` warning on a real compiler, out of this core's scope);
    /// pointers must agree on pointee type or have a `void*` on one side;
    /// structs must be the exact same named type.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        let from = self.resolve_typedef(from);
        let to = self.resolve_typedef(to);
        match (&from, &to) {
            (Type::Integer { .. }, Type::Integer { .. }) => true,
            (Type::Pointer { target: t1, .. }, Type::Pointer { target: t2, .. }) => {
                matches!(**t1, Type::Void) || matches!(**t2, Type::Void) || t1 == t2
            }
            (Type::Struct(a), Type::Struct(b)) => a == b,
            (Type::Array { element: e1, .. }, Type::Pointer { target: e2, .. }) => e1 == e2,
            _ => from == to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;

    fn id(s: &str) -> Id {
        internment::Intern::new(s.to_string())
    }

    #[test]
    fn struct_fields_lay_out_in_declaration_order_with_no_padding() {
        let mut table = TypeTable::new();
        table.declare_struct(id("Point"));
        table
            .complete_struct(
                id("Point"),
                vec![
                    (id("x"), Type::Integer { width: IntWidth::W16, signed: true }),
                    (id("y"), Type::Integer { width: IntWidth::W16, signed: true }),
                ],
                Span::synthetic(),
            )
            .unwrap();
        assert_eq!(table.size_in_cells(&Type::Struct(id("Point"))), Ok(2));
        assert_eq!(table.field_offset(id("Point"), id("x")), Some(0));
        assert_eq!(table.field_offset(id("Point"), id("y")), Some(1));
    }

    #[test]
    fn long_field_occupies_two_cells() {
        let mut table = TypeTable::new();
        table.declare_struct(id("Pair"));
        table
            .complete_struct(
                id("Pair"),
                vec![
                    (id("a"), Type::Integer { width: IntWidth::W32, signed: true }),
                    (id("b"), Type::Integer { width: IntWidth::W16, signed: true }),
                ],
                Span::synthetic(),
            )
            .unwrap();
        assert_eq!(table.size_in_cells(&Type::Struct(id("Pair"))), Ok(3));
        assert_eq!(table.field_offset(id("Pair"), id("b")), Some(2));
    }

    #[test]
    fn self_referential_pointer_is_allowed_but_by_value_is_rejected() {
        let mut table = TypeTable::new();
        table.declare_struct(id("Node"));
        let ok = table.complete_struct(
            id("Node"),
            vec![
                (id("value"), Type::Integer { width: IntWidth::W16, signed: true }),
                (id("next"), Type::pointer_to(Type::Struct(id("Node")))),
            ],
            Span::synthetic(),
        );
        assert!(ok.is_ok());

        let mut table2 = TypeTable::new();
        table2.declare_struct(id("Bad"));
        let err = table2.complete_struct(
            id("Bad"),
            vec![(id("self"), Type::Struct(id("Bad")))],
            Span::synthetic(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn incomplete_struct_cannot_be_instantiated() {
        let mut table = TypeTable::new();
        table.declare_struct(id("Forward"));
        assert_eq!(table.size_in_cells(&Type::Struct(id("Forward"))), Err(()));
    }

    #[test]
    fn typedef_chains_resolve_fully() {
        let mut table = TypeTable::new();
        table.define_typedef(id("word_t"), Type::Integer { width: IntWidth::W16, signed: true });
        table.define_typedef(id("counter_t"), Type::TypeName(id("word_t")));
        let resolved = table.resolve_typedef(&Type::TypeName(id("counter_t")));
        assert_eq!(resolved, Type::Integer { width: IntWidth::W16, signed: true });
    }

    #[test]
    fn array_decays_to_pointer_of_element_type() {
        let table = TypeTable::new();
        let arr = Type::Array { element: Box::new(Type::Integer { width: IntWidth::W16, signed: true }), length: 10 };
        let decayed = table.pointer_decay(&arr);
        assert_eq!(decayed, Type::pointer_to(Type::Integer { width: IntWidth::W16, signed: true }));
    }
}
