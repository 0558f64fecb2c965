//! Type checking: resolves every typedef, completes struct layouts, and
//! annotates every expression with its `expr_type` (spec §8.1's "type
//! preservation" property, and the `tast` trace artifact of spec §6).
//!
//! Like [`super::lex`] and [`super::parse`], type-checking is one of the
//! "external" pipeline stages named in spec §4.8 — this implementation
//! exists to make the compiler runnable end to end and is deliberately
//! lighter-weight than components A through G, which is where the
//! engineering budget goes.

use crate::common::{Id, Map, Span};
use crate::diag::{Code, Diagnostic, DiagnosticBag};
use crate::types::{IntWidth, Type, TypeTable};

use super::ast::*;

/// One entry in the `sem` trace artifact (spec §6): a resolved symbol,
/// its type, and the lexical scope depth it was declared at.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SemEntry {
    pub symbol_name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub scope_level: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SemanticTable {
    pub entries: Vec<SemEntry>,
    pub typedefs: Map<String, String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    pub ret: Type,
    pub variadic: bool,
}

/// The `tast` trace artifact of spec §6 in full: the annotated tree
/// itself, the completed type table, and every resolved signature.
#[derive(Debug, serde::Serialize)]
pub struct TypedProgram {
    pub ast: Program,
    pub types: TypeTable,
    pub functions: Map<Id, FunctionSig>,
    pub globals: Map<Id, Type>,
    pub sem: SemanticTable,
}

/// Type-check a freshly parsed [`Program`], filling in every `Expr::ty`.
/// Errors are collected in the returned bag; a program with any `Error`-
/// or `Fatal`-severity diagnostic should not be lowered to IR (spec §7).
pub fn typecheck(mut program: Program) -> (TypedProgram, DiagnosticBag) {
    let mut diags = DiagnosticBag::new();
    let mut types = TypeTable::new();
    let mut sem = SemanticTable::default();

    for (alias, ty) in &program.typedefs {
        sem.typedefs.insert(alias.to_string(), format!("{ty:?}"));
        types.define_typedef(*alias, ty.clone());
    }

    // Pass 1: declare every struct name so self-referential pointers and
    // forward references resolve (spec §4.1's two-pass rule).
    for s in &program.structs {
        types.declare_struct(s.name);
    }
    // Pass 2: complete every struct that has a body.
    for s in &program.structs {
        if s.fields.is_empty() {
            continue;
        }
        let resolved_fields: Vec<(Id, Type)> = s.fields.iter().map(|(n, t)| (*n, types.resolve_typedef(t))).collect();
        if let Err(e) = types.complete_struct(s.name, resolved_fields, s.span) {
            diags.push(e);
        }
    }

    let mut functions: Map<Id, FunctionSig> = Map::new();
    register_builtin(&mut functions, "putchar", vec![Type::Integer { width: IntWidth::W16, signed: true }], Type::Integer { width: IntWidth::W16, signed: true });
    register_builtin(&mut functions, "getchar", vec![], Type::Integer { width: IntWidth::W16, signed: true });

    for f in &program.functions {
        let params: Vec<Type> = f.params.iter().map(|p| types.resolve_typedef(&p.ty)).collect();
        let ret = types.resolve_typedef(&f.ret);
        functions.insert(f.name, FunctionSig { params, ret, variadic: false });
    }

    let mut globals: Map<Id, Type> = Map::new();
    for g in &program.globals {
        globals.insert(g.name, types.resolve_typedef(&g.ty));
        sem.entries.push(SemEntry { symbol_name: g.name.to_string(), ty: format!("{:?}", types.resolve_typedef(&g.ty)), scope_level: 0 });
    }

    let mut checker = Checker { types: &types, functions: &functions, globals: &globals, scopes: vec![Map::new()], diags: &mut diags, sem: &mut sem };

    for g in &mut program.globals {
        g.ty = checker.types.resolve_typedef(&g.ty);
        if let Some(init) = &mut g.init {
            checker.check_expr(init);
        }
    }

    for f in &mut program.functions {
        checker.check_function(f);
    }

    let typed = TypedProgram { ast: program, types, functions, globals, sem };
    (typed, diags)
}

fn register_builtin(functions: &mut Map<Id, FunctionSig>, name: &str, params: Vec<Type>, ret: Type) {
    functions.insert(internment::Intern::new(name.to_string()), FunctionSig { params, ret, variadic: false });
}

struct Checker<'a> {
    types: &'a TypeTable,
    functions: &'a Map<Id, FunctionSig>,
    globals: &'a Map<Id, Type>,
    scopes: Vec<Map<Id, Type>>,
    diags: &'a mut DiagnosticBag,
    sem: &'a mut SemanticTable,
}

impl<'a> Checker<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(Map::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_local(&mut self, name: Id, ty: Type) {
        self.sem.entries.push(SemEntry { symbol_name: name.to_string(), ty: format!("{ty:?}"), scope_level: self.scopes.len() });
        self.scopes.last_mut().unwrap().insert(name, ty);
    }

    fn lookup(&self, name: Id) -> Option<Type> {
        for scope in self.scopes.iter().rev() {
            if let Some(ty) = scope.get(&name) {
                return Some(ty.clone());
            }
        }
        self.globals.get(&name).cloned()
    }

    fn check_function(&mut self, f: &mut FunctionDecl) {
        self.push_scope();
        for p in &f.params {
            self.declare_local(p.name, self.types.resolve_typedef(&p.ty));
        }
        let ret = self.types.resolve_typedef(&f.ret);
        if let Some(body) = &mut f.body {
            for stmt in body {
                self.check_stmt(stmt, &ret);
            }
        }
        self.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &mut Stmt, ret_ty: &Type) {
        match stmt {
            Stmt::Expr(e) => self.check_expr(e),
            Stmt::Decl { name, ty, init, span } => {
                *ty = self.types.resolve_typedef(ty);
                if self.types.size_in_cells(ty).is_err() {
                    self.diags.push(Diagnostic::error(Code::IncompleteTypeByValue, *span, format!("variable '{name}' has incomplete type")));
                }
                if let Some(init) = init {
                    self.check_expr(init);
                    let init_ty = init.expr_type().clone();
                    if !self.types.is_assignable(&init_ty, ty) {
                        self.diags.push(Diagnostic::error(
                            Code::IncompatibleTypes,
                            init.span,
                            format!("cannot initialize '{name}' of type {ty:?} with value of type {init_ty:?}"),
                        ));
                    }
                }
                self.declare_local(*name, ty.clone());
            }
            Stmt::If { cond, then_branch, else_branch, span } => {
                self.check_expr(cond);
                self.require_scalar(cond, *span);
                self.push_scope();
                for s in then_branch {
                    self.check_stmt(s, ret_ty);
                }
                self.pop_scope();
                self.push_scope();
                for s in else_branch {
                    self.check_stmt(s, ret_ty);
                }
                self.pop_scope();
            }
            Stmt::While { cond, body, span } => {
                self.check_expr(cond);
                self.require_scalar(cond, *span);
                self.push_scope();
                for s in body {
                    self.check_stmt(s, ret_ty);
                }
                self.pop_scope();
            }
            Stmt::Switch { scrutinee, cases, default, span: _ } => {
                self.check_expr(scrutinee);
                self.push_scope();
                for (_, body) in cases {
                    for s in body {
                        self.check_stmt(s, ret_ty);
                    }
                }
                for s in default {
                    self.check_stmt(s, ret_ty);
                }
                self.pop_scope();
            }
            Stmt::Return(expr, span) => match expr {
                Some(e) => {
                    self.check_expr(e);
                    let got = e.expr_type().clone();
                    if !self.types.is_assignable(&got, ret_ty) {
                        self.diags.push(Diagnostic::error(Code::IncompatibleTypes, e.span, format!("return type mismatch: expected {ret_ty:?}, found {got:?}")));
                    }
                }
                None => {
                    if !matches!(ret_ty, Type::Void) {
                        self.diags.push(Diagnostic::error(Code::IncompatibleTypes, *span, "missing return value in non-void function"));
                    }
                }
            },
            Stmt::Compound(body) => {
                self.push_scope();
                for s in body {
                    self.check_stmt(s, ret_ty);
                }
                self.pop_scope();
            }
        }
    }

    fn require_scalar(&mut self, e: &Expr, span: Span) {
        if !e.expr_type().is_scalar() {
            self.diags.push(Diagnostic::error(Code::InvalidOperand, span, "expected a scalar (integer or pointer) expression"));
        }
    }

    fn check_expr(&mut self, e: &mut Expr) {
        let ty = self.infer(e);
        e.ty = Some(ty);
    }

    fn infer(&mut self, e: &mut Expr) -> Type {
        match &mut e.kind {
            ExprKind::IntLit(_) => Type::Integer { width: IntWidth::W16, signed: true },
            ExprKind::CharLit(_) => Type::Integer { width: IntWidth::W8, signed: true },
            ExprKind::StrLit(_) => {
                Type::Pointer { target: Box::new(Type::Integer { width: IntWidth::W8, signed: true }), region: Some(crate::region::RegionTag::Global) }
            }
            ExprKind::Var(name) => match self.lookup(*name) {
                Some(ty) => ty,
                None => {
                    self.diags.push(Diagnostic::error(Code::UndeclaredIdentifier, e.span, format!("undeclared identifier '{name}'")));
                    Type::Integer { width: IntWidth::W16, signed: true }
                }
            },
            ExprKind::Unary(op, operand) => self.infer_unary(*op, operand, e.span),
            ExprKind::Binary(op, lhs, rhs) => self.infer_binary(*op, lhs, rhs, e.span),
            ExprKind::LogAnd(lhs, rhs) | ExprKind::LogOr(lhs, rhs) => {
                self.check_expr(lhs);
                self.check_expr(rhs);
                Type::Integer { width: IntWidth::W16, signed: true }
            }
            ExprKind::Assign(lhs, rhs) => {
                self.check_expr(lhs);
                self.check_expr(rhs);
                if !is_lvalue(lhs) {
                    self.diags.push(Diagnostic::error(Code::NotAnLvalue, lhs.span, "left-hand side of assignment is not an lvalue"));
                }
                let lhs_ty = lhs.expr_type().clone();
                let rhs_ty = rhs.expr_type().clone();
                if !self.types.is_assignable(&rhs_ty, &lhs_ty) {
                    self.diags.push(Diagnostic::error(Code::IncompatibleTypes, e.span, format!("cannot assign {rhs_ty:?} to {lhs_ty:?}")));
                }
                lhs_ty
            }
            ExprKind::Index(base, index) => {
                self.check_expr(base);
                self.check_expr(index);
                let base_ty = self.types.pointer_decay(base.expr_type());
                match base_ty.pointee() {
                    Some(elem) => elem.clone(),
                    None => {
                        self.diags.push(Diagnostic::error(Code::InvalidOperand, base.span, "indexed expression is not an array or pointer"));
                        Type::Integer { width: IntWidth::W16, signed: true }
                    }
                }
            }
            ExprKind::Member { base, field, arrow } => {
                self.check_expr(base);
                let base_ty = base.expr_type().clone();
                let struct_name = if *arrow {
                    match base_ty.pointee() {
                        Some(Type::Struct(name)) => Some(*name),
                        _ => None,
                    }
                } else {
                    match &base_ty {
                        Type::Struct(name) => Some(*name),
                        _ => None,
                    }
                };
                match struct_name.and_then(|s| self.types.field_type(s, *field)) {
                    Some(ty) => ty,
                    None => {
                        self.diags.push(Diagnostic::error(Code::InvalidOperand, e.span, format!("no field '{field}' on this expression's type")));
                        Type::Integer { width: IntWidth::W16, signed: true }
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                for a in args.iter_mut() {
                    self.check_expr(a);
                }
                match self.functions.get(callee).cloned() {
                    Some(sig) => {
                        if args.len() != sig.params.len() {
                            self.diags.push(Diagnostic::error(
                                Code::TooManyArguments,
                                e.span,
                                format!("'{callee}' expects {} argument(s), found {}", sig.params.len(), args.len()),
                            ));
                        }
                        sig.ret
                    }
                    None => {
                        self.diags.push(Diagnostic::error(Code::UndeclaredIdentifier, e.span, format!("call to undeclared function '{callee}'")));
                        Type::Integer { width: IntWidth::W16, signed: true }
                    }
                }
            }
            ExprKind::Cast { ty, expr } => {
                self.check_expr(expr);
                *ty = self.types.resolve_typedef(ty);
                ty.clone()
            }
        }
    }

    fn infer_unary(&mut self, op: UnOp, operand: &mut Expr, span: Span) -> Type {
        self.check_expr(operand);
        let operand_ty = operand.expr_type().clone();
        match op {
            UnOp::Neg | UnOp::BitNot => {
                if !operand_ty.is_integer() {
                    self.diags.push(Diagnostic::error(Code::InvalidOperand, span, "operand must be an integer"));
                }
                self.types.integer_promote(&operand_ty)
            }
            UnOp::Not => Type::Integer { width: IntWidth::W16, signed: true },
            UnOp::Addr => {
                if !is_lvalue(operand) {
                    self.diags.push(Diagnostic::error(Code::NotAnLvalue, span, "cannot take the address of a non-lvalue"));
                }
                Type::Pointer { target: Box::new(operand_ty), region: None }
            }
            UnOp::Deref => match operand_ty.pointee() {
                Some(inner) => inner.clone(),
                None => {
                    self.diags.push(Diagnostic::error(Code::InvalidOperand, span, "cannot dereference a non-pointer"));
                    Type::Integer { width: IntWidth::W16, signed: true }
                }
            },
        }
    }

    fn infer_binary(&mut self, op: BinOp, lhs: &mut Expr, rhs: &mut Expr, span: Span) -> Type {
        self.check_expr(lhs);
        self.check_expr(rhs);
        let lhs_ty = self.types.pointer_decay(lhs.expr_type());
        let rhs_ty = self.types.pointer_decay(rhs.expr_type());

        match op {
            BinOp::Add | BinOp::Sub => match (lhs_ty.is_pointer(), rhs_ty.is_pointer()) {
                (true, true) => {
                    if op == BinOp::Sub {
                        if lhs_ty.pointee() != rhs_ty.pointee() {
                            self.diags.push(Diagnostic::error(Code::PointerDiffUnrelatedTypes, span, "pointer difference between unrelated pointee types"));
                        }
                        Type::Integer { width: IntWidth::W16, signed: true }
                    } else {
                        self.diags.push(Diagnostic::error(Code::InvalidOperand, span, "cannot add two pointers"));
                        lhs_ty
                    }
                }
                (true, false) => lhs_ty,
                (false, true) if op == BinOp::Add => rhs_ty,
                (false, true) => {
                    self.diags.push(Diagnostic::error(Code::InvalidOperand, span, "cannot subtract a pointer from an integer"));
                    rhs_ty
                }
                (false, false) => self.promote_both(&lhs_ty, &rhs_ty),
            },
            BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
                if !lhs_ty.is_integer() || !rhs_ty.is_integer() {
                    self.diags.push(Diagnostic::error(Code::InvalidOperand, span, "operands must both be integers"));
                }
                self.promote_both(&lhs_ty, &rhs_ty)
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                if lhs_ty.is_pointer() != rhs_ty.is_pointer() {
                    self.diags.push(Diagnostic::error(Code::InvalidOperand, span, "cannot compare a pointer with an integer"));
                }
                Type::Integer { width: IntWidth::W16, signed: true }
            }
        }
    }

    fn promote_both(&self, a: &Type, b: &Type) -> Type {
        let a = self.types.integer_promote(a);
        let b = self.types.integer_promote(b);
        match (&a, &b) {
            (Type::Integer { width: IntWidth::W32, .. }, _) | (_, Type::Integer { width: IntWidth::W32, .. }) => {
                Type::Integer { width: IntWidth::W32, signed: true }
            }
            _ => a,
        }
    }
}

fn is_lvalue(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::Var(_) | ExprKind::Index(_, _) | ExprKind::Member { .. } | ExprKind::Unary(UnOp::Deref, _))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;

    fn typecheck_ok(src: &str) -> TypedProgram {
        let ast = parse(src).expect("parse should succeed");
        let (typed, diags) = typecheck(ast);
        assert!(!diags.has_errors(), "unexpected diagnostics: {:?}", diags.into_vec());
        typed
    }

    #[test]
    fn struct_field_types_resolve() {
        let typed = typecheck_ok("struct Point { int x; int y; }; int main() { struct Point p; p.x = 10; return p.x; }");
        assert!(typed.types.struct_def(internment::Intern::new("Point".to_string())).unwrap().is_complete());
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let ast = parse("int main() { return y; }").unwrap();
        let (_, diags) = typecheck(ast);
        assert!(diags.has_errors());
    }

    #[test]
    fn pointer_plus_int_keeps_pointer_type() {
        let typed = typecheck_ok("int main() { int *p; int x; p = &x; return *(p + 1); }");
        let main = typed.ast.functions.iter().find(|f| f.name.to_string() == "main").unwrap();
        // the assignment expression's rhs (`&x`) should be pointer-typed
        if let Stmt::Expr(e) = &main.body.as_ref().unwrap()[2] {
            if let ExprKind::Assign(_, rhs) = &e.kind {
                assert!(rhs.expr_type().is_pointer());
            }
        }
    }
}
