//! Component B: lowers a type-checked AST to the typed IR (spec §4.2).
//!
//! Locals use a straightforward `Alloca`+`Load`+`Store` strategy (an
//! `-O0`-shaped simplification; `crate::middle::opt` cleans up the
//! redundant loads/stores it creates at `-O1`). Array and struct access
//! always goes through `Gep`, never a bare pointer `BinOp` (spec §4.2's
//! GEP-exclusivity rule).
//!
//! Provenance is conservative by default (spec §3.3: a load's result is
//! `Unknown` unless something more specific is known). For the common
//! case of a simple, non-aliased local pointer variable, this builder
//! additionally tracks `local_regions`, a flow-sensitive map from
//! variable to its currently-known provenance, joined across `if`/`else`
//! branches and widened across loops. This is the per-function "side
//! table" the specification's second open question anticipates for
//! exactly this case; reads through arrays, struct fields, or another
//! pointer still default to `Unknown`, as do unannotated parameters.
//! Rejecting a dereference of `Unknown`/`Mixed` provenance is not this
//! module's job — it belongs to `crate::back::gep`, which consults the
//! `ProvenanceTable` this builder produces.

use crate::common::{Id, Map, Set, Span};
use crate::config::CompilerConfig;
use crate::diag::{Code, Diagnostic, DiagnosticBag};
use crate::front::ast::{self, BinOp as AstBinOp, ExprKind, UnOp};
use crate::front::typeck::TypedProgram;
use crate::region::RegionTag;
use crate::types::{IntWidth, Type, TypeTable};

use super::ir::{BlockId, CmpOp, Function, GepIndex, Global, GlobalInit, Instruction, IrBinOp, Module, TempId, Terminator, Value};
use super::provenance::{Provenance, ProvenanceTable};

/// Lower every function and global in `typed` to IR. Diagnostics raised
/// here are internal-error-shaped (a well-typed program should never
/// trigger one); they exist so a bug in this pass fails loudly instead
/// of producing silently wrong IR.
pub fn build_module(typed: &TypedProgram, config: &CompilerConfig) -> (Module, DiagnosticBag) {
    let mut module = Module::new();
    let mut diags = DiagnosticBag::new();
    let mut string_literals: Map<Vec<u8>, Id> = Map::new();

    for g in &typed.ast.globals {
        let ty = typed.types.resolve_typedef(&g.ty);
        let init = match &g.init {
            None => GlobalInit::Zero,
            Some(e) => match &e.kind {
                ExprKind::IntLit(n) => GlobalInit::Int(*n),
                ExprKind::CharLit(b) => GlobalInit::Int(*b as i64),
                _ => {
                    diags.push(Diagnostic::error(
                        Code::InvalidOperand,
                        e.span,
                        format!("global '{}' initializer must be a constant expression", g.name),
                    ));
                    GlobalInit::Zero
                }
            },
        };
        module.globals.push(Global { name: g.name, ty, init });
    }

    for f in &typed.ast.functions {
        let Some(body) = &f.body else { continue };
        let mut fb = FnBuilder {
            types: &typed.types,
            globals: &typed.globals,
            config,
            diags: &mut diags,
            string_literals: &mut string_literals,
            module_globals: &mut module.globals,
            locals: Map::new(),
            local_regions: Map::new(),
            provenance: ProvenanceTable::new(),
            func: Function {
                name: f.name,
                params: Vec::new(),
                ret: typed.types.resolve_typedef(&f.ret),
                entry: BlockId(0),
                temps: Vec::new(),
                blocks: Vec::new(),
                span: f.span,
            },
            current: BlockId(0),
            terminated: false,
        };

        let entry = fb.func.new_block();
        fb.func.entry = entry;
        fb.current = entry;

        fb.bind_params(&f.params);
        for stmt in body {
            fb.build_stmt(stmt);
        }
        fb.finish();

        module.provenance.insert(f.name, fb.provenance);
        module.functions.push(fb.func);
    }

    (module, diags)
}

struct FnBuilder<'a> {
    types: &'a TypeTable,
    globals: &'a Map<Id, Type>,
    config: &'a CompilerConfig,
    diags: &'a mut DiagnosticBag,
    string_literals: &'a mut Map<Vec<u8>, Id>,
    module_globals: &'a mut Vec<Global>,
    /// Variable name -> (address temp, declared type).
    locals: Map<Id, (TempId, Type)>,
    /// Variable name -> currently-known provenance, for pointer locals
    /// only; see this module's doc comment.
    local_regions: Map<Id, Provenance>,
    provenance: ProvenanceTable,
    func: Function,
    current: BlockId,
    terminated: bool,
}

impl<'a> FnBuilder<'a> {
    fn new_temp(&mut self, ty: Type) -> TempId {
        self.func.new_temp(ty)
    }

    fn new_block(&mut self) -> BlockId {
        self.func.new_block()
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block;
        self.terminated = false;
    }

    fn emit(&mut self, insn: Instruction) {
        if !self.terminated {
            self.func.block_mut(self.current).insns.push(insn);
        }
    }

    fn terminate(&mut self, term: Terminator) {
        if !self.terminated {
            self.func.block_mut(self.current).term = Some(term);
            self.terminated = true;
        }
    }

    fn finish(&mut self) {
        self.terminate(Terminator::Ret(None));
    }

    fn provenance_of_value(&self, v: Value) -> Option<&Provenance> {
        match v {
            Value::Temp(t) => self.provenance.get(t),
            Value::Const(_) => None,
        }
    }

    fn intern_string_literal(&mut self, content: Id) -> Id {
        let bytes = content.as_bytes().to_vec();
        if let Some(existing) = self.string_literals.get(&bytes) {
            return *existing;
        }
        let label = internment::Intern::new(format!(".L.str.{}", self.string_literals.len()));
        self.string_literals.insert(bytes.clone(), label);
        let length = bytes.len() + 1; // NUL terminator
        self.module_globals.push(Global {
            name: label,
            ty: Type::Array { element: Box::new(Type::Integer { width: IntWidth::W8, signed: true }), length },
            init: GlobalInit::StringBytes(bytes),
        });
        label
    }

    fn bind_params(&mut self, params: &[ast::Param]) {
        let span = self.func.span;
        for p in params {
            let ty = self.types.resolve_typedef(&p.ty);
            let addr = self.new_temp(Type::pointer_to(ty.clone()));
            self.emit(Instruction::Alloca { dst: addr, ty: ty.clone() });
            self.provenance.set(addr, RegionTag::Stack, span);

            let val = self.new_temp(ty.clone());
            self.func.params.push(val);
            if ty.is_pointer() {
                match self.config.assume_pointer_params {
                    Some(region) => {
                        self.provenance.set(val, region, span);
                        self.diags.push(
                            Diagnostic::warning(
                                Code::DerefWithNoRegion,
                                span,
                                format!("provenance of parameter '{}' assumed to be {region} via --assume-pointer-params", p.name),
                            )
                            .with_help("pointer parameters otherwise default to Unknown provenance"),
                        );
                    }
                    None => self.provenance.set(val, RegionTag::Unknown, span),
                }
                let rec = self.provenance.get(val).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, span));
                self.local_regions.insert(p.name, rec);
            }

            self.emit(Instruction::Store { ptr: Value::Temp(addr), value: Value::Temp(val), ty: ty.clone(), span });
            self.locals.insert(p.name, (addr, ty));
        }
    }

    fn build_stmt(&mut self, stmt: &ast::Stmt) {
        if self.terminated {
            return;
        }
        match stmt {
            ast::Stmt::Expr(e) => {
                self.build_rvalue(e);
            }
            ast::Stmt::Decl { name, ty, init, span } => {
                let resolved = self.types.resolve_typedef(ty);
                let addr = self.new_temp(Type::pointer_to(resolved.clone()));
                self.emit(Instruction::Alloca { dst: addr, ty: resolved.clone() });
                self.provenance.set(addr, RegionTag::Stack, *span);
                self.locals.insert(*name, (addr, resolved.clone()));

                if let Some(init) = init {
                    let (val, _) = self.build_rvalue(init);
                    self.emit(Instruction::Store { ptr: Value::Temp(addr), value: val, ty: resolved.clone(), span: *span });
                    if resolved.is_pointer() {
                        let rec = self.provenance_of_value(val).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, *span));
                        self.local_regions.insert(*name, rec);
                    }
                } else if resolved.is_pointer() {
                    self.local_regions.insert(*name, Provenance::new(RegionTag::Unknown, *span));
                }
            }
            ast::Stmt::If { cond, then_branch, else_branch, span: _ } => {
                let (cond_val, _) = self.build_rvalue(cond);
                let then_bb = self.new_block();
                let else_bb = self.new_block();
                let join_bb = self.new_block();
                self.terminate(Terminator::CondBr { cond: cond_val, then_bb, else_bb });

                let before = self.local_regions.clone();

                self.switch_to(then_bb);
                for s in then_branch {
                    self.build_stmt(s);
                }
                let then_dead = self.terminated;
                if !self.terminated {
                    self.terminate(Terminator::Br(join_bb));
                }
                let after_then = self.local_regions.clone();

                self.local_regions = before.clone();
                self.switch_to(else_bb);
                for s in else_branch {
                    self.build_stmt(s);
                }
                let else_dead = self.terminated;
                if !self.terminated {
                    self.terminate(Terminator::Br(join_bb));
                }
                let after_else = self.local_regions.clone();

                self.local_regions = merge_regions(&before, &after_then, then_dead, &after_else, else_dead);
                self.switch_to(join_bb);
            }
            ast::Stmt::While { cond, body, span: _ } => {
                let cond_bb = self.new_block();
                let body_bb = self.new_block();
                let after_bb = self.new_block();
                self.terminate(Terminator::Br(cond_bb));

                self.switch_to(cond_bb);
                let (cond_val, _) = self.build_rvalue(cond);
                self.terminate(Terminator::CondBr { cond: cond_val, then_bb: body_bb, else_bb: after_bb });

                let before = self.local_regions.clone();
                self.switch_to(body_bb);
                for s in body {
                    self.build_stmt(s);
                }
                if !self.terminated {
                    self.terminate(Terminator::Br(cond_bb));
                }
                // Conservative widening: a local's provenance entering the
                // loop header must already account for whatever the body
                // does to it, since the body may run any number of times.
                let after_body = self.local_regions.clone();
                self.local_regions = merge_regions(&before, &before, false, &after_body, false);

                self.switch_to(after_bb);
            }
            ast::Stmt::Switch { scrutinee, cases, default, span: _ } => {
                let (scrut_val, _) = self.build_rvalue(scrutinee);
                let after_bb = self.new_block();
                let before = self.local_regions.clone();
                let mut merged = before.clone();
                let mut dispatch_bb = self.current;

                for (value, body) in cases {
                    let case_bb = self.new_block();
                    let next_bb = self.new_block();
                    self.switch_to(dispatch_bb);
                    let cmp_ty = Type::Integer { width: IntWidth::W16, signed: true };
                    let cmp_dst = self.new_temp(cmp_ty);
                    self.emit(Instruction::Cmp { dst: cmp_dst, op: CmpOp::Eq, lhs: scrut_val, rhs: Value::Const(*value) });
                    self.terminate(Terminator::CondBr { cond: Value::Temp(cmp_dst), then_bb: case_bb, else_bb: next_bb });

                    self.local_regions = before.clone();
                    self.switch_to(case_bb);
                    for s in body {
                        self.build_stmt(s);
                    }
                    let case_dead = self.terminated;
                    if !self.terminated {
                        self.terminate(Terminator::Br(after_bb));
                    }
                    merged = merge_regions(&before, &merged, false, &self.local_regions, case_dead);
                    dispatch_bb = next_bb;
                }

                self.switch_to(dispatch_bb);
                self.local_regions = before.clone();
                for s in default {
                    self.build_stmt(s);
                }
                let default_dead = self.terminated;
                if !self.terminated {
                    self.terminate(Terminator::Br(after_bb));
                }
                merged = merge_regions(&before, &merged, false, &self.local_regions, default_dead);

                self.local_regions = merged;
                self.switch_to(after_bb);
            }
            ast::Stmt::Return(expr, _span) => {
                let val = expr.as_ref().map(|e| self.build_rvalue(e).0);
                self.terminate(Terminator::Ret(val));
            }
            ast::Stmt::Compound(body) => {
                for s in body {
                    self.build_stmt(s);
                }
            }
        }
    }

    /// Evaluate `e` for its address: the pointer value that would be
    /// stored to or taken with `&`. Only valid for the lvalue forms
    /// `is_lvalue` in `front::typeck` accepts; typeck has already
    /// rejected anything else by the time this runs.
    fn build_lvalue(&mut self, e: &ast::Expr) -> (Value, Type) {
        match &e.kind {
            ExprKind::Var(name) => {
                if let Some((addr, ty)) = self.locals.get(name).cloned() {
                    (Value::Temp(addr), ty)
                } else if let Some(ty) = self.globals.get(name).cloned() {
                    let resolved = self.types.resolve_typedef(&ty);
                    let dst = self.new_temp(Type::pointer_to(resolved.clone()));
                    self.emit(Instruction::AddrOfGlobal { dst, name: *name });
                    self.provenance.set(dst, RegionTag::Global, e.span);
                    (Value::Temp(dst), resolved)
                } else {
                    (Value::Const(0), e.expr_type().clone())
                }
            }
            ExprKind::Index(base, index) => self.build_index_address(base, index, e.span),
            ExprKind::Member { base, field, arrow } => self.build_member_address(base, *field, *arrow, e.span),
            ExprKind::Unary(UnOp::Deref, inner) => self.build_rvalue(inner),
            _ => (Value::Const(0), e.expr_type().clone()),
        }
    }

    /// Load through a pointer whose pointee is already known, without
    /// any more specific provenance than "came from memory": arrays and
    /// struct fields keep `Unknown` per spec §3.3's default rule (the
    /// `local_regions` side table only tracks simple scalar locals).
    fn load_through(&mut self, ptr: Value, ty: Type, span: Span) -> (Value, Type) {
        let dst = self.new_temp(ty.clone());
        self.emit(Instruction::Load { dst, ptr, ty: ty.clone(), span });
        if ty.is_pointer() {
            self.provenance.set(dst, RegionTag::Unknown, span);
        }
        (Value::Temp(dst), ty)
    }

    fn build_index_address(&mut self, base: &ast::Expr, index: &ast::Expr, span: Span) -> (Value, Type) {
        let (base_val, base_ty) = self.build_rvalue(base);
        let elem_ty = base_ty.pointee().cloned().unwrap_or(Type::Void);
        let (index_val, _) = self.build_rvalue(index);
        let elem_size = self.types.size_in_cells(&elem_ty).unwrap_or(1) as i64;

        let dst = self.new_temp(Type::pointer_to(elem_ty.clone()));
        self.emit(Instruction::Gep {
            dst,
            base: base_val,
            indices: vec![GepIndex::Element { index: index_val, elem_size_cells: elem_size }],
            result_ty: elem_ty.clone(),
        });
        let rec = self.provenance_of_value(base_val).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, span));
        self.provenance.set_record(dst, rec);
        (Value::Temp(dst), elem_ty)
    }

    fn build_member_address(&mut self, base: &ast::Expr, field: Id, arrow: bool, span: Span) -> (Value, Type) {
        let (base_ptr, struct_name) = if arrow {
            let (val, ty) = self.build_rvalue(base);
            let name = match ty.pointee() {
                Some(Type::Struct(n)) => *n,
                _ => internment::Intern::new(String::new()),
            };
            (val, name)
        } else {
            let (val, ty) = self.build_lvalue(base);
            let name = match ty {
                Type::Struct(n) => n,
                _ => internment::Intern::new(String::new()),
            };
            (val, name)
        };

        let offset = self.types.field_offset(struct_name, field).unwrap_or(0) as i64;
        let field_ty = self.types.field_type(struct_name, field).unwrap_or(Type::Void);

        let dst = self.new_temp(Type::pointer_to(field_ty.clone()));
        self.emit(Instruction::Gep { dst, base: base_ptr, indices: vec![GepIndex::Field { offset_cells: offset }], result_ty: field_ty.clone() });
        let rec = self.provenance_of_value(base_ptr).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, span));
        self.provenance.set_record(dst, rec);
        (Value::Temp(dst), field_ty)
    }

    fn build_rvalue(&mut self, e: &ast::Expr) -> (Value, Type) {
        match &e.kind {
            ExprKind::IntLit(n) => (Value::Const(*n), e.expr_type().clone()),
            ExprKind::CharLit(b) => (Value::Const(*b as i64), e.expr_type().clone()),
            ExprKind::StrLit(content) => {
                let label = self.intern_string_literal(*content);
                let dst = self.new_temp(e.expr_type().clone());
                self.emit(Instruction::AddrOfGlobal { dst, name: label });
                self.provenance.set(dst, RegionTag::Global, e.span);
                (Value::Temp(dst), e.expr_type().clone())
            }
            ExprKind::Var(name) => {
                if let Some((addr, ty)) = self.locals.get(name).cloned() {
                    match self.types.resolve_typedef(&ty) {
                        Type::Array { element, .. } => {
                            let decayed = Type::pointer_to(*element);
                            let dst = self.new_temp(decayed.clone());
                            self.emit(Instruction::Gep { dst, base: Value::Temp(addr), indices: vec![], result_ty: decayed.pointee().cloned().unwrap() });
                            let rec = self.provenance.get(addr).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Stack, e.span));
                            self.provenance.set_record(dst, rec);
                            (Value::Temp(dst), decayed)
                        }
                        _ => {
                            let dst = self.new_temp(ty.clone());
                            self.emit(Instruction::Load { dst, ptr: Value::Temp(addr), ty: ty.clone(), span: e.span });
                            if ty.is_pointer() {
                                let rec = self.local_regions.get(name).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, e.span));
                                self.provenance.set_record(dst, rec);
                            }
                            (Value::Temp(dst), ty)
                        }
                    }
                } else if let Some(ty) = self.globals.get(name).cloned() {
                    let resolved = self.types.resolve_typedef(&ty);
                    let addr_dst = self.new_temp(Type::pointer_to(resolved.clone()));
                    self.emit(Instruction::AddrOfGlobal { dst: addr_dst, name: *name });
                    self.provenance.set(addr_dst, RegionTag::Global, e.span);
                    match resolved {
                        Type::Array { element, .. } => (Value::Temp(addr_dst), Type::pointer_to(*element)),
                        _ => self.load_through(Value::Temp(addr_dst), resolved, e.span),
                    }
                } else {
                    (Value::Const(0), e.expr_type().clone())
                }
            }
            ExprKind::Unary(op, operand) => self.build_unary(*op, operand, e.span, e.expr_type()),
            ExprKind::Binary(op, lhs, rhs) => self.build_binary(*op, lhs, rhs, e.span),
            ExprKind::LogAnd(lhs, rhs) => self.build_logical(lhs, rhs, true),
            ExprKind::LogOr(lhs, rhs) => self.build_logical(lhs, rhs, false),
            ExprKind::Assign(lhs, rhs) => self.build_assign(lhs, rhs),
            ExprKind::Index(base, index) => {
                let (ptr, elem_ty) = self.build_index_address(base, index, e.span);
                self.load_through(ptr, elem_ty, e.span)
            }
            ExprKind::Member { base, field, arrow } => {
                let (ptr, field_ty) = self.build_member_address(base, *field, *arrow, e.span);
                self.load_through(ptr, field_ty, e.span)
            }
            ExprKind::Call { callee, args } => self.build_call(*callee, args, e.span, e.expr_type()),
            ExprKind::Cast { ty, expr } => self.build_cast(ty, expr, e.span),
        }
    }

    fn build_unary(&mut self, op: UnOp, operand: &ast::Expr, span: Span, result_ty: &Type) -> (Value, Type) {
        match op {
            UnOp::Addr => {
                let (addr, pointee_ty) = self.build_lvalue(operand);
                (addr, Type::pointer_to(pointee_ty))
            }
            UnOp::Deref => {
                let (ptr_val, ptr_ty) = self.build_rvalue(operand);
                let pointee = ptr_ty.pointee().cloned().unwrap_or(Type::Void);
                self.load_through(ptr_val, pointee, span)
            }
            UnOp::Neg => {
                let (v, _) = self.build_rvalue(operand);
                let dst = self.new_temp(result_ty.clone());
                self.emit(Instruction::BinOp { dst, op: IrBinOp::Sub, lhs: Value::Const(0), rhs: v, ty: result_ty.clone() });
                (Value::Temp(dst), result_ty.clone())
            }
            UnOp::BitNot => {
                let (v, _) = self.build_rvalue(operand);
                let dst = self.new_temp(result_ty.clone());
                self.emit(Instruction::BinOp { dst, op: IrBinOp::BitXor, lhs: v, rhs: Value::Const(-1), ty: result_ty.clone() });
                (Value::Temp(dst), result_ty.clone())
            }
            UnOp::Not => {
                let (v, _) = self.build_rvalue(operand);
                let dst = self.new_temp(result_ty.clone());
                self.emit(Instruction::Cmp { dst, op: CmpOp::Eq, lhs: v, rhs: Value::Const(0) });
                (Value::Temp(dst), result_ty.clone())
            }
        }
    }

    fn negate(&mut self, v: Value) -> Value {
        match v {
            Value::Const(n) => Value::Const(-n),
            Value::Temp(_) => {
                let ty = Type::Integer { width: IntWidth::W16, signed: true };
                let dst = self.new_temp(ty.clone());
                self.emit(Instruction::BinOp { dst, op: IrBinOp::Sub, lhs: Value::Const(0), rhs: v, ty });
                Value::Temp(dst)
            }
        }
    }

    fn promote(&self, a: &Type, b: &Type) -> Type {
        let a = self.types.integer_promote(a);
        let b = self.types.integer_promote(b);
        match (&a, &b) {
            (Type::Integer { width: IntWidth::W32, .. }, _) | (_, Type::Integer { width: IntWidth::W32, .. }) => {
                Type::Integer { width: IntWidth::W32, signed: true }
            }
            _ => a,
        }
    }

    fn build_binary(&mut self, op: AstBinOp, lhs: &ast::Expr, rhs: &ast::Expr, span: Span) -> (Value, Type) {
        let (lhs_val, lhs_ty) = self.build_rvalue(lhs);
        let (rhs_val, rhs_ty) = self.build_rvalue(rhs);

        match op {
            AstBinOp::Add | AstBinOp::Sub => match (lhs_ty.is_pointer(), rhs_ty.is_pointer()) {
                (true, true) => {
                    let result_ty = Type::Integer { width: IntWidth::W16, signed: true };
                    let dst = self.new_temp(result_ty.clone());
                    self.emit(Instruction::PtrSub { dst, lhs: lhs_val, rhs: rhs_val });
                    (Value::Temp(dst), result_ty)
                }
                (true, false) => {
                    let offset = if op == AstBinOp::Sub { self.negate(rhs_val) } else { rhs_val };
                    let dst = self.new_temp(lhs_ty.clone());
                    self.emit(Instruction::PtrAdd { dst, ptr: lhs_val, offset });
                    let rec = self.provenance_of_value(lhs_val).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, span));
                    self.provenance.set_record(dst, rec);
                    (Value::Temp(dst), lhs_ty)
                }
                (false, true) => {
                    let dst = self.new_temp(rhs_ty.clone());
                    self.emit(Instruction::PtrAdd { dst, ptr: rhs_val, offset: lhs_val });
                    let rec = self.provenance_of_value(rhs_val).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, span));
                    self.provenance.set_record(dst, rec);
                    (Value::Temp(dst), rhs_ty)
                }
                (false, false) => {
                    let ty = self.promote(&lhs_ty, &rhs_ty);
                    let dst = self.new_temp(ty.clone());
                    let irop = if op == AstBinOp::Add { IrBinOp::Add } else { IrBinOp::Sub };
                    self.emit(Instruction::BinOp { dst, op: irop, lhs: lhs_val, rhs: rhs_val, ty: ty.clone() });
                    (Value::Temp(dst), ty)
                }
            },
            AstBinOp::Mul | AstBinOp::Div | AstBinOp::Mod | AstBinOp::BitAnd | AstBinOp::BitOr | AstBinOp::BitXor | AstBinOp::Shl | AstBinOp::Shr => {
                let ty = self.promote(&lhs_ty, &rhs_ty);
                let irop = match op {
                    AstBinOp::Mul => IrBinOp::Mul,
                    AstBinOp::Div => IrBinOp::Div,
                    AstBinOp::Mod => IrBinOp::Mod,
                    AstBinOp::BitAnd => IrBinOp::BitAnd,
                    AstBinOp::BitOr => IrBinOp::BitOr,
                    AstBinOp::BitXor => IrBinOp::BitXor,
                    AstBinOp::Shl => IrBinOp::Shl,
                    AstBinOp::Shr => IrBinOp::Shr,
                    _ => unreachable!(),
                };
                let dst = self.new_temp(ty.clone());
                self.emit(Instruction::BinOp { dst, op: irop, lhs: lhs_val, rhs: rhs_val, ty: ty.clone() });
                (Value::Temp(dst), ty)
            }
            AstBinOp::Lt | AstBinOp::Le | AstBinOp::Gt | AstBinOp::Ge | AstBinOp::Eq | AstBinOp::Ne => {
                let result_ty = Type::Integer { width: IntWidth::W16, signed: true };
                let cmp = match op {
                    AstBinOp::Lt => CmpOp::Lt,
                    AstBinOp::Le => CmpOp::Le,
                    AstBinOp::Gt => CmpOp::Gt,
                    AstBinOp::Ge => CmpOp::Ge,
                    AstBinOp::Eq => CmpOp::Eq,
                    AstBinOp::Ne => CmpOp::Ne,
                    _ => unreachable!(),
                };
                let dst = self.new_temp(result_ty.clone());
                if lhs_ty.is_pointer() {
                    self.emit(Instruction::PtrCmp { dst, op: cmp, lhs: lhs_val, rhs: rhs_val });
                } else {
                    self.emit(Instruction::Cmp { dst, op: cmp, lhs: lhs_val, rhs: rhs_val });
                }
                (Value::Temp(dst), result_ty)
            }
        }
    }

    /// Short-circuit `&&`/`||`, lowered to a CFG join rather than a plain
    /// `BinOp` (spec §4.2): `is_and` selects which side short-circuits on
    /// which outcome.
    fn build_logical(&mut self, lhs: &ast::Expr, rhs: &ast::Expr, is_and: bool) -> (Value, Type) {
        let (lhs_val, _) = self.build_rvalue(lhs);
        let lhs_block = self.current;
        let rhs_bb = self.new_block();
        let join_bb = self.new_block();

        if is_and {
            self.terminate(Terminator::CondBr { cond: lhs_val, then_bb: rhs_bb, else_bb: join_bb });
        } else {
            self.terminate(Terminator::CondBr { cond: lhs_val, then_bb: join_bb, else_bb: rhs_bb });
        }

        self.switch_to(rhs_bb);
        let (rhs_val, _) = self.build_rvalue(rhs);
        let rhs_end_block = self.current;
        self.terminate(Terminator::Br(join_bb));

        self.switch_to(join_bb);
        let result_ty = Type::Integer { width: IntWidth::W16, signed: true };
        let dst = self.new_temp(result_ty.clone());
        let short_circuit_value = if is_and { Value::Const(0) } else { Value::Const(1) };
        self.emit(Instruction::Phi { dst, incoming: vec![(lhs_block, short_circuit_value), (rhs_end_block, rhs_val)] });
        (Value::Temp(dst), result_ty)
    }

    fn build_assign(&mut self, lhs: &ast::Expr, rhs: &ast::Expr) -> (Value, Type) {
        let (addr, ty) = self.build_lvalue(lhs);
        let (val, _) = self.build_rvalue(rhs);
        self.emit(Instruction::Store { ptr: addr, value: val, ty: ty.clone(), span: lhs.span });
        if ty.is_pointer() {
            if let ExprKind::Var(name) = &lhs.kind {
                let rec = self.provenance_of_value(val).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, lhs.span));
                self.local_regions.insert(*name, rec);
            }
        }
        (val, ty)
    }

    fn build_call(&mut self, callee: Id, args: &[ast::Expr], span: Span, ret_ty: &Type) -> (Value, Type) {
        let arg_vals: Vec<Value> = args.iter().map(|a| self.build_rvalue(a).0).collect();
        if matches!(ret_ty, Type::Void) {
            self.emit(Instruction::Call { dst: None, callee, args: arg_vals });
            (Value::Const(0), Type::Void)
        } else {
            let dst = self.new_temp(ret_ty.clone());
            self.emit(Instruction::Call { dst: Some(dst), callee, args: arg_vals });
            if ret_ty.is_pointer() {
                self.provenance.set(dst, RegionTag::Unknown, span);
            }
            (Value::Temp(dst), ret_ty.clone())
        }
    }

    fn build_cast(&mut self, ty: &Type, expr: &ast::Expr, span: Span) -> (Value, Type) {
        let (val, from_ty) = self.build_rvalue(expr);
        let resolved = self.types.resolve_typedef(ty);
        if resolved == from_ty {
            return (val, resolved);
        }
        let dst = self.new_temp(resolved.clone());
        self.emit(Instruction::Cast { dst, value: val, to: resolved.clone() });
        if resolved.is_pointer() {
            let region = if from_ty.is_pointer() {
                self.provenance_of_value(val).map(|p| p.region).unwrap_or(RegionTag::Unknown)
            } else {
                RegionTag::Unknown
            };
            self.provenance.set(dst, region, span);
        }
        (Value::Temp(dst), resolved)
    }
}

/// Join `local_regions` across two branches of a conditional. A branch
/// that never reaches the join point (it returned) contributes nothing;
/// if both do, a variable present on only one side falls back to its
/// pre-branch provenance before joining, since the other side left it
/// unchanged.
fn merge_regions(before: &Map<Id, Provenance>, a: &Map<Id, Provenance>, a_dead: bool, b: &Map<Id, Provenance>, b_dead: bool) -> Map<Id, Provenance> {
    if a_dead && b_dead {
        return before.clone();
    }
    if a_dead {
        return b.clone();
    }
    if b_dead {
        return a.clone();
    }

    let mut names: Set<Id> = Set::new();
    names.extend(a.keys().copied());
    names.extend(b.keys().copied());

    let mut out = Map::new();
    for name in names {
        let pa = a.get(&name).or_else(|| before.get(&name)).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, Span::synthetic()));
        let pb = b.get(&name).or_else(|| before.get(&name)).cloned().unwrap_or_else(|| Provenance::new(RegionTag::Unknown, Span::synthetic()));
        let region = pa.region.join(pb.region);
        let mut origins = pa.origins.clone();
        origins.extend(pb.origins.iter().copied());
        out.insert(name, Provenance { region, origins });
    }
    out
}
