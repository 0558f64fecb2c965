//! The abstract syntax tree, before and after type resolution.
//!
//! There is a single `Expr`/`Stmt` representation used for both the `ast`
//! and `tast` trace artifacts from spec §6: the parser leaves every
//! `Expr::ty` as `None`, and `front::typeck` fills it in, in place. This
//! mirrors how little structural difference there actually is between
//! the two stages for this language — the alternative of two near-
//! identical tree types was judged not worth the duplication.

use serde::Serialize;

use crate::common::{Id, Span};
use crate::types::Type;

#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub structs: Vec<StructDecl>,
    pub typedefs: Vec<(Id, Type)>,
    pub globals: Vec<GlobalDecl>,
    pub functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructDecl {
    pub name: Id,
    pub fields: Vec<(Id, Type)>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalDecl {
    pub name: Id,
    pub ty: Type,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: Id,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub name: Id,
    pub ret: Type,
    pub params: Vec<Param>,
    /// `None` for a declaration with no body (an external/forward
    /// declaration); such functions are callable but never lowered.
    pub body: Option<Vec<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Expr(Expr),
    Decl {
        name: Id,
        ty: Type,
        init: Option<Expr>,
        span: Span,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<(i64, Vec<Stmt>)>,
        default: Vec<Stmt>,
        span: Span,
    },
    Return(Option<Expr>, Span),
    Compound(Vec<Stmt>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Filled by `front::typeck`; `None` in the freshly parsed tree.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span, ty: None }
    }

    /// The resolved type. Panics if called before type resolution — every
    /// expression the IR builder (component B) touches has already been
    /// through `front::typeck`, so this indicates an internal error, not
    /// a user-facing one (spec §8.1's "type preservation" property).
    pub fn expr_type(&self) -> &Type {
        self.ty.as_ref().expect("internal error: expr_type queried before type resolution")
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    IntLit(i64),
    CharLit(u8),
    StrLit(Id),
    Var(Id),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Short-circuit `&&`; lowered to a CFG join, never a plain `BinOp`
    /// (spec §4.2).
    LogAnd(Box<Expr>, Box<Expr>),
    /// Short-circuit `||`; same treatment as `LogAnd`.
    LogOr(Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Member {
        base: Box<Expr>,
        field: Id,
        arrow: bool,
    },
    Call {
        callee: Id,
        args: Vec<Expr>,
    },
    Cast {
        ty: Type,
        expr: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    Addr,
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}
