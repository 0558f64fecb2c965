//! The parser.
//!
//! A compact recursive-descent parser for the C99 subset spec §3 and §4.2
//! describe (no preprocessor directives — those are handled upstream by
//! an external preprocessor, spec §1). Like [`super::lex`], this module
//! is intentionally simpler and less heavily documented than components
//! A through G: it exists to make the rest of the pipeline runnable and
//! testable end to end.

use std::fmt::Debug;

use derive_more::derive::Display;

use crate::common::{Id, Span};
use crate::types::{IntWidth, Type};

use super::ast::*;
use super::lex::*;

#[derive(Display)]
#[display("Parse error: {}", self.0)]
pub struct ParseError(String);

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

fn err<T>(msg: impl Into<String>) -> Result<T, ParseError> {
    Err(ParseError(msg.into()))
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(input)?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_program()
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut out = Vec::new();
    loop {
        match lexer.next() {
            Ok(Some(tok)) => out.push(tok),
            Ok(None) => break,
            Err(e) => return err(e.to_string()),
        }
    }
    Ok(out)
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn span(&self) -> Span {
        self.peek().map(|t| t.span).unwrap_or_default()
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let t = self.tokens.get(self.pos).copied();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.bump() {
            Some(t) if t.kind == kind => Ok(t),
            Some(t) => err(format!("expected {kind}, found {} ({:?}) at {}:{}", t.kind, t.text, t.span.start.line, t.span.start.col)),
            None => err(format!("expected {kind}, found end of input")),
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat_if(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<Id, ParseError> {
        let t = self.eat(TokenKind::Id)?;
        Ok(internment::Intern::new(t.text.to_string()))
    }

    fn is_type_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::KwInt | TokenKind::KwShort | TokenKind::KwChar | TokenKind::KwLong | TokenKind::KwVoid | TokenKind::KwStruct)
        )
    }

    /// Parses a base type followed by any number of `*` suffixes.
    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let mut ty = match self.bump() {
            Some(t) if t.kind == TokenKind::KwVoid => Type::Void,
            Some(t) if t.kind == TokenKind::KwChar => Type::Integer { width: IntWidth::W8, signed: true },
            Some(t) if t.kind == TokenKind::KwShort => Type::Integer { width: IntWidth::W16, signed: true },
            Some(t) if t.kind == TokenKind::KwInt => Type::Integer { width: IntWidth::W16, signed: true },
            Some(t) if t.kind == TokenKind::KwLong => Type::Integer { width: IntWidth::W32, signed: true },
            Some(t) if t.kind == TokenKind::KwStruct => {
                let name = self.ident()?;
                Type::Struct(name)
            }
            Some(t) if t.kind == TokenKind::Id => Type::TypeName(internment::Intern::new(t.text.to_string())),
            Some(t) => return err(format!("expected a type, found {} ({:?})", t.kind, t.text)),
            None => return err("expected a type, found end of input"),
        };
        while self.eat_if(TokenKind::Star) {
            ty = Type::pointer_to(ty);
        }
        Ok(ty)
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut structs = Vec::new();
        let mut typedefs = Vec::new();
        let mut globals = Vec::new();
        let mut functions = Vec::new();

        while self.peek().is_some() {
            if self.at(TokenKind::KwTypedef) {
                self.bump();
                let ty = self.parse_type()?;
                let name = self.ident()?;
                self.eat(TokenKind::Semi)?;
                typedefs.push((name, ty));
                continue;
            }
            if self.at(TokenKind::KwStruct) {
                let start = self.span();
                self.bump();
                let name = self.ident()?;
                if self.eat_if(TokenKind::Semi) {
                    // forward declaration only
                    structs.push(StructDecl { name, fields: Vec::new(), span: start });
                    continue;
                }
                self.eat(TokenKind::LBrace)?;
                let mut fields = Vec::new();
                while !self.at(TokenKind::RBrace) {
                    let field_ty = self.parse_type()?;
                    let field_name = self.ident()?;
                    self.eat(TokenKind::Semi)?;
                    fields.push((field_name, field_ty));
                }
                self.eat(TokenKind::RBrace)?;
                self.eat(TokenKind::Semi)?;
                structs.push(StructDecl { name, fields, span: start });
                continue;
            }

            let start = self.span();
            let ty = self.parse_type()?;
            let name = self.ident()?;

            if self.at(TokenKind::LParen) {
                let func = self.parse_function_rest(name, ty, start)?;
                functions.push(func);
            } else {
                let init = if self.eat_if(TokenKind::Assign) { Some(self.parse_expr()?) } else { None };
                self.eat(TokenKind::Semi)?;
                globals.push(GlobalDecl { name, ty, init, span: start });
            }
        }

        Ok(Program { structs, typedefs, globals, functions })
    }

    fn parse_function_rest(&mut self, name: Id, ret: Type, start: Span) -> Result<FunctionDecl, ParseError> {
        self.eat(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let pty = self.parse_type()?;
                let pname = self.ident()?;
                params.push(Param { name: pname, ty: pty });
                if !self.eat_if(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(TokenKind::RParen)?;

        if self.eat_if(TokenKind::Semi) {
            return Ok(FunctionDecl { name, ret, params, body: None, span: start });
        }

        let body = self.parse_block()?;
        Ok(FunctionDecl { name, ret, params, body: Some(body), span: start })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.eat(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.eat(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.span();
        match self.peek_kind() {
            Some(TokenKind::LBrace) => Ok(Stmt::Compound(self.parse_block()?)),
            Some(TokenKind::KwIf) => {
                self.bump();
                self.eat(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.eat(TokenKind::RParen)?;
                let then_branch = self.parse_stmt_as_block()?;
                let else_branch = if self.eat_if(TokenKind::KwElse) { self.parse_stmt_as_block()? } else { Vec::new() };
                Ok(Stmt::If { cond, then_branch, else_branch, span: start })
            }
            Some(TokenKind::KwWhile) => {
                self.bump();
                self.eat(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.eat(TokenKind::RParen)?;
                let body = self.parse_stmt_as_block()?;
                Ok(Stmt::While { cond, body, span: start })
            }
            Some(TokenKind::KwSwitch) => {
                self.bump();
                self.eat(TokenKind::LParen)?;
                let scrutinee = self.parse_expr()?;
                self.eat(TokenKind::RParen)?;
                self.eat(TokenKind::LBrace)?;
                let mut cases = Vec::new();
                let mut default = Vec::new();
                while !self.at(TokenKind::RBrace) {
                    if self.eat_if(TokenKind::KwCase) {
                        let value_tok = self.eat(TokenKind::IntLit)?;
                        let value: i64 = value_tok.text.parse().map_err(|_| ParseError("invalid integer literal".into()))?;
                        self.eat(TokenKind::Colon)?;
                        let mut body = Vec::new();
                        while !matches!(self.peek_kind(), Some(TokenKind::KwCase | TokenKind::KwDefault | TokenKind::RBrace)) {
                            body.push(self.parse_stmt()?);
                        }
                        cases.push((value, body));
                    } else if self.eat_if(TokenKind::KwDefault) {
                        self.eat(TokenKind::Colon)?;
                        while !matches!(self.peek_kind(), Some(TokenKind::KwCase | TokenKind::KwDefault | TokenKind::RBrace)) {
                            default.push(self.parse_stmt()?);
                        }
                    } else {
                        return err("expected 'case' or 'default' inside switch body");
                    }
                }
                self.eat(TokenKind::RBrace)?;
                Ok(Stmt::Switch { scrutinee, cases, default, span: start })
            }
            Some(TokenKind::KwReturn) => {
                self.bump();
                let value = if self.at(TokenKind::Semi) { None } else { Some(self.parse_expr()?) };
                self.eat(TokenKind::Semi)?;
                Ok(Stmt::Return(value, start))
            }
            _ if self.is_type_start() || self.at_declaration() => {
                let ty = self.parse_type()?;
                let name = self.ident()?;
                let init = if self.eat_if(TokenKind::Assign) { Some(self.parse_expr()?) } else { None };
                self.eat(TokenKind::Semi)?;
                Ok(Stmt::Decl { name, ty, init, span: start })
            }
            _ => {
                let e = self.parse_expr()?;
                self.eat(TokenKind::Semi)?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    /// Heuristic for a `TypeName ident` declaration statement: an
    /// identifier token immediately followed by another identifier is
    /// treated as a typedef'd declaration rather than an expression
    /// statement.
    fn at_declaration(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Id)) && matches!(self.tokens.get(self.pos + 1).map(|t| t.kind), Some(TokenKind::Id))
    }

    fn parse_stmt_as_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.at(TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    // Expression grammar, precedence climbing from lowest to highest:
    //   assignment > logical-or > logical-and > bitor > bitxor > bitand
    //   > equality > relational > shift > additive > multiplicative
    //   > unary > postfix > primary

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_logor()?;
        if self.eat_if(TokenKind::Assign) {
            let rhs = self.parse_assign()?;
            let span = lhs.span.join(rhs.span);
            return Ok(Expr::new(ExprKind::Assign(Box::new(lhs), Box::new(rhs)), span));
        }
        Ok(lhs)
    }

    fn parse_logor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_logand()?;
        while self.eat_if(TokenKind::PipePipe) {
            let rhs = self.parse_logand()?;
            let span = lhs.span.join(rhs.span);
            lhs = Expr::new(ExprKind::LogOr(Box::new(lhs), Box::new(rhs)), span);
        }
        Ok(lhs)
    }

    fn parse_logand(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitor()?;
        while self.eat_if(TokenKind::AmpAmp) {
            let rhs = self.parse_bitor()?;
            let span = lhs.span.join(rhs.span);
            lhs = Expr::new(ExprKind::LogAnd(Box::new(lhs), Box::new(rhs)), span);
        }
        Ok(lhs)
    }

    fn parse_binop_level(&mut self, ops: &[(TokenKind, BinOp)], next: fn(&mut Self) -> Result<Expr, ParseError>) -> Result<Expr, ParseError> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.at(*tok) {
                    self.bump();
                    let rhs = next(self)?;
                    let span = lhs.span.join(rhs.span);
                    lhs = Expr::new(ExprKind::Binary(*op, Box::new(lhs), Box::new(rhs)), span);
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(&[(TokenKind::Pipe, BinOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(&[(TokenKind::Caret, BinOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(&[(TokenKind::Amp, BinOp::BitAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(&[(TokenKind::EqEq, BinOp::Eq), (TokenKind::Ne, BinOp::Ne)], Self::parse_relational)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Ge, BinOp::Ge),
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(&[(TokenKind::Shl, BinOp::Shl), (TokenKind::Shr, BinOp::Shr)], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(&[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_binop_level(
            &[(TokenKind::Star, BinOp::Mul), (TokenKind::Slash, BinOp::Div), (TokenKind::Percent, BinOp::Mod)],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.span();
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => Some(UnOp::Neg),
            Some(TokenKind::Bang) => Some(UnOp::Not),
            Some(TokenKind::Tilde) => Some(UnOp::BitNot),
            Some(TokenKind::Amp) => Some(UnOp::Addr),
            Some(TokenKind::Star) => Some(UnOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            let span = start.join(operand.span);
            return Ok(Expr::new(ExprKind::Unary(op, Box::new(operand)), span));
        }
        // `(Type) expr` cast, disambiguated from a parenthesized expression
        // by requiring a type keyword right after `(`.
        if self.at(TokenKind::LParen) && matches!(self.tokens.get(self.pos + 1).map(|t| t.kind), Some(k) if self.is_type_token(k)) {
            self.bump();
            let ty = self.parse_type()?;
            self.eat(TokenKind::RParen)?;
            let expr = self.parse_unary()?;
            let span = start.join(expr.span);
            return Ok(Expr::new(ExprKind::Cast { ty, expr: Box::new(expr) }, span));
        }
        self.parse_postfix()
    }

    fn is_type_token(&self, kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::KwInt | TokenKind::KwShort | TokenKind::KwChar | TokenKind::KwLong | TokenKind::KwVoid | TokenKind::KwStruct
        )
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::LBracket) => {
                    self.bump();
                    let index = self.parse_expr()?;
                    let end = self.eat(TokenKind::RBracket)?;
                    let span = expr.span.join(end.span);
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(index)), span);
                }
                Some(TokenKind::Dot) => {
                    self.bump();
                    let field = self.ident()?;
                    let span = expr.span;
                    expr = Expr::new(ExprKind::Member { base: Box::new(expr), field, arrow: false }, span);
                }
                Some(TokenKind::Arrow) => {
                    self.bump();
                    let field = self.ident()?;
                    let span = expr.span;
                    expr = Expr::new(ExprKind::Member { base: Box::new(expr), field, arrow: true }, span);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.span();
        match self.bump() {
            Some(t) if t.kind == TokenKind::IntLit => {
                let value: i64 = t.text.parse().map_err(|_| ParseError(format!("invalid integer literal {:?}", t.text)))?;
                Ok(Expr::new(ExprKind::IntLit(value), t.span))
            }
            Some(t) if t.kind == TokenKind::CharLit => {
                let byte = decode_char_literal(t.text);
                Ok(Expr::new(ExprKind::CharLit(byte), t.span))
            }
            Some(t) if t.kind == TokenKind::StrLit => {
                let content = decode_string_literal(t.text);
                Ok(Expr::new(ExprKind::StrLit(internment::Intern::new(content)), t.span))
            }
            Some(t) if t.kind == TokenKind::Id => {
                let name = internment::Intern::new(t.text.to_string());
                if self.eat_if(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.at(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat_if(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.eat(TokenKind::RParen)?;
                    Ok(Expr::new(ExprKind::Call { callee: name, args }, t.span.join(end.span)))
                } else {
                    Ok(Expr::new(ExprKind::Var(name), t.span))
                }
            }
            Some(t) if t.kind == TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let end = self.eat(TokenKind::RParen)?;
                Ok(Expr { span: start.join(end.span), ..inner })
            }
            Some(t) => err(format!("expected an expression, found {} ({:?})", t.kind, t.text)),
            None => err("expected an expression, found end of input"),
        }
    }
}

fn decode_char_literal(text: &str) -> u8 {
    let inner = &text[1..text.len() - 1];
    decode_escapes(inner).first().copied().unwrap_or(0)
}

fn decode_string_literal(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    decode_escapes(inner).into_iter().map(|b| b as char).collect()
}

fn decode_escapes(text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('t') => out.push(b'\t'),
                Some('0') => out.push(0),
                Some('\\') => out.push(b'\\'),
                Some('\'') => out.push(b'\''),
                Some('"') => out.push(b'"'),
                Some(other) => out.push(other as u8),
                None => {}
            }
        } else {
            out.push(c as u8);
        }
    }
    out
}
