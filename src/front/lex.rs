//! The lexer.
//!
//! Lexing and parsing are treated as external collaborators by spec §1 —
//! this core only needs to produce the `tokens` trace artifact (spec §6)
//! and feed a typed AST to the builder. Kept deliberately simpler and
//! less heavily documented than components A through G.

use derive_more::Display;
use regex::Regex;
use serde::Serialize;

use crate::common::{Position, Span};

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Debug)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("int")]
    IntLit,
    #[display("char")]
    CharLit,
    #[display("str")]
    StrLit,
    #[display("int")]
    KwInt,
    #[display("short")]
    KwShort,
    #[display("char")]
    KwChar,
    #[display("long")]
    KwLong,
    #[display("void")]
    KwVoid,
    #[display("struct")]
    KwStruct,
    #[display("typedef")]
    KwTypedef,
    #[display("if")]
    KwIf,
    #[display("else")]
    KwElse,
    #[display("while")]
    KwWhile,
    #[display("switch")]
    KwSwitch,
    #[display("case")]
    KwCase,
    #[display("default")]
    KwDefault,
    #[display("return")]
    KwReturn,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display(";")]
    Semi,
    #[display(",")]
    Comma,
    #[display(":")]
    Colon,
    #[display(".")]
    Dot,
    #[display("->")]
    Arrow,
    #[display("=")]
    Assign,
    #[display("==")]
    EqEq,
    #[display("!=")]
    Ne,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("<<")]
    Shl,
    #[display(">>")]
    Shr,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("&")]
    Amp,
    #[display("&&")]
    AmpAmp,
    #[display("|")]
    Pipe,
    #[display("||")]
    PipePipe,
    #[display("^")]
    Caret,
    #[display("!")]
    Bang,
    #[display("~")]
    Tilde,
    #[display("eof")]
    Eof,
}

/// A single lexical token, carrying the source slice it came from so the
/// parser never needs to re-derive text from a span.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Debug)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub span: Span,
}

pub struct LexError(pub Position, pub char);

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer error: unexpected character {:?} at {}:{}", self.1, self.0.line, self.0.col)
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match word {
        "int" => KwInt,
        "short" => KwShort,
        "char" => KwChar,
        "long" => KwLong,
        "void" => KwVoid,
        "struct" => KwStruct,
        "typedef" => KwTypedef,
        "if" => KwIf,
        "else" => KwElse,
        "while" => KwWhile,
        "switch" => KwSwitch,
        "case" => KwCase,
        "default" => KwDefault,
        "return" => KwReturn,
        _ => return None,
    })
}

/// Multi-character punctuation, longest first so the scanner can try
/// them in order without backtracking.
const PUNCT: &[(&str, TokenKind)] = {
    use TokenKind::*;
    &[
        ("->", Arrow),
        ("==", EqEq),
        ("!=", Ne),
        ("<=", Le),
        (">=", Ge),
        ("<<", Shl),
        (">>", Shr),
        ("&&", AmpAmp),
        ("||", PipePipe),
        ("(", LParen),
        (")", RParen),
        ("{", LBrace),
        ("}", RBrace),
        ("[", LBracket),
        ("]", RBracket),
        (";", Semi),
        (",", Comma),
        (":", Colon),
        (".", Dot),
        ("=", Assign),
        ("<", Lt),
        (">", Gt),
        ("+", Plus),
        ("-", Minus),
        ("*", Star),
        ("/", Slash),
        ("%", Percent),
        ("&", Amp),
        ("|", Pipe),
        ("^", Caret),
        ("!", Bang),
        ("~", Tilde),
    ]
};

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: u32,
    col: u32,
    whitespace: Regex,
    ident: Regex,
    number: Regex,
    char_lit: Regex,
    str_lit: Regex,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Lexer {
            input,
            pos: 0,
            line: 1,
            col: 1,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://[^\n]*)|(?s:/\*.*?\*/))*").unwrap(),
            ident: Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(),
            number: Regex::new(r"\A[0-9]+").unwrap(),
            char_lit: Regex::new(r"\A'(\\.|[^'\\])'").unwrap(),
            str_lit: Regex::new(r#"\A"(\\.|[^"\\])*""#).unwrap(),
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    fn position(&self) -> Position {
        Position { line: self.line, col: self.col, offset: self.pos as u32 }
    }

    fn advance(&mut self, n: usize) {
        for ch in self.input[self.pos..self.pos + n].chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += n;
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.advance(m.end());
        }
    }

    fn take(&mut self, start: Position, kind: TokenKind, len: usize) -> Token<'input> {
        let start_off = self.pos;
        self.advance(len);
        Token { kind, text: &self.input[start_off..self.pos], span: Span::new(start, self.position()) }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        use TokenKind::*;
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let start = self.position();
        let rest = &self.input[self.pos..];

        if let Some(m) = self.str_lit.find(rest) {
            return Ok(Some(self.take(start, StrLit, m.end())));
        }
        if let Some(m) = self.char_lit.find(rest) {
            return Ok(Some(self.take(start, CharLit, m.end())));
        }
        if let Some(m) = self.ident.find(rest) {
            let text = &rest[..m.end()];
            let kind = keyword_kind(text).unwrap_or(Id);
            return Ok(Some(self.take(start, kind, m.end())));
        }
        if let Some(m) = self.number.find(rest) {
            return Ok(Some(self.take(start, IntLit, m.end())));
        }
        for (text, kind) in PUNCT {
            if rest.starts_with(text) {
                return Ok(Some(self.take(start, *kind, text.len())));
            }
        }
        Err(LexError(start, rest.chars().next().unwrap()))
    }
}
