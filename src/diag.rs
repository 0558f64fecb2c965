//! Diagnostics: the first-class values produced by every fallible phase.
//!
//! Per spec §7 and §9 ("no exceptions for control flow"), diagnostics are
//! data, not `Error` types threaded through `?`. Phases append to a
//! [`DiagnosticBag`] and keep going where spec §7's "local recovery" rule
//! allows it; the driver (`crate::driver`) decides whether the bag's worst
//! severity should halt the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Span;

/// Severity levels, ordered worst-to-best for sorting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// Stable diagnostic codes, grouped by the taxonomy in spec §7. These are
/// not meant to be exhaustive of every message the compiler can produce,
/// only of the categories spec §7 calls out by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Code {
    // Type errors
    UndeclaredIdentifier,
    IncompatibleTypes,
    InvalidOperand,
    IncompleteTypeByValue,
    RecursiveStructByValue,
    NotAnLvalue,
    InvalidCast,
    // Pointer safety
    DerefMixedProvenance,
    DerefUnknownProvenance,
    GepOverflowsBank,
    PointerDiffUnrelatedTypes,
    // Register allocation (internal only; always fatal)
    SpillPinnedRegister,
    // Calling convention
    TooManyArguments,
    SretMismatch,
    // ABI / bank
    DerefWithNoRegion,
    MisalignedCallTarget,
    // Driver / I/O
    UnreadableInput,
    UnwritableOutput,
    SerializationFailure,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One note attached to a diagnostic: an additional span with explanatory
/// text. Used to point at every contributing origin of a provenance
/// conflict (spec §4.3's "must name both conflicting regions").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Note {
    pub span: Span,
    pub text: String,
}

impl Note {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Note { span, text: text.into() }
    }
}

/// A single diagnostic: `{severity, code, primary_span, notes, help?}` per
/// spec §7.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Code,
    pub primary_span: Span,
    pub message: String,
    pub notes: Vec<Note>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: Code, primary_span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code,
            primary_span,
            message: message.into(),
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn error(code: Code, span: Span, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, code, span, message)
    }

    pub fn warning(code: Code, span: Span, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, code, span, message)
    }

    pub fn fatal(code: Code, span: Span, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Fatal, code, span, message)
    }

    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error | Severity::Fatal)
    }

    /// Render in the `file:line:col: severity[code]: message` format of
    /// spec §7, followed by indented note lines each with their own span.
    pub fn render(&self, file: &str) -> String {
        let mut out = format!(
            "{file}:{}:{}: {}[{}]: {}",
            self.primary_span.start.line, self.primary_span.start.col, self.severity, self.code, self.message
        );
        for note in &self.notes {
            out.push_str(&format!(
                "\n    note: {file}:{}:{}: {}",
                note.span.start.line, note.span.start.col, note.text
            ));
        }
        if let Some(help) = &self.help {
            out.push_str(&format!("\n    help: {help}"));
        }
        out
    }
}

/// Collects diagnostics in source order (spec §7: "Errors are collected and
/// emitted in source order").
#[derive(Clone, Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn render_all(&self, file: &str) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.render(file))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Position;

    fn span_at(line: u32, col: u32) -> Span {
        Span::new(Position { line, col, offset: 0 }, Position { line, col, offset: 0 })
    }

    #[test]
    fn render_includes_notes_in_order() {
        let d = Diagnostic::error(Code::DerefMixedProvenance, span_at(3, 5), "dereference of pointer with conflicting provenance")
            .with_note(Note::new(span_at(1, 1), "region Stack established here"))
            .with_note(Note::new(span_at(2, 1), "region Global established here"));
        let rendered = d.render("t.c");
        assert!(rendered.starts_with("t.c:3:5: error[DerefMixedProvenance]:"));
        assert_eq!(rendered.matches("note:").count(), 2);
    }

    #[test]
    fn bag_tracks_worst_severity() {
        let mut bag = DiagnosticBag::new();
        assert!(!bag.has_errors());
        bag.push(Diagnostic::warning(Code::UnreadableInput, span_at(1, 1), "just a warning"));
        assert!(!bag.has_errors());
        bag.push(Diagnostic::error(Code::UndeclaredIdentifier, span_at(1, 1), "boom"));
        assert!(bag.has_errors());
        assert!(!bag.has_fatal());
    }
}
