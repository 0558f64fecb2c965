//! Component H: pipeline orchestration (spec §4.8, §6).
//!
//! Drives one translation unit from source text to assembly text:
//! lex → parse → typecheck → build IR → optimize (`-O1` only) → resolve
//! memory banks → allocate registers → select instructions → render.
//! Every stage's diagnostics accumulate in one [`DiagnosticBag`]; the
//! pipeline stops lowering to IR (and everything after) the moment the
//! bag holds an error, but still renders what diagnostics it collected
//! (spec §7's "collected and emitted in source order", §9's "errors
//! don't abort the whole compiler" via exit codes, not panics).
//!
//! Trace artifacts (spec §6: `.tokens`, `.ast`, `.sem`, `.tast`, `.ir`)
//! are written as JSON via `serde_json` when `--trace` is set, one file
//! per stage reached, named from [`CompilerConfig::trace_stem`].

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::back::abi::{compute_signature, Signature};
use crate::back::gep::lower_memory;
use crate::back::isel::{select_instructions, FunctionContext};
use crate::back::regalloc::{allocate_registers, Allocation};
use crate::common::{Id, Map};
use crate::config::CompilerConfig;
use crate::diag::DiagnosticBag;
use crate::front::lex::{LexError, Lexer, Token};
use crate::front::parse::parse;
use crate::front::typeck::typecheck;
use crate::middle::builder::build_module;
use crate::middle::opt::optimize;
use crate::middle::provenance::ProvenanceTable;

/// Process-boundary failures with no source span to attach to (spec
/// §9's "global mutable state → explicit context" extends to errors:
/// these are distinct from [`crate::diag::Diagnostic`], which always
/// names a location in the translation unit).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot read input file {path}: {source}")]
    UnreadableInput { path: String, #[source] source: std::io::Error },
    #[error("cannot write output file {path}: {source}")]
    UnwritableOutput { path: String, #[source] source: std::io::Error },
    #[error("cannot write trace artifact {path}: {source}")]
    TraceWriteFailed { path: String, #[source] source: std::io::Error },
    #[error("failed to serialize trace artifact {artifact}: {source}")]
    SerializationFailed { artifact: &'static str, #[source] source: serde_json::Error },
    #[error("{path}: {message}")]
    ParseFailed { path: String, message: String },
}

/// Exit codes spec §6 assigns the CLI: success, diagnostics with at
/// least one error, and a driver/internal failure that never reached
/// the point of having diagnostics to show.
pub const EXIT_OK: i32 = 0;
pub const EXIT_DIAGNOSTICS: i32 = 1;
pub const EXIT_DRIVER_ERROR: i32 = 2;

/// Everything one call to [`compile`] produces: the rendered assembly
/// (absent if a prior stage had errors) and every diagnostic collected
/// along the way.
pub struct CompileResult {
    pub assembly: Option<String>,
    pub diagnostics: DiagnosticBag,
}

/// Run the full pipeline over `config.input`, writing the assembly to
/// `config.output_path()` and, if `config.trace` is set, every trace
/// artifact the pipeline reached to `config.trace_stem()`-based paths.
pub fn compile(config: &CompilerConfig) -> Result<CompileResult, DriverError> {
    let path = &config.input;
    let source = fs::read_to_string(path).map_err(|source| DriverError::UnreadableInput { path: path.display().to_string(), source })?;

    let mut diagnostics = DiagnosticBag::new();

    if config.trace {
        let tokens = tokenize_all(&source);
        write_trace(config, "tokens", &tokens)?;
    }

    let program = match parse(&source) {
        Ok(program) => program,
        Err(e) => {
            // The parser has no span-carrying error today (spec §4.8
            // treats parsing as a light external collaborator); report
            // it as a driver error rather than inventing a synthetic
            // span for a `Diagnostic`.
            return Err(DriverError::ParseFailed { path: path.display().to_string(), message: e.to_string() });
        }
    };

    if config.trace {
        write_trace(config, "ast", &program)?;
    }

    let (typed, typeck_diags) = typecheck(program);
    diagnostics.extend(typeck_diags);

    if config.trace {
        write_trace(config, "sem", &typed.sem)?;
        write_trace(config, "tast", &typed)?;
    }

    if diagnostics.has_errors() {
        return Ok(CompileResult { assembly: None, diagnostics });
    }

    let (mut module, build_diags) = build_module(&typed, config);
    diagnostics.extend(build_diags);

    if config.opt_level == crate::config::OptLevel::O1 {
        optimize(&mut module);
    }

    if config.trace {
        write_trace(config, "ir", &module)?;
    }

    if diagnostics.has_errors() {
        return Ok(CompileResult { assembly: None, diagnostics });
    }

    let (banks, gep_diags) = lower_memory(&module);
    diagnostics.extend(gep_diags);

    if diagnostics.has_errors() {
        return Ok(CompileResult { assembly: None, diagnostics });
    }

    // Every function's own ABI placement, computed up front so a call
    // site can place arguments by the *callee's* signature rather than
    // its own (`back::isel::FunctionContext::signatures`).
    let mut signatures: Map<Id, Signature> = Map::new();
    for function in &module.functions {
        if let Some(sig) = typed.functions.get(&function.name) {
            signatures.insert(function.name, compute_signature(&typed.types, &sig.params, &sig.ret));
        }
    }

    let empty_provenance = ProvenanceTable::new();
    let mut allocations: Map<Id, Allocation> = Map::new();
    for function in &module.functions {
        let provenance = module.provenance.get(&function.name).unwrap_or(&empty_provenance);
        allocations.insert(function.name, allocate_registers(function, provenance));
    }

    let mut contexts: Map<Id, FunctionContext> = Map::new();
    for function in &module.functions {
        let (Some(alloc), Some(bank_assignment), Some(signature)) =
            (allocations.get(&function.name), banks.get(&function.name), signatures.get(&function.name))
        else {
            continue;
        };
        contexts.insert(function.name, FunctionContext { alloc, banks: bank_assignment, signature, signatures: &signatures });
    }

    let asm_program = select_instructions(&module, &typed.types, &contexts);
    let assembly = asm_program.asm_code();

    let output_path = config.output_path();
    fs::write(&output_path, &assembly).map_err(|source| DriverError::UnwritableOutput { path: output_path.display().to_string(), source })?;

    Ok(CompileResult { assembly: Some(assembly), diagnostics })
}

/// Drive [`Lexer`] directly to produce the `.tokens` trace artifact;
/// `front::parse`'s own tokenizer is a private helper, not reusable
/// here. A lexer error truncates the stream at the bad character
/// rather than failing the whole trace — the parser will report the
/// same failure properly moments later.
fn tokenize_all(source: &str) -> Vec<Token<'_>> {
    let mut lexer = Lexer::new(source);
    let mut out = Vec::new();
    loop {
        match lexer.next() {
            Ok(Some(tok)) => out.push(tok),
            Ok(None) => break,
            Err(LexError(..)) => break,
        }
    }
    out
}

fn write_trace<T: serde::Serialize>(config: &CompilerConfig, stage: &'static str, value: &T) -> Result<(), DriverError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| DriverError::SerializationFailed { artifact: stage, source })?;
    let path = trace_path(config, stage);
    fs::write(&path, json).map_err(|source| DriverError::TraceWriteFailed { path: path.display().to_string(), source })
}

fn trace_path(config: &CompilerConfig, stage: &str) -> std::path::PathBuf {
    let stem = config.trace_stem();
    let mut path = stem;
    path.set_extension(stage);
    path
}

/// Render the pipeline's diagnostics and pick the process exit code
/// (spec §6): 0 clean, 1 diagnostics with at least one error, 2 a
/// [`DriverError`] that never reached diagnostic collection.
pub fn render_and_exit_code(result: &CompileResult, file_name: &str) -> (String, i32) {
    let rendered = result.diagnostics.render_all(file_name);
    let code = if result.diagnostics.has_errors() { EXIT_DIAGNOSTICS } else { EXIT_OK };
    (rendered, code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn a_trivial_function_compiles_clean() {
        let dir = std::env::temp_dir();
        let input = write_source(&dir, "rcc_driver_test_trivial.c", "int main() { return 0; }");
        let mut config = CompilerConfig::default();
        config.input = input;
        let result = compile(&config).expect("driver stages should not hit a process-boundary error");
        assert!(!result.diagnostics.has_errors());
        assert!(result.assembly.is_some());
        assert!(result.assembly.unwrap().contains("main:"));
    }

    #[test]
    fn an_unreadable_input_is_a_driver_error_not_a_panic() {
        let mut config = CompilerConfig::default();
        config.input = std::env::temp_dir().join("rcc_driver_test_does_not_exist.c");
        assert!(matches!(compile(&config), Err(DriverError::UnreadableInput { .. })));
    }

    #[test]
    fn an_undeclared_identifier_stops_before_code_generation() {
        let dir = std::env::temp_dir();
        let input = write_source(&dir, "rcc_driver_test_undeclared.c", "int main() { return undeclared_thing; }");
        let mut config = CompilerConfig::default();
        config.input = input;
        let result = compile(&config).expect("driver stages should not hit a process-boundary error");
        assert!(result.diagnostics.has_errors());
        assert!(result.assembly.is_none());
    }
}
