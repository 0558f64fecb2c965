//! Compiler configuration and per-translation-unit session state.
//!
//! Per spec §9 ("global mutable state → explicit context"), the compiler
//! has no process-wide singletons: one `CompilerConfig` plus one
//! `Session` are threaded through the pipeline explicitly.

use std::path::PathBuf;

use crate::region::RegionTag;

/// Optimization level (spec §6's `-O0`/`-O1`). Anything beyond constant
/// folding, dead-code elimination, and peephole is out of scope (spec
/// §1 Non-goals); `-O1` simply turns those three passes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    O0,
    O1,
}

/// Every flag from spec §6's CLI grammar, captured as plain fields (no
/// env vars, no global config file — spec §6's "Persisted state: None").
#[derive(Clone, Debug)]
pub struct CompilerConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub opt_level: OptLevel,
    pub debug_info: bool,
    pub trace: bool,
    /// `-I dir` search paths. Stored for forwarding to an external
    /// preprocessor; this core never reads from them itself (spec §4.9).
    pub include_dirs: Vec<PathBuf>,
    /// `-D name[=value]` macro definitions, same external-preprocessor
    /// caveat as `include_dirs`.
    pub defines: Vec<(String, Option<String>)>,
    pub force_includes: Vec<PathBuf>,
    pub stack_bank: u16,
    pub stack_base: u16,
    /// The diagnostic escape hatch from spec §6: weakens provenance of
    /// every pointer parameter to the given region. `None` means
    /// provenance is tracked normally (no weakening).
    pub assume_pointer_params: Option<RegionTag>,
}

impl CompilerConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| self.input.with_extension("s"))
    }

    pub fn trace_stem(&self) -> PathBuf {
        self.input.with_extension("")
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            input: PathBuf::new(),
            output: None,
            opt_level: OptLevel::O0,
            debug_info: false,
            trace: false,
            include_dirs: Vec::new(),
            defines: Vec::new(),
            force_includes: Vec::new(),
            stack_bank: 1,
            stack_base: 0,
            assume_pointer_params: None,
        }
    }
}

/// Bundles a [`CompilerConfig`] with the state that belongs to exactly one
/// translation unit and is released at the end of its compile (spec §5).
/// The interned-string pool (`internment`) is itself process-global by
/// construction, but every other piece of session state here is created
/// fresh per compile and never shared across translation units.
pub struct Session {
    pub config: CompilerConfig,
    /// Source text of the translation unit, kept around so diagnostics
    /// can be rendered against the original file.
    pub source: String,
    pub file_name: String,
}

impl Session {
    pub fn new(config: CompilerConfig, source: String) -> Self {
        let file_name = config.input.to_string_lossy().into_owned();
        Session { config, source, file_name }
    }
}
