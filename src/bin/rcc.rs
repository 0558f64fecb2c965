//! The `rcc` command-line entry point (spec §6).
//!
//! Thin over `rcc::driver`: parse args, build a `CompilerConfig`, run the
//! pipeline, render diagnostics, pick an exit code. No logic lives here
//! that the library doesn't already own.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use rcc::config::{CompilerConfig, OptLevel};
use rcc::driver::{self, DriverError, EXIT_DRIVER_ERROR};
use rcc::region::RegionTag;

#[derive(Debug, Parser)]
#[command(name = "rcc", version, about = "C99-subset compiler targeting a banked 16-bit virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile one translation unit to assembly.
    Compile(CompileArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Opt {
    O0,
    O1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Region {
    Global,
    Stack,
}

impl From<Region> for RegionTag {
    fn from(r: Region) -> Self {
        match r {
            Region::Global => RegionTag::Global,
            Region::Stack => RegionTag::Stack,
        }
    }
}

#[derive(Debug, Parser)]
struct CompileArgs {
    /// The `.c` source file to compile.
    input: PathBuf,

    /// Output assembly path (default: input with a `.s` extension).
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Optimization level: `O0` (default, no passes) or `O1` (constant
    /// folding, dead-code elimination, peephole — spec §1's full scope).
    #[arg(short = 'O', value_enum, default_value = "o0")]
    opt: Opt,

    /// Emit debug info alongside the assembly (spec §6; no-op on the
    /// banked target beyond carrying the flag through to the session).
    #[arg(short = 'g', long)]
    debug_info: bool,

    /// Write every pipeline-stage trace artifact (`.tokens`/`.ast`/
    /// `.sem`/`.tast`/`.ir`) next to the input.
    #[arg(long)]
    trace: bool,

    /// Preprocessor include search path; forwarded, never read by this
    /// core (spec §4.9's external-preprocessor boundary).
    #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Preprocessor macro definition `name` or `name=value`; forwarded,
    /// never read by this core.
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Preprocessor forced include; forwarded, never read by this core.
    #[arg(long = "include", value_name = "FILE")]
    force_includes: Vec<PathBuf>,

    /// Bank number the stack frame is placed in.
    #[arg(long, default_value_t = 1)]
    stack_bank: u16,

    /// Base address within `stack_bank` the stack frame starts at.
    #[arg(long, default_value_t = 0)]
    stack_base: u16,

    /// Escape hatch (spec §6): weaken every pointer parameter's
    /// provenance to the named region instead of tracking it normally.
    #[arg(long, value_enum)]
    assume_pointer_params: Option<Region>,
}

fn parse_define(raw: &str) -> (String, Option<String>) {
    match raw.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (raw.to_string(), None),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let Command::Compile(args) = cli.command;

    let config = CompilerConfig {
        input: args.input.clone(),
        output: args.output,
        opt_level: match args.opt {
            Opt::O0 => OptLevel::O0,
            Opt::O1 => OptLevel::O1,
        },
        debug_info: args.debug_info,
        trace: args.trace,
        include_dirs: args.include_dirs,
        defines: args.defines.iter().map(|d| parse_define(d)).collect(),
        force_includes: args.force_includes,
        stack_bank: args.stack_bank,
        stack_base: args.stack_base,
        assume_pointer_params: args.assume_pointer_params.map(RegionTag::from),
    };

    let file_name = config.input.to_string_lossy().into_owned();

    match driver::compile(&config) {
        Ok(result) => {
            let (rendered, code) = driver::render_and_exit_code(&result, &file_name);
            if !rendered.is_empty() {
                eprintln!("{rendered}");
            }
            ExitCode::from(code as u8)
        }
        Err(err) => {
            report_driver_error(&err);
            ExitCode::from(EXIT_DRIVER_ERROR as u8)
        }
    }
}

fn report_driver_error(err: &DriverError) {
    tracing::error!("{err}");
}
