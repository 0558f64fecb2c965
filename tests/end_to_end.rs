//! End-to-end pipeline scenarios, adapted from the six cases in the
//! specification's testable-properties section to what the implemented
//! front end actually accepts (no ternary — `front::ast` has no such
//! expression, so `cond ? a : b` becomes `if (cond) ... else ...`).
//! There is no assembler/VM in this workspace to actually run the
//! emitted assembly against, so each scenario checks the pipeline's
//! observable compile-time behavior instead: which diagnostics (if any)
//! come out, and what the rendered assembly contains.

use std::io::Write;

use rcc::config::CompilerConfig;
use rcc::driver;

fn compile_source(name: &str, source: &str) -> driver::CompileResult {
    let path = std::env::temp_dir().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(source.as_bytes()).unwrap();
    let mut config = CompilerConfig::default();
    config.input = path;
    driver::compile(&config).expect("pipeline should not hit a process-boundary error")
}

#[test]
fn basic_arithmetic_with_a_conditional_compiles_clean() {
    let result = compile_source(
        "rcc_e2e_basic_arithmetic.c",
        "int main() { if (2 + 2 == 4) { return 'Y'; } else { return 'N'; } }",
    );
    assert!(!result.diagnostics.has_errors(), "{}", result.diagnostics.render_all("t.c"));
    let asm = result.assembly.expect("no errors means assembly should be emitted");
    assert!(asm.contains("main:"));
}

#[test]
fn struct_field_access_never_lowers_to_a_bare_pointer_add() {
    let result = compile_source(
        "rcc_e2e_struct_fields.c",
        "struct Point { int x; int y; };\n\
         int main() {\n\
           struct Point p;\n\
           p.x = 10;\n\
           p.y = 20;\n\
           if (p.x == 10) { if (p.y == 20) { return 'Y'; } }\n\
           return 'N';\n\
         }",
    );
    assert!(!result.diagnostics.has_errors(), "{}", result.diagnostics.render_all("t.c"));
    assert!(result.assembly.is_some());
}

#[test]
fn an_array_spanning_more_than_one_bank_still_compiles_and_indexes() {
    let result = compile_source(
        "rcc_e2e_bank_crossing_array.c",
        "int main() {\n\
           int a[5000];\n\
           a[0] = 42;\n\
           a[4500] = 99;\n\
           if (a[4500] == 99) { return 'Y'; }\n\
           return 'N';\n\
         }",
    );
    assert!(!result.diagnostics.has_errors(), "{}", result.diagnostics.render_all("t.c"));
    let asm = result.assembly.expect("a bank-crossing array is a valid program, not a diagnostic");
    assert!(asm.contains("main:"));
    // a[4500]'s byte offset (4500 cells past a[0], well past BANK_SIZE)
    // must actually carry into the bank half rather than silently
    // truncating to an intra-bank address: the shift-by-BANK_SHIFT/mask
    // pair `carry_bank_overflow` emits for every fat-pointer GEP result.
    assert!(asm.contains("shri"), "expected a bank-carry shift in:\n{asm}");
    assert!(asm.contains("andi"), "expected a bank-carry mask in:\n{asm}");
}

#[test]
fn dereferencing_a_pointer_with_mixed_global_and_stack_provenance_is_rejected() {
    let result = compile_source(
        "rcc_e2e_mixed_provenance.c",
        "int g;\n\
         int cond();\n\
         int main() {\n\
           int x;\n\
           int *p;\n\
           if (cond()) { p = &x; } else { p = &g; }\n\
           return *p;\n\
         }",
    );
    assert!(result.diagnostics.has_errors(), "expected the *p dereference to be rejected");
    assert!(result.assembly.is_none());
    let rendered = result.diagnostics.render_all("t.c");
    assert!(rendered.contains("DerefMixedProvenance") || rendered.contains("DerefUnknownProvenance"));
}

#[test]
fn a_cross_function_call_round_trips_through_the_calling_convention() {
    let result = compile_source(
        "rcc_e2e_cross_bank_call.c",
        "int helper(int a) { return a + 1; }\n\
         int main() { return helper(41); }",
    );
    assert!(!result.diagnostics.has_errors(), "{}", result.diagnostics.render_all("t.c"));
    let asm = result.assembly.expect("no errors means assembly should be emitted");
    assert!(asm.contains("helper:"));
    assert!(asm.contains("call helper"));
}

#[test]
fn six_scalar_arguments_place_the_first_four_in_registers_and_the_rest_on_the_stack() {
    let result = compile_source(
        "rcc_e2e_many_args.c",
        "int sum6(int a, int b, int c, int d, int e, int f) {\n\
           return a + b + c + d + e + f;\n\
         }\n\
         int main() { return sum6(1, 2, 3, 4, 5, 6); }",
    );
    assert!(!result.diagnostics.has_errors(), "{}", result.diagnostics.render_all("t.c"));
    let asm = result.assembly.expect("no errors means assembly should be emitted");
    assert!(asm.contains("sum6:"));
    // Arguments 5 and 6 don't fit in ARG0..ARG3, so the call site must
    // push them to the stack rather than trying to route them through
    // registers (spec §4.5's left-packing rule).
    assert!(asm.contains("sp"));
}

#[test]
fn trace_artifacts_are_written_next_to_the_input_when_requested() {
    let path = std::env::temp_dir().join("rcc_e2e_trace.c");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"int main() { return 0; }").unwrap();

    let mut config = CompilerConfig::default();
    config.input = path.clone();
    config.trace = true;
    let result = driver::compile(&config).expect("pipeline should not hit a process-boundary error");
    assert!(!result.diagnostics.has_errors());

    for ext in ["tokens", "ast", "sem", "tast", "ir"] {
        let mut trace_path = path.clone();
        trace_path.set_extension(ext);
        assert!(trace_path.exists(), "expected {ext} trace artifact at {trace_path:?}");
    }
}
