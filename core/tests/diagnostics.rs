use std::sync::Arc;

use tilang_core::{
    BufferSink, CompileConfig, DiagnosticKind, Level, Program, Script, TilangErrorExt, check_source,
    generate_error_report,
};

fn load(src: &str) -> Program {
    let script = Script::from_source("diag.ti", src);
    Program::from_script(&script, CompileConfig::default())
        .expect("script should load")
        .with_sink(Arc::new(BufferSink::new()))
}

fn compile_error(src: &str, kernel: &str) -> Box<dyn TilangErrorExt> {
    let mut program = load(src);
    program.call(kernel, &[]).expect_err("kernel should be rejected")
}

#[test]
fn membership_test_is_rejected() {
    let err = compile_error("@kernel\ndef foo():\n    1 in [1]\n", "foo");
    assert_eq!(err.message(), "\"In\" is not supported in Taichi kernels.");
    assert_eq!(err.kind(), Some(DiagnosticKind::UnsupportedConstruct));
    assert_eq!(err.location().map(|l| l.line), Some(3));
}

#[test]
fn identity_test_is_rejected() {
    let err = compile_error("@kernel\ndef foo():\n    x = 1\n    x is not None\n", "foo");
    assert_eq!(err.message(), "\"Is\" is not supported in Taichi kernels.");
}

#[test]
fn static_element_assignment_is_rejected() {
    let src = r#"
@kernel
def foo():
    a = static([1, 2, 3])
    a[0] = static(2)
"#;
    let err = compile_error(src, "foo");
    assert_eq!(err.message(), "Static assign cannot be used on elements in arrays");
    assert_eq!(err.kind(), Some(DiagnosticKind::IllegalStaticMutation));
}

#[test]
fn runtime_store_into_static_container_is_rejected() {
    let src = r#"
@kernel
def foo():
    a = static([1, 2, 3])
    a[0] = 2
"#;
    let err = compile_error(src, "foo");
    assert_eq!(err.message(), "Static assign cannot be used on elements in arrays");
    assert_eq!(err.kind(), Some(DiagnosticKind::IllegalStaticMutation));
    assert_eq!(err.location().map(|l| l.line), Some(5));
}

#[test]
fn script_store_into_static_container_is_rejected() {
    let script = Script::from_source("diag.ti", "a = [1, 2]\na[0] = 3\n");
    let err = Program::from_script(&script, CompileConfig::default()).err().expect("store should be rejected");
    assert_eq!(err.message(), "Static assign cannot be used on elements in arrays");
}

#[test]
fn recreating_runtime_variable_as_static_is_rejected() {
    let src = r#"
@kernel
def foo():
    a = 1
    a = static(2)
"#;
    let err = compile_error(src, "foo");
    assert_eq!(err.message(), "Recreating variables is not allowed");
    assert_eq!(err.kind(), Some(DiagnosticKind::IllegalRebind));
}

#[test]
fn runtime_return_inside_func_is_rejected() {
    let src = r#"
@func
def pick(x):
    if x > 0:
        return 1
    return 0

@kernel
def foo(x: i32) -> i32:
    return pick(x)
"#;
    let mut program = load(src);
    let err = program.call("foo", &[3i64.into()]).expect_err("should be rejected");
    assert_eq!(err.message(), "Return inside non-static if/for is not supported");
}

#[test]
fn unbounded_recursion_hits_the_inline_limit() {
    let src = r#"
@func
def spin(x):
    return spin(x)

@kernel
def foo() -> i32:
    return spin(1)
"#;
    let config = CompileConfig { max_inline_depth: 8, ..CompileConfig::default() };
    let mut program = Program::from_script(&Script::from_source("deep.ti", src), config).expect("loads");
    let err = program.call("foo", &[]).expect_err("should hit the limit");
    assert_eq!(err.kind(), Some(DiagnosticKind::RecursionLimit));
    assert_eq!(err.level(), Level::Critical);
    assert_eq!(err.message(), "Maximum inline depth 8 exceeded while inlining 'spin'");
}

#[test]
fn undefined_names_are_reported() {
    let err = compile_error("@kernel\ndef foo():\n    y = missing + 1\n", "foo");
    assert_eq!(err.kind(), Some(DiagnosticKind::UndefinedName));
    assert!(err.message().contains("missing"), "{}", err.message());
}

#[test]
fn kernels_cannot_call_kernels() {
    let src = r#"
@kernel
def inner():
    pass

@kernel
def outer():
    inner()
"#;
    let err = compile_error(src, "outer");
    assert_eq!(err.kind(), Some(DiagnosticKind::InvalidCall));
}

#[test]
fn wrong_argument_count_is_reported() {
    let mut program = load("@kernel\ndef foo(x: i32):\n    pass\n");
    let err = program.call("foo", &[]).expect_err("missing argument");
    assert_eq!(err.message(), "Kernel 'foo' takes 1 argument(s) but 0 were given");
}

#[test]
fn kernel_parameters_need_annotations() {
    let script = Script::from_source("untyped.ti", "@kernel\ndef foo(x):\n    pass\n");
    let err = Program::from_script(&script, CompileConfig::default())
        .err()
        .expect("registration should fail");
    assert_eq!(err.message(), "Kernel parameter 'x' needs a type annotation");
}

#[test]
fn parse_errors_carry_a_location() {
    let script = Script::from_source("broken.ti", "@kernel\ndef foo():\n    x = = 1\n");
    let err = Program::from_script(&script, CompileConfig::default())
        .err()
        .expect("parse should fail");
    let location = err.location().expect("parse error has a location");
    assert_eq!(location.file, "broken.ti");
    assert_eq!(location.line, 3);
}

#[test]
fn error_report_formats_level_location_and_message() {
    let err = compile_error("@kernel\ndef foo():\n    1 in [1]\n", "foo");
    let report = generate_error_report(err.as_ref());
    assert!(report.starts_with("TILANG | ERROR | diag.ti:3:"), "{}", report);
    assert!(report.ends_with("| \"In\" is not supported in Taichi kernels."), "{}", report);
}

#[test]
fn check_source_compiles_argument_free_kernels() {
    let ok = Script::from_source("ok.ti", "@kernel\ndef foo() -> i32:\n    return 1\n");
    let program = check_source(&ok, CompileConfig::default()).expect("valid kernel");
    assert_eq!(program.compiled_kernel_count(), 1);

    let bad = Script::from_source("bad.ti", "@kernel\ndef foo():\n    a = 1\n    a = static(2)\n");
    let err = check_source(&bad, CompileConfig::default()).err().expect("invalid kernel");
    assert_eq!(err.message(), "Recreating variables is not allowed");
}
