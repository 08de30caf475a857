use std::sync::Arc;

use tilang_core::{BufferSink, CompileConfig, KernelArg, Program, Script, StaticValue, Value};

fn load(src: &str) -> Program {
    let script = Script::from_source("control.ti", src);
    Program::from_script(&script, CompileConfig::default())
        .expect("script should load")
        .with_sink(Arc::new(BufferSink::new()))
}

fn call_int(program: &mut Program, name: &str, args: &[KernelArg]) -> i64 {
    match program.call(name, args).expect("kernel runs") {
        Some(Value::Int(v)) => v,
        other => panic!("{} returned {:?}", name, other),
    }
}

fn template(v: i64) -> KernelArg {
    KernelArg::Template(StaticValue::Int(v))
}

#[test]
fn return_value_of_expression() {
    let mut program = load("@kernel\ndef foo(x: i32) -> i32:\n    return x + 1\n");
    assert_eq!(call_int(&mut program, "foo", &[1i64.into()]), 2);
}

#[test]
fn runtime_if_selects_branch() {
    let src = r#"
@kernel
def foo(x: i32) -> i32:
    ret = 0
    if x:
        ret = 1
    else:
        ret = 0
    return ret
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "foo", &[1i64.into()]), 1);
    assert_eq!(call_int(&mut program, "foo", &[0i64.into()]), 0);
}

#[test]
fn static_if_compiles_one_branch_per_specialization() {
    let src = r#"
@kernel
def foo(x: template()) -> i32:
    ret = 0
    if static(x):
        ret = 1
    else:
        ret = 0
    return ret
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "foo", &[template(1)]), 1);
    assert_eq!(call_int(&mut program, "foo", &[template(0)]), 0);
    assert_eq!(program.compiled_kernel_count(), 2);

    let ir = program.kernel_ir("foo");
    assert_eq!(ir.len(), 2);
    for kernel in ir {
        let text = kernel.to_string();
        assert!(!text.contains("BrFalse"), "static if left a branch:\n{}", text);
    }
}

#[test]
fn struct_for_visits_every_element() {
    let src = r#"
a = field(i32, shape=(10,))

@kernel
def foo(x: i32):
    for i in a:
        a[i] = x
"#;
    let mut program = load(src);
    program.call("foo", &[5i64.into()]).expect("kernel runs");
    let a = program.field("a").expect("field a");
    assert!(a.to_vec().iter().all(|v| *v == Value::Int(5)));
}

#[test]
fn static_for_unrolls_the_body() {
    let src = r#"
a = field(i32, shape=(10,))

@kernel
def foo(x: i32):
    for i in static(range(10)):
        a[i] = x
"#;
    let mut program = load(src);
    program.call("foo", &[5i64.into()]).expect("kernel runs");
    assert!(program.field("a").expect("field a").to_vec().iter().all(|v| *v == Value::Int(5)));

    let ir = program.kernel_ir("foo").remove(0);
    assert!(!ir.to_string().contains("RangeFor"));
}

#[test]
fn range_and_ndrange_loops_run_at_runtime() {
    let src = r#"
grid = field(i32, shape=(3, 4))

@kernel
def sum_to(n: i32) -> i32:
    total = 0
    for i in range(n):
        total += i
    return total

@kernel
def fill():
    for i, j in ndrange(3, (1, 4)):
        grid[i, j] = i * 10 + j
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "sum_to", &[5i64.into()]), 10);
    program.call("fill", &[]).expect("fill runs");

    let grid = program.field("grid").expect("grid");
    assert_eq!(grid.get(&[2, 3]).expect("in range"), Value::Int(23));
    assert_eq!(grid.get(&[1, 1]).expect("in range"), Value::Int(11));
    assert_eq!(grid.get(&[0, 0]).expect("in range"), Value::Int(0));
}

#[test]
fn while_with_break_and_continue() {
    let src = r#"
@kernel
def odd_sum(n: i32) -> i32:
    total = 0
    i = 0
    while True:
        i += 1
        if i > n:
            break
        if i % 2 == 0:
            continue
        total += i
    return total
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "odd_sum", &[7i64.into()]), 16);
}

#[test]
fn return_inside_runtime_if_of_a_kernel() {
    let src = r#"
@kernel
def sign(x: i32) -> i32:
    if x < 0:
        return -1
    return 1
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "sign", &[(-4i64).into()]), -1);
    assert_eq!(call_int(&mut program, "sign", &[9i64.into()]), 1);
}

#[test]
fn func_returning_a_tuple_is_unpacked() {
    let src = r#"
@func
def bar(x):
    return x * x, -x

a = field(i32, shape=(10,))
b = field(i32, shape=(10,))

@kernel
def foo():
    for i in a:
        a[i], b[i] = bar(i)
"#;
    let mut program = load(src);
    program.call("foo", &[]).expect("kernel runs");
    let a = program.field("a").expect("a");
    let b = program.field("b").expect("b");
    for i in 0..10i64 {
        assert_eq!(a.get(&[i]).expect("a[i]"), Value::Int(i * i));
        assert_eq!(b.get(&[i]).expect("b[i]"), Value::Int(-i));
    }
}

#[test]
fn recursive_template_func_through_host_function() {
    let src = r#"
@func
def bar(x: template()):
    if static(x):
        mat = bar(x // 2)
        mat = mat @ mat
        if static(x % 2):
            mat = mat @ Matrix([[1, 1], [1, 0]])
        return mat
    else:
        return Matrix([[1, 0], [0, 1]])

def fibonacci(x):
    return subscript(bar(x), 1, 0)

@kernel
def foo(x: template()) -> i32:
    return fibonacci(x)
"#;
    let mut program = load(src);
    let fib = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34];
    for (i, want) in fib.iter().enumerate() {
        assert_eq!(call_int(&mut program, "foo", &[template(i as i64)]), *want, "fib({})", i);
    }
}

#[test]
fn conditional_expressions() {
    let src = r#"
@kernel
def foo(x: i32) -> i32:
    return 1 if x else 0

@kernel
def bar(x: template()) -> i32:
    return 1 if static(x) else 0
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "foo", &[1i64.into()]), 1);
    assert_eq!(call_int(&mut program, "foo", &[0i64.into()]), 0);
    assert_eq!(call_int(&mut program, "bar", &[template(1)]), 1);
    assert_eq!(call_int(&mut program, "bar", &[template(0)]), 0);
}

#[test]
fn static_assign_aliases_template_fields() {
    let src = r#"
a = field(i32, shape=(1,))
b = field(i32, shape=(1,))
a[0] = 2
b[0] = 3

@kernel
def foo(xx: template(), yy: template()) -> i32:
    x, y = static(xx, yy)
    x[0] -= 1
    y[0] -= 1
    return x[0] + y[0]
"#;
    let mut program = load(src);
    let args = [KernelArg::Global("a".to_string()), KernelArg::Global("b".to_string())];
    assert_eq!(call_int(&mut program, "foo", &args), 3);
    assert_eq!(program.field("a").expect("a").get(&[0]).expect("a[0]"), Value::Int(1));
}

#[test]
fn logical_operators_short_circuit() {
    let src = r#"
hits = field(i32, shape=(1,))

@func
def touch() -> i32:
    hits[0] += 1
    return 1

@kernel
def foo(x: i32) -> i32:
    return x > 0 and touch() == 1
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "foo", &[0i64.into()]), 0);
    assert_eq!(program.field("hits").expect("hits").get(&[0]).expect("hits[0]"), Value::Int(0));
    assert_eq!(call_int(&mut program, "foo", &[3i64.into()]), 1);
    assert_eq!(program.field("hits").expect("hits").get(&[0]).expect("hits[0]"), Value::Int(1));
}

#[test]
fn chained_compare_evaluates_shared_operand_once() {
    let src = r#"
hits = field(i32, shape=(1,))

@func
def mid(x) -> i32:
    hits[0] += 1
    return x

@kernel
def foo(a: i32, b: i32) -> i32:
    return a < mid(b) > a
"#;
    let mut program = load(src);
    assert_eq!(call_int(&mut program, "foo", &[1i64.into(), 5i64.into()]), 1);
    assert_eq!(program.field("hits").expect("hits").get(&[0]).expect("hits[0]"), Value::Int(1));
}

#[test]
fn static_selection_skips_side_effects_of_the_other_branch() {
    let src = r#"
hits = field(i32, shape=(1,))

@func
def touch() -> i32:
    hits[0] += 1
    return 1

@kernel
def pick(c: template()) -> i32:
    return 2 if static(c) else touch()

@kernel
def branch(c: template()) -> i32:
    ret = 0
    if static(c):
        ret = 2
    else:
        ret = touch()
    return ret
"#;
    let mut program = load(src);
    let hits = |program: &Program| program.field("hits").expect("hits").get(&[0]).expect("hits[0]");

    assert_eq!(call_int(&mut program, "pick", &[template(1)]), 2);
    assert_eq!(call_int(&mut program, "branch", &[template(1)]), 2);
    assert_eq!(hits(&program), Value::Int(0));

    assert_eq!(call_int(&mut program, "pick", &[template(0)]), 1);
    assert_eq!(hits(&program), Value::Int(1));
    assert_eq!(call_int(&mut program, "branch", &[template(0)]), 1);
    assert_eq!(hits(&program), Value::Int(2));
}
