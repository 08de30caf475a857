use std::sync::Arc;

use tilang_core::{BufferSink, CompileConfig, KernelArg, Program, Script, Value};

fn load(src: &str) -> Program {
    let script = Script::from_source("arith.ti", src);
    Program::from_script(&script, CompileConfig::default())
        .expect("script should load")
        .with_sink(Arc::new(BufferSink::new()))
}

fn global(name: &str) -> KernelArg {
    KernelArg::Global(name.to_string())
}

fn field_values(program: &Program, name: &str) -> Vec<f64> {
    program
        .field(name)
        .unwrap_or_else(|| panic!("field {} missing", name))
        .to_vec()
        .iter()
        .map(Value::as_f64)
        .collect()
}

fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len());
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!((g - w).abs() < 1e-4, "element {}: got {}, want {}", i, g, w);
    }
}

#[test]
fn binary_operators_match_host_evaluation() {
    let src = r#"
@kernel
def foo(x: i32, y: i32, a: template()):
    a[0] = x + y
    a[1] = x - y
    a[2] = x * y
    a[3] = ti_float(x) / y
    a[4] = x // y
    a[5] = x % y
    a[6] = x ** y
    a[7] = x << y
    a[8] = x >> y
    a[9] = x | y
    a[10] = x ^ y
    a[11] = x & y

x = 37
y = 3
a = field(f32, shape=(12,))
b = field(f32, shape=(12,))

a[0] = x + y
a[1] = x - y
a[2] = x * y
a[3] = x / y
a[4] = x // y
a[5] = x % y
a[6] = x ** y
a[7] = x << y
a[8] = x >> y
a[9] = x | y
a[10] = x ^ y
a[11] = x & y
"#;
    let mut program = load(src);
    program.call("foo", &[37i64.into(), 3i64.into(), global("b")]).expect("kernel runs");

    let expected = [40.0, 34.0, 111.0, 37.0 / 3.0, 12.0, 1.0, 50653.0, 296.0, 4.0, 39.0, 38.0, 1.0];
    assert_close(&field_values(&program, "a"), &expected);
    assert_close(&field_values(&program, "b"), &expected);
}

#[test]
fn augmented_assignment_on_field_elements() {
    let src = r#"
@kernel
def foo(x: i32, y: i32, a: template(), b: template()):
    for i in a:
        a[i] = x
    a[0] += y
    a[1] -= y
    a[2] *= y
    a[3] //= y
    a[4] %= y
    a[5] **= y
    a[6] <<= y
    a[7] >>= y
    a[8] |= y
    a[9] ^= y
    a[10] &= y
    b[0] = x
    b[0] /= y

b = field(i32, shape=(11,))
d = field(f32, shape=(1,))
"#;
    let mut program = load(src);
    program
        .call("foo", &[37i64.into(), 3i64.into(), global("b"), global("d")])
        .expect("kernel runs");

    assert_close(
        &field_values(&program, "b"),
        &[40.0, 34.0, 111.0, 12.0, 1.0, 50653.0, 296.0, 4.0, 39.0, 38.0, 1.0],
    );
    assert_close(&field_values(&program, "d"), &[37.0 / 3.0]);
}

#[test]
fn unary_operators() {
    let src = r#"
@kernel
def foo(x: i32, a: template()):
    a[0] = +x
    a[1] = -x
    a[2] = not x
    a[3] = ~x

b = field(i32, shape=(4,))
"#;
    let mut program = load(src);
    program.call("foo", &[1234i64.into(), global("b")]).expect("kernel runs");
    assert_close(&field_values(&program, "b"), &[1234.0, -1234.0, 0.0, -1235.0]);
}

#[test]
fn single_compares_on_static_vectors() {
    let src = r#"
@kernel
def foo(a: template(), b: template(), c: template()):
    for i in static(range(3)):
        c[i * 6] = a[i] == b[i]
        c[i * 6 + 1] = a[i] != b[i]
        c[i * 6 + 2] = a[i] < b[i]
        c[i * 6 + 3] = a[i] <= b[i]
        c[i * 6 + 4] = a[i] > b[i]
        c[i * 6 + 5] = a[i] >= b[i]

a = Vector([1, 1, 2])
b = Vector([2, 1, 1])
d = field(i32, shape=(18,))
"#;
    let mut program = load(src);
    program.call("foo", &[global("a"), global("b"), global("d")]).expect("kernel runs");

    let pairs = [(1, 2), (1, 1), (2, 1)];
    let mut expected = Vec::new();
    for (a, b) in pairs {
        for truth in [a == b, a != b, a < b, a <= b, a > b, a >= b] {
            expected.push(truth as i64 as f64);
        }
    }
    assert_close(&field_values(&program, "d"), &expected);
}

#[test]
fn chained_compares_short_circuit_like_python() {
    let src = r#"
@kernel
def foo(a: i32, b: i32, c: template()):
    c[0] = a == b == a
    c[1] = a == b != a
    c[2] = a != b == a
    c[3] = a < b > a
    c[4] = a > b < a
    c[5] = a < b < a
    c[6] = a > b > a
    c[7] = a == a == a == a
    c[8] = a == a == a != a
    c[9] = a < b > a < b
    c[10] = a > b > a < b

d = field(i32, shape=(11,))
"#;
    let mut program = load(src);
    program.call("foo", &[1i64.into(), 2i64.into(), global("d")]).expect("kernel runs");

    let (a, b) = (1, 2);
    let expected = [
        a == b && b == a,
        a == b && b != a,
        a != b && b == a,
        a < b && b > a,
        a > b && b < a,
        a < b && b < a,
        a > b && b > a,
        true,
        false,
        a < b && b > a && a < b,
        a > b && b > a && a < b,
    ];
    let expected: Vec<f64> = expected.iter().map(|t| *t as i64 as f64).collect();
    assert_close(&field_values(&program, "d"), &expected);
}

#[test]
fn script_level_values_are_folded_into_globals() {
    let src = r#"
n = 4
m = n * 2 + 1
name = 'grid'
"#;
    let program = load(src);
    assert_eq!(program.global("m").and_then(|v| v.as_int()), Some(9));
    assert_eq!(program.global("n").and_then(|v| v.as_int()), Some(4));
    assert!(program.global("name").is_some());
    assert!(program.global("missing").is_none());
}
