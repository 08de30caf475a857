use std::io::Write;
use std::sync::Arc;

use tilang_core::{
    BufferSink, CompileConfig, DataType, KernelArg, Layout, NdArray, Program, Script, SparseMatrixBuilder, Value,
};

fn load_with_sink(src: &str) -> (Program, Arc<BufferSink>) {
    let sink = Arc::new(BufferSink::new());
    let program = Program::new(CompileConfig::default()).with_sink(sink.clone());
    let mut program = program;
    program
        .load_source(&Script::from_source("program.ti", src))
        .expect("script should load");
    (program, sink)
}

#[test]
fn ndarray_matrix_elements_accumulate() {
    let src = r#"
n = 4
m = 7

@kernel
def run(x: any_arr(element_dim=2, layout=Layout.AOS), y: any_arr()):
    for i in static(range(n)):
        for j in static(range(m)):
            x[i, j][0, 0] += i + j + y[i, j]
"#;
    let (mut program, _) = load_with_sink(src);
    let a = NdArray::matrix(1, 1, DataType::I32, &[4, 7], Layout::AOS);
    let b = NdArray::scalar(DataType::I32, &[4, 7]);
    for i in 0..4i64 {
        for j in 0..7i64 {
            a.set(&[i, j], 0, Value::Int(i * j)).expect("in range");
            b.set(&[i, j], 0, Value::Int(1)).expect("in range");
        }
    }
    program.call("run", &[a.clone().into(), b.into()]).expect("kernel runs");
    for i in 0..4i64 {
        for j in 0..7i64 {
            assert_eq!(a.get(&[i, j], 0).expect("in range"), Value::Int(i * j + i + j + 1));
        }
    }
}

#[test]
fn ndarray_layout_mismatch_is_rejected() {
    let src = "@kernel\ndef run(x: any_arr(element_dim=1, layout=Layout.SOA)):\n    pass\n";
    let (mut program, _) = load_with_sink(src);
    let wrong = NdArray::new(DataType::F32, &[3], &[2], Layout::AOS);
    let err = program.call("run", &[wrong.into()]).expect_err("layout differs");
    assert!(err.message().contains("layout"), "{}", err.message());
}

#[test]
fn runtime_loop_over_ndarray() {
    let src = r#"
@kernel
def scale(v: any_arr(), k: f32):
    for i, j in v:
        v[i, j] = v[i, j] * k
"#;
    let (mut program, _) = load_with_sink(src);
    let v = NdArray::scalar(DataType::F32, &[2, 3]);
    v.set(&[1, 2], 0, Value::Float(1.5)).expect("in range");
    program.call("scale", &[v.clone().into(), 2.0f64.into()]).expect("kernel runs");
    assert_eq!(v.get(&[1, 2], 0).expect("in range"), Value::Float(3.0));
    assert_eq!(v.get(&[0, 0], 0).expect("in range"), Value::Float(0.0));
}

#[test]
fn sparse_matrix_builder_collects_triplets() {
    let src = r#"
n = 8

@kernel
def fill(builder: sparse_matrix_builder()):
    for i, j in static(ndrange(n, n)):
        builder[i, j] += i + j
"#;
    let (mut program, _) = load_with_sink(src);
    let builder = SparseMatrixBuilder::new(8, 8, 100);
    program.call("fill", &[builder.clone().into()]).expect("kernel runs");
    let matrix = builder.build();
    assert_eq!(matrix.shape(), (8, 8));
    for i in 0..8 {
        for j in 0..8 {
            assert_eq!(matrix.get(i, j), (i + j) as f64);
        }
    }
}

#[test]
fn sparse_builder_capacity_is_enforced_at_runtime() {
    let src = r#"
@kernel
def fill(builder: sparse_matrix_builder()):
    for i in range(4):
        builder[i, i] += 1.0
"#;
    let (mut program, _) = load_with_sink(src);
    let builder = SparseMatrixBuilder::new(4, 4, 2);
    let err = program.call("fill", &[builder.into()]).expect_err("builder overflows");
    assert!(err.message().contains("full"), "{}", err.message());
}

#[test]
fn kernel_print_formats_runtime_values() {
    let src = r#"
a = field(i32, shape=(10,))

@kernel
def foo():
    a[0] = 1.0
    a[5] = 2.0
    print('Test if the string.format and fstring print works')
    print('string.format: a[0]={}, a[5]={}'.format(a[0], a[5]))
    print(f'fstring: a[0]={a[0]}, a[5]={a[5]}')
"#;
    let (mut program, sink) = load_with_sink(src);
    program.call("foo", &[]).expect("kernel runs");
    assert_eq!(
        sink.lines(),
        vec![
            "Test if the string.format and fstring print works".to_string(),
            "string.format: a[0]=1, a[5]=2".to_string(),
            "fstring: a[0]=1, a[5]=2".to_string(),
        ]
    );
}

#[test]
fn script_level_print_goes_to_the_sink() {
    let (_, sink) = load_with_sink("x = 3\nprint('x is', x, sep=' ')\n");
    assert_eq!(sink.lines(), vec!["x is 3".to_string()]);
}

#[test]
fn specializations_are_cached_per_signature() {
    let src = r#"
@kernel
def add(x: i32, k: template()) -> i32:
    return x + k
"#;
    let (mut program, _) = load_with_sink(src);
    let k = |v: i64| KernelArg::Template(tilang_core::StaticValue::Int(v));

    assert_eq!(program.call("add", &[1i64.into(), k(10)]).expect("runs"), Some(Value::Int(11)));
    assert_eq!(program.call("add", &[2i64.into(), k(10)]).expect("runs"), Some(Value::Int(12)));
    assert_eq!(program.compiled_kernel_count(), 1);

    assert_eq!(program.call("add", &[2i64.into(), k(20)]).expect("runs"), Some(Value::Int(22)));
    assert_eq!(program.compiled_kernel_count(), 2);
    assert_eq!(program.kernel_names(), vec!["add".to_string()]);
}

#[test]
fn redefining_globals_invalidates_compiled_kernels() {
    let src = r#"
scale = 2

@kernel
def twice(x: i32) -> i32:
    return x * scale
"#;
    let (mut program, _) = load_with_sink(src);
    assert_eq!(program.call("twice", &[5i64.into()]).expect("runs"), Some(Value::Int(10)));
    program
        .load_source(&Script::from_source("update.ti", "scale = 3\n"))
        .expect("update loads");
    assert_eq!(program.compiled_kernel_count(), 0);
    assert_eq!(program.call("twice", &[5i64.into()]).expect("runs"), Some(Value::Int(15)));
}

#[test]
fn float_arguments_are_narrowed_to_the_parameter_type() {
    let src = "@kernel\ndef trunc(x: i32) -> i32:\n    return x\n";
    let (mut program, _) = load_with_sink(src);
    assert_eq!(program.call("trunc", &[2.75f64.into()]).expect("runs"), Some(Value::Int(2)));
}

#[test]
fn scripts_and_config_load_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let script_path = dir.path().join("disk.ti");
    let mut file = std::fs::File::create(&script_path).expect("create script");
    writeln!(file, "@kernel\ndef half(x: f32) -> f32:\n    return x / 2").expect("write script");

    let config_path = dir.path().join("tilang.json");
    std::fs::write(&config_path, r#"{ "optimize": false, "default_float": "f64" }"#).expect("write config");

    let config = CompileConfig::from_json_file(&config_path).expect("config parses");
    assert!(!config.optimize);
    assert_eq!(config.default_float, DataType::F64);

    let script = Script::new(script_path).expect("script reads");
    assert_eq!(script.name, "disk.ti");
    let mut program = Program::from_script(&script, config).expect("loads");
    assert_eq!(program.call("half", &[3.0f64.into()]).expect("runs"), Some(Value::Float(1.5)));
}

#[test]
fn missing_script_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = Script::new(dir.path().join("absent.ti")).err().expect("no such file");
    assert!(err.message().starts_with("Missing script at"), "{}", err.message());
}
