use std::path::PathBuf;

use assert_cmd::Command;

const SAMPLE: &str = r#"
grid = field(i32, shape=(4,))
scale = 3

@kernel
def fill(x: i32):
    for i in grid:
        grid[i] = i * x

@kernel
def total(x: i32) -> i32:
    acc = 0
    for i in range(x):
        acc += i * scale
    return acc

@kernel
def greet():
    print(f'hello {scale}')
"#;

fn write_sample(dir: &tempfile::TempDir, source: &str) -> PathBuf {
    let path = dir.path().join("sample.ti");
    std::fs::write(&path, source).expect("write sample");
    path
}

fn tilang() -> Command {
    let mut cmd = Command::cargo_bin("tilang").expect("binary is built");
    cmd.env_remove("TILANG_LOG");
    cmd
}

#[test]
fn run_prints_the_returned_value() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sample = write_sample(&dir, SAMPLE);
    let output = tilang()
        .args(["run", sample.to_str().expect("utf8 path"), "--kernel", "total", "--arg", "4"])
        .output()
        .expect("spawn tilang");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("total returned 18"), "{}", stdout);
}

#[test]
fn run_forwards_kernel_prints_and_shows_fields() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sample = write_sample(&dir, SAMPLE);
    let path = sample.to_str().expect("utf8 path");

    let output = tilang().args(["run", path, "-k", "greet"]).output().expect("spawn tilang");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hello 3"));

    let output = tilang()
        .args(["run", path, "-k", "fill", "-a", "2", "--show-fields"])
        .output()
        .expect("spawn tilang");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("grid"), "{}", stdout);
    assert!(stdout.contains("0, 2, 4, 6"), "{}", stdout);
}

#[test]
fn ir_dumps_the_lowered_kernel() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sample = write_sample(&dir, SAMPLE);
    let output = tilang()
        .args(["ir", sample.to_str().expect("utf8 path"), "--kernel", "total", "--arg", "1"])
        .output()
        .expect("spawn tilang");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("kernel total"), "{}", stdout);
    assert!(stdout.contains("RangeFor"), "{}", stdout);
}

#[test]
fn check_reports_diagnostics_and_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sample = write_sample(&dir, "@kernel\ndef bad():\n    a = 1\n    a = static(2)\n");
    let output = tilang()
        .args(["check", sample.to_str().expect("utf8 path")])
        .output()
        .expect("spawn tilang");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TILANG | ERROR | sample.ti:4:"), "{}", stderr);
    assert!(stderr.contains("Recreating variables is not allowed"), "{}", stderr);
}

#[test]
fn check_accepts_a_valid_script() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sample = write_sample(&dir, SAMPLE);
    tilang()
        .args(["check", sample.to_str().expect("utf8 path")])
        .assert()
        .success();
}

#[test]
fn config_file_is_honoured() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sample = write_sample(&dir, SAMPLE);
    let config = dir.path().join("bad.json");
    std::fs::write(&config, r#"{ "max_inline_depth": 0 }"#).expect("write config");
    let output = tilang()
        .args(["--config", config.to_str().expect("utf8 path"), "check", sample.to_str().expect("utf8 path")])
        .output()
        .expect("spawn tilang");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_inline_depth"));
}

#[test]
fn missing_script_fails_cleanly() {
    tilang().args(["check", "/definitely/not/here.ti"]).assert().failure();
}
