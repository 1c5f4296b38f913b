//! Driver tests: compile real files through the CLI entry points.

use std::io::Write;

use tarn_cli::args::CliArgs;
use tarn_cli::driver;

fn run_source(source: &str, disasm: bool, json: bool) -> (i32, String) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("input.tarn");
    let mut file = std::fs::File::create(&path).expect("create source");
    file.write_all(source.as_bytes()).expect("write source");

    let args = CliArgs {
        input: path,
        disasm,
        json,
        log_level: None,
    };
    let mut out = Vec::new();
    let code = driver::run(&args, &mut out).expect("driver runs");
    (code, String::from_utf8(out).expect("utf-8 output"))
}

#[test]
fn successful_compilation_exits_zero_and_prints_nothing_by_default() {
    let (code, out) = run_source("fn main() { x := 1; x = x + 1; }", false, false);
    assert_eq!(code, 0);
    assert!(out.is_empty());
}

#[test]
fn disasm_prints_the_listing() {
    let (code, out) = run_source("fn main() { }", true, false);
    assert_eq!(code, 0);
    assert!(out.contains("halt"));
    assert!(out.contains("enter frame"));
}

#[test]
fn json_listing_carries_offsets_and_globals() {
    let (code, out) = run_source("g := 5\nfn main() { }", false, true);
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&out).expect("valid json");
    assert_eq!(value["globals_size"], 8);
    assert!(value["code"].as_array().is_some_and(|code| !code.is_empty()));
}

#[test]
fn a_diagnostic_exits_nonzero_and_names_the_location() {
    let (code, out) = run_source("fn main() { y = 1; }", false, false);
    assert_eq!(code, 1);
    assert!(out.contains("input.tarn:1:"));
    assert!(out.contains("Unknown identifier y"));
}

#[test]
fn missing_input_file_is_a_driver_error() {
    let args = CliArgs {
        input: "no-such-file.tarn".into(),
        disasm: false,
        json: false,
        log_level: None,
    };
    let mut out = Vec::new();
    let err = driver::run(&args, &mut out).unwrap_err();
    assert!(err.to_string().contains("no-such-file.tarn"));
}
