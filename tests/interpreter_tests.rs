//! Whole-program integration tests driven through the library's
//! `eval_source`/`run_source` entry points, covering the interpreter's
//! documented concrete scenarios end-to-end.

use dynascript::{eval_source, run_source, Value};

#[test]
fn object_census_drops_to_zero_after_temporaries_are_released() {
    let v = eval_source("class Foo { } repeat 10000 { new Foo(); } typeof(Foo).ObjectCount()")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(0));

    let v = eval_source("class Foo { } var x = new Foo(); typeof(Foo).ObjectCount()")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(1));
}

#[test]
fn factorial_recursion() {
    let v = eval_source("fn fact(n) { if (n == 0) { return 1; } return n * fact(n - 1); } fact(5)")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(120));
}

#[test]
fn foreach_sums_an_array() {
    let v = eval_source("var sum = 0; foreach (item in [1, 2, 3, 4]) { sum = sum + item; } sum")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(10));
}

#[test]
fn range_iterates_half_open() {
    let v = eval_source("var n = 0; foreach (i in 0..5) { n = n + 1; } n")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(5));

    let v = eval_source("var n = 0; foreach (i in 0..=5) { n = n + 1; } n")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(6));
}

#[test]
fn enum_auto_increment_with_override() {
    let v = eval_source("enum Color { Red, Green = 2, Blue } Color.Red")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(0));

    let v = eval_source("enum Color { Red, Green = 2, Blue } Color.Green")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(2));

    let v = eval_source("enum Color { Red, Green = 2, Blue } Color.Blue")
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(3));
}

#[test]
fn match_predicate_arm_routes_on_condition() {
    let src = "match 5 { fn (x) => x > 0 : \"positive\", default: \"non-positive\" }";
    let v = eval_source(src).unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::string("positive".to_string()));

    let src = "match -1 { fn (x) => x > 0 : \"positive\", default: \"non-positive\" }";
    let v = eval_source(src).unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::string("non-positive".to_string()));
}

#[test]
fn scope_isolation_for_block_locals() {
    let err = eval_source("{ var x = 1; } x").unwrap_err();
    assert!(err.to_string().contains("x") || err.to_string().contains("undefined"));
}

#[test]
fn division_of_integers_by_zero_raises_runtime_error() {
    let err = eval_source("1 / 0").unwrap_err();
    assert!(err.to_string().to_lowercase().contains("division"));
}

#[test]
fn division_of_reals_by_zero_yields_error_value() {
    let v = eval_source("1.0 / 0.0").unwrap_or_else(|e| panic!("eval error: {e}"));
    assert!(matches!(v, Value::Error(_)));
}

#[test]
fn array_index_out_of_range_is_an_error() {
    assert!(eval_source("var a = [1, 2, 3]; a[-1]").is_err());
    assert!(eval_source("var a = [1, 2, 3]; a[3]").is_err());
}

#[test]
fn run_source_calls_top_level_main_with_argv() {
    let src = r#"
        fn Main(args) {
            return args.Count();
        }
    "#;
    let v = run_source(src, &["one".to_string(), "two".to_string()])
        .unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Integer(2));
}

#[test]
fn run_source_without_main_is_a_no_op_success() {
    let v = run_source("var x = 1 + 1;", &[]).unwrap_or_else(|e| panic!("eval error: {e}"));
    assert_eq!(v, Value::Null);
}

#[test]
fn parse_errors_are_reported_rather_than_panicking() {
    let err = eval_source("var = ;").unwrap_err();
    assert!(!err.to_string().is_empty());
}

mod cli {
    use std::io::Write;
    use std::process::Command;

    fn bin() -> &'static str {
        env!("CARGO_BIN_EXE_dynascript")
    }

    fn write_script(dir: &tempfile::TempDir, name: &str, source: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(source.as_bytes()).unwrap();
        path
    }

    #[test]
    fn run_subcommand_invokes_main_with_trailing_args() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            &dir,
            "main.ds",
            "fn Main(args) { foreach (a in args) { print(a); } }",
        );
        let output = Command::new(bin())
            .arg("run")
            .arg(&script)
            .arg("--")
            .arg("hello")
            .arg("world")
            .output()
            .expect("failed to run binary");
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("hello"));
        assert!(stdout.contains("world"));
    }

    #[test]
    fn load_subcommand_does_not_require_main() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "lib.ds", "var x = 1 + 1;");
        let output = Command::new(bin())
            .arg("load")
            .arg(&script)
            .output()
            .expect("failed to run binary");
        assert!(output.status.success());
    }

    #[test]
    fn multi_file_run_shares_declarations_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let helper = write_script(&dir, "helper.ds", "fn Double(n) { return n * 2; }");
        let main = write_script(&dir, "main.ds", "fn Main(args) { print(Double(21)); }");
        let output = Command::new(bin())
            .arg("run")
            .arg(&helper)
            .arg(&main)
            .output()
            .expect("failed to run binary");
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("42"));
    }
}
