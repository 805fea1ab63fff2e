//! Integration tests for the CLI application
//!
//! These tests run the `rsdm` binary on generated bag files.

use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::{NamedTempFile, TempDir};

/// Deterministic pseudo-random offsets in [-1, 1)
fn jitter(i: usize) -> f64 {
    let x = ((i as u64).wrapping_mul(2654435761) % 1000) as f64;
    x / 500.0 - 1.0
}

/// CSV with `n_bags` bags of 12 two-dimensional points; odd bags sit at (5, 5)
fn write_bags_csv(n_bags: usize, offset: usize) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::with_suffix(".csv")?;
    writeln!(file, "# generated bags")?;
    writeln!(file, "bag,label,x,y")?;
    let mut t = offset * 1000;
    for b in 0..n_bags {
        let label = b % 2;
        let center = 5.0 * label as f64;
        for _ in 0..12 {
            writeln!(
                file,
                "bag{b},{label},{:.4},{:.4}",
                center + jitter(t),
                center + jitter(t + 7)
            )?;
            t += 13;
        }
    }
    file.flush()?;
    Ok(file)
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rsdm"))
        .args(args)
        .output()
        .expect("Failed to execute CLI command")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["divs", "cv", "cv-divs", "predict"] {
        assert!(stdout.contains(command), "help lacks {command}");
    }
}

#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_divs_command() {
    let data = write_bags_csv(4, 0).unwrap();
    let output = run_cli(&[
        "divs",
        "--data",
        path_str(data.path()),
        "--div-func",
        "hellinger",
        "--div-func",
        "l2",
    ]);
    let json = stdout_json(&output);

    assert_eq!(json["shape"], serde_json::json!([2, 4, 4]));
    assert_eq!(json["div_funcs"][0], "hellinger");
    assert!(json["timestamp"].is_string());
    assert_eq!(json["divs"][0][2][2], 0.0);
}

#[test]
fn test_divs_command_writes_file_with_f32() {
    let data = write_bags_csv(4, 1).unwrap();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("divs.json");
    let output = run_cli(&[
        "divs",
        "--data",
        path_str(data.path()),
        "--dtype",
        "f32",
        "-o",
        path_str(&out),
    ]);
    assert!(output.status.success());
    let json: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["shape"], serde_json::json!([1, 4, 4]));
}

#[test]
fn test_cv_command() {
    let data = write_bags_csv(12, 2).unwrap();
    let output = run_cli(&[
        "cv",
        "--data",
        path_str(data.path()),
        "--div-func",
        "renyi:.9",
        "--folds",
        "3",
        "--seed",
        "1",
        "--c-vals",
        "1,32",
    ]);
    let json = stdout_json(&output);

    assert_eq!(json["task"], "classification");
    assert_eq!(json["direction"], "higher_is_better");
    assert_eq!(json["fold_scores"].as_array().unwrap().len(), 3);
    assert!(json["score"].as_f64().unwrap() >= 0.9);
}

#[test]
fn test_cv_divs_command() {
    let mut divs = NamedTempFile::with_suffix(".json").unwrap();
    let n = 9;
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| match (i == j, i % 3 == j % 3) {
                    (true, _) => 0.0,
                    (false, true) => 0.1,
                    (false, false) => 2.0,
                })
                .collect()
        })
        .collect();
    let labels: Vec<usize> = (0..n).map(|i| i % 3).collect();
    write!(
        divs,
        "{}",
        serde_json::json!({ "divs": rows, "labels": labels })
    )
    .unwrap();
    divs.flush().unwrap();

    let output = run_cli(&[
        "cv-divs",
        "--divs",
        path_str(divs.path()),
        "--folds",
        "3",
        "--tuning-folds",
        "2",
        "--stratified",
        "--seed",
        "4",
    ]);
    let json = stdout_json(&output);
    assert_eq!(json["score"].as_f64().unwrap(), 1.0);
    assert!(json.get("div_func").is_none());
}

#[test]
fn test_predict_command() {
    let train = write_bags_csv(10, 3).unwrap();
    let test = write_bags_csv(2, 4).unwrap();
    for transduct in [false, true] {
        let mut args = vec![
            "predict",
            "--train",
            path_str(train.path()),
            "--test",
            path_str(test.path()),
            "--div-func",
            "hellinger",
            "--seed",
            "0",
            "--confidence",
        ];
        if transduct {
            args.push("--transduct");
        }
        let json = stdout_json(&run_cli(&args));
        let predictions = json["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0]["id"], "bag0");
        assert_eq!(predictions[0]["label"], 0.0);
        assert_eq!(predictions[1]["label"], 1.0);
        assert_eq!(json["transductive"], transduct);
        assert_eq!(predictions[0].get("confidence").is_some(), !transduct);
    }
}

#[test]
fn test_config_file_is_applied() {
    let data = write_bags_csv(4, 5).unwrap();
    let mut config = NamedTempFile::with_suffix(".json").unwrap();
    write!(config, r#"{{"k": 20, "flann_params": {{"algorithm": "linear"}}}}"#).unwrap();
    config.flush().unwrap();

    // 12 points per bag cannot support k = 20
    let output = run_cli(&[
        "divs",
        "--data",
        path_str(data.path()),
        "--config",
        path_str(config.path()),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("at least 21"));
}

#[test]
fn test_error_cases() {
    // Missing file
    let output = run_cli(&["cv", "--data", "/nonexistent/bags.csv"]);
    assert!(!output.status.success());

    // Unknown divergence function
    let data = write_bags_csv(4, 6).unwrap();
    let output = run_cli(&[
        "divs",
        "--data",
        path_str(data.path()),
        "--div-func",
        "wasserstein",
    ]);
    assert!(!output.status.success());

    // Integer storage type for bag values
    let output = run_cli(&["divs", "--data", path_str(data.path()), "--dtype", "i32"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported scalar type"));

    // More folds than bags
    let output = run_cli(&["cv", "--data", path_str(data.path()), "--folds", "10"]);
    assert!(!output.status.success());
}
