//! End-to-end tests for the `qnode` binary.
//!
//! The CLI is a binary crate, so these tests drive the built executable
//! with temporary config and input files.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const CONFIG: &str = r#"
nodes:
  - n_wires: 2
    encoder_op_list_name: 2_ry
    q_layer_name: rxyzcx_s0
    seed: 3
  - n_wires: 2
    encoder_op_list_name: 2_ry
    q_layer_name: seth_s0
    seed: 4
act_norm: batch_norm_no_last
batch: 2
"#;

const INPUT: &str = r#"{"x": [[0.1, 0.7], [1.2, -0.4], [0.5, 0.5], [-0.9, 0.3]]}"#;

fn qnode(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qnode"))
        .args(args)
        .env_remove("QNODE_BACKEND")
        .env_remove("QNODE_SHOTS")
        .env_remove("QNODE_SEED")
        .output()
        .expect("failed to launch qnode")
}

fn setup(config: &str, input: &str) -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pipeline.yml");
    let input_path = dir.path().join("batch.json");
    std::fs::write(&config_path, config).unwrap();
    std::fs::write(&input_path, input).unwrap();
    (dir, config_path, input_path)
}

fn s(p: &Path) -> &str {
    p.to_str().unwrap()
}

fn read_json(p: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(p).unwrap()).unwrap()
}

#[test]
fn test_forward_writes_outputs() {
    let (dir, config, input) = setup(CONFIG, INPUT);
    let out = dir.path().join("y.json");
    let result = qnode(&["forward", "-c", s(&config), "-i", s(&input), "-o", s(&out)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let json = read_json(&out);
    let y = json["y"].as_array().unwrap();
    assert_eq!(y.len(), 4);
    for row in y {
        let row = row.as_array().unwrap();
        assert_eq!(row.len(), 2);
        for v in row {
            let v = v.as_f64().unwrap();
            assert!((-1.0..=1.0).contains(&v));
        }
    }
}

#[test]
fn test_forward_is_deterministic_with_seeds() {
    let (dir, config, input) = setup(CONFIG, INPUT);
    let a = dir.path().join("a.json");
    let b = dir.path().join("b.json");
    assert!(qnode(&["forward", "-c", s(&config), "-i", s(&input), "-o", s(&a)]).status.success());
    assert!(qnode(&["forward", "-c", s(&config), "-i", s(&input), "-o", s(&b)]).status.success());
    assert_eq!(read_json(&a), read_json(&b));
}

#[test]
fn test_grad_reports_every_weight() {
    let (dir, config, input) = setup(CONFIG, INPUT);
    let out = dir.path().join("g.json");
    let result = qnode(&["grad", "-c", s(&config), "-i", s(&input), "-o", s(&out)]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let json = read_json(&out);
    let grads = json["gradients"].as_array().unwrap();
    assert_eq!(grads.len(), 2);
    // rxyzcx_s0: 3 rotations per wire; seth_s0: RZZ on both ring edges plus RY per wire.
    assert_eq!(grads[0].as_array().unwrap().len(), 6);
    assert_eq!(grads[1].as_array().unwrap().len(), 4);
    assert!(grads.iter().flat_map(|g| g.as_array().unwrap()).all(|v| v.as_f64().unwrap().is_finite()));
}

#[test]
fn test_train_reduces_loss() {
    let (dir, config, input) = setup(CONFIG, INPUT);
    let out = dir.path().join("t.json");
    let result = qnode(&[
        "train", "-c", s(&config), "-i", s(&input), "-e", "15", "--lr", "0.05", "-o", s(&out),
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let json = read_json(&out);
    let losses: Vec<f64> = json["losses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    assert_eq!(losses.len(), 15);
    assert!(losses.last().unwrap() < losses.first().unwrap());
    assert_eq!(json["parameters"].as_array().unwrap().len(), 2);
}

#[test]
fn test_train_with_short_final_batch() {
    // batch: 2 over 5 rows leaves one row, which batch norm cannot use alone.
    let input = r#"{"x": [[0.1, 0.7], [1.2, -0.4], [0.5, 0.5], [-0.9, 0.3], [0.2, -1.1]]}"#;
    let (dir, config, input) = setup(CONFIG, input);
    let out = dir.path().join("t.json");
    let result = qnode(&[
        "train", "-c", s(&config), "-i", s(&input), "-e", "2", "-o", s(&out),
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
    assert_eq!(read_json(&out)["losses"].as_array().unwrap().len(), 2);
}

#[test]
fn test_train_rejects_zero_epochs() {
    let (_dir, config, input) = setup(CONFIG, INPUT);
    let result = qnode(&["train", "-c", s(&config), "-i", s(&input), "-e", "0"]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("--epochs"));
}

#[test]
fn test_layers_lists_names() {
    let result = qnode(&["layers", "--wires", "4", "--blocks", "2"]);
    assert!(result.status.success());
    let stdout = String::from_utf8_lossy(&result.stdout);
    for name in ["4x4_ryzxy", "u3cu3_s0", "farhi_s0", "layer_norm_no_last"] {
        assert!(stdout.contains(name), "missing {name}");
    }
    // u3cu3_s0 on 4 wires, 2 blocks: (4 × 3 + 4 × 3) × 2
    assert!(stdout.contains("48"));
}

#[test]
fn test_missing_config_file() {
    let (_dir, _config, input) = setup(CONFIG, INPUT);
    let result = qnode(&["forward", "-c", "/nonexistent/pipeline.yml", "-i", s(&input)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("File not found"));
}

#[test]
fn test_unknown_layer_in_config() {
    let bad = CONFIG.replace("seth_s0", "nope_s0");
    let (_dir, config, input) = setup(&bad, INPUT);
    let result = qnode(&["forward", "-c", s(&config), "-i", s(&input)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Invalid pipeline config"));
}

#[test]
fn test_ragged_input_batch() {
    let (_dir, config, input) = setup(CONFIG, r#"{"x": [[0.1, 0.2], [0.3]]}"#);
    let result = qnode(&["forward", "-c", s(&config), "-i", s(&input)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Row 1"));
}

#[test]
fn test_narrow_input_batch() {
    let (_dir, config, input) = setup(CONFIG, r#"{"x": [[0.1], [0.3]]}"#);
    let result = qnode(&["forward", "-c", s(&config), "-i", s(&input)]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("does not fit"));
}

#[test]
fn test_missing_subcommand_fails() {
    assert!(!qnode(&[]).status.success());
}

#[test]
fn test_version_command() {
    let result = qnode(&["version"]);
    assert!(result.status.success());
    assert!(String::from_utf8_lossy(&result.stdout).contains(env!("CARGO_PKG_VERSION")));
}
