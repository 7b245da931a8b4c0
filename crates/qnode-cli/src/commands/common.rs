//! Shared helpers for CLI commands.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use qnode_core::{BackendChoice, CircuitExecutor, PipelineConfig};

/// Input batch file: `{"x": [[...], ...]}`.
#[derive(Debug, Deserialize)]
pub struct InputBatch {
    /// One row per sample.
    pub x: Vec<Vec<f64>>,
}

/// Load and validate a pipeline config, applying `QNODE_*` overrides.
pub fn load_config(path: &str) -> Result<PipelineConfig> {
    if !Path::new(path).exists() {
        anyhow::bail!("File not found: {path}");
    }
    PipelineConfig::from_file(path)
        .and_then(PipelineConfig::with_env_overrides)
        .with_context(|| format!("Invalid pipeline config: {path}"))
}

/// Load an input batch as a `(batch × features)` array.
pub fn load_input(path: &str) -> Result<Array2<f64>> {
    if !Path::new(path).exists() {
        anyhow::bail!("File not found: {path}");
    }
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?;
    let batch: InputBatch =
        serde_json::from_str(&source).with_context(|| format!("Invalid input batch: {path}"))?;
    rows_to_array(&batch.x)
}

/// Convert rectangular rows to an array.
pub fn rows_to_array(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    if rows.is_empty() || width == 0 {
        anyhow::bail!("Input batch is empty");
    }
    if let Some(i) = rows.iter().position(|r| r.len() != width) {
        anyhow::bail!(
            "Row {i} has {} values, expected {width}",
            rows[i].len()
        );
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(Array2::from_shape_vec((rows.len(), width), flat)?)
}

/// Convert an array back to rows for JSON output.
pub fn array_to_rows(a: &Array2<f64>) -> Vec<Vec<f64>> {
    a.rows().into_iter().map(|r| r.to_vec()).collect()
}

/// Load config and input, check they fit, and build the executor.
pub fn prepare(
    config_path: &str,
    input_path: &str,
) -> Result<(PipelineConfig, Array2<f64>, Arc<dyn CircuitExecutor>)> {
    let config = load_config(config_path)?;
    let x = load_input(input_path)?;
    config
        .validate_input_width(x.ncols())
        .with_context(|| format!("Input batch does not fit {config_path}"))?;
    let executor = config.executor()?;

    println!(
        "  Pipeline: {} node(s), act_norm {}, {} backend",
        config.nodes.len(),
        style(config.act_norm).yellow(),
        backend_label(&config.backend)
    );
    println!("  Input: {} × {}", x.nrows(), x.ncols());
    Ok((config, x, executor))
}

fn backend_label(choice: &BackendChoice) -> String {
    match choice {
        BackendChoice::Simulator => "statevector".to_string(),
        BackendChoice::Hardware { shots, .. } => format!("shot-based ({shots} shots)"),
    }
}

/// Spinner shown while circuits run.
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(s) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(s);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Print a matrix as a right-aligned table.
pub fn print_matrix(label: &str, a: &Array2<f64>) {
    println!("\n{}", style(label).bold());
    for (i, row) in a.rows().into_iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:>9.5}")).collect();
        println!("  {:>4}  {}", i, cells.join(" "));
    }
}

/// Write a JSON document.
pub fn write_json<T: Serialize>(path: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write file: {path}"))?;
    println!("  Written: {}", style(path).green());
    Ok(())
}
