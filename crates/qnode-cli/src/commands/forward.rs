//! Forward command implementation.

use anyhow::Result;
use console::style;
use serde::Serialize;

use qnode_core::NoiseMode;

use super::common::{array_to_rows, prepare, print_matrix, spinner, write_json};

#[derive(Serialize)]
struct ForwardOutput {
    y: Vec<Vec<f64>>,
}

pub async fn execute(config_path: &str, input_path: &str, output: Option<&str>) -> Result<()> {
    println!(
        "{} Running forward pass for {}",
        style("→").cyan().bold(),
        style(config_path).green()
    );

    let (config, x, executor) = prepare(config_path, input_path)?;
    let mut nodes = config.build_nodes()?;
    nodes.set_noise_mode(NoiseMode::Eval);

    let spinner = spinner(&format!("Executing on {}...", executor.name()));
    let start = std::time::Instant::now();
    let y = nodes.forward(&x, executor.as_ref()).await;
    spinner.finish_and_clear();
    let y = y?;

    println!(
        "{} Forward pass completed in {:.2}s",
        style("✓").green().bold(),
        start.elapsed().as_secs_f64()
    );

    match output {
        Some(path) => write_json(path, &ForwardOutput { y: array_to_rows(&y) })?,
        None => print_matrix("Outputs:", &y),
    }

    Ok(())
}
