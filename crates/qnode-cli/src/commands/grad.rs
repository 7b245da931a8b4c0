//! Gradient command implementation.

use anyhow::Result;
use console::style;
use ndarray::Array2;
use serde::Serialize;

use super::common::{array_to_rows, prepare, print_matrix, spinner, write_json};

#[derive(Serialize)]
struct GradOutput {
    y: Vec<Vec<f64>>,
    gradients: Vec<Vec<f64>>,
}

/// Gradients of `sum(output)` with respect to every node's weights.
pub async fn execute(config_path: &str, input_path: &str, output: Option<&str>) -> Result<()> {
    println!(
        "{} Computing parameter-shift gradients for {}",
        style("→").cyan().bold(),
        style(config_path).green()
    );

    let (config, x, executor) = prepare(config_path, input_path)?;
    let mut nodes = config.build_nodes()?;
    println!("  Trainable weights: {}", nodes.num_parameters());

    let spinner = spinner(&format!("Executing shifted circuits on {}...", executor.name()));
    let start = std::time::Instant::now();
    let y = nodes.shift_and_run(&x, executor.as_ref()).await;
    spinner.finish_and_clear();
    let y = y?;
    let grads = nodes.backward(&Array2::ones(y.raw_dim()))?;

    println!(
        "{} Gradients computed in {:.2}s",
        style("✓").green().bold(),
        start.elapsed().as_secs_f64()
    );

    if let Some(path) = output {
        return write_json(
            path,
            &GradOutput {
                y: array_to_rows(&y),
                gradients: grads,
            },
        );
    }

    print_matrix("Outputs:", &y);
    println!("\n{}", style("Weight gradients:").bold());
    for (node, g) in nodes.nodes().iter().zip(&grads) {
        let norm = g.iter().map(|v| v * v).sum::<f64>().sqrt();
        println!(
            "  node {} ({}, {} weights)  |g| = {:.5}",
            node.node_id(),
            node.q_layer().name(),
            g.len(),
            norm
        );
        let cells: Vec<String> = g.iter().map(|v| format!("{v:.5}")).collect();
        println!("    [{}]", cells.join(", "));
    }

    Ok(())
}
