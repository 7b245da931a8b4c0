//! Train command implementation.
//!
//! Minimises `Σ y²` over the batch with plain SGD, mini-batched by the
//! config's `batch` size.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array2, s};
use serde::Serialize;
use tracing::debug;

use qnode_core::NoiseMode;

use super::common::{prepare, write_json};

#[derive(Serialize)]
struct TrainOutput {
    losses: Vec<f64>,
    final_loss: f64,
    parameters: Vec<Vec<f64>>,
}

fn sum_of_squares(y: &Array2<f64>) -> f64 {
    y.iter().map(|v| v * v).sum()
}

pub async fn execute(
    config_path: &str,
    input_path: &str,
    epochs: usize,
    lr: f64,
    output: Option<&str>,
) -> Result<()> {
    if epochs == 0 {
        anyhow::bail!("--epochs must be positive");
    }
    if !(lr.is_finite() && lr > 0.0) {
        anyhow::bail!("--lr must be a positive number, got {lr}");
    }

    println!(
        "{} Training {} for {} epoch(s), lr {}",
        style("→").cyan().bold(),
        style(config_path).green(),
        epochs,
        lr
    );

    let (config, x, executor) = prepare(config_path, input_path)?;
    let mut nodes = config.build_nodes()?;
    let batches = config.mini_batches(x.nrows());
    println!(
        "  Trainable weights: {}, mini-batches per epoch: {}",
        nodes.num_parameters(),
        batches.len()
    );

    let bar = ProgressBar::new(epochs as u64);
    if let Ok(s) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(s);
    }

    let start = std::time::Instant::now();
    let mut losses = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        nodes.set_epoch(epoch);
        let mut epoch_loss = 0.0;
        for rows in &batches {
            let xb = x.slice(s![rows.clone(), ..]).to_owned();
            let y = nodes.shift_and_run(&xb, executor.as_ref()).await?;
            epoch_loss += sum_of_squares(&y);
            let grads = nodes.backward(&(&y * 2.0))?;
            nodes.sgd_step(&grads, lr)?;
        }
        debug!(epoch, loss = epoch_loss, "epoch finished");
        losses.push(epoch_loss);
        bar.set_message(format!("loss {epoch_loss:.5}"));
        bar.inc(1);
    }
    bar.finish_and_clear();

    nodes.set_noise_mode(NoiseMode::Eval);
    let final_loss = sum_of_squares(&nodes.forward(&x, executor.as_ref()).await?);

    println!(
        "{} Trained in {:.2}s",
        style("✓").green().bold(),
        start.elapsed().as_secs_f64()
    );
    if let Some(first) = losses.first() {
        println!("  Loss (first epoch): {first:.5}");
    }
    println!("  Loss (eval):        {}", style(format!("{final_loss:.5}")).yellow());

    if let Some(path) = output {
        write_json(
            path,
            &TrainOutput {
                losses,
                final_loss,
                parameters: nodes.parameters(),
            },
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sum_of_squares() {
        assert_eq!(sum_of_squares(&array![[1.0, -2.0], [0.5, 0.0]]), 5.25);
    }
}
