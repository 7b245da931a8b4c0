//! qnode Command-Line Interface
//!
//! Runs quantum node pipelines described by a YAML config on a JSON batch.
//!
//! ```text
//! qnode forward --config pipeline.yml --input batch.json
//! qnode grad    --config pipeline.yml --input batch.json --output grads.json
//! qnode train   --config pipeline.yml --input batch.json --epochs 20 --lr 0.05
//! qnode layers  --wires 4
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{forward, grad, layers, train, version};

/// qnode - parameterized quantum circuit nodes with parameter-shift gradients
#[derive(Parser)]
#[command(name = "qnode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline forward
    Forward {
        /// Pipeline config (YAML)
        #[arg(short, long)]
        config: String,

        /// Input batch (JSON, {"x": [[...], ...]})
        #[arg(short, long)]
        input: String,

        /// Write outputs as JSON instead of printing a table
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Compute weight gradients of sum(output) by parameter shift
    Grad {
        /// Pipeline config (YAML)
        #[arg(short, long)]
        config: String,

        /// Input batch (JSON)
        #[arg(short, long)]
        input: String,

        /// Write outputs and gradients as JSON
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Minimise the sum of squared outputs with plain SGD
    Train {
        /// Pipeline config (YAML)
        #[arg(short, long)]
        config: String,

        /// Input batch (JSON)
        #[arg(short, long)]
        input: String,

        /// Number of epochs
        #[arg(short, long, default_value = "10")]
        epochs: usize,

        /// Learning rate
        #[arg(long, default_value = "0.05")]
        lr: f64,

        /// Write losses and trained weights as JSON
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List encoders, layers and normalizations
    Layers {
        /// Wire count used for parameter counts
        #[arg(short, long, default_value = "4")]
        wires: u32,

        /// Blocks used for parameter counts
        #[arg(short, long, default_value = "1")]
        blocks: usize,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Forward {
            config,
            input,
            output,
        } => forward::execute(&config, &input, output.as_deref()).await,

        Commands::Grad {
            config,
            input,
            output,
        } => grad::execute(&config, &input, output.as_deref()).await,

        Commands::Train {
            config,
            input,
            epochs,
            lr,
            output,
        } => train::execute(&config, &input, epochs, lr, output.as_deref()).await,

        Commands::Layers { wires, blocks } => layers::execute(wires, blocks),

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
