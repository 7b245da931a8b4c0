//! Layers command implementation.

use anyhow::Result;
use console::style;
use rand::SeedableRng;
use rand::rngs::StdRng;

use qnode_core::{ActNorm, GeneralEncoder, LAYER_NAMES, NAMED_ENCODERS, VariationalLayer};

pub fn execute(wires: u32, blocks: usize) -> Result<()> {
    println!("{}", style("Encoders:").bold());
    for name in NAMED_ENCODERS {
        let encoder = GeneralEncoder::from_name(name)?;
        println!(
            "  {:<12} {:>3} inputs, {} wires",
            style(name).cyan(),
            encoder.n_inputs(),
            encoder.min_wires()
        );
    }
    for gate in ["rx", "ry", "rz"] {
        println!(
            "  {:<12} n inputs, n wires",
            style(format!("{{n}}_{gate}")).cyan()
        );
    }

    println!(
        "\n{} (parameters for {} wires, {} block(s))",
        style("Layers:").bold(),
        wires,
        blocks
    );
    let mut rng = StdRng::seed_from_u64(0);
    for name in LAYER_NAMES {
        match VariationalLayer::new(name, wires, blocks, &mut rng) {
            Ok(layer) => println!("  {:<12} {:>4}", style(name).cyan(), layer.num_params()),
            Err(e) => println!("  {:<12} {}", style(name).cyan(), style(e).red()),
        }
    }

    println!("\n{}", style("Activation norms:").bold());
    for norm in ActNorm::ALL {
        println!("  {}", style(norm).cyan());
    }

    Ok(())
}
