//! Version command implementation.

use console::style;

pub fn execute() {
    println!(
        "{} {}",
        style("qnode").cyan().bold(),
        style(env!("CARGO_PKG_VERSION")).green()
    );
    println!();
    println!("Parameterized quantum circuit nodes with parameter-shift gradients");
    println!();
    println!("Backends:");
    println!("  • statevector - exact expectations");
    println!("  • shot-based  - sampled counts, chunked into jobs");
    println!();
    println!("Activation norms: {}", qnode_core::ActNorm::ALL.len());
}
