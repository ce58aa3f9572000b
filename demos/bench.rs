use anyhow::Result;
use matrixmill::{Matrix, MatrixMill};
use std::io::Write;
use std::time::Instant;

// Repeated products of a fixed pair, the buffer cache's intended usage
// pattern: all allocations happen on the first call.
fn main() -> Result<()> {
    env_logger::init();
    let iterations: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 50_000,
    };

    let mut mill = MatrixMill::new()?;
    let row = Matrix::filled(1, 10_240, 0.12);
    let col = Matrix::filled(10_240, 1, 0.12);

    let start = Instant::now();
    let mut product = mill.multiply(&row, &col)?;
    for i in 0..iterations {
        product = mill.multiply(&row, &col)?;
        if i % 1_000 == 0 {
            print!("\r{:.1}%", i as f64 / iterations as f64 * 100.0);
            std::io::stdout().flush()?;
        }
    }
    println!("\rproduct: {}", product.element(0, 0));
    println!("{} multiplies in {:?}", iterations, start.elapsed());

    Ok(())
}
