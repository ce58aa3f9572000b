use anyhow::Result;
use matrixmill::{Matrix, MatrixMill};

fn main() -> Result<()> {
    env_logger::init();
    let mut mill = MatrixMill::new()?;

    let a = Matrix::filled(2, 3, 0.1);
    let b = Matrix::filled(2, 3, 2.0);
    let c = Matrix::filled(3, 4, 0.3);
    let d = Matrix::from_flat(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 1)?;

    println!("a =\n{}", a);
    println!("b =\n{}", b);
    println!("c =\n{}", c);

    println!("a ⊙ b =\n{}", mill.hadamard(&a, &b)?);
    println!("b * c =\n{}", mill.multiply(&b, &c)?);

    println!("d =\n{}", d);
    println!("dᵀ =\n{}", mill.transpose(&d)?);

    Ok(())
}
