use crate::engine::{ceil_div, clamp_tile, TileSize};
use crate::*;

/// Device tests run only where a Vulkan implementation and the compiled
/// kernels are present; everywhere else they skip instead of failing.
fn engine() -> Option<MatrixMill> {
    match MatrixMill::new() {
        Ok(mill) => Some(mill),
        Err(err) => {
            eprintln!("skipping device test: {}", err);
            None
        }
    }
}

fn cpu_multiply(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = Matrix::filled(a.rows(), b.cols(), 0.0);
    for i in 0..a.rows() {
        for j in 0..b.cols() {
            let mut acc = 0.0;
            for k in 0..a.cols() {
                acc += a.element(i, k) * b.element(k, j);
            }
            out.set_element(acc, i, j);
        }
    }
    out
}

fn assert_close(got: &Matrix, want: &Matrix, tolerance: f32) {
    assert_eq!(got.rows(), want.rows());
    assert_eq!(got.cols(), want.cols());
    for (g, w) in got.as_slice().iter().zip(want.as_slice()) {
        assert!(
            (g - w).abs() <= tolerance,
            "{} differs from {} by more than {}",
            g,
            w,
            tolerance
        );
    }
}

#[test]
fn filled_matrix_has_fill_everywhere() {
    let m = Matrix::filled(4, 7, 1.25);
    assert_eq!(m.len(), 4 * 7);
    for row in 0..4 {
        for col in 0..7 {
            assert_eq!(m.element(row, col), 1.25);
        }
    }
}

#[test]
fn nested_rows_round_trip() -> Result<()> {
    let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
    let m = Matrix::from_rows(&rows)?;
    assert_eq!(m.rows(), 2);
    assert_eq!(m.cols(), 3);
    for (r, row) in rows.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            assert_eq!(m.element(r, c), v as f32);
        }
    }
    Ok(())
}

#[test]
fn flat_count_must_divide_evenly() {
    assert!(matches!(
        Matrix::from_flat(vec![1.0; 7], 2),
        Err(Error::FlatLength { len: 7, rows: 2 })
    ));
    let m = Matrix::from_flat(vec![1.0; 6], 2).unwrap();
    assert_eq!((m.rows(), m.cols()), (2, 3));
}

#[test]
fn ragged_rows_are_rejected() {
    let rows = vec![vec![1.0, 2.0], vec![3.0]];
    assert!(matches!(
        Matrix::from_rows(&rows),
        Err(Error::RaggedRows { row: 1, .. })
    ));
    let empty: Vec<Vec<f64>> = Vec::new();
    assert!(matches!(Matrix::from_rows(&empty), Err(Error::EmptyRows)));
}

#[test]
fn reset_preserves_declared_shape() -> Result<()> {
    let mut m = Matrix::filled(2, 2, 0.0);
    m.reset_from_flat(&[1.0, 2.0, 3.0, 4.0])?;
    assert_eq!(m.element(1, 0), 3.0);
    assert!(matches!(
        m.reset_from_flat(&[1.0, 2.0]),
        Err(Error::ResetLength {
            got: 2,
            expected: 4
        })
    ));

    m.reset_from_rows(&[vec![9.0, 8.0], vec![7.0, 6.0]])?;
    assert_eq!(m.element(0, 1), 8.0);
    assert!(matches!(
        m.reset_from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]),
        Err(Error::ResetShape { got_cols: 3, .. })
    ));
    Ok(())
}

#[test]
fn set_element_writes_through() {
    let mut m = Matrix::filled(3, 3, 0.0);
    m.set_element(5.5, 2, 1);
    assert_eq!(m.element(2, 1), 5.5);
    assert_eq!(m.get(2, 1), Some(5.5));
    assert_eq!(m.get(3, 0), None);
}

#[test]
#[should_panic(expected = "out of range")]
fn element_out_of_range_panics() {
    let m = Matrix::filled(2, 2, 0.0);
    m.element(2, 0);
}

#[test]
fn display_is_tab_separated_rows() -> Result<()> {
    let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]])?;
    assert_eq!(m.to_string(), "1\t2\n3\t4\n");
    Ok(())
}

#[test]
fn ceiling_division_covers_the_grid() {
    assert_eq!(ceil_div(0, 32), 0);
    assert_eq!(ceil_div(1, 32), 1);
    assert_eq!(ceil_div(32, 32), 1);
    assert_eq!(ceil_div(33, 32), 2);
    let tile = TileSize { x: 32, y: 32 };
    assert_eq!(tile.groups(100, 64), (4, 2));
}

#[test]
fn tile_cap_respects_device_limits() {
    // Roomy desktop-class limits keep the cap as configured.
    assert_eq!(
        clamp_tile(32, [1024, 1024, 64], 1024),
        TileSize { x: 32, y: 32 }
    );
    // Tight invocation budget halves the edge until the square fits.
    assert_eq!(
        clamp_tile(32, [1024, 1024, 64], 256),
        TileSize { x: 16, y: 16 }
    );
    // Small per-axis limit wins over the cap.
    assert_eq!(clamp_tile(32, [8, 8, 8], 64), TileSize { x: 8, y: 8 });
    assert_eq!(clamp_tile(0, [1024, 1024, 64], 1024).x, 1);
}

#[test]
fn multiply_requires_conformable_shapes() {
    let Some(mut mill) = engine() else { return };
    let a = Matrix::filled(2, 3, 1.0);
    let b = Matrix::filled(4, 2, 1.0);
    assert!(matches!(
        mill.multiply(&a, &b),
        Err(Error::MultiplyShape {
            a_cols: 3,
            b_rows: 4,
            ..
        })
    ));
}

#[test]
fn multiply_known_case() {
    let Some(mut mill) = engine() else { return };
    let a = Matrix::filled(2, 3, 2.0);
    let b = Matrix::filled(3, 4, 3.0);
    let out = mill.multiply(&a, &b).unwrap();
    assert_close(&out, &Matrix::filled(2, 4, 18.0), 1e-5);
}

#[test]
fn multiply_against_cpu_reference() {
    let Some(mut mill) = engine() else { return };
    let a = Matrix::from_flat((0..6 * 5).map(|v| v as f32 * 0.25 - 3.0).collect(), 6).unwrap();
    let b = Matrix::from_flat((0..5 * 7).map(|v| (v % 11) as f32 * 0.5).collect(), 5).unwrap();
    let out = mill.multiply(&a, &b).unwrap();
    assert_close(&out, &cpu_multiply(&a, &b), 1e-4);
}

#[test]
fn hadamard_requires_identical_shapes() {
    let Some(mut mill) = engine() else { return };
    // Same height alone is not enough...
    let a = Matrix::filled(2, 3, 1.0);
    let b = Matrix::filled(2, 4, 1.0);
    assert!(matches!(
        mill.hadamard(&a, &b),
        Err(Error::HadamardShape { .. })
    ));
    // ...and neither is same width alone.
    let c = Matrix::filled(3, 3, 1.0);
    let d = Matrix::filled(2, 3, 1.0);
    assert!(matches!(
        mill.hadamard(&c, &d),
        Err(Error::HadamardShape { .. })
    ));
}

#[test]
fn hadamard_small_values() {
    let Some(mut mill) = engine() else { return };
    let a = Matrix::filled(2, 3, 0.1);
    let b = Matrix::filled(2, 3, 2.0);
    let out = mill.hadamard(&a, &b).unwrap();
    assert_close(&out, &Matrix::filled(2, 3, 0.2), f32::EPSILON);
}

#[test]
fn transpose_shape_law_and_involution() {
    let Some(mut mill) = engine() else { return };
    let a = Matrix::from_flat((0..3 * 5).map(|v| v as f32).collect(), 3).unwrap();
    let t = mill.transpose(&a).unwrap();
    assert_eq!(t.rows(), a.cols());
    assert_eq!(t.cols(), a.rows());
    for i in 0..a.rows() {
        for j in 0..a.cols() {
            assert_eq!(t.element(j, i), a.element(i, j));
        }
    }
    let back = mill.transpose(&t).unwrap();
    assert_eq!(back, a);
}

#[test]
fn repeated_calls_are_bit_identical() {
    let Some(mut mill) = engine() else { return };
    let a = Matrix::filled(17, 9, 0.37);
    let b = Matrix::filled(9, 23, 1.91);
    let first = mill.multiply(&a, &b).unwrap();
    let second = mill.multiply(&a, &b).unwrap();
    assert_eq!(first.as_slice(), second.as_slice());

    // A smaller product afterwards must not pick up stale cache content.
    let c = Matrix::filled(2, 2, 1.0);
    let small = mill.multiply(&c, &c).unwrap();
    assert_close(&small, &Matrix::filled(2, 2, 2.0), 1e-6);
}

#[test]
fn growing_operands_never_corrupt_results() {
    let Some(mut mill) = engine() else { return };
    for (m, k, n) in [(2, 3, 4), (5, 8, 6), (13, 16, 11), (32, 40, 33)] {
        let a = Matrix::from_flat((0..m * k).map(|v| (v % 13) as f32 * 0.5).collect(), m).unwrap();
        let b = Matrix::from_flat((0..k * n).map(|v| (v % 7) as f32 - 3.0).collect(), k).unwrap();
        let out = mill.multiply(&a, &b).unwrap();
        assert_close(&out, &cpu_multiply(&a, &b), 1e-3);
    }
}

#[test]
fn per_call_policy_matches_cached_results() {
    let options = EngineOptions {
        buffer_policy: BufferPolicy::PerCall,
        ..EngineOptions::default()
    };
    let Ok(mut mill) = MatrixMill::with_options(options) else {
        eprintln!("skipping device test: engine unavailable");
        return;
    };
    let a = Matrix::filled(4, 4, 1.5);
    let b = Matrix::filled(4, 4, 2.0);
    let out = mill.multiply(&a, &b).unwrap();
    assert_close(&out, &Matrix::filled(4, 4, 12.0), 1e-5);
}
