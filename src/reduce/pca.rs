use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::data::decode::DecodedMatrix;

/// Relative eigenvalue cut-off below which an axis counts as empty.
const RANK_TOLERANCE: f64 = 1e-10;
/// Largest side (rows or bits) still decomposed in full.
const FULL_SOLVER_MAX_SIDE: usize = 500;
/// Extra random directions sampled beyond the kept components.
const OVERSAMPLES: usize = 10;
const POWER_ITERATIONS: usize = 4;

// ---------------------------------------------------------------------------
// Linear stage: principal component projection
// ---------------------------------------------------------------------------

/// Scores of every concept on the leading principal components.
#[derive(Debug, Clone)]
pub struct Projection {
    /// `rows × components` score matrix.
    pub scores: DMatrix<f64>,
    /// Variance captured by each kept component, in descending order.
    pub explained_variance: Vec<f64>,
    /// Fraction of the total variance captured by each kept component.
    pub explained_variance_ratio: Vec<f64>,
}

/// How the leading axes are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solver {
    /// Eigendecompose the Gram (`n × n`) or covariance (`d × d`) matrix,
    /// whichever is smaller.
    Full,
    /// Seeded randomized range finder with power iterations; only the
    /// requested axes are ever formed.
    Randomized,
}

impl Solver {
    /// Full decomposition for small inputs or when most axes are kept,
    /// randomized otherwise.
    pub fn for_shape(rows: usize, cols: usize, components: usize) -> Self {
        let smaller = rows.min(cols) as f64;
        if rows.max(cols) <= FULL_SOLVER_MAX_SIDE || components as f64 >= 0.8 * smaller {
            Solver::Full
        } else {
            Solver::Randomized
        }
    }
}

/// Project the decoded bits onto the top `components` principal axes.
///
/// Output always has exactly `components` columns; axes beyond the data's
/// rank come out as zero columns.  Each column's sign is fixed so its
/// largest-magnitude score is positive.  `seed` only matters for
/// [`Solver::Randomized`].
pub fn project(decoded: &DecodedMatrix, components: usize, seed: u64) -> Projection {
    let n = decoded.rows();
    let d = decoded.cols();

    if n == 0 || d == 0 {
        return Projection {
            scores: DMatrix::zeros(n, components),
            explained_variance: vec![0.0; components],
            explained_variance_ratio: vec![0.0; components],
        };
    }

    let centered = centered(decoded);
    let solver = Solver::for_shape(n, d, components);
    log::debug!("PCA solver: {solver:?}");
    let (mut scores, eigenvalues) = match solver {
        Solver::Full if n <= d => gram(&centered, components),
        Solver::Full => covariance(&centered, components),
        Solver::Randomized => randomized(&centered, components, seed),
    };

    let dof = (n.max(2) - 1) as f64;
    let total = centered.norm_squared();
    let explained_variance = eigenvalues.iter().map(|lambda| lambda / dof).collect();
    let explained_variance_ratio = eigenvalues
        .iter()
        .map(|lambda| if total > 0.0 { lambda / total } else { 0.0 })
        .collect();

    flip_signs(&mut scores);

    Projection {
        scores,
        explained_variance,
        explained_variance_ratio,
    }
}

/// Gram trick: scores = U * sqrt(lambda).
fn gram(centered: &DMatrix<f64>, components: usize) -> (DMatrix<f64>, Vec<f64>) {
    let n = centered.nrows();
    let eig = SymmetricEigen::new(centered * centered.transpose());
    let (order, values) = ranked(&eig.eigenvalues);

    let mut scores = DMatrix::zeros(n, components);
    for (c, &idx) in order.iter().take(components).enumerate() {
        let scale = values[c].sqrt();
        for r in 0..n {
            scores[(r, c)] = eig.eigenvectors[(r, idx)] * scale;
        }
    }
    (scores, padded(values, components))
}

/// Covariance route: scores = Xc * V.
fn covariance(centered: &DMatrix<f64>, components: usize) -> (DMatrix<f64>, Vec<f64>) {
    let eig = SymmetricEigen::new(centered.tr_mul(centered));
    let (order, values) = ranked(&eig.eigenvalues);

    let mut scores = DMatrix::zeros(centered.nrows(), components);
    for (c, &idx) in order.iter().take(components).enumerate() {
        if values[c] == 0.0 {
            continue;
        }
        let column: DVector<f64> = centered * eig.eigenvectors.column(idx);
        scores.set_column(c, &column);
    }
    (scores, padded(values, components))
}

/// Randomized truncated SVD (Halko et al.): sample the range of `Xc` with a
/// Gaussian sketch, sharpen it with power iterations, then decompose the
/// small projected problem.
fn randomized(centered: &DMatrix<f64>, components: usize, seed: u64) -> (DMatrix<f64>, Vec<f64>) {
    let (n, d) = centered.shape();
    let width = (components + OVERSAMPLES).min(n.min(d));

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let sketch = DMatrix::<f64>::from_fn(d, width, |_, _| rng.sample(StandardNormal));

    let mut basis = orthonormal(centered * sketch);
    for _ in 0..POWER_ITERATIONS {
        let back = orthonormal(centered.tr_mul(&basis));
        basis = orthonormal(centered * back);
    }

    // B = Qᵀ Xc is width × d; its Gram matrix carries the leading spectrum
    let reduced = basis.tr_mul(centered);
    let eig = SymmetricEigen::new(&reduced * reduced.transpose());
    let (order, values) = ranked(&eig.eigenvalues);

    let mut scores = DMatrix::zeros(n, components);
    for (c, &idx) in order.iter().take(components).enumerate() {
        if values[c] == 0.0 {
            continue;
        }
        let column: DVector<f64> = &basis * eig.eigenvectors.column(idx) * values[c].sqrt();
        scores.set_column(c, &column);
    }
    (scores, padded(values, components))
}

fn orthonormal(m: DMatrix<f64>) -> DMatrix<f64> {
    m.qr().q()
}

/// Exactly `len` values: truncated, or filled with zeros.
fn padded(mut values: Vec<f64>, len: usize) -> Vec<f64> {
    values.resize(len, 0.0);
    values
}

/// Decoded bits as floats with every column mean subtracted.
fn centered(decoded: &DecodedMatrix) -> DMatrix<f64> {
    let n = decoded.rows();
    let d = decoded.cols();
    let mut means = vec![0.0f64; d];
    for r in 0..n {
        for (m, &bit) in means.iter_mut().zip(decoded.row(r)) {
            *m += bit as f64;
        }
    }
    for m in &mut means {
        *m /= n as f64;
    }
    DMatrix::from_fn(n, d, |r, c| decoded.get(r, c) as f64 - means[c])
}

/// Eigen-indices sorted by decreasing eigenvalue (ties by index), with the
/// matching eigenvalues.  Values under the rank tolerance become exactly 0.
fn ranked(values: &DVector<f64>) -> (Vec<usize>, Vec<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

    let largest = order.first().map(|&i| values[i]).unwrap_or(0.0).max(0.0);
    let tolerance = largest * RANK_TOLERANCE;
    let sorted = order
        .iter()
        .map(|&i| if values[i] > tolerance { values[i] } else { 0.0 })
        .collect();
    (order, sorted)
}

fn flip_signs(scores: &mut DMatrix<f64>) {
    for mut column in scores.column_iter_mut() {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            column.neg_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::data::decode::decode;
    use crate::data::model::{ConceptRecord, Dataset, Term};

    fn decoded(vectors: &[Vec<u64>]) -> DecodedMatrix {
        let records = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| ConceptRecord {
                term: Term::atom(format!("c{i}")),
                usage: 0,
                vector: v.clone(),
            })
            .collect();
        decode(&Dataset::new(records), 1000).unwrap()
    }

    #[test]
    fn gram_route_keeps_requested_columns() {
        let m = decoded(&[vec![0b1011], vec![0b0110], vec![0b1111]]);
        let p = project(&m, 3, 42);
        assert_eq!(p.scores.nrows(), 3);
        assert_eq!(p.scores.ncols(), 3);
        // centred data of rank 2: the third axis carries nothing
        assert_abs_diff_eq!(p.explained_variance[2], 0.0, epsilon = 1e-9);
        assert!(p.explained_variance[0] >= p.explained_variance[1]);
    }

    #[test]
    fn covariance_route_pads_beyond_bit_width() {
        // 70 rows, 64 bits: d < n, and 50 components requested
        let vectors: Vec<Vec<u64>> = (0..70u64)
            .map(|i| vec![i.wrapping_mul(0x9E37_79B9_7F4A_7C15)])
            .collect();
        let m = decoded(&vectors);
        let p = project(&m, 50, 42);
        assert_eq!(p.scores.shape(), (70, 50));
        assert_eq!(p.explained_variance.len(), 50);
        assert!(p.scores.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn two_opposite_points_split_on_first_axis() {
        let cat = (1u64 << 25) - 1;
        let m = decoded(&[vec![cat], vec![cat << 25]]);
        let p = project(&m, 2, 42);
        let a = p.scores[(0, 0)];
        let b = p.scores[(1, 0)];
        assert_abs_diff_eq!(a, -b, epsilon = 1e-9);
        // 50 differing bits, each contributing 0.5^2 per row
        assert_abs_diff_eq!(a.abs(), (50.0f64 * 0.25).sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(p.explained_variance_ratio[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.scores[(0, 1)], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn identical_rows_project_to_zero() {
        let m = decoded(&[vec![42], vec![42], vec![42]]);
        let p = project(&m, 3, 42);
        assert!(p.scores.iter().all(|v| v.abs() < 1e-12));
        assert!(p.explained_variance_ratio.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn largest_score_in_each_column_is_positive() {
        let m = decoded(&[vec![1], vec![3], vec![7], vec![0xFF00]]);
        let p = project(&m, 4, 42);
        for column in p.scores.column_iter() {
            let pivot = column
                .iter()
                .copied()
                .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
            assert!(pivot >= 0.0);
        }
    }

    #[test]
    fn solver_follows_input_size() {
        assert_eq!(Solver::for_shape(3, 64, 3), Solver::Full);
        assert_eq!(Solver::for_shape(70, 64, 50), Solver::Full);
        // keeping nearly every axis is cheaper done in full
        assert_eq!(Solver::for_shape(600, 64, 60), Solver::Full);
        assert_eq!(Solver::for_shape(600, 64, 50), Solver::Randomized);
        assert_eq!(Solver::for_shape(3000, 10048, 50), Solver::Randomized);
    }

    /// 600 rows drawn from four bit patterns in uneven proportions.
    fn four_patterns() -> DMatrix<f64> {
        let patterns = [
            0x0F0F_0F0F_0F0F_0F0Fu64,
            0xFFFF_0000_FFFF_0000,
            0x1234_5678_9ABC_DEF0,
            0,
        ];
        let counts = [300, 150, 100, 50];
        let vectors: Vec<Vec<u64>> = patterns
            .iter()
            .zip(counts)
            .flat_map(|(&p, count)| std::iter::repeat(vec![p]).take(count))
            .collect();
        centered(&decoded(&vectors))
    }

    #[test]
    fn randomized_matches_full_decomposition() {
        let data = four_patterns();
        let (mut full, full_values) = covariance(&data, 50);
        let (mut fast, fast_values) = randomized(&data, 50, 42);
        flip_signs(&mut full);
        flip_signs(&mut fast);

        assert_eq!(fast.shape(), (600, 50));
        assert_eq!(fast_values.len(), 50);
        for (&a, &b) in full_values.iter().zip(&fast_values) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6 * full_values[0]);
        }
        // four distinct rows centre to a rank-3 cloud
        assert!(fast_values[2] > 0.0);
        assert!(fast_values[3..].iter().all(|&v| v == 0.0));
        for c in 0..3 {
            for r in 0..600 {
                assert_abs_diff_eq!(full[(r, c)].abs(), fast[(r, c)].abs(), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn randomized_is_seeded() {
        let data = four_patterns();
        let (a, _) = randomized(&data, 50, 9);
        let (b, _) = randomized(&data, 50, 9);
        assert_eq!(a, b);
    }
}
