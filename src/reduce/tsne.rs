use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use super::quadtree::QuadTree;

// ---------------------------------------------------------------------------
// Nonlinear stage: t-SNE
// ---------------------------------------------------------------------------

const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const MIN_PROBABILITY: f64 = 1e-12;
const MIN_GAIN: f64 = 0.01;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const INIT_SCALE: f64 = 1e-4;
const KL_LOG_EVERY: usize = 250;
/// Largest sample count embedded with the exact `O(n²)` gradient when a
/// Barnes-Hut angle is configured.
pub const EXACT_MAX_POINTS: usize = 500;

/// Gradient evaluation strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    /// Dense affinities over every pair, exact repulsion.
    Exact,
    /// Affinities over the `3 × perplexity` nearest neighbours, repulsion
    /// approximated with a quadtree opened down to angle `theta`.
    BarnesHut { theta: f64 },
}

impl Method {
    /// Exact for small inputs or `theta <= 0`, Barnes-Hut otherwise.
    pub fn for_size(n: usize, theta: f64) -> Self {
        if theta <= 0.0 || n <= EXACT_MAX_POINTS {
            Method::Exact
        } else {
            Method::BarnesHut { theta }
        }
    }
}

/// Optimiser settings for the 2D embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TsneParams {
    pub perplexity: f64,
    pub iterations: usize,
    pub early_exaggeration: f64,
    pub exaggeration_iterations: usize,
    pub seed: u64,
    pub method: Method,
}

/// Neighbourhood size for `n` samples: `min(max, n - 1)`, never below 1.
pub fn perplexity_for(n: usize, max_perplexity: f64) -> f64 {
    max_perplexity.min(n.saturating_sub(1) as f64).max(1.0)
}

/// Embed the rows of `data` in two dimensions.
///
/// Returns an `n × 2` matrix.  The result depends only on `data` and
/// `params`; the initial layout is drawn from a `ChaCha8Rng` seeded with
/// `params.seed`.
pub fn embed(data: &DMatrix<f64>, params: &TsneParams) -> DMatrix<f64> {
    let n = data.nrows();
    if n < 2 {
        return DMatrix::zeros(n, 2);
    }

    let neighbours = match params.method {
        Method::Exact => n - 1,
        Method::BarnesHut { .. } => ((3.0 * params.perplexity) as usize + 1).min(n - 1),
    };
    let p = Affinities::compute(data, neighbours, params.perplexity);
    log::debug!("t-SNE affinities: {} non-zero pairs", p.values.len());

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut y: Vec<f64> = (0..n * 2)
        .map(|_| rng.sample::<f64, _>(StandardNormal) * INIT_SCALE)
        .collect();

    let learning_rate = (n as f64 / params.early_exaggeration / 4.0).max(50.0);
    let mut update = vec![0.0f64; n * 2];
    let mut gains = vec![1.0f64; n * 2];
    let mut grad = vec![0.0f64; n * 2];

    for iter in 0..params.iterations {
        let exploring = iter < params.exaggeration_iterations;
        let exaggeration = if exploring { params.early_exaggeration } else { 1.0 };
        let momentum = if exploring { INITIAL_MOMENTUM } else { FINAL_MOMENTUM };

        let kl = match params.method {
            Method::Exact => exact_gradient(&p, &y, exaggeration, &mut grad),
            Method::BarnesHut { theta } => {
                barnes_hut_gradient(&p, &y, exaggeration, theta, &mut grad)
            }
        };
        if (iter + 1) % KL_LOG_EVERY == 0 {
            log::debug!("t-SNE iteration {}: KL divergence {kl:.4}", iter + 1);
        }

        for ((u, gain), &dy) in update.iter_mut().zip(gains.iter_mut()).zip(&grad) {
            if *u * dy < 0.0 {
                *gain += 0.2;
            } else {
                *gain *= 0.8;
            }
            *gain = gain.max(MIN_GAIN);
            *u = momentum * *u - learning_rate * *gain * dy;
        }
        for (yi, u) in y.iter_mut().zip(&update) {
            *yi += u;
        }
        recenter(&mut y, n);
    }

    DMatrix::from_row_slice(n, 2, &y)
}

// -- affinities --

/// Symmetric joint probabilities `P` in compressed sparse rows.  With every
/// other point as a neighbour the rows are dense.
#[derive(Debug, Clone)]
struct Affinities {
    offsets: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
}

impl Affinities {
    /// Calibrate each point's conditional distribution over its `k` nearest
    /// neighbours so its entropy matches `ln(perplexity)`, then symmetrise.
    fn compute(data: &DMatrix<f64>, k: usize, perplexity: f64) -> Self {
        let n = data.nrows();
        let dim = data.ncols();
        // row-major copy so each point is a contiguous slice
        let rows = data.transpose();
        let rows = rows.as_slice();
        let point = |i: usize| &rows[i * dim..(i + 1) * dim];

        let target_entropy = perplexity.ln();
        let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(2 * n * k);
        let mut candidates: Vec<(f64, usize)> = Vec::with_capacity(n);
        let mut distances = vec![0.0f64; k];
        let mut conditional = vec![0.0f64; k];

        for i in 0..n {
            candidates.clear();
            candidates.extend((0..n).filter(|&j| j != i).map(|j| {
                let d: f64 = point(i)
                    .iter()
                    .zip(point(j))
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (d, j)
            }));
            if k < candidates.len() {
                candidates
                    .select_nth_unstable_by(k, |a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                candidates.truncate(k);
                candidates.sort_unstable_by_key(|&(_, j)| j);
            }

            for (slot, &(d, _)) in distances.iter_mut().zip(&candidates) {
                *slot = d;
            }
            calibrate(&distances, target_entropy, &mut conditional);

            for (&(_, j), &c) in candidates.iter().zip(&conditional) {
                triplets.push((i, j, c));
                triplets.push((j, i, c));
            }
        }

        Self::symmetrised(n, triplets, k == n - 1)
    }

    /// `P = (C + Cᵀ) / 2n`; dense rows are floored at [`MIN_PROBABILITY`].
    fn symmetrised(n: usize, mut triplets: Vec<(usize, usize, f64)>, dense: bool) -> Self {
        triplets.sort_unstable_by_key(|&(i, j, _)| (i, j));

        let norm = 2.0 * n as f64;
        let mut offsets = Vec::with_capacity(n + 1);
        let mut columns = Vec::with_capacity(triplets.len() / 2);
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len() / 2);
        offsets.push(0);

        let mut row = 0;
        for (i, j, c) in triplets {
            while row < i {
                offsets.push(columns.len());
                row += 1;
            }
            let start = offsets[row];
            match columns.last() {
                Some(&last) if columns.len() > start && last == j => {
                    if let Some(v) = values.last_mut() {
                        *v += c;
                    }
                }
                _ => {
                    columns.push(j);
                    values.push(c);
                }
            }
        }
        while offsets.len() <= n {
            offsets.push(columns.len());
        }

        for v in &mut values {
            *v /= norm;
            if dense {
                *v = v.max(MIN_PROBABILITY);
            }
        }
        Self {
            offsets,
            columns,
            values,
        }
    }

    fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.offsets[i]..self.offsets[i + 1];
        self.columns[span.clone()]
            .iter()
            .copied()
            .zip(self.values[span].iter().copied())
    }

    fn points(&self) -> usize {
        self.offsets.len() - 1
    }
}

/// Binary search on the precision `beta` so the distribution over
/// `distances` has the target entropy.  Writes the normalised row to `out`.
fn calibrate(distances: &[f64], target_entropy: f64, out: &mut [f64]) {
    // shift by the nearest neighbour so exp() cannot underflow to all-zero
    let nearest = distances.iter().copied().fold(f64::INFINITY, f64::min);

    let mut beta = 1.0f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;

    for _ in 0..PERPLEXITY_STEPS {
        let mut sum_p = 0.0;
        for (o, &d) in out.iter_mut().zip(distances) {
            *o = (-(d - nearest) * beta).exp();
            sum_p += *o;
        }
        if sum_p == 0.0 {
            sum_p = 1e-8;
        }
        let mut weighted = 0.0;
        for (o, &d) in out.iter_mut().zip(distances) {
            *o /= sum_p;
            weighted += (d - nearest) * *o;
        }
        let entropy = sum_p.ln() + beta * weighted;
        let diff = entropy - target_entropy;
        if diff.abs() <= PERPLEXITY_TOLERANCE {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() { beta * 2.0 } else { (beta + beta_max) / 2.0 };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() { beta / 2.0 } else { (beta + beta_min) / 2.0 };
        }
    }
}

// -- gradients --

fn kernel(y: &[f64], i: usize, j: usize) -> (f64, [f64; 2]) {
    let diff = [y[2 * i] - y[2 * j], y[2 * i + 1] - y[2 * j + 1]];
    (1.0 / (1.0 + diff[0] * diff[0] + diff[1] * diff[1]), diff)
}

/// Fill `grad` with the exact KL gradient for layout `y`; returns the KL
/// divergence.
fn exact_gradient(p: &Affinities, y: &[f64], exaggeration: f64, grad: &mut [f64]) -> f64 {
    let n = p.points();
    let mut sum_q = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            sum_q += 2.0 * kernel(y, i, j).0;
        }
    }
    let sum_q = sum_q.max(f64::MIN_POSITIVE);

    grad.fill(0.0);
    let mut kl = 0.0;
    for i in 0..n {
        for (j, pij) in p.row(i) {
            let (w, diff) = kernel(y, i, j);
            let q = (w / sum_q).max(MIN_PROBABILITY);
            kl += pij * (pij / q).ln();
            let coeff = 4.0 * (exaggeration * pij - q) * w;
            grad[2 * i] += coeff * diff[0];
            grad[2 * i + 1] += coeff * diff[1];
        }
    }
    kl
}

/// Barnes-Hut gradient: attraction over the sparse neighbours, repulsion
/// from a quadtree.  Returns the KL divergence over the stored pairs.
fn barnes_hut_gradient(
    p: &Affinities,
    y: &[f64],
    exaggeration: f64,
    theta: f64,
    grad: &mut [f64],
) -> f64 {
    let n = p.points();
    let tree = QuadTree::build(y);

    let mut sum_q = 0.0;
    for i in 0..n {
        let r = tree.repulsion(i, theta);
        sum_q += r.z;
        grad[2 * i] = -r.force[0];
        grad[2 * i + 1] = -r.force[1];
    }
    let sum_q = sum_q.max(f64::MIN_POSITIVE);

    let mut kl = 0.0;
    for i in 0..n {
        let (mut ax, mut ay) = (0.0, 0.0);
        for (j, pij) in p.row(i) {
            let (w, diff) = kernel(y, i, j);
            let q = (w / sum_q).max(MIN_PROBABILITY);
            kl += pij * (pij.max(MIN_PROBABILITY) / q).ln();
            ax += exaggeration * pij * w * diff[0];
            ay += exaggeration * pij * w * diff[1];
        }
        grad[2 * i] = 4.0 * (ax + grad[2 * i] / sum_q);
        grad[2 * i + 1] = 4.0 * (ay + grad[2 * i + 1] / sum_q);
    }
    kl
}

fn recenter(y: &mut [f64], n: usize) {
    let (mut mx, mut my) = (0.0, 0.0);
    for point in y.chunks_exact(2) {
        mx += point[0];
        my += point[1];
    }
    mx /= n as f64;
    my /= n as f64;
    for point in y.chunks_exact_mut(2) {
        point[0] -= mx;
        point[1] -= my;
    }
}
