/// Dimensionality reduction: decoded bits → PCA scores → 2D t-SNE layout.
///
/// ```text
///   DecodedMatrix (n × bits)
///        │
///        ▼
///   ┌──────────┐
///   │   pca    │  n × min(50, n) scores (full or randomized solver)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   tsne   │  n × 2 embedding (exact, or Barnes-Hut over a quadtree)
///   └──────────┘
/// ```
pub mod pca;
mod quadtree;
pub mod tsne;

use nalgebra::DMatrix;

use crate::data::decode::DecodedMatrix;
use crate::error::{PipelineError, Result};

use self::pca::Projection;
use self::tsne::{Method, TsneParams};

/// Reducer settings.  The seed is the only source of randomness.
///
/// `theta` is the Barnes-Hut angle used above
/// [`tsne::EXACT_MAX_POINTS`] samples; `0` keeps the exact gradient at any
/// size.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerConfig {
    pub seed: u64,
    pub max_components: usize,
    pub max_perplexity: f64,
    pub iterations: usize,
    pub early_exaggeration: f64,
    pub exaggeration_iterations: usize,
    pub theta: f64,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_components: 50,
            max_perplexity: 30.0,
            iterations: 1000,
            early_exaggeration: 12.0,
            exaggeration_iterations: 250,
            theta: 0.5,
        }
    }
}

/// Output of both reduction stages.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub projection: Projection,
    /// `n × 2` layout, one row per concept.
    pub embedding: DMatrix<f64>,
}

impl Reduction {
    /// 2D coordinates of every concept, in record order.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.embedding
            .row_iter()
            .map(|row| (row[0], row[1]))
            .collect()
    }
}

/// Run PCA then t-SNE on the decoded matrix.
pub fn reduce(decoded: &DecodedMatrix, config: &ReducerConfig) -> Result<Reduction> {
    let n = decoded.rows();
    if n < 2 {
        return Err(PipelineError::InsufficientData { found: n });
    }

    let components = config.max_components.min(n);
    log::info!("Reducing {n} x {} bits to {components} principal components", decoded.cols());
    let projection = pca::project(decoded, components, config.seed);
    let retained: f64 = projection.explained_variance_ratio.iter().sum();
    log::debug!(
        "PCA retains {:.1}% of the variance (leading component {:.3})",
        retained * 100.0,
        projection.explained_variance.first().copied().unwrap_or(0.0)
    );

    let params = TsneParams {
        perplexity: tsne::perplexity_for(n, config.max_perplexity),
        iterations: config.iterations,
        early_exaggeration: config.early_exaggeration,
        exaggeration_iterations: config.exaggeration_iterations,
        seed: config.seed,
        method: Method::for_size(n, config.theta),
    };
    log::info!(
        "Reducing dimensions with t-SNE (perplexity {}, {:?})...",
        params.perplexity,
        params.method
    );
    let embedding = tsne::embed(&projection.scores, &params);

    Ok(Reduction {
        projection,
        embedding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::decode::decode;
    use crate::data::model::{ConceptRecord, Dataset, Term};

    fn decoded(n: usize) -> DecodedMatrix {
        let records = (0..n as u64)
            .map(|i| ConceptRecord {
                term: Term::atom(format!("c{i}")),
                usage: i,
                vector: vec![i.wrapping_mul(0x9E37_79B9_7F4A_7C15), !i],
            })
            .collect();
        decode(&Dataset::new(records), 1000).unwrap()
    }

    fn quick() -> ReducerConfig {
        ReducerConfig {
            iterations: 200,
            exaggeration_iterations: 50,
            ..ReducerConfig::default()
        }
    }

    #[test]
    fn single_record_is_insufficient() {
        let err = reduce(&decoded(1), &quick()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { found: 1 }));
    }

    #[test]
    fn stage_shapes_follow_sample_count() {
        for n in [2, 7, 60] {
            let r = reduce(&decoded(n), &quick()).unwrap();
            assert_eq!(r.projection.scores.ncols(), n.min(50), "n = {n}");
            assert_eq!(r.embedding.shape(), (n, 2));
            assert_eq!(r.points().len(), n);
        }
    }

    #[test]
    fn reruns_with_same_seed_match() {
        let m = decoded(12);
        let a = reduce(&m, &quick()).unwrap();
        let b = reduce(&m, &quick()).unwrap();
        assert_eq!(a.embedding, b.embedding);
    }

    #[test]
    fn large_inputs_use_the_approximate_solvers() {
        let n = 600;
        let config = ReducerConfig {
            iterations: 60,
            exaggeration_iterations: 20,
            ..ReducerConfig::default()
        };
        let r = reduce(&decoded(n), &config).unwrap();
        assert_eq!(r.projection.scores.shape(), (n, 50));
        assert_eq!(r.embedding.shape(), (n, 2));
        assert!(r.embedding.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn seed_changes_the_layout() {
        let m = decoded(12);
        let a = reduce(&m, &quick()).unwrap();
        let b = reduce(&m, &ReducerConfig { seed: 7, ..quick() }).unwrap();
        assert_ne!(a.embedding, b.embedding);
    }
}
