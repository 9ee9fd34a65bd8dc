//! Run configuration, read from the environment.

use std::str::FromStr;

use crate::data::select::SelectorConfig;
use crate::error::{PipelineError, Result};
use crate::plot::RenderConfig;
use crate::reduce::ReducerConfig;

// Environment variable names for configuration.

/// Seed for the embedding's initial layout.
pub const ENV_SEED: &str = "HYPERMAP_SEED";
/// Comma-separated annotation keywords.
pub const ENV_KEYWORDS: &str = "HYPERMAP_KEYWORDS";
/// Normalised usage above which a concept is annotated.
pub const ENV_USAGE_THRESHOLD: &str = "HYPERMAP_USAGE_THRESHOLD";
/// Number of t-SNE optimisation steps.
pub const ENV_TSNE_ITERATIONS: &str = "HYPERMAP_TSNE_ITERATIONS";
/// Barnes-Hut angle for large inputs; 0 forces the exact gradient.
pub const ENV_TSNE_THETA: &str = "HYPERMAP_TSNE_THETA";
/// Records between decode progress messages.
pub const ENV_PROGRESS_INTERVAL: &str = "HYPERMAP_PROGRESS_INTERVAL";

/// Everything a run can be tuned with.
#[derive(Debug, Clone, PartialEq)]
pub struct VizConfig {
    pub reducer: ReducerConfig,
    pub selector: SelectorConfig,
    pub render: RenderConfig,
    pub progress_interval: usize,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            reducer: ReducerConfig::default(),
            selector: SelectorConfig::default(),
            render: RenderConfig::default(),
            progress_interval: 1000,
        }
    }
}

impl VizConfig {
    /// Defaults overridden by any `HYPERMAP_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`VizConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(seed) = parse::<u64>(&lookup, ENV_SEED)? {
            config.reducer.seed = seed;
        }
        if let Some(iterations) = parse::<usize>(&lookup, ENV_TSNE_ITERATIONS)? {
            if iterations == 0 {
                return Err(invalid(ENV_TSNE_ITERATIONS, "must be at least 1"));
            }
            config.reducer.iterations = iterations;
        }
        if let Some(theta) = parse::<f64>(&lookup, ENV_TSNE_THETA)? {
            if !(0.0..=1.0).contains(&theta) {
                return Err(invalid(ENV_TSNE_THETA, "must lie in [0, 1]"));
            }
            config.reducer.theta = theta;
        }
        if let Some(threshold) = parse::<f64>(&lookup, ENV_USAGE_THRESHOLD)? {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(invalid(ENV_USAGE_THRESHOLD, "must lie in [0, 1]"));
            }
            config.selector.usage_threshold = threshold;
        }
        if let Some(raw) = lookup(ENV_KEYWORDS) {
            config.selector.keywords = raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(interval) = parse::<usize>(&lookup, ENV_PROGRESS_INTERVAL)? {
            if interval == 0 {
                return Err(invalid(ENV_PROGRESS_INTERVAL, "must be at least 1"));
            }
            config.progress_interval = interval;
        }

        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|val| val.trim().parse().map_err(|e| invalid(key, e)))
        .transpose()
}

fn invalid(key: &str, reason: impl std::fmt::Display) -> PipelineError {
    PipelineError::Config(format!("invalid {key}: {reason}"))
}
