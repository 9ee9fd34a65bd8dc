use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::VizConfig;
use crate::data::decode::{self, DecodedMatrix};
use crate::data::loader;
use crate::data::model::Dataset;
use crate::data::select::{self, Selection};
use crate::error::{PipelineError, Result};
use crate::plot;
use crate::reduce::{self, Reduction};

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

/// Where a run currently stands.  `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loaded,
    Decoded,
    Reduced,
    Rendered,
    Done,
    Failed,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// One visualization run and everything it has produced so far.
///
/// Each step consumes the previous step's output; any error moves the run
/// to [`Stage::Failed`] and every later step is refused.
pub struct PipelineRun {
    input: PathBuf,
    stage: Stage,

    dataset: Option<Dataset>,
    decoded: Option<DecodedMatrix>,
    reduction: Option<Reduction>,
    selection: Option<Selection>,
    artifact: Option<PathBuf>,

    /// Reason for the failure, once failed.
    failure: Option<String>,
    /// Wall time of each completed step.
    timings: Vec<(Stage, Duration)>,
}

impl PipelineRun {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            stage: Stage::Idle,
            dataset: None,
            decoded: None,
            reduction: None,
            selection: None,
            artifact: None,
            failure: None,
            timings: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn timings(&self) -> &[(Stage, Duration)] {
        &self.timings
    }

    pub fn decoded(&self) -> Option<&DecodedMatrix> {
        self.decoded.as_ref()
    }

    pub fn reduction(&self) -> Option<&Reduction> {
        self.reduction.as_ref()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// `Idle → Loaded`: read the dataset.
    pub fn load(&mut self) -> Result<()> {
        self.enter(Stage::Idle, Stage::Loaded)?;
        let started = Instant::now();
        let dataset = loader::load_file(&self.input);
        let dataset = self.settle(dataset)?;
        self.dataset = Some(dataset);
        self.complete(Stage::Loaded, started);
        Ok(())
    }

    /// `Loaded → Decoded`: unpack vectors; rejects empty datasets.
    pub fn decode(&mut self, config: &VizConfig) -> Result<()> {
        self.enter(Stage::Loaded, Stage::Decoded)?;
        let started = Instant::now();
        let decoded = match &self.dataset {
            Some(ds) => decode::decode(ds, config.progress_interval),
            None => Err(PipelineError::EmptyDataset),
        };
        let decoded = self.settle(decoded)?;
        self.decoded = Some(decoded);
        self.complete(Stage::Decoded, started);
        Ok(())
    }

    /// `Decoded → Reduced`: PCA then t-SNE.
    pub fn reduce(&mut self, config: &VizConfig) -> Result<()> {
        self.enter(Stage::Decoded, Stage::Reduced)?;
        let started = Instant::now();
        let reduction = match &self.decoded {
            Some(m) => reduce::reduce(m, &config.reducer),
            None => Err(PipelineError::InsufficientData { found: 0 }),
        };
        let reduction = self.settle(reduction)?;
        self.reduction = Some(reduction);
        self.complete(Stage::Reduced, started);
        Ok(())
    }

    /// `Reduced → Rendered`: select annotations and write the image.
    pub fn render(&mut self, config: &VizConfig) -> Result<()> {
        self.enter(Stage::Reduced, Stage::Rendered)?;
        let started = Instant::now();
        let (Some(dataset), Some(reduction)) = (&self.dataset, &self.reduction) else {
            let err = PipelineError::InvalidTransition {
                from: Stage::Reduced,
                to: Stage::Rendered,
            };
            return self.settle(Err(err));
        };

        let selection = select::select(dataset, &config.selector);
        let path = plot::artifact_path(&self.input);
        log::info!("Plotting...");
        let written = plot::render_to_file(
            &reduction.points(),
            &dataset.labels(),
            &selection,
            &config.render,
            &path,
        );
        self.settle(written)?;

        self.selection = Some(selection);
        self.artifact = Some(path);
        self.complete(Stage::Rendered, started);
        Ok(())
    }

    /// `Rendered → Done`: hand back the artifact path.
    pub fn finish(&mut self) -> Result<PathBuf> {
        self.enter(Stage::Rendered, Stage::Done)?;
        let path = self.artifact.clone().ok_or(PipelineError::InvalidTransition {
            from: Stage::Rendered,
            to: Stage::Done,
        });
        let path = self.settle(path)?;
        self.stage = Stage::Done;
        Ok(path)
    }

    // -- transitions --

    fn enter(&self, expected: Stage, next: Stage) -> Result<()> {
        if self.stage != expected {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        log::debug!("pipeline: {expected:?} -> {next:?}");
        Ok(())
    }

    /// Pass a step's result through, failing the run on error.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.stage = Stage::Failed;
            self.failure = Some(err.to_string());
        }
        result
    }

    fn complete(&mut self, stage: Stage, started: Instant) {
        let elapsed = started.elapsed();
        log::debug!("pipeline: {stage:?} in {elapsed:.2?}");
        self.timings.push((stage, elapsed));
        self.stage = stage;
    }
}
