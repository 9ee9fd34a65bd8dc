use std::path::{Path, PathBuf};

use crate::config::VizConfig;
use crate::error::Result;
use crate::state::PipelineRun;

// ---------------------------------------------------------------------------
// One end-to-end visualization
// ---------------------------------------------------------------------------

/// Load, decode, reduce and render `input`; returns the written image path.
///
/// Stops at the first failing step; nothing is written in that case.
pub fn run(input: &Path, config: &VizConfig) -> Result<PathBuf> {
    let mut run = PipelineRun::new(input);
    match drive(&mut run, config) {
        Ok(path) => {
            log::info!("{}", summary(&run));
            Ok(path)
        }
        Err(err) => {
            log::debug!(
                "run for {} failed at {:?}: {}",
                run.input().display(),
                run.stage(),
                run.failure().unwrap_or("unknown")
            );
            Err(err)
        }
    }
}

fn drive(run: &mut PipelineRun, config: &VizConfig) -> Result<PathBuf> {
    run.load()?;
    run.decode(config)?;
    run.reduce(config)?;
    run.render(config)?;
    run.finish()
}

/// One-line account of a finished run: shape, variance kept, labels drawn,
/// and where the time went.
fn summary(run: &PipelineRun) -> String {
    let mut parts = Vec::new();
    if let Some(m) = run.decoded() {
        parts.push(format!("{} concepts x {} bits", m.rows(), m.cols()));
    }
    if let Some(r) = run.reduction() {
        let kept: f64 = r.projection.explained_variance_ratio.iter().sum();
        parts.push(format!("PCA kept {:.1}% of the variance", kept * 100.0));
    }
    if let Some(s) = run.selection() {
        parts.push(format!("{} annotated", s.interesting_indices().len()));
    }
    let timings: Vec<String> = run
        .timings()
        .iter()
        .map(|(stage, elapsed)| format!("{stage:?} {elapsed:.2?}"))
        .collect();
    if !timings.is_empty() {
        parts.push(timings.join(", "));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn missing_input_is_reported_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("concepts.json");
        let err = run(&input, &VizConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert!(!dir.path().join("concepts.png").exists());
    }

    #[test]
    fn finished_run_writes_image_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("concepts.json");
        std::fs::write(
            &input,
            r#"[{"term": "cat", "usage": 10, "vector": [33554431]},
                {"term": "dog", "usage": 1, "vector": [1125899873288192]}]"#,
        )
        .unwrap();
        let mut config = VizConfig::default();
        config.reducer.iterations = 50;
        config.reducer.exaggeration_iterations = 10;

        let output = run(&input, &config).unwrap();
        assert_eq!(output, dir.path().join("concepts.png"));
        assert!(output.exists());

        let mut replay = PipelineRun::new(&input);
        drive(&mut replay, &config).unwrap();
        let line = summary(&replay);
        assert!(line.starts_with("2 concepts x 64 bits"), "{line}");
        assert!(line.contains("1 annotated"), "{line}");
        assert!(line.contains("Rendered"), "{line}");
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("concepts.json");
        std::fs::write(&input, r#"[{"term": "cat", "usage": "lots"}]"#).unwrap();
        let err = run(&input, &VizConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
        assert!(!dir.path().join("concepts.png").exists());
    }
}
