use super::model::Dataset;

// ---------------------------------------------------------------------------
// Selector configuration
// ---------------------------------------------------------------------------

/// Which concepts deserve a text label on the plot.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    /// Case-insensitive substrings matched against the rendered label.
    pub keywords: Vec<String>,
    /// Normalised usage strictly above this value is highlighted.
    pub usage_threshold: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["cat".into(), "tiger".into(), "feline".into()],
            usage_threshold: 0.8,
        }
    }
}

// ---------------------------------------------------------------------------
// Highlight flags
// ---------------------------------------------------------------------------

/// Why a concept is annotated.  `Keyword` outranks `Usage` for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Highlight {
    #[default]
    None,
    Usage,
    Keyword,
}

impl Highlight {
    pub fn is_interesting(self) -> bool {
        self != Highlight::None
    }
}

/// Per-concept normalised usage and highlight flag, in record order.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub normalized_usage: Vec<f64>,
    pub highlights: Vec<Highlight>,
    /// Raw usage range, for the colour bar.
    pub usage_range: (u64, u64),
}

impl Selection {
    /// Indices of concepts that get a label.
    pub fn interesting_indices(&self) -> Vec<usize> {
        self.highlights
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_interesting())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self, highlight: Highlight) -> usize {
        self.highlights.iter().filter(|&&h| h == highlight).count()
    }
}

// ---------------------------------------------------------------------------
// Normalisation and selection
// ---------------------------------------------------------------------------

/// Min–max scale usage counters to `[0, 1]`.
///
/// A constant column carries no signal, so every value maps to exactly 0.
pub fn normalize_usage(usages: &[u64]) -> Vec<f64> {
    let min = usages.iter().copied().min().unwrap_or(0);
    let max = usages.iter().copied().max().unwrap_or(0);
    if max == min {
        return vec![0.0; usages.len()];
    }
    let range = (max - min) as f64;
    usages.iter().map(|&u| (u - min) as f64 / range).collect()
}

/// Whether `label` contains any of `keywords`, ignoring case.
pub fn matches_keyword(label: &str, keywords: &[String]) -> bool {
    let label = label.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| label.contains(&k.to_lowercase()))
}

/// Flag every concept of the dataset.
pub fn select(dataset: &Dataset, config: &SelectorConfig) -> Selection {
    let usages = dataset.usages();
    let normalized_usage = normalize_usage(&usages);

    let highlights: Vec<Highlight> = dataset
        .records
        .iter()
        .zip(&normalized_usage)
        .map(|(rec, &norm)| {
            if matches_keyword(&rec.term.label(), &config.keywords) {
                Highlight::Keyword
            } else if norm > config.usage_threshold {
                Highlight::Usage
            } else {
                Highlight::None
            }
        })
        .collect();

    let usage_range = (
        usages.iter().copied().min().unwrap_or(0),
        usages.iter().copied().max().unwrap_or(0),
    );

    let selection = Selection {
        normalized_usage,
        highlights,
        usage_range,
    };
    log::info!(
        "Annotating {} keyword and {} high-usage concepts",
        selection.count(Highlight::Keyword),
        selection.count(Highlight::Usage)
    );
    selection
}
