use std::fmt;

use serde::{Deserialize, Deserializer};

// ---------------------------------------------------------------------------
// Term – the concept's symbolic label
// ---------------------------------------------------------------------------

/// The symbolic term a concept stands for.
///
/// The exporter writes either a bare string or the engine's own tagged
/// representation (`{"Atom": ...}` / `{"Var": [kind, id]}` /
/// `{"Compound": [op, [args]]}`).  All are normalised into this enum on load
/// so the rest of the pipeline never has to inspect JSON shapes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTerm")]
pub enum Term {
    Atom(String),
    Var { kind: VarKind, name: String },
    Compound { operator: String, args: Vec<Term> },
}

/// Variable flavours, written with their Narsese sigils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum VarKind {
    Independent,
    Dependent,
    Query,
}

impl VarKind {
    pub fn sigil(self) -> char {
        match self {
            VarKind::Independent => '$',
            VarKind::Dependent => '#',
            VarKind::Query => '?',
        }
    }
}

impl Term {
    pub fn atom(label: impl Into<String>) -> Self {
        Term::Atom(label.into())
    }

    /// The canonical display label, identical to the `Display` output.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(label) => write!(f, "{label}"),
            Term::Var { kind, name } => write!(f, "{}{name}", kind.sigil()),
            Term::Compound { operator, args } => {
                write!(f, "({operator}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// -- Wire shapes accepted for `term` --

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTerm {
    Plain(String),
    Tagged(TaggedTerm),
}

#[derive(Deserialize)]
enum TaggedTerm {
    Atom(AtomLabel),
    Var(VarKind, AtomLabel),
    Compound(RawOperator, Vec<RawTerm>),
}

/// Names are strings in hand-written exports and FNV hashes in engine dumps.
#[derive(Deserialize)]
#[serde(untagged)]
enum AtomLabel {
    Text(String),
    Id(u64),
}

impl AtomLabel {
    fn into_name(self) -> String {
        match self {
            AtomLabel::Text(s) => s,
            AtomLabel::Id(id) => id.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOperator {
    Named(String),
    Other {
        #[serde(rename = "Other")]
        other: String,
    },
}

impl From<RawTerm> for Term {
    fn from(raw: RawTerm) -> Self {
        match raw {
            RawTerm::Plain(s) => Term::atom(s),
            RawTerm::Tagged(TaggedTerm::Atom(label)) => Term::atom(label.into_name()),
            RawTerm::Tagged(TaggedTerm::Var(kind, label)) => Term::Var {
                kind,
                name: label.into_name(),
            },
            RawTerm::Tagged(TaggedTerm::Compound(op, args)) => Term::Compound {
                operator: match op {
                    RawOperator::Named(name) => name,
                    RawOperator::Other { other } => other,
                },
                args: args.into_iter().map(Term::from).collect(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ConceptRecord – one exported concept
// ---------------------------------------------------------------------------

/// A single concept as exported by the memory engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConceptRecord {
    pub term: Term,
    /// Non-negative usage counter; drives colour and annotation.
    pub usage: u64,
    /// Packed hypervector, 64 bits per word, LSB first.
    #[serde(deserialize_with = "deserialize_words")]
    pub vector: Vec<u64>,
}

/// Accepts the flat `[u64, ...]` layout and the older `{"bits": [...]}` one.
fn deserialize_words<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Words {
        Flat(Vec<u64>),
        Nested { bits: Vec<u64> },
    }

    Ok(match Words::deserialize(deserializer)? {
        Words::Flat(words) | Words::Nested { bits: words } => words,
    })
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded export
// ---------------------------------------------------------------------------

/// All concepts of one export, in file order.  Never mutated after loading.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<ConceptRecord>,
}

impl Dataset {
    pub fn new(records: Vec<ConceptRecord>) -> Self {
        Dataset { records }
    }

    /// Number of concepts.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Display labels in record order.
    pub fn labels(&self) -> Vec<String> {
        self.records.iter().map(|r| r.term.label()).collect()
    }

    /// Raw usage counters in record order.
    pub fn usages(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.usage).collect()
    }
}
