/// Data layer: concept types, loading, bit decoding and annotation selection.
///
/// Architecture:
/// ```text
///   concepts.json
///        │
///        ▼
///   ┌──────────┐
///   │  loader  │  parse file → Dataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  decode  │  packed u64 words → DecodedMatrix (0/1 per bit)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  select  │  usage normalisation + keyword match → Selection
///   └──────────┘
/// ```

pub mod decode;
pub mod loader;
pub mod model;
pub mod select;
