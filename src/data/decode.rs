use crate::error::{PipelineError, Result};

use super::model::Dataset;

/// Bits per packed vector word.
pub const WORD_BITS: usize = 64;

// ---------------------------------------------------------------------------
// DecodedMatrix – dense 0/1 rows, one per concept
// ---------------------------------------------------------------------------

/// Dense bit matrix, row-major, one byte (0 or 1) per bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMatrix {
    rows: usize,
    cols: usize,
    bits: Vec<u8>,
}

impl DecodedMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Bits of record `i`.
    pub fn row(&self, i: usize) -> &[u8] {
        &self.bits[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.bits[row * self.cols + col]
    }
}

/// Unpack one record's words, least-significant bit first, words in order.
pub fn unpack_words(words: &[u64], out: &mut Vec<u8>) {
    out.reserve(words.len() * WORD_BITS);
    for &word in words {
        for b in 0..WORD_BITS {
            out.push(((word >> b) & 1) as u8);
        }
    }
}

/// Decode every record of the dataset into a dense bit matrix.
///
/// The word count of the first record fixes the width; any other count is a
/// fatal [`PipelineError::DimensionMismatch`].  Progress is logged every
/// `progress_interval` records.
pub fn decode(dataset: &Dataset, progress_interval: usize) -> Result<DecodedMatrix> {
    let first = dataset.records.first().ok_or(PipelineError::EmptyDataset)?;
    let words_per_record = first.vector.len();
    let cols = words_per_record * WORD_BITS;
    let rows = dataset.len();

    let mut bits = Vec::with_capacity(rows * cols);
    for (index, record) in dataset.records.iter().enumerate() {
        if record.vector.len() != words_per_record {
            return Err(PipelineError::DimensionMismatch {
                index,
                expected: words_per_record,
                found: record.vector.len(),
            });
        }
        unpack_words(&record.vector, &mut bits);

        let done = index + 1;
        if progress_interval > 0 && done % progress_interval == 0 {
            log::info!("Decoded {done}/{rows} concepts");
        }
    }

    log::debug!("Decoded matrix: {rows} x {cols} bits");
    Ok(DecodedMatrix { rows, cols, bits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ConceptRecord, Term};

    fn record(label: &str, usage: u64, vector: Vec<u64>) -> ConceptRecord {
        ConceptRecord {
            term: Term::atom(label),
            usage,
            vector,
        }
    }

    #[test]
    fn bits_follow_lsb_first_word_order() {
        let words = vec![0x8000_0000_0000_0001, 0xF0, u64::MAX, 0];
        let ds = Dataset::new(vec![
            record("a", 0, words.clone()),
            record("b", 0, vec![0x0123_4567_89AB_CDEF; 4]),
        ]);
        let m = decode(&ds, 1000).unwrap();

        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 4 * WORD_BITS);
        for (r, rec) in ds.records.iter().enumerate() {
            for i in 0..m.cols() {
                let expected = ((rec.vector[i / WORD_BITS] >> (i % WORD_BITS)) & 1) as u8;
                assert_eq!(m.get(r, i), expected, "row {r} bit {i}");
            }
        }
        assert_eq!(m.get(0, 0), 1);
        assert_eq!(m.get(0, 63), 1);
        assert_eq!(&m.row(0)[64..72], &[0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn cat_and_dog_halves_decode() {
        let cat = (1u64 << 25) - 1;
        let dog = cat << 25;
        let ds = Dataset::new(vec![record("cat", 10, vec![cat]), record("dog", 1, vec![dog])]);
        let m = decode(&ds, 1000).unwrap();

        assert_eq!(m.cols(), 64);
        assert!(m.row(0)[..25].iter().all(|&b| b == 1));
        assert!(m.row(0)[25..].iter().all(|&b| b == 0));
        assert!(m.row(1)[..25].iter().all(|&b| b == 0));
        assert!(m.row(1)[25..50].iter().all(|&b| b == 1));
        assert!(m.row(1)[50..].iter().all(|&b| b == 0));
    }

    #[test]
    fn differing_word_counts_are_rejected() {
        let ds = Dataset::new(vec![
            record("a", 0, vec![1, 2]),
            record("b", 0, vec![1, 2]),
            record("c", 0, vec![1]),
        ]);
        let err = decode(&ds, 1000).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch {
                index: 2,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let err = decode(&Dataset::default(), 1000).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset));
    }
}
