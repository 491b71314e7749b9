//! Deduplication and indexing of folded sequences and coded streams.
//!
//! Row-aligned sequences are grouped into equivalence classes by their
//! polynomial hash; each class gets one canonical row key. A finite
//! [`Alphabet`] assigns dense ranks to distinct codes so the suffix tree
//! can index children by rank.

use std::collections::BTreeMap;

use log::debug;

use crate::state::ChannelStateSequence;

/// A distinct code in a coded stream. Code 0 is the reserved terminator.
pub type AlphaCode = u64;

/// Rank of a code in an [`Alphabet`]. Rank 0 is the terminator.
pub type AlphaChar = usize;

/// Group row sequences into hash-equivalence classes.
///
/// Returns `(canonical_by_hash, freq_by_hash, representative_by_row_key)`.
/// The first row key (in key order) to produce a hash becomes the class
/// canonical; every row key maps to its class canonical in the
/// representative map. Hash equality is treated as behavioral equivalence.
#[allow(clippy::type_complexity)]
pub fn find_common_sequences(
    sequences: &BTreeMap<String, ChannelStateSequence>,
) -> (
    BTreeMap<u64, String>,
    BTreeMap<u64, u32>,
    BTreeMap<String, String>,
) {
    let mut canonical: BTreeMap<u64, String> = BTreeMap::new();
    let mut frequency: BTreeMap<u64, u32> = BTreeMap::new();
    let mut representative: BTreeMap<String, String> = BTreeMap::new();

    for (key, seq) in sequences {
        let hash = seq.hash();
        match canonical.get(&hash) {
            None => {
                canonical.insert(hash, key.clone());
                frequency.insert(hash, 1);
            }
            Some(existing) => {
                *frequency.get_mut(&hash).unwrap() += 1;
                // a different interval count under the same hash would be a
                // real collision; surface it in diagnostics
                if sequences[existing].len() != seq.len() {
                    debug!(
                        "hash {:x} groups {} and {} with differing interval counts",
                        hash, existing, key
                    );
                }
            }
        }
        representative.insert(key.clone(), canonical[&hash].clone());
    }

    (canonical, frequency, representative)
}

/// Ordered set of distinct codes with a dense rank assignment.
///
/// Rank 0 always belongs to code 0 (the terminator). All other codes are
/// ranked by descending frequency with ascending code value as tie-break,
/// so the hottest codes get the smallest ranks.
#[derive(Debug, Clone)]
pub struct Alphabet {
    codes: Vec<AlphaCode>,
    index: BTreeMap<AlphaCode, AlphaChar>,
}

impl Alphabet {
    /// Build an alphabet from a code frequency map.
    pub fn from_frequencies(freq: &BTreeMap<AlphaCode, usize>) -> Self {
        let mut codes: Vec<AlphaCode> = vec![0];
        let mut index: BTreeMap<AlphaCode, AlphaChar> = BTreeMap::new();
        index.insert(0, 0);

        let mut ranked: Vec<(AlphaCode, usize)> = freq
            .iter()
            .filter(|(&code, _)| code != 0)
            .map(|(&code, &count)| (code, count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        for (code, _) in ranked {
            index.insert(code, codes.len());
            codes.push(code);
        }

        Alphabet { codes, index }
    }

    /// Number of distinct codes, terminator included.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.len() <= 1
    }

    /// Rank of a code, if it is in the alphabet.
    pub fn rank_of(&self, code: AlphaCode) -> Option<AlphaChar> {
        self.index.get(&code).copied()
    }

    /// Code at a rank.
    pub fn code_at(&self, rank: AlphaChar) -> AlphaCode {
        self.codes[rank]
    }

    /// Translate a code stream into ranks. Every code must be in the
    /// alphabet; the caller keeps the terminator code at the end.
    pub fn translate(&self, codes: &[AlphaCode]) -> Vec<AlphaChar> {
        codes.iter().map(|c| self.index[c]).collect()
    }
}

/// Shannon statistics over a code frequency map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodeStats {
    /// Total symbols counted.
    pub symbols: usize,
    /// Distinct non-terminator codes.
    pub distinct: usize,
    /// Entropy in bits per symbol.
    pub entropy: f64,
    /// Entropy-ideal size of the stream in bytes.
    pub expected_bytes: f64,
}

/// Compute the zero-order entropy of a code stream from its frequency map.
/// The terminator code does not participate.
pub fn code_stats(freq: &BTreeMap<AlphaCode, usize>) -> CodeStats {
    let symbols: usize = freq.values().sum();
    let mut distinct = 0usize;
    let mut entropy = 0f64;
    if symbols > 0 {
        for (&code, &count) in freq {
            if code == 0 || count == 0 {
                continue;
            }
            distinct += 1;
            let p = count as f64 / symbols as f64;
            entropy -= p * p.log2();
        }
    }
    let expected_bytes = entropy * symbols as f64 / 8.0;
    CodeStats {
        symbols,
        distinct,
        entropy,
        expected_bytes,
    }
}
