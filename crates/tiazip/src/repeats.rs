//! Repeat selection over a rank sequence.
//!
//! Left-diverse suffix tree nodes yield candidate repeat classes; each is
//! scored by the bytes it would save and committed greedily from a
//! priority queue. Committing a class claims its positions, which can
//! invalidate cheaper candidates; those are re-scored when popped and
//! pushed back if something else now outweighs them.
//!
//! The result is a position-indexed copy plan: at every index the span
//! either holds a literal (`length == 1`, `start == index`), opens a macro
//! definition (`length > 1`, `start == index`), or calls one
//! (`length > 1`, `start < index`).

use std::collections::BinaryHeap;
use std::collections::BTreeMap;

use log::debug;

use crate::index::AlphaChar;
use crate::tree::SuffixTree;

/// A contiguous run of one channel's coded sequence.
///
/// `length == 0` marks an unassigned plan position, `length == 1` a
/// literal; `length > 1` with `start` before the position marks a
/// reference to the copy beginning at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub subsong: u16,
    pub channel: usize,
    pub start: usize,
    pub length: usize,
}

impl Span {
    pub fn new(subsong: u16, channel: usize, start: usize, length: usize) -> Self {
        Span {
            subsong,
            channel,
            start,
            length,
        }
    }
}

/// One maximal left-diverse occurrence class.
#[derive(Debug, Clone)]
pub struct DuplicateSpans {
    pub length: usize,
    pub weight: usize,
    pub spans: Vec<Span>,
    /// Histogram of characters immediately before each occurrence.
    pub incoming: BTreeMap<AlphaChar, usize>,
    /// Histogram of characters just past each occurrence.
    pub outgoing: BTreeMap<AlphaChar, usize>,
}

/// Heap entry ordering: weight first, length second, earliest candidate
/// wins remaining ties so selection is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    weight: usize,
    length: usize,
    index: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.weight
            .cmp(&other.weight)
            .then(self.length.cmp(&other.length))
            .then(other.index.cmp(&self.index))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Enumerate scored repeat candidates from the left-diverse nodes of the
/// tree, with overlapping occurrences already filtered out.
pub fn gather_candidates(
    tree: &SuffixTree,
    s: &[AlphaChar],
    subsong: u16,
    channel: usize,
    min_repeat_depth: usize,
) -> Vec<DuplicateSpans> {
    let mut candidates = Vec::new();

    for node in tree.gather_left(s) {
        let length = tree.node(node).depth;
        if length < min_repeat_depth {
            continue;
        }
        let mut starts: Vec<usize> = tree
            .gather_leaves(node)
            .into_iter()
            .map(|leaf| tree.node(leaf).start)
            .collect();
        starts.sort_unstable();

        // drop occurrences overlapping an earlier kept one
        let mut kept: Vec<usize> = Vec::new();
        let mut last_end = 0usize;
        for start in starts {
            if start < last_end {
                continue;
            }
            last_end = start + length;
            kept.push(start);
        }

        let repeats = kept.len();
        let uncompressed = length * repeats;
        let overhead = length + repeats;
        if overhead >= uncompressed {
            continue;
        }

        let mut duplicates = DuplicateSpans {
            length,
            weight: uncompressed - overhead,
            spans: Vec::with_capacity(repeats),
            incoming: BTreeMap::new(),
            outgoing: BTreeMap::new(),
        };
        for &start in &kept {
            duplicates
                .spans
                .push(Span::new(subsong, channel, start, length));
            let char_in = if start > 0 { s[start - 1] } else { 0 };
            *duplicates.incoming.entry(char_in).or_insert(0) += 1;
            let end = start + length;
            let char_out = if end < s.len() - 1 { s[end + 1] } else { 0 };
            *duplicates.outgoing.entry(char_out).or_insert(0) += 1;
        }
        candidates.push(duplicates);
    }

    candidates
}

/// Log a lower-bound size estimate for the candidate cover, mirroring the
/// selector's pre-pass diagnostics.
fn log_size_estimate(s: &[AlphaChar], candidates: &[DuplicateSpans]) {
    let mut covered = vec![0usize; s.len()];
    let mut starts: Vec<Vec<usize>> = vec![Vec::new(); s.len()];
    for (index, dup) in candidates.iter().enumerate() {
        for span in &dup.spans {
            starts[span.start].push(index);
            for slot in covered.iter_mut().skip(span.start).take(span.length) {
                *slot += 1;
            }
        }
    }

    let mut unique_spans = 0usize;
    let mut min_repeats = 0usize;
    let mut min_transitions = 0usize;
    let mut min_transition_bits = 0f64;
    for i in 0..s.len() {
        if covered[i] == 0 {
            unique_spans += 1;
        }
        let min_candidate = starts[i]
            .iter()
            .copied()
            .min_by_key(|&c| candidates[c].length);
        if let Some(c) = min_candidate {
            let dup = &candidates[c];
            if dup.spans[0].start == i {
                min_repeats += dup.length + 1;
            }
            min_transitions += 1;
            let max_transitions = covered[i]
                .max(dup.incoming.len())
                .max(dup.outgoing.len())
                .max(1);
            min_transition_bits += (max_transitions as f64).log2();
        }
    }
    let total_estimate = unique_spans + min_repeats + (min_transition_bits / 8.0) as usize;
    debug!(
        "codes: {} estimate: {} unique: {} minRepeats: {} minTransitions: {} minTransitionBits: {:.2}",
        s.len(),
        total_estimate,
        unique_spans,
        min_repeats,
        min_transitions,
        min_transition_bits
    );
}

/// Select non-overlapping repeats and produce the copy plan for `s`.
///
/// `s` is the rank-translated sequence including the terminator. The plan
/// has one span per position; committed occurrence classes never overlap.
pub fn select_repeats(
    tree: &SuffixTree,
    s: &[AlphaChar],
    subsong: u16,
    channel: usize,
    min_repeat_depth: usize,
) -> Vec<Span> {
    let mut candidates = gather_candidates(tree, s, subsong, channel, min_repeat_depth);
    log_size_estimate(s, &candidates);

    let mut heap: BinaryHeap<HeapEntry> = candidates
        .iter()
        .enumerate()
        .map(|(index, dup)| HeapEntry {
            weight: dup.weight,
            length: dup.length,
            index,
        })
        .collect();

    let mut copy_sequence: Vec<Span> = (0..s.len())
        .map(|i| Span::new(subsong, channel, i, 0))
        .collect();

    while let Some(entry) = heap.pop() {
        let top = &mut candidates[entry.index];

        // check which spans are still free to claim
        let mut non_maximal = 0usize;
        for i in 0..top.spans.len() {
            let span = top.spans[i];
            if span.length == 0 {
                continue;
            }
            let claimed = copy_sequence[span.start..span.start + span.length]
                .iter()
                .any(|slot| slot.length > 0);
            if claimed {
                if top.weight < span.length {
                    top.weight = 0;
                    break;
                }
                top.weight -= span.length;
                top.spans[i].length = 0;
                non_maximal += 1;
            }
        }

        if top.weight == 0 {
            continue;
        }
        if non_maximal > 0 {
            if let Some(next) = heap.peek() {
                if next.weight > top.weight {
                    // no longer the most valuable, defer
                    heap.push(HeapEntry {
                        weight: top.weight,
                        length: top.length,
                        index: entry.index,
                    });
                    continue;
                }
            }
        }

        debug!(
            "compressing: {} - weight: {} spans: {} in: {} out: {}",
            top.length,
            top.weight,
            top.spans.len(),
            top.incoming.len(),
            top.outgoing.len()
        );

        // first valid span becomes the definition, the rest point back at it
        let mut first_start: Option<usize> = None;
        for span in &top.spans {
            if span.length == 0 {
                continue;
            }
            match first_start {
                None => {
                    first_start = Some(span.start);
                    copy_sequence[span.start] = *span;
                }
                Some(fs) => {
                    copy_sequence[span.start] = Span::new(subsong, channel, fs, span.length);
                }
            }
            for tail in copy_sequence
                .iter_mut()
                .skip(span.start + 1)
                .take(span.length - 1)
            {
                tail.length = 1;
            }
        }
    }

    // everything unclaimed is a literal
    for (i, span) in copy_sequence.iter_mut().enumerate() {
        if span.length == 0 {
            *span = Span::new(subsong, channel, i, 1);
        }
    }

    copy_sequence
}
