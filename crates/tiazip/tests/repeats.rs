use tiazip::program::{encode_copy_sequence, expand_copy_sequence};
use tiazip::repeats::{gather_candidates, select_repeats, Span};
use tiazip::{AlphaChar, AlphaCode, SuffixTree};

fn ranks(input: &str) -> (Vec<AlphaChar>, usize) {
    let mut order: Vec<u8> = Vec::new();
    let mut s: Vec<AlphaChar> = Vec::new();
    for b in input.bytes() {
        let rank = match order.iter().position(|&c| c == b) {
            Some(i) => i + 1,
            None => {
                order.push(b);
                order.len()
            }
        };
        s.push(rank);
    }
    s.push(0);
    (s, order.len() + 1)
}

#[test]
fn test_candidate_scores() {
    let (s, n) = ranks("abcdeabcdefghijfghijabcdexyxyxyx");
    let tree = SuffixTree::build(n, &s);
    let candidates = gather_candidates(&tree, &s, 0, 0, 3);

    // abcde: 3 non-overlapping occurrences, saving 15 - 8
    let abcde = candidates
        .iter()
        .find(|c| c.length == 5 && c.spans[0].start == 0)
        .expect("abcde candidate");
    assert_eq!(abcde.spans.len(), 3);
    assert_eq!(abcde.weight, 7);

    // fghij: 2 occurrences, saving 10 - 7
    let fghij = candidates
        .iter()
        .find(|c| c.length == 5 && c.spans[0].start == 10)
        .expect("fghij candidate");
    assert_eq!(fghij.spans.len(), 2);
    assert_eq!(fghij.weight, 3);
}

#[test]
fn test_candidates_reject_unprofitable_repeats() {
    let (s, n) = ranks("abcdeabcdefghijfghijabcdexyxyxyx");
    let tree = SuffixTree::build(n, &s);
    let candidates = gather_candidates(&tree, &s, 0, 0, 3);
    for c in &candidates {
        let repeats = c.spans.len();
        assert!(c.length + repeats < c.length * repeats);
    }
}

#[test]
fn test_selection_commits_primary_repeats() {
    let (s, n) = ranks("abcdeabcdefghijfghijabcdexyxyxyx");
    let tree = SuffixTree::build(n, &s);
    let plan = select_repeats(&tree, &s, 0, 0, 3);

    // abcde defines at 0 and is called from 5 and 20
    assert_eq!(plan[0], Span::new(0, 0, 0, 5));
    assert_eq!(plan[5], Span::new(0, 0, 0, 5));
    assert_eq!(plan[20], Span::new(0, 0, 0, 5));

    // fghij defines at 10 and is called from 15
    assert_eq!(plan[10], Span::new(0, 0, 10, 5));
    assert_eq!(plan[15], Span::new(0, 0, 10, 5));
}

#[test]
fn test_selection_partitions_sequence() {
    let (s, n) = ranks("abcdeabcdefghijfghijabcdexyxyxyx");
    let tree = SuffixTree::build(n, &s);
    let plan = select_repeats(&tree, &s, 0, 0, 3);

    // stepping by span length visits every position exactly once
    let mut i = 0usize;
    while i < plan.len() {
        let span = plan[i];
        assert!(span.length >= 1);
        if span.start != i {
            // a call points strictly backwards at a definition
            assert!(span.start < i);
            assert_eq!(plan[span.start].start, span.start);
            assert_eq!(plan[span.start].length, span.length);
        }
        i += span.length;
    }
    assert_eq!(i, plan.len());
}

#[test]
fn test_left_uniform_input_stays_literal() {
    let (s, n) = ranks("aaaa");
    let tree = SuffixTree::build(n, &s);
    let plan = select_repeats(&tree, &s, 0, 0, 3);
    for (i, span) in plan.iter().enumerate() {
        assert_eq!((span.start, span.length), (i, 1));
    }
}

#[test]
fn test_plan_expansion_is_lossless() {
    let (s, n) = ranks("abcdeabcdefghijfghijabcdexyxyxyx");
    let tree = SuffixTree::build(n, &s);
    let plan = select_repeats(&tree, &s, 0, 0, 3);

    let codes: Vec<AlphaCode> = s.iter().map(|&r| r as AlphaCode).collect();
    let bounds = Span::new(0, 0, 0, codes.len());
    let expanded = expand_copy_sequence(&codes, &bounds, &plan);
    assert_eq!(expanded, codes);

    // and the encoded program round-trips through expansion of its plan
    let encoded = encode_copy_sequence(&codes, &bounds, &plan);
    assert!(!encoded.is_empty());
}

#[test]
fn test_selection_prefers_heavier_candidates() {
    // "ababab" style overlap: only disjoint occurrences are kept, and the
    // heavier cover wins over fragmented ones
    let (s, n) = ranks("qwertyqwertyzzqwerty");
    let tree = SuffixTree::build(n, &s);
    let plan = select_repeats(&tree, &s, 0, 0, 3);

    assert_eq!(plan[0], Span::new(0, 0, 0, 6));
    assert_eq!(plan[6], Span::new(0, 0, 0, 6));
    assert_eq!(plan[14], Span::new(0, 0, 0, 6));
    // the in-between positions stay literals
    assert_eq!(plan[12], Span::new(0, 0, 12, 1));
    assert_eq!(plan[13], Span::new(0, 0, 13, 1));
}
