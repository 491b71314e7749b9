use tiazip::{AlphaChar, SuffixTree};

/// Translate an ASCII string into ranks (distinct letters get distinct
/// nonzero ranks) and append the terminator rank.
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

fn key_of(s: &[AlphaChar], start: usize, len: usize) -> Vec<AlphaChar> {
    s[start..start + len].to_vec()
}

#[test]
fn test_find_locates_substrings() {
    let (s, n) = ranks("banana");
    let tree = SuffixTree::build(n, &s);

    let key = key_of(&s, 1, 3); // "ana"
    let node = tree.find(&key, &s).expect("ana occurs");
    let start = tree.node(node).start;
    assert_eq!(&s[start..start + 3], key.as_slice());

    // "nab" does not occur
    let bogus = vec![s[2], s[1], s[0]];
    assert!(tree.find(&bogus, &s).is_none());
}

#[test]
fn test_find_whole_string() {
    let (s, n) = ranks("abcabc");
    let tree = SuffixTree::build(n, &s);
    let node = tree.find(&s, &s).expect("the whole string is a suffix");
    assert_eq!(tree.node(node).start, 0);
}

#[test]
fn test_find_prior_returns_longest_earlier_copy() {
    let (s, n) = ranks("abcabc");
    let tree = SuffixTree::build(n, &s);

    // the second "abc" copies the first
    let (start, length) = tree.find_prior(3, &s);
    assert_eq!((start, length), (0, 3));

    // nothing precedes position 0
    let (_, length) = tree.find_prior(0, &s);
    assert_eq!(length, 0);
}

#[test]
fn test_gather_leaves_counts_occurrences() {
    let (s, n) = ranks("banana");
    let tree = SuffixTree::build(n, &s);

    let key = key_of(&s, 1, 3); // "ana"
    let node = tree.find(&key, &s).unwrap();
    let mut starts: Vec<usize> = tree
        .gather_leaves(node)
        .into_iter()
        .map(|leaf| tree.node(leaf).start)
        .collect();
    starts.sort_unstable();
    assert_eq!(starts, vec![1, 3]);
}

#[test]
fn test_every_suffix_is_a_leaf() {
    let (s, n) = ranks("abcdeabcdefghijfghijabcdexyxyxyx");
    let tree = SuffixTree::build(n, &s);
    let mut starts: Vec<usize> = tree
        .gather_leaves(SuffixTree::ROOT)
        .into_iter()
        .map(|leaf| tree.node(leaf).start)
        .collect();
    starts.sort_unstable();
    let expected: Vec<usize> = (0..s.len()).collect();
    assert_eq!(starts, expected);
}

#[test]
fn test_maximal_substring_banana() {
    let (s, n) = ranks("banana");
    let tree = SuffixTree::build(n, &s);
    let node = tree.find_maximal_substring().expect("banana repeats");
    // the deepest repeated substring is "ana"
    assert_eq!(tree.node(node).depth, 3);
    let start = tree.node(node).start;
    assert_eq!(key_of(&s, start, 3), key_of(&s, 1, 3));
}

#[test]
fn test_no_repeats_means_no_internal_nodes() {
    let (s, n) = ranks("abcdef");
    let tree = SuffixTree::build(n, &s);
    assert!(tree.find_maximal_substring().is_none());
}

#[test]
fn test_gather_left_finds_diverse_repeats() {
    let (s, n) = ranks("abcdeabcdefghijfghijabcdexyxyxyx");
    let tree = SuffixTree::build(n, &s);
    let diverse = tree.gather_left(&s);

    // "abcde" and "fghij" are maximal repeats with mixed left contexts
    let abcde = key_of(&s, 0, 5);
    let fghij = key_of(&s, 10, 5);
    let has = |key: &[AlphaChar]| {
        diverse.iter().any(|&node| {
            tree.node(node).depth == key.len() && {
                let start = tree.node(node).start;
                &s[start..start + key.len()] == key
            }
        })
    };
    assert!(has(&abcde));
    assert!(has(&fghij));
}

#[test]
fn test_gather_left_ignores_uniform_contexts() {
    // every "an" in "banana" is preceded by the same character
    let (s, n) = ranks("banana");
    let tree = SuffixTree::build(n, &s);
    let diverse = tree.gather_left(&s);
    for &node in &diverse {
        let start = tree.node(node).start;
        let key = key_of(&s, start, tree.node(node).depth);
        assert_ne!(key, key_of(&s, 2, 2), "\"na\" is left-uniform");
    }
}
