#![allow(dead_code)]

use blocktree::{
    AutoPrefixConfig, BlockTreeConfig, CompiledAutomaton, DictionaryBuilder, FieldInfo,
    IntersectOptions, Streamer, TermDictionary, TermMatch,
};
use roaring::RoaringBitmap;
use std::error::Error;
use std::path::Path;

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Docs of the `i`-th term: between one and four ids starting at `3 * i`.
pub fn docs_for(i: usize) -> RoaringBitmap {
    let start = (i * 3) as u32;
    (start..start + (i % 4) as u32 + 1).collect()
}

/// Write a dictionary of sorted, distinct `terms` at `base` and open it.
pub fn build<T: AsRef<[u8]>>(
    base: &Path,
    terms: &[T],
    config: BlockTreeConfig,
) -> TestResult<TermDictionary> {
    let mut builder = DictionaryBuilder::new(base, FieldInfo::new("body", true), config)?;
    for (i, term) in terms.iter().enumerate() {
        let docs = docs_for(i);
        let ttf = docs.len() + (i % 3) as u64;
        builder.insert_with_freq(term.as_ref(), &docs, ttf)?;
    }
    Ok(builder.into_dictionary()?)
}

pub fn config(min: usize, max: usize, auto_prefix: Option<(usize, usize)>) -> BlockTreeConfig {
    BlockTreeConfig {
        min_items_in_block: min,
        max_items_in_block: max,
        auto_prefix: auto_prefix.map(|(min_items_in_prefix, max_items_in_prefix)| AutoPrefixConfig {
            min_items_in_prefix,
            max_items_in_prefix,
        }),
    }
}

/// Sorted distinct pseudo-random terms over a small alphabet, so that
/// prefixes are heavily shared and blocks get floor chunks.
pub fn synthetic_terms(count: usize, seed: u64) -> Vec<Vec<u8>> {
    let alphabet = b"abcdex";
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    let mut terms: Vec<Vec<u8>> = (0..count)
        .map(|_| {
            let len = 1 + next() % 5;
            (0..len).map(|_| alphabet[next() % alphabet.len()]).collect()
        })
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

pub fn strs(terms: &[&str]) -> Vec<Vec<u8>> {
    terms.iter().map(|t| t.as_bytes().to_vec()).collect()
}

pub fn run_all(
    dict: &TermDictionary,
    automaton: &CompiledAutomaton,
    start: Option<&[u8]>,
    options: IntersectOptions,
) -> TestResult<Vec<TermMatch>> {
    Ok(dict.intersect(automaton, start, options)?.collect()?)
}

/// Dictionary terms covered by `matches`, asserting that none is covered twice.
pub fn expand(matches: &[TermMatch], terms: &[Vec<u8>]) -> Vec<Vec<u8>> {
    terms
        .iter()
        .filter(|t| {
            let hits = matches.iter().filter(|m| m.covers(t)).count();
            assert!(
                hits <= 1,
                "{:?} covered by {} results",
                String::from_utf8_lossy(t),
                hits
            );
            hits == 1
        })
        .cloned()
        .collect()
}

/// Terms the automaton accepts, by scanning every term.
pub fn oracle(automaton: &CompiledAutomaton, terms: &[Vec<u8>]) -> Vec<Vec<u8>> {
    terms.iter().filter(|t| automaton.run(t)).cloned().collect()
}

pub fn assert_strictly_ascending(matches: &[TermMatch]) {
    for w in matches.windows(2) {
        assert!(
            w[0].as_bytes() < w[1].as_bytes(),
            "{:?} not before {:?}",
            String::from_utf8_lossy(w[0].as_bytes()),
            String::from_utf8_lossy(w[1].as_bytes())
        );
    }
}

pub fn as_strings(matches: &[TermMatch]) -> Vec<String> {
    matches
        .iter()
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .collect()
}
