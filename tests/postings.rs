mod common;

use blocktree::postings::RoaringPostings;
use blocktree::{CompiledAutomaton, IndexError, IntersectOptions, PostingsFlags};
use common::*;
use roaring::RoaringBitmap;
use std::error::Error;
use tempfile::tempdir;

#[test]
fn doc_freq_is_decoded_lazily() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let terms = synthetic_terms(400, 13);
    let dict = build(&dir.path().join("d"), &terms, config(3, 5, None))?;
    let automaton = CompiledAutomaton::from_regex(".*")?;
    let mut e = dict.intersect(&automaton, None, IntersectOptions::default())?;
    let mut n = 0usize;
    while let Some(term) = e.next_term()? {
        let i = terms.binary_search_by(|t| t.as_slice().cmp(term)).map_err(|_| "unknown term")?;
        let expected = docs_for(i);
        // Skip some terms entirely and ask others twice, so decoding has to
        // catch up over several entries and stay put when repeated.
        match n % 3 {
            0 => {}
            1 => assert_eq!(u64::from(e.doc_freq()?), expected.len()),
            _ => {
                assert_eq!(u64::from(e.doc_freq()?), expected.len());
                assert_eq!(u64::from(e.doc_freq()?), expected.len());
                assert_eq!(e.total_term_freq()?, expected.len() + (i % 3) as u64);
            }
        }
        n += 1;
    }
    assert_eq!(n, terms.len());
    Ok(())
}

#[test]
fn postings_return_term_docs() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let terms = synthetic_terms(200, 17);
    let dict = build(&dir.path().join("d"), &terms, config(2, 3, None))?;
    let automaton = CompiledAutomaton::from_regex("[bd].*")?;
    let mut e = dict.intersect(&automaton, None, IntersectOptions::default())?;
    let mut live = RoaringBitmap::new();
    live.insert_range(0..300);
    let mut reuse: Option<RoaringPostings> = None;
    while let Some(term) = e.next_term()? {
        let i = terms.binary_search_by(|t| t.as_slice().cmp(term)).map_err(|_| "unknown term")?;
        let all: Vec<u32> = e.postings(None, reuse.take(), PostingsFlags::DocsOnly)?.collect();
        assert_eq!(all, docs_for(i).iter().collect::<Vec<_>>());

        let postings = e.postings(Some(&live), None, PostingsFlags::Freqs)?;
        let expected: Vec<u32> = docs_for(i).iter().filter(|d| *d < 300).collect();
        let mut seen = Vec::new();
        let mut p = postings;
        while let Some(doc) = p.next() {
            assert_eq!(p.freq(), 1);
            seen.push(doc);
        }
        assert_eq!(seen, expected);
        reuse = Some(p);
    }
    Ok(())
}

#[test]
fn auto_prefix_stats_cover_their_terms() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let terms = strs(&["cat", "cats", "dog", "door", "dot"]);
    let dict = build(&dir.path().join("d"), &terms, config(25, 48, Some((2, 4))))?;
    let automaton = CompiledAutomaton::from_regex("do.*")?;
    let mut e = dict.intersect(&automaton, None, IntersectOptions::default())?;
    assert_eq!(e.next_term()?, Some(&b"do"[..]));
    assert!(e.is_auto_prefix());

    let mut union = RoaringBitmap::new();
    for i in 2..5 {
        union |= docs_for(i);
    }
    assert_eq!(u64::from(e.doc_freq()?), union.len());
    let docs: RoaringBitmap = e.postings(None, None, PostingsFlags::DocsOnly)?.collect();
    assert_eq!(docs, union);
    assert_eq!(e.next_term()?, None);
    Ok(())
}

#[test]
fn freqs_need_a_field_with_freqs() -> Result<(), Box<dyn Error>> {
    use blocktree::{BlockTreeConfig, DictionaryBuilder, FieldInfo};
    let dir = tempdir()?;
    let mut builder = DictionaryBuilder::new(
        dir.path().join("d"),
        FieldInfo::new("tags", false),
        BlockTreeConfig::default(),
    )?;
    builder.insert(b"alpha", &docs_for(0))?;
    builder.insert(b"beta", &docs_for(1))?;
    let dict = builder.into_dictionary()?;
    let automaton = CompiledAutomaton::from_regex("beta")?;
    let mut e = dict.intersect(&automaton, None, IntersectOptions::default())?;
    assert_eq!(e.next_term()?, Some(&b"beta"[..]));
    assert_eq!(e.total_term_freq()?, 2);
    assert!(matches!(
        e.postings(None, None, PostingsFlags::Freqs),
        Err(IndexError::Unsupported(_))
    ));
    assert_eq!(e.postings(None, None, PostingsFlags::DocsOnly)?.count(), 2);
    Ok(())
}

#[test]
fn reused_postings_restart_on_the_new_term() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let terms = strs(&["apple", "apricot", "banana", "blueberry", "cherry"]);
    let dict = build(&dir.path().join("d"), &terms, config(25, 48, None))?;
    let automaton = CompiledAutomaton::from_regex(".*")?;
    let mut e = dict.intersect(&automaton, None, IntersectOptions::default())?;

    // Leave the first term's postings half read before handing them back.
    assert_eq!(e.next_term()?, Some(&b"apple"[..]));
    let mut first = e.postings(None, None, PostingsFlags::DocsOnly)?;
    assert_eq!(first.next(), docs_for(0).min());

    let mut reuse = Some(first);
    for i in 1..terms.len() {
        assert_eq!(e.next_term()?, Some(terms[i].as_slice()));
        let postings = e.postings(None, reuse.take(), PostingsFlags::DocsOnly)?;
        assert_eq!(postings.size_hint().0 as u64, docs_for(i).len());
        let mut p = postings;
        let docs: Vec<u32> = p.by_ref().collect();
        assert_eq!(docs, docs_for(i).iter().collect::<Vec<_>>());
        reuse = Some(p);
    }
    Ok(())
}
