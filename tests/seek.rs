mod common;

use blocktree::{CompiledAutomaton, IntersectOptions};
use common::*;
use std::error::Error;
use tempfile::tempdir;

#[test]
fn start_term_is_exclusive() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let terms = strs(&["cat", "cats", "dog", "door", "dot"]);
    let dict = build(&dir.path().join("d"), &terms, config(25, 48, None))?;
    let automaton = CompiledAutomaton::from_regex(".*")?;
    let cases: &[(&str, &[&str])] = &[
        ("", &["cat", "cats", "dog", "door", "dot"]),
        ("cat", &["cats", "dog", "door", "dot"]),
        ("cb", &["dog", "door", "dot"]),
        ("door", &["dot"]),
        ("dot", &[]),
        ("zzz", &[]),
    ];
    for (start, expected) in cases {
        let got = run_all(&dict, &automaton, Some(start.as_bytes()), IntersectOptions::default())?;
        assert_eq!(as_strings(&got), *expected, "start {:?}", start);
    }
    Ok(())
}

#[test]
fn start_term_matches_brute_force() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let terms = synthetic_terms(500, 21);
    let starts: Vec<Vec<u8>> = strs(&["", "a", "ab", "abx", "b", "cc", "cdd", "d", "e", "ex", "xxxxxx", "y"])
        .into_iter()
        .chain(terms.iter().step_by(37).cloned())
        .collect();
    for (i, cfg) in [config(2, 3, None), config(3, 4, Some((2, 4))), config(25, 48, Some((3, 6)))]
        .into_iter()
        .enumerate()
    {
        let dict = build(&dir.path().join(format!("d{}", i)), &terms, cfg)?;
        for pattern in [".*", "[a-c].*", ".*d", "e.?x?"] {
            let automaton = CompiledAutomaton::from_regex(pattern)?;
            let accepted = oracle(&automaton, &terms);
            for start in &starts {
                let got = run_all(&dict, &automaton, Some(start), IntersectOptions::default())?;
                assert_strictly_ascending(&got);
                assert!(got.iter().all(|m| m.as_bytes() > start.as_slice()));
                let expected: Vec<Vec<u8>> =
                    accepted.iter().filter(|t| *t > start).cloned().collect();
                assert_eq!(
                    expand(&got, &terms),
                    expected,
                    "config {:?} pattern {:?} start {:?}",
                    cfg,
                    pattern,
                    String::from_utf8_lossy(start)
                );
            }
        }
    }
    Ok(())
}

#[test]
fn start_term_between_auto_prefix_and_its_terms() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let terms = strs(&["cat", "cats", "do", "dog", "door", "dot"]);
    let dict = build(&dir.path().join("d"), &terms, config(25, 48, Some((2, 4))))?;
    let automaton = CompiledAutomaton::from_regex("do.*")?;

    // "do" itself is a term, so the auto-prefix term "do" is passed over too.
    let got = run_all(&dict, &automaton, Some(b"do"), IntersectOptions::default())?;
    assert_eq!(as_strings(&got), vec!["dog", "door", "dot"]);

    let got = run_all(&dict, &automaton, Some(b"dn"), IntersectOptions::default())?;
    assert_eq!(expand(&got, &terms), strs(&["do", "dog", "door", "dot"]));
    Ok(())
}
