//! Byte-level deterministic automata prepared for dictionary intersection.
//!
//! Patterns are compiled by `regex-automata` and then flattened into a dense
//! `state x byte` table restricted to states that can still reach a match.
//! On top of the table we precompute what the intersection walk asks for on
//! every entry: sorted transition ranges per state, the universal sink state,
//! whether the language is finite, and the suffix shared by every accepted term.

use std::hash::Hash;

use bitvec::prelude::*;
use regex_automata::{dense, DFA};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{IndexError, Result};

pub type StateId = u32;

const DEAD: StateId = StateId::MAX;
const ALPHABET: usize = 256;

/// Contiguous byte range `[min, max]` leading to `dest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub min: u8,
    pub max: u8,
    pub dest: StateId,
}

/// Per-state transitions, sorted by `min` and non-overlapping (inline up to 4 ranges).
pub type Transitions = SmallVec<[Transition; 4]>;

pub struct CompiledAutomaton {
    table: Vec<StateId>,
    accept: BitVec,
    transitions: Vec<Transitions>,
    sink: Option<StateId>,
    finite: bool,
    common_suffix: Option<Vec<u8>>,
}

impl CompiledAutomaton {
    /// Compile `pattern` as an anchored, byte-oriented regex matching whole terms.
    pub fn from_regex(pattern: &str) -> Result<Self> {
        let dfa = dense::Builder::new()
            .anchored(true)
            .longest_match(true)
            .minimize(true)
            .unicode(false)
            .allow_invalid_utf8(true)
            .dot_matches_new_line(true)
            .build(pattern)
            .map_err(|e| IndexError::Regex(e.to_string()))?;
        Ok(Self::from_dfa(&dfa))
    }

    /// Flatten any `regex-automata` DFA into a dense table.
    ///
    /// The DFA must be anchored; match states are taken to mean "the input read so
    /// far is a complete match".
    pub fn from_dfa<D>(dfa: &D) -> Self
    where
        D: DFA,
        D::ID: Hash + Eq + Copy,
    {
        let start = dfa.start_state();
        let mut ids: FxHashMap<D::ID, StateId> = FxHashMap::default();
        let mut order: Vec<D::ID> = vec![start];
        ids.insert(start, 0);
        let mut table: Vec<StateId> = Vec::new();
        let mut i = 0;
        while i < order.len() {
            let s = order[i];
            for b in 0..=255u8 {
                let next = dfa.next_state(s, b);
                let id = if dfa.is_dead_state(next) {
                    DEAD
                } else {
                    let n = ids.len() as StateId;
                    *ids.entry(next).or_insert_with(|| {
                        order.push(next);
                        n
                    })
                };
                table.push(id);
            }
            i += 1;
        }
        let accept: BitVec = order.iter().map(|&s| dfa.is_match_state(s)).collect();
        Self::from_table(table, accept)
    }

    fn from_table(mut table: Vec<StateId>, accept: BitVec) -> Self {
        let n = accept.len();
        prune_dead_ends(&mut table, &accept);

        let transitions: Vec<Transitions> = (0..n)
            .map(|s| collect_ranges(&table[s * ALPHABET..(s + 1) * ALPHABET]))
            .collect();

        let sink = (0..n).find(|&s| {
            accept[s]
                && table[s * ALPHABET..(s + 1) * ALPHABET]
                    .iter()
                    .all(|&d| d == s as StateId)
        });

        let finite = !has_cycle(&transitions);
        let common_suffix = if finite {
            None
        } else {
            Some(common_suffix(&accept, &transitions)).filter(|s| !s.is_empty())
        };

        CompiledAutomaton {
            table,
            accept,
            transitions,
            sink: sink.map(|s| s as StateId),
            finite,
            common_suffix,
        }
    }

    /// Override the designated sink state; `None` disables auto-prefix terms.
    pub fn with_sink_state(mut self, sink: Option<StateId>) -> Self {
        self.sink = sink;
        self
    }

    #[inline]
    pub fn initial_state(&self) -> StateId {
        0
    }

    #[inline]
    pub fn step(&self, state: StateId, byte: u8) -> Option<StateId> {
        let next = self.table[state as usize * ALPHABET + byte as usize];
        (next != DEAD).then_some(next)
    }

    #[inline]
    pub fn is_accept(&self, state: StateId) -> bool {
        self.accept[state as usize]
    }

    #[inline]
    pub fn transitions(&self, state: StateId) -> &[Transition] {
        &self.transitions[state as usize]
    }

    #[inline]
    pub fn sink_state(&self) -> Option<StateId> {
        self.sink
    }

    pub fn is_finite(&self) -> bool {
        self.finite
    }

    /// Bytes every accepted term ends with; only computed for infinite languages.
    pub fn common_suffix(&self) -> Option<&[u8]> {
        self.common_suffix.as_deref()
    }

    pub fn num_states(&self) -> usize {
        self.accept.len()
    }

    /// Run the whole input; true if the automaton accepts it.
    pub fn run(&self, bytes: &[u8]) -> bool {
        let mut state = self.initial_state();
        for &b in bytes {
            match self.step(state, b) {
                Some(s) => state = s,
                None => return false,
            }
        }
        self.is_accept(state)
    }

    /// True if a single transition out of `state` spans `[start, end]` and leads to the sink.
    pub fn accepts_suffix_range(&self, state: StateId, start: u8, end: u8) -> bool {
        let Some(sink) = self.sink else {
            return false;
        };
        self.transitions(state)
            .iter()
            .any(|t| t.min <= start && end <= t.max && t.dest == sink)
    }
}

/// Redirect transitions into states that can no longer reach a match to DEAD.
fn prune_dead_ends(table: &mut [StateId], accept: &BitVec) {
    let n = accept.len();
    let mut reverse: Vec<Vec<StateId>> = vec![Vec::new(); n];
    for s in 0..n {
        for &d in &table[s * ALPHABET..(s + 1) * ALPHABET] {
            if d != DEAD && reverse[d as usize].last() != Some(&(s as StateId)) {
                reverse[d as usize].push(s as StateId);
            }
        }
    }
    let mut live: BitVec = bitvec![0; n];
    let mut work: Vec<StateId> = Vec::new();
    for s in accept.iter_ones() {
        live.set(s, true);
        work.push(s as StateId);
    }
    while let Some(s) = work.pop() {
        for &p in &reverse[s as usize] {
            if !live[p as usize] {
                live.set(p as usize, true);
                work.push(p);
            }
        }
    }
    for d in table.iter_mut() {
        if *d != DEAD && !live[*d as usize] {
            *d = DEAD;
        }
    }
}

fn collect_ranges(row: &[StateId]) -> Transitions {
    let mut out = Transitions::new();
    let mut b = 0usize;
    while b < ALPHABET {
        let dest = row[b];
        let start = b;
        while b + 1 < ALPHABET && row[b + 1] == dest {
            b += 1;
        }
        if dest != DEAD {
            out.push(Transition {
                min: start as u8,
                max: b as u8,
                dest,
            });
        }
        b += 1;
    }
    out
}

/// Iterative three-colour DFS over the pruned transition graph.
fn has_cycle(transitions: &[Transitions]) -> bool {
    const WHITE: u8 = 0;
    const GREY: u8 = 1;
    const BLACK: u8 = 2;
    if transitions.is_empty() {
        return false;
    }
    let mut colour = vec![WHITE; transitions.len()];
    let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
    colour[0] = GREY;
    while let Some(&mut (s, ref mut next)) = stack.last_mut() {
        if let Some(t) = transitions[s].get(*next) {
            *next += 1;
            let d = t.dest as usize;
            match colour[d] {
                GREY => return true,
                WHITE => {
                    colour[d] = GREY;
                    stack.push((d, 0));
                }
                _ => {}
            }
        } else {
            colour[s] = BLACK;
            stack.pop();
        }
    }
    false
}

/// Longest suffix shared by every string accepted from the initial state.
///
/// Walks the reversed automaton from the accept states: `frontier` holds the
/// states from which the suffix collected so far leads to a match. The suffix
/// grows while every reversed edge out of the frontier carries the same single
/// byte, and stops as soon as the initial state joins the frontier.
fn common_suffix(accept: &BitVec, transitions: &[Transitions]) -> Vec<u8> {
    let n = accept.len();
    let mut reverse: Vec<SmallVec<[(u8, u8, StateId); 4]>> = vec![SmallVec::new(); n];
    for (s, ts) in transitions.iter().enumerate() {
        for t in ts {
            reverse[t.dest as usize].push((t.min, t.max, s as StateId));
        }
    }

    let mut suffix = Vec::new();
    let mut frontier: BitVec = accept.clone();
    // The shortest path from the initial state into the frontier shrinks by
    // one on every step, so at most `n` bytes can be collected.
    for _ in 0..n {
        if frontier.not_any() || frontier[0] {
            break;
        }
        let mut byte: Option<u8> = None;
        let mut next: BitVec = bitvec![0; n];
        for d in frontier.iter_ones() {
            for &(min, max, src) in &reverse[d] {
                if min != max || byte.is_some_and(|b| b != min) {
                    suffix.reverse();
                    return suffix;
                }
                byte = Some(min);
                next.set(src as usize, true);
            }
        }
        match byte {
            Some(b) => suffix.push(b),
            None => break,
        }
        frontier = next;
    }
    suffix.reverse();
    suffix
}
