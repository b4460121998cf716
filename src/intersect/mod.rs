//! Enumerate the terms of a block-tree dictionary accepted by an automaton.
//!
//! The walk keeps one [`Frame`] per trie depth. Each entry of the current
//! frame is pruned against the automaton transitions cached on the frame,
//! then stepped byte by byte from the frame's entry state. Sub-blocks push a
//! child frame, accepted terms are emitted, and accepted auto-prefix terms are
//! emitted in place of every term they cover, which are then skipped.

mod seek;
mod skip;

use fst::raw::Fst;
use roaring::RoaringBitmap;
use tracing::{debug, trace};

use crate::automaton::{CompiledAutomaton, StateId};
use crate::codec::ByteReader;
use crate::entry::{AutoPrefixRange, Entry, TermMatch};
use crate::error::{IndexError, Result};
use crate::frame::{BlockCode, Frame};
use crate::postings::{BlockTermState, FieldInfo, PostingsFlags, PostingsReader};
use crate::prefix::IndexArc;
use crate::storage::{read_index_record, BlockInput, SharedMmap};
use crate::streamer::Streamer;

use skip::SkipRange;

/// Knobs for a single intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectOptions {
    /// Skip floor chunks lying entirely below the automaton's next transition.
    pub floor_pruning: bool,
    /// Emit auto-prefix terms in place of the terms they cover.
    pub allow_auto_prefix: bool,
}

impl Default for IntersectOptions {
    fn default() -> Self {
        IntersectOptions {
            floor_pruning: true,
            allow_auto_prefix: true,
        }
    }
}

/// Everything an enumerator reads from an open dictionary.
pub(crate) struct TermSource<'a, P> {
    pub input: BlockInput,
    pub index: &'a Fst<SharedMmap>,
    pub codes: &'a [u8],
    pub postings: &'a P,
    pub field: &'a FieldInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    /// The last result was an auto-prefix term; the terms it covers come next
    /// and must be passed over before scanning resumes.
    PendingAutoPrefixSkip(SkipRange),
    Exhausted,
}

/// Forward-only enumerator over the dictionary terms an automaton accepts.
///
/// Results come in strictly increasing byte order. An auto-prefix result stands
/// for every dictionary term in its range; none of those is returned on its own.
pub struct IntersectTermsEnum<'a, P: PostingsReader> {
    input: BlockInput,
    index: &'a Fst<SharedMmap>,
    codes: &'a [u8],
    automaton: &'a CompiledAutomaton,
    postings: &'a P,
    field: &'a FieldInfo,
    options: IntersectOptions,
    /// Checked against concrete terms before stepping the automaton.
    common_suffix: Option<&'a [u8]>,

    stack: Vec<Frame<P::TermState>>,
    current: usize,
    term: Vec<u8>,
    scan: ScanState,
    /// Entry behind the current result, `None` when there is no current result.
    emitted: Option<Entry>,
}

impl<'a, P: PostingsReader> IntersectTermsEnum<'a, P> {
    pub(crate) fn new(
        source: TermSource<'a, P>,
        automaton: &'a CompiledAutomaton,
        start_term: Option<&[u8]>,
        options: IntersectOptions,
    ) -> Result<Self> {
        debug!(
            states = automaton.num_states(),
            sink = ?automaton.sink_state(),
            finite = automaton.is_finite(),
            common_suffix_len = automaton.common_suffix().map_or(0, |s| s.len()),
            field = %source.field.name,
            "building intersect enum"
        );
        let mut e = IntersectTermsEnum {
            input: source.input,
            index: source.index,
            codes: source.codes,
            automaton,
            postings: source.postings,
            field: source.field,
            options,
            common_suffix: automaton.common_suffix(),
            stack: Vec::new(),
            current: 0,
            term: Vec::new(),
            scan: ScanState::Scanning,
            emitted: None,
        };

        let root_arc = IndexArc::root(e.index);
        let Some(offset) = root_arc.final_value(e.index) else {
            e.scan = ScanState::Exhausted;
            return Ok(e);
        };
        let record = read_index_record(e.codes, offset, 0)?;
        let code = BlockCode::decode(ByteReader::new(record).read_vlong()?);

        let initial = automaton.initial_state();
        let mut root = Frame::new(0);
        root.fp_orig = code.fp;
        root.arc = Some(root_arc);
        root.last_state = initial;
        root.set_state(automaton, initial);
        root.load(&mut e.input, record, automaton, options.floor_pruning)?;
        e.stack.push(root);

        if let Some(target) = start_term {
            e.seek_to_start_term(target)?;
        }
        Ok(e)
    }

    /// Advance to the next accepted term or auto-prefix term.
    ///
    /// Returns `Ok(None)` once exhausted. An error also exhausts the enumerator.
    pub fn next_term(&mut self) -> Result<Option<&[u8]>> {
        self.emitted = None;
        match self.advance() {
            Ok(true) => Ok(Some(&self.term)),
            Ok(false) => Ok(None),
            Err(err) => {
                self.scan = ScanState::Exhausted;
                Err(err)
            }
        }
    }

    /// Bytes of the current result; empty before the first `next_term`.
    pub fn term(&self) -> &[u8] {
        &self.term
    }

    pub fn is_auto_prefix(&self) -> bool {
        matches!(
            self.emitted,
            Some(Entry::AutoPrefixSimple { .. } | Entry::AutoPrefixFloored { .. })
        )
    }

    /// Terms covered by the current result when it is an auto-prefix term.
    pub fn auto_prefix_range(&self) -> Option<AutoPrefixRange> {
        let entry = self.emitted.as_ref()?;
        AutoPrefixRange::for_entry(&self.term, entry)
    }

    /// Stats and postings metadata of the current result, decoded on demand.
    pub fn term_state(&mut self) -> Result<&BlockTermState<P::TermState>> {
        if self.emitted.is_none() {
            return Err(IndexError::Unsupported("no current term"));
        }
        let frame = &mut self.stack[self.current];
        frame.decode_meta_data(self.postings, self.field)?;
        Ok(&frame.term_state)
    }

    pub fn doc_freq(&mut self) -> Result<u32> {
        Ok(self.term_state()?.doc_freq)
    }

    pub fn total_term_freq(&mut self) -> Result<u64> {
        Ok(self.term_state()?.total_term_freq)
    }

    pub fn postings(
        &mut self,
        live_docs: Option<&RoaringBitmap>,
        reuse: Option<P::Postings>,
        flags: PostingsFlags,
    ) -> Result<P::Postings> {
        let (postings, field) = (self.postings, self.field);
        let state = self.term_state()?;
        postings.postings(field, state, live_docs, reuse, flags)
    }

    pub fn seek_exact(&mut self, _term: &[u8]) -> Result<bool> {
        Err(IndexError::Unsupported("seek_exact on an intersect enum"))
    }

    pub fn seek_ceil(&mut self, _term: &[u8]) -> Result<bool> {
        Err(IndexError::Unsupported("seek_ceil on an intersect enum"))
    }

    pub fn ord(&self) -> Result<u64> {
        Err(IndexError::Unsupported("ord on an intersect enum"))
    }

    fn advance(&mut self) -> Result<bool> {
        let automaton = self.automaton;
        loop {
            match self.scan {
                ScanState::Exhausted => return Ok(false),
                ScanState::PendingAutoPrefixSkip(range) => {
                    self.scan = ScanState::Scanning;
                    self.skip_auto_prefix(range)?;
                    continue;
                }
                ScanState::Scanning => {}
            }

            let frame = &mut self.stack[self.current];
            if frame.is_exhausted() {
                if !frame.is_last_in_floor() {
                    frame.load_next_floor_block(&mut self.input, automaton, self.options.floor_pruning)?;
                } else {
                    self.pop_frame();
                }
                continue;
            }

            let prefix = frame.prefix;
            let parent_lead = prefix.checked_sub(1).map(|i| self.term[i]);
            let entry = frame.next(parent_lead)?;

            if let Some(&label) = frame.suffix().first() {
                let mut exhausted = false;
                while label as i32 > frame.cur_transition_max {
                    if !frame.advance_transition(automaton) {
                        exhausted = true;
                        break;
                    }
                }
                if exhausted {
                    // Labels only grow from here, so nothing left in this block can match.
                    self.pop_frame();
                    continue;
                }
            }

            self.term.truncate(prefix);
            self.term.extend_from_slice(frame.suffix());

            if let (Some(common), Entry::Term { .. }) = (self.common_suffix, entry) {
                if !self.term.ends_with(common) {
                    continue;
                }
            }

            let Some((state, last_state)) =
                run_suffix(automaton, frame.state, frame.last_state, frame.suffix())
            else {
                continue;
            };

            match entry {
                Entry::SubBlock { child_fp, .. } => {
                    self.push_frame(child_fp, state, last_state)?;
                }
                Entry::AutoPrefixSimple { lead_end, .. } => {
                    if self.options.allow_auto_prefix
                        && automaton.is_accept(state)
                        && automaton.accepts_suffix_range(state, 0, lead_end)
                    {
                        self.emit_auto_prefix(entry, self.term.len(), 0, lead_end, true);
                        return Ok(true);
                    }
                }
                Entry::AutoPrefixFloored {
                    lead_start,
                    lead_end,
                    ..
                } => {
                    if self.options.allow_auto_prefix
                        && automaton.accepts_suffix_range(last_state, lead_start, lead_end)
                    {
                        self.emit_auto_prefix(entry, self.term.len() - 1, lead_start, lead_end, false);
                        return Ok(true);
                    }
                }
                Entry::Term { .. } => {
                    if automaton.is_accept(state) {
                        self.emitted = Some(entry);
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn emit_auto_prefix(
        &mut self,
        entry: Entry,
        base_len: usize,
        lead_start: u8,
        lead_end: u8,
        includes_prefix: bool,
    ) {
        self.emitted = Some(entry);
        self.scan = ScanState::PendingAutoPrefixSkip(SkipRange {
            base_len,
            lead_start,
            lead_end,
            includes_prefix,
        });
    }

    /// Drop the current frame; popping the root exhausts the enumerator.
    fn pop_frame(&mut self) {
        if self.current == 0 {
            self.scan = ScanState::Exhausted;
        } else {
            self.current -= 1;
        }
    }

    /// Enter the sub-block whose prefix is the current term.
    fn push_frame(&mut self, child_fp: u64, state: StateId, last_state: StateId) -> Result<()> {
        let parent = &self.stack[self.current];
        let parent_arc = parent.arc.ok_or(IndexError::Corrupt {
            fp: parent.fp_orig,
            reason: "frame has no index arc",
        })?;
        let arc = parent_arc
            .walk(self.index, &self.term[parent.prefix..])
            .ok_or(IndexError::Corrupt {
                fp: child_fp,
                reason: "sub-block prefix missing from index",
            })?;
        let offset = arc.final_value(self.index).ok_or(IndexError::Corrupt {
            fp: child_fp,
            reason: "sub-block prefix not final in index",
        })?;
        let record = read_index_record(self.codes, offset, child_fp)?;

        let ord = self.current + 1;
        if self.stack.len() <= ord {
            self.stack.push(Frame::new(ord));
        }
        let frame = &mut self.stack[ord];
        frame.prefix = self.term.len();
        frame.fp_orig = child_fp;
        frame.arc = Some(arc);
        frame.last_state = last_state;
        frame.set_state(self.automaton, state);
        frame.load(&mut self.input, record, self.automaton, self.options.floor_pruning)?;
        self.current = ord;
        trace!(ord, fp = child_fp, prefix = frame.prefix, "pushed frame");
        Ok(())
    }
}

/// Step `bytes` from `state`; returns the reached state and the one before the
/// last byte, or `None` if the automaton rejects along the way.
fn run_suffix(
    automaton: &CompiledAutomaton,
    mut state: StateId,
    mut last_state: StateId,
    bytes: &[u8],
) -> Option<(StateId, StateId)> {
    for &b in bytes {
        last_state = state;
        state = automaton.step(state, b)?;
    }
    Some((state, last_state))
}

impl<P: PostingsReader> Streamer for IntersectTermsEnum<'_, P> {
    type Item = TermMatch;

    fn next(&mut self) -> Result<Option<TermMatch>> {
        let Some(term) = self.next_term()? else {
            return Ok(None);
        };
        let term = term.to_vec();
        Ok(Some(match self.auto_prefix_range() {
            Some(range) => TermMatch::AutoPrefix { term, range },
            None => TermMatch::Term(term),
        }))
    }
}
