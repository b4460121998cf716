use tracing::trace;

use super::floor::{BlockCode, FloorTable};
use crate::automaton::{CompiledAutomaton, StateId};
use crate::codec::{ByteReader, ScratchBuf};
use crate::entry::Entry;
use crate::error::{IndexError, Result};
use crate::postings::{BlockTermState, FieldInfo, PostingsReader};
use crate::prefix::IndexArc;
use crate::storage::BlockInput;

/// Entry-cursor state of a frame, enough to re-read the last entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryCursor {
    next_ent: usize,
    suffix_pos: usize,
    start_byte_pos: usize,
    suffix: usize,
    term_block_ord: usize,
}

/// Reusable view over one block (or floor chunk) at a fixed trie depth.
///
/// Frames live in the enumerator's stack and are reloaded in place whenever the
/// walk comes back to their depth; all buffers keep their capacity.
pub(crate) struct Frame<S> {
    pub ord: usize,
    /// Length of the term prefix shared by every entry of this block.
    pub prefix: usize,
    pub fp_orig: u64,
    /// File pointer of the chunk currently loaded.
    pub fp: u64,
    /// Index arc reached by this frame's prefix.
    pub arc: Option<IndexArc>,

    /// Automaton state after consuming the prefix.
    pub state: StateId,
    /// Automaton state before the last prefix byte.
    pub last_state: StateId,
    pub transition_index: usize,
    pub transition_count: usize,
    /// Upper bound of the current transition, -1 when the state has none.
    pub cur_transition_max: i32,

    suffix_bytes: ScratchBuf,
    stats: ScratchBuf,
    meta: ScratchBuf,
    floor: FloorTable,

    ent_count: usize,
    next_ent: usize,
    is_leaf: bool,
    is_last_in_floor: bool,

    start_byte_pos: usize,
    suffix: usize,

    /// Term-like entries read from the current chunk so far.
    term_block_ord: usize,
    /// Term-like entries whose stats and metadata have been decoded.
    meta_upto: usize,
    pub term_state: BlockTermState<S>,
    longs: Vec<u64>,
}

impl<S: Default> Frame<S> {
    pub(crate) fn new(ord: usize) -> Self {
        Frame {
            ord,
            prefix: 0,
            fp_orig: 0,
            fp: 0,
            arc: None,
            state: 0,
            last_state: 0,
            transition_index: 0,
            transition_count: 0,
            cur_transition_max: -1,
            suffix_bytes: ScratchBuf::default(),
            stats: ScratchBuf::default(),
            meta: ScratchBuf::default(),
            floor: FloorTable::default(),
            ent_count: 0,
            next_ent: 0,
            is_leaf: false,
            is_last_in_floor: true,
            start_byte_pos: 0,
            suffix: 0,
            term_block_ord: 0,
            meta_upto: 0,
            term_state: BlockTermState::default(),
            longs: Vec::new(),
        }
    }
}

impl<S> Frame<S> {
    /// Cache `state` and its transitions; the walk prunes entries against them.
    pub(crate) fn set_state(&mut self, automaton: &CompiledAutomaton, state: StateId) {
        self.state = state;
        self.transition_index = 0;
        let transitions = automaton.transitions(state);
        self.transition_count = transitions.len();
        self.cur_transition_max = transitions.first().map_or(-1, |t| t.max as i32);
    }

    /// Move to the next transition of `state`; false when none is left.
    pub(crate) fn advance_transition(&mut self, automaton: &CompiledAutomaton) -> bool {
        if self.transition_index + 1 >= self.transition_count {
            return false;
        }
        self.transition_index += 1;
        self.cur_transition_max = automaton.transitions(self.state)[self.transition_index].max as i32;
        true
    }

    fn transition_min(&self, automaton: &CompiledAutomaton) -> Option<u8> {
        automaton
            .transitions(self.state)
            .get(self.transition_index)
            .map(|t| t.min)
    }

    /// Load the first chunk of the block at `fp_orig`.
    ///
    /// `index_data` is the block's index record. For floor blocks whose entry
    /// state is not accepting, chunks lying entirely below the first transition
    /// are skipped without being read.
    pub(crate) fn load(
        &mut self,
        input: &mut BlockInput,
        index_data: &[u8],
        automaton: &CompiledAutomaton,
        floor_pruning: bool,
    ) -> Result<()> {
        let mut r = ByteReader::new(index_data);
        let code = BlockCode::decode(r.read_vlong()?);
        if code.fp != self.fp_orig {
            return Err(IndexError::Corrupt {
                fp: self.fp_orig,
                reason: "index record points at a different block",
            });
        }
        self.fp = self.fp_orig;
        self.floor.clear();
        if code.is_floor {
            self.floor.reset(&index_data[r.position()..], self.fp_orig)?;
            // An accepting state may match the empty suffix, which only the first chunk holds.
            if floor_pruning && !automaton.is_accept(self.state) {
                if let Some(min) = self.transition_min(automaton) {
                    while self.floor.has_more() && self.floor.next_label() <= min as u16 {
                        self.fp = self.floor.advance()?;
                        trace!(fp_orig = self.fp_orig, fp = self.fp, "skipped floor chunk");
                    }
                }
            }
        }
        self.read_block(input)
    }

    /// Move to the next floor chunk, skipping chunks below the current transition.
    pub(crate) fn load_next_floor_block(
        &mut self,
        input: &mut BlockInput,
        automaton: &CompiledAutomaton,
        floor_pruning: bool,
    ) -> Result<()> {
        let min = if floor_pruning {
            self.transition_min(automaton)
        } else {
            None
        };
        loop {
            self.fp = self.floor.advance()?;
            match min {
                Some(m) if self.floor.has_more() && self.floor.next_label() <= m as u16 => {
                    trace!(fp_orig = self.fp_orig, fp = self.fp, "skipped floor chunk");
                }
                _ => break,
            }
        }
        self.read_block(input)
    }

    fn read_block(&mut self, input: &mut BlockInput) -> Result<()> {
        input.seek(self.fp)?;
        let code = input.read_vint()?;
        self.ent_count = (code >> 1) as usize;
        if self.ent_count == 0 {
            return Err(IndexError::Corrupt {
                fp: self.fp,
                reason: "block has no entries",
            });
        }
        self.is_last_in_floor = code & 1 != 0;
        if self.is_last_in_floor == self.floor.has_more() {
            return Err(IndexError::Corrupt {
                fp: self.fp,
                reason: "last-in-floor flag disagrees with floor table",
            });
        }

        let code = input.read_vint()?;
        self.is_leaf = code & 1 != 0;
        input.read_into(&mut self.suffix_bytes, (code >> 1) as usize)?;
        let n = input.read_vint()? as usize;
        input.read_into(&mut self.stats, n)?;
        let n = input.read_vint()? as usize;
        input.read_into(&mut self.meta, n)?;

        self.next_ent = 0;
        self.start_byte_pos = 0;
        self.suffix = 0;
        self.term_block_ord = 0;
        self.meta_upto = 0;
        Ok(())
    }

    #[inline]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.next_ent == self.ent_count
    }

    #[inline]
    pub(crate) fn is_last_in_floor(&self) -> bool {
        self.is_last_in_floor
    }

    /// Suffix bytes of the entry most recently returned by `next`.
    #[inline]
    pub(crate) fn suffix(&self) -> &[u8] {
        &self.suffix_bytes.as_slice()[self.start_byte_pos..self.start_byte_pos + self.suffix]
    }

    /// Decode the next entry.
    ///
    /// `parent_lead` is the last byte of this frame's prefix; floored auto-prefix
    /// entries with an empty suffix take their leading byte from it.
    pub(crate) fn next(&mut self, parent_lead: Option<u8>) -> Result<Entry> {
        assert!(self.next_ent < self.ent_count, "entry cursor past entry count");
        self.next_ent += 1;
        if self.is_leaf {
            let len = self.suffix_bytes.read_vint()? as usize;
            self.take_suffix(len)?;
            return Ok(Entry::Term {
                suffix_len: len,
                term_ord: self.bump_term_ord(),
            });
        }

        let code = self.suffix_bytes.read_vint()?;
        let len = (code >> 2) as usize;
        self.take_suffix(len)?;
        match code & 3 {
            0 => Ok(Entry::Term {
                suffix_len: len,
                term_ord: self.bump_term_ord(),
            }),
            1 => {
                let delta = self.suffix_bytes.read_vlong()?;
                let child_fp = self
                    .fp
                    .checked_sub(delta)
                    .filter(|_| delta != 0)
                    .ok_or(IndexError::Corrupt {
                        fp: self.fp,
                        reason: "sub-block pointer out of range",
                    })?;
                Ok(Entry::SubBlock {
                    suffix_len: len,
                    child_fp,
                })
            }
            2 => {
                let lead_end = self.suffix_bytes.read_byte()?;
                self.bump_term_ord();
                Ok(Entry::AutoPrefixSimple {
                    suffix_len: len,
                    lead_end,
                })
            }
            _ => {
                let lead_end = self.suffix_bytes.read_byte()?;
                let lead_start = match self.suffix().last() {
                    Some(&b) => b,
                    None => parent_lead.ok_or(IndexError::Corrupt {
                        fp: self.fp,
                        reason: "floored auto-prefix term has no leading byte",
                    })?,
                };
                if lead_start > lead_end {
                    return Err(IndexError::Corrupt {
                        fp: self.fp,
                        reason: "floored auto-prefix range is empty",
                    });
                }
                self.bump_term_ord();
                Ok(Entry::AutoPrefixFloored {
                    suffix_len: len,
                    lead_start,
                    lead_end,
                })
            }
        }
    }

    fn take_suffix(&mut self, len: usize) -> Result<()> {
        self.start_byte_pos = self.suffix_bytes.position();
        self.suffix = len;
        self.suffix_bytes.skip(len)
    }

    fn bump_term_ord(&mut self) -> usize {
        let ord = self.term_block_ord;
        self.term_block_ord += 1;
        ord
    }

    pub(crate) fn snapshot(&self) -> EntryCursor {
        EntryCursor {
            next_ent: self.next_ent,
            suffix_pos: self.suffix_bytes.position(),
            start_byte_pos: self.start_byte_pos,
            suffix: self.suffix,
            term_block_ord: self.term_block_ord,
        }
    }

    /// Rewind to a snapshot taken on the currently loaded chunk.
    pub(crate) fn restore(&mut self, cursor: EntryCursor) {
        debug_assert!(cursor.term_block_ord >= self.meta_upto);
        self.next_ent = cursor.next_ent;
        self.suffix_bytes.set_position(cursor.suffix_pos);
        self.start_byte_pos = cursor.start_byte_pos;
        self.suffix = cursor.suffix;
        self.term_block_ord = cursor.term_block_ord;
    }

    /// Decode stats and metadata up to the entry most recently returned by `next`.
    ///
    /// Ordinals are decoded in order and each only once; the first of a chunk is
    /// absolute, the rest are deltas.
    pub(crate) fn decode_meta_data<P>(&mut self, postings: &P, field: &FieldInfo) -> Result<()>
    where
        P: PostingsReader<TermState = S>,
    {
        let limit = self.term_block_ord;
        self.longs.resize(postings.longs_size(), 0);
        let mut absolute = self.meta_upto == 0;
        while self.meta_upto < limit {
            let doc_freq = self.stats.read_vint()?;
            self.term_state.doc_freq = doc_freq;
            self.term_state.total_term_freq = if field.has_freqs {
                (doc_freq as u64)
                    .checked_add(self.stats.read_vlong()?)
                    .ok_or(IndexError::Corrupt {
                        fp: self.fp,
                        reason: "total term frequency overflows",
                    })?
            } else {
                doc_freq as u64
            };
            for long in self.longs.iter_mut() {
                *long = self.meta.read_vlong()?;
            }
            let mut r = self.meta.reader();
            postings.decode_term(&self.longs, &mut r, field, &mut self.term_state, absolute)?;
            let pos = r.position();
            self.meta.set_position(pos);
            self.meta_upto += 1;
            absolute = false;
        }
        self.term_state.term_block_ord = self.meta_upto;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_vint, write_vlong};
    use crate::frame::{encode_index_record, BlockCode};
    use crate::postings::PostingsFlags;
    use crate::storage::{self, BlockInput, HEADER_LEN};
    use roaring::RoaringBitmap;
    use std::io::Write;

    /// Postings reader whose state is just the running sum of its one long.
    struct SumReader;

    impl PostingsReader for SumReader {
        type TermState = u64;
        type Postings = ();

        fn longs_size(&self) -> usize {
            1
        }

        fn decode_term(
            &self,
            longs: &[u64],
            _meta: &mut ByteReader<'_>,
            _field: &FieldInfo,
            state: &mut BlockTermState<u64>,
            absolute: bool,
        ) -> Result<()> {
            if absolute {
                state.postings = 0;
            }
            state.postings += longs[0];
            Ok(())
        }

        fn postings(
            &self,
            _field: &FieldInfo,
            _state: &BlockTermState<u64>,
            _live_docs: Option<&RoaringBitmap>,
            _reuse: Option<()>,
            _flags: PostingsFlags,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn leaf_block(suffixes: &[&[u8]], doc_freqs: &[u32], longs: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        write_vint(&mut out, (suffixes.len() as u32) << 1 | 1);
        let mut sfx = Vec::new();
        for s in suffixes {
            write_vint(&mut sfx, s.len() as u32);
            sfx.extend_from_slice(s);
        }
        write_vint(&mut out, (sfx.len() as u32) << 1 | 1);
        out.extend_from_slice(&sfx);
        let mut stats = Vec::new();
        for &df in doc_freqs {
            write_vint(&mut stats, df);
        }
        write_vint(&mut out, stats.len() as u32);
        out.extend_from_slice(&stats);
        let mut meta = Vec::new();
        for &l in longs {
            write_vlong(&mut meta, l);
        }
        write_vint(&mut out, meta.len() as u32);
        out.extend_from_slice(&meta);
        out
    }

    fn input_over(block: &[u8]) -> (tempfile::NamedTempFile, BlockInput) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        storage::write_header(&mut file, b"TEST", 1).unwrap();
        file.write_all(block).unwrap();
        file.flush().unwrap();
        let data = storage::map_file(file.path(), "terms").unwrap();
        (file, BlockInput::new(data))
    }

    fn plain_record(fp: u64) -> Vec<u8> {
        let mut rec = Vec::new();
        let code = BlockCode {
            fp,
            has_terms: true,
            is_floor: false,
        };
        encode_index_record(&mut rec, code, &[]);
        rec
    }

    fn loaded_frame(block: &[u8]) -> (tempfile::NamedTempFile, Frame<u64>) {
        let (file, mut input) = input_over(block);
        let automaton = CompiledAutomaton::from_regex(".*").unwrap();
        let mut frame = Frame::new(0);
        frame.fp_orig = HEADER_LEN as u64;
        frame.set_state(&automaton, automaton.initial_state());
        frame
            .load(&mut input, &plain_record(HEADER_LEN as u64), &automaton, true)
            .unwrap();
        (file, frame)
    }

    #[test]
    fn leaf_entries_decode_in_order() {
        let block = leaf_block(&[b"a", b"bc", b""], &[1, 2, 3], &[10, 5, 5]);
        let (_file, mut frame) = loaded_frame(&block);
        let mut seen = Vec::new();
        while !frame.is_exhausted() {
            let e = frame.next(None).unwrap();
            assert!(matches!(e, Entry::Term { .. }));
            seen.push(frame.suffix().to_vec());
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"bc".to_vec(), Vec::new()]);
        assert!(frame.is_last_in_floor());
    }

    #[test]
    fn meta_data_catches_up_and_is_idempotent() {
        let block = leaf_block(&[b"a", b"b", b"c"], &[4, 7, 9], &[100, 20, 3]);
        let (_file, mut frame) = loaded_frame(&block);
        frame.next(None).unwrap();
        frame.next(None).unwrap();
        frame.decode_meta_data(&SumReader, &FieldInfo::new("f", false)).unwrap();
        assert_eq!(frame.term_state.doc_freq, 7);
        assert_eq!(frame.term_state.postings, 120);
        frame.decode_meta_data(&SumReader, &FieldInfo::new("f", false)).unwrap();
        assert_eq!(frame.term_state.postings, 120);
        frame.next(None).unwrap();
        frame.decode_meta_data(&SumReader, &FieldInfo::new("f", false)).unwrap();
        assert_eq!(frame.term_state.doc_freq, 9);
        assert_eq!(frame.term_state.postings, 123);
        assert_eq!(frame.term_state.term_block_ord, 3);
    }

    #[test]
    fn snapshot_rewinds_one_entry() {
        let block = leaf_block(&[b"x", b"yy"], &[1, 1], &[0, 0]);
        let (_file, mut frame) = loaded_frame(&block);
        let before = frame.snapshot();
        frame.next(None).unwrap();
        assert_eq!(frame.suffix(), b"x");
        frame.restore(before);
        frame.next(None).unwrap();
        assert_eq!(frame.suffix(), b"x");
        frame.next(None).unwrap();
        assert_eq!(frame.suffix(), b"yy");
    }

    #[test]
    fn empty_block_is_corrupt() {
        let mut block = Vec::new();
        write_vint(&mut block, 1);
        block.extend_from_slice(&[1, 0, 0]);
        let (_file, mut input) = input_over(&block);
        let automaton = CompiledAutomaton::from_regex("a").unwrap();
        let mut frame: Frame<u64> = Frame::new(0);
        frame.fp_orig = HEADER_LEN as u64;
        frame.set_state(&automaton, automaton.initial_state());
        let err = frame
            .load(&mut input, &plain_record(HEADER_LEN as u64), &automaton, true)
            .unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { reason: "block has no entries", .. }));
    }

    #[test]
    fn mismatched_index_record_is_corrupt() {
        let block = leaf_block(&[b"a"], &[1], &[0]);
        let (_file, mut input) = input_over(&block);
        let automaton = CompiledAutomaton::from_regex("a").unwrap();
        let mut frame: Frame<u64> = Frame::new(0);
        frame.fp_orig = HEADER_LEN as u64;
        frame.set_state(&automaton, automaton.initial_state());
        assert!(frame
            .load(&mut input, &plain_record(HEADER_LEN as u64 + 1), &automaton, true)
            .is_err());
    }
}
