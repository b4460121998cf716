//! Postings format plugged into the term dictionary.
//!
//! The dictionary itself only stores per-term stats plus a few opaque longs;
//! what those longs mean is up to a [`PostingsReader`]. The format shipped here
//! keeps one roaring bitmap of doc ids per term in `<base>.postings` and uses a
//! single long, the bitmap's offset in that file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::codec::ByteReader;
use crate::error::{IndexError, Result};
use crate::storage::{self, SharedMmap, HEADER_LEN};

pub(crate) const POSTINGS_MAGIC: &[u8; 4] = b"BTPS";
pub(crate) const POSTINGS_VERSION: u16 = 1;

/// Per-field settings the dictionary was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Whether total term frequencies are recorded alongside doc frequencies.
    pub has_freqs: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, has_freqs: bool) -> Self {
        FieldInfo {
            name: name.into(),
            has_freqs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingsFlags {
    DocsOnly,
    Freqs,
}

/// Decoded stats and metadata for one term-like entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTermState<S> {
    pub doc_freq: u32,
    pub total_term_freq: u64,
    /// Ordinal of the entry within its block's term-like entries.
    pub term_block_ord: usize,
    pub postings: S,
}

pub trait PostingsReader {
    type TermState: Clone + Default;
    type Postings;

    /// Number of longs stored per term in the block metadata section.
    fn longs_size(&self) -> usize;

    fn new_term_state(&self) -> BlockTermState<Self::TermState> {
        BlockTermState::default()
    }

    /// Apply one term's longs to `state`; when `absolute` is false they are
    /// deltas from the previous term of the same block.
    fn decode_term(
        &self,
        longs: &[u64],
        meta: &mut ByteReader<'_>,
        field: &FieldInfo,
        state: &mut BlockTermState<Self::TermState>,
        absolute: bool,
    ) -> Result<()>;

    fn postings(
        &self,
        field: &FieldInfo,
        state: &BlockTermState<Self::TermState>,
        live_docs: Option<&RoaringBitmap>,
        reuse: Option<Self::Postings>,
        flags: PostingsFlags,
    ) -> Result<Self::Postings>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoaringTermState {
    pub postings_fp: u64,
}

/// Reads postings written by [`PostingsWriter`].
#[derive(Clone)]
pub struct RoaringPostingsReader {
    data: SharedMmap,
}

impl RoaringPostingsReader {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let data = storage::map_file(path, "postings")?;
        storage::check_header(data.as_ref(), POSTINGS_MAGIC, POSTINGS_VERSION)?;
        Ok(RoaringPostingsReader { data })
    }
}

impl PostingsReader for RoaringPostingsReader {
    type TermState = RoaringTermState;
    type Postings = RoaringPostings;

    fn longs_size(&self) -> usize {
        1
    }

    fn decode_term(
        &self,
        longs: &[u64],
        _meta: &mut ByteReader<'_>,
        _field: &FieldInfo,
        state: &mut BlockTermState<RoaringTermState>,
        absolute: bool,
    ) -> Result<()> {
        let delta = *longs
            .first()
            .ok_or(IndexError::InvalidFormat("missing postings pointer"))?;
        if absolute {
            state.postings.postings_fp = 0;
        }
        state.postings.postings_fp = state
            .postings
            .postings_fp
            .checked_add(delta)
            .ok_or(IndexError::InvalidFormat("postings pointer overflow"))?;
        Ok(())
    }

    fn postings(
        &self,
        field: &FieldInfo,
        state: &BlockTermState<RoaringTermState>,
        live_docs: Option<&RoaringBitmap>,
        reuse: Option<RoaringPostings>,
        flags: PostingsFlags,
    ) -> Result<RoaringPostings> {
        if flags == PostingsFlags::Freqs && !field.has_freqs {
            return Err(IndexError::Unsupported(
                "frequencies requested for a field indexed without them",
            ));
        }
        let data = self.data.as_ref();
        let fp = state.postings.postings_fp;
        if fp < HEADER_LEN as u64 || fp >= data.len() as u64 {
            return Err(IndexError::Corrupt {
                fp,
                reason: "postings pointer outside postings file",
            });
        }
        let mut docs = RoaringBitmap::deserialize_from(&data[fp as usize..])?;
        if let Some(live) = live_docs {
            docs &= live;
        }
        let mut postings = reuse.unwrap_or_default();
        postings.docs.clear();
        postings.docs.extend(docs.iter());
        postings.pos = 0;
        Ok(postings)
    }
}

/// Doc id iterator for one term. Frequencies are not stored, so `freq` is always 1.
///
/// Doc ids are buffered so a finished instance can be handed back to
/// [`PostingsReader::postings`] and refilled without reallocating.
#[derive(Debug, Default)]
pub struct RoaringPostings {
    docs: Vec<u32>,
    pos: usize,
}

impl RoaringPostings {
    pub fn freq(&self) -> u32 {
        1
    }
}

impl Iterator for RoaringPostings {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let doc = self.docs.get(self.pos).copied()?;
        self.pos += 1;
        Some(doc)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.docs.len() - self.pos;
        (left, Some(left))
    }
}

/// Appends doc-id bitmaps to `<base>.postings`.
pub(crate) struct PostingsWriter {
    out: BufWriter<File>,
    offset: u64,
}

impl PostingsWriter {
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        storage::write_header(&mut out, POSTINGS_MAGIC, POSTINGS_VERSION)?;
        Ok(PostingsWriter {
            out,
            offset: HEADER_LEN as u64,
        })
    }

    /// Write `docs` and return its offset.
    pub(crate) fn write(&mut self, docs: &RoaringBitmap) -> Result<u64> {
        let fp = self.offset;
        docs.serialize_into(&mut self.out)?;
        self.offset += docs.serialized_size() as u64;
        Ok(fp)
    }

    pub(crate) fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
