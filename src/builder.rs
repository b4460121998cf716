use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use fst::MapBuilder;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{write_vint, write_vlong};
use crate::dictionary::{DictionaryMeta, TermDictionary, META_VERSION};
use crate::error::{IndexError, Result};
use crate::frame::{encode_index_record, BlockCode, FloorChunk};
use crate::postings::{FieldInfo, PostingsWriter};
use crate::storage::{self, CODES_MAGIC, FORMAT_VERSION, HEADER_LEN, TERMS_MAGIC};

const CHUNK_SIZE: usize = 128 * 1024;

/// Bounds on how many terms an auto-prefix term may stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPrefixConfig {
    pub min_items_in_prefix: usize,
    pub max_items_in_prefix: usize,
}

impl AutoPrefixConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_items_in_prefix < 2 {
            return Err(IndexError::InvalidConfig("min_items_in_prefix must be at least 2"));
        }
        if self.max_items_in_prefix < 2 * (self.min_items_in_prefix - 1) {
            return Err(IndexError::InvalidConfig(
                "max_items_in_prefix must be at least 2 * (min_items_in_prefix - 1)",
            ));
        }
        Ok(())
    }
}

/// Block sizing and auto-prefix settings for a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTreeConfig {
    pub min_items_in_block: usize,
    pub max_items_in_block: usize,
    pub auto_prefix: Option<AutoPrefixConfig>,
}

impl Default for BlockTreeConfig {
    fn default() -> Self {
        BlockTreeConfig {
            min_items_in_block: 25,
            max_items_in_block: 48,
            auto_prefix: None,
        }
    }
}

impl BlockTreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_items_in_block < 2 {
            return Err(IndexError::InvalidConfig("min_items_in_block must be at least 2"));
        }
        if self.max_items_in_block < 2 * (self.min_items_in_block - 1) {
            return Err(IndexError::InvalidConfig(
                "max_items_in_block must be at least 2 * (min_items_in_block - 1)",
            ));
        }
        match &self.auto_prefix {
            Some(ap) => ap.validate(),
            None => Ok(()),
        }
    }
}

struct PendingTerm {
    bytes: Vec<u8>,
    docs: RoaringBitmap,
    total_term_freq: u64,
}

/// Builder for a new on-disk block-tree dictionary.
/// Insert terms in ascending order with `insert()`, then call `close()` or `into_dictionary()`.
pub struct DictionaryBuilder {
    base: PathBuf,
    field: FieldInfo,
    config: BlockTreeConfig,
    terms: Vec<PendingTerm>,
}

impl DictionaryBuilder {
    /// Create a builder that will write `<base>.terms`, `.codes`, `.idx`, `.postings` and `.meta`.
    pub fn new<P: AsRef<Path>>(base: P, field: FieldInfo, config: BlockTreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(DictionaryBuilder {
            base: base.as_ref().to_path_buf(),
            field,
            config,
            terms: Vec::new(),
        })
    }

    /// Add a term with the docs containing it; total term frequency is taken as the doc count.
    pub fn insert(&mut self, term: &[u8], docs: &RoaringBitmap) -> Result<()> {
        self.insert_with_freq(term, docs, docs.len())
    }

    pub fn insert_with_freq(
        &mut self,
        term: &[u8],
        docs: &RoaringBitmap,
        total_term_freq: u64,
    ) -> Result<()> {
        if let Some(last) = self.terms.last() {
            if last.bytes.as_slice() >= term {
                return Err(IndexError::UnsortedInput);
            }
        }
        if total_term_freq < docs.len() {
            return Err(IndexError::InvalidFormat(
                "total term frequency below doc frequency",
            ));
        }
        self.terms.push(PendingTerm {
            bytes: term.to_vec(),
            docs: docs.clone(),
            total_term_freq,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Write every dictionary file and return the metadata stored in `<base>.meta`.
    pub fn close(self) -> Result<DictionaryMeta> {
        let DictionaryBuilder {
            base,
            field,
            config,
            terms,
        } = self;
        if terms.is_empty() {
            warn!(base = ?base, "writing an empty dictionary");
        }

        let term_count = terms.len() as u64;
        let mut doc_count = RoaringBitmap::new();
        let mut sum_doc_freq = 0u64;
        let mut sum_total_term_freq = 0u64;
        for t in &terms {
            doc_count |= &t.docs;
            sum_doc_freq += t.docs.len();
            sum_total_term_freq += t.total_term_freq;
        }
        let min_term = terms.first().map(|t| t.bytes.clone());
        let max_term = terms.last().map(|t| t.bytes.clone());

        let mut entries = collect_entries(terms, config.auto_prefix.as_ref());
        let auto_prefix_count = entries.len() as u64 - term_count;

        let mut postings = PostingsWriter::create(&base.with_extension("postings"))?;
        for e in entries.iter_mut() {
            e.postings_fp = postings.write(&e.docs)?;
        }
        postings.finish()?;

        let mut writer = BlockTreeWriter::create(&base, &entries, &config, field.has_freqs)?;
        for (i, e) in entries.iter().enumerate() {
            writer.push_term(&e.bytes)?;
            writer.pending.push(Pending::Term(i));
        }
        let stats = writer.finish()?;

        let meta = DictionaryMeta {
            version: META_VERSION,
            field,
            config,
            term_count,
            auto_prefix_count,
            block_count: stats.block_count,
            floor_block_count: stats.floor_block_count,
            sum_doc_freq,
            sum_total_term_freq,
            doc_count: doc_count.len(),
            min_term,
            max_term,
            terms_crc32: stats.terms_crc32,
        };
        let meta_path = base.with_extension("meta");
        let meta_file = File::create(&meta_path).map_err(|e| {
            IndexError::Io(io::Error::new(
                e.kind(),
                format!("failed to create meta file {:?}: {}", meta_path, e),
            ))
        })?;
        let mut meta_writer = BufWriter::new(meta_file);
        serde_cbor::to_writer(&mut meta_writer, &meta)?;
        meta_writer.flush()?;

        debug!(
            terms = meta.term_count,
            auto_prefix_terms = meta.auto_prefix_count,
            blocks = meta.block_count,
            floor_blocks = meta.floor_block_count,
            "dictionary written"
        );
        Ok(meta)
    }

    /// Consume the builder, write files, and open the dictionary via mmap.
    pub fn into_dictionary(self) -> Result<TermDictionary> {
        let base = self.base.clone();
        self.close()?;
        TermDictionary::open(base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Term,
    AutoPrefixSimple { lead_end: u8 },
    AutoPrefixFloored { lead_end: u8 },
}

struct BuildEntry {
    bytes: Vec<u8>,
    kind: EntryKind,
    docs: RoaringBitmap,
    total_term_freq: u64,
    postings_fp: u64,
}

impl BuildEntry {
    /// Sort key after the bytes: auto-prefix terms covering more come first,
    /// concrete terms last.
    fn rank(&self) -> usize {
        match self.kind {
            EntryKind::Term => usize::MAX,
            EntryKind::AutoPrefixSimple { .. } => self.bytes.len(),
            EntryKind::AutoPrefixFloored { .. } => self.bytes.len() - 1,
        }
    }
}

/// An auto-prefix term chosen for the dictionary and the terms it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AutoPrefixTerm {
    bytes: Vec<u8>,
    lead_end: u8,
    floored: bool,
    covered: Range<usize>,
}

fn collect_entries(terms: Vec<PendingTerm>, auto_prefix: Option<&AutoPrefixConfig>) -> Vec<BuildEntry> {
    let prefixes = match auto_prefix {
        Some(cfg) => {
            let keys: Vec<&[u8]> = terms.iter().map(|t| t.bytes.as_slice()).collect();
            select_auto_prefixes(&keys, cfg)
        }
        None => Vec::new(),
    };

    let mut entries = Vec::with_capacity(terms.len() + prefixes.len());
    for ap in prefixes {
        let mut docs = RoaringBitmap::new();
        let mut total_term_freq = 0;
        for t in &terms[ap.covered.clone()] {
            docs |= &t.docs;
            total_term_freq += t.total_term_freq;
        }
        let kind = if ap.floored {
            EntryKind::AutoPrefixFloored {
                lead_end: ap.lead_end,
            }
        } else {
            EntryKind::AutoPrefixSimple {
                lead_end: ap.lead_end,
            }
        };
        entries.push(BuildEntry {
            bytes: ap.bytes,
            kind,
            docs,
            total_term_freq,
            postings_fp: 0,
        });
    }
    for t in terms {
        entries.push(BuildEntry {
            bytes: t.bytes,
            kind: EntryKind::Term,
            docs: t.docs,
            total_term_freq: t.total_term_freq,
            postings_fp: 0,
        });
    }
    entries.sort_by(|a, b| a.bytes.cmp(&b.bytes).then(a.rank().cmp(&b.rank())));
    entries
}

/// Choose auto-prefix terms over sorted `terms`.
///
/// Every non-empty prefix shared by `min..=max` terms gets a simple auto-prefix
/// term. A prefix shared by more is split by the following byte into runs of at
/// least `min` terms, each becoming a floored auto-prefix term; the run holding
/// the bare prefix becomes a simple term bounded by its last byte instead.
fn select_auto_prefixes(terms: &[&[u8]], cfg: &AutoPrefixConfig) -> Vec<AutoPrefixTerm> {
    let mut out = Vec::new();
    let (_, groups) = lead_groups(terms, 0, 0..terms.len());
    for (_, range) in groups {
        visit_prefix(terms, 1, range, cfg, &mut out);
    }
    out
}

fn visit_prefix(
    terms: &[&[u8]],
    depth: usize,
    range: Range<usize>,
    cfg: &AutoPrefixConfig,
    out: &mut Vec<AutoPrefixTerm>,
) {
    if range.len() < cfg.min_items_in_prefix {
        return;
    }
    let (bare, groups) = lead_groups(terms, depth, range.clone());
    let prefix = &terms[range.start][..depth];
    if range.len() <= cfg.max_items_in_prefix {
        out.push(AutoPrefixTerm {
            bytes: prefix.to_vec(),
            lead_end: u8::MAX,
            floored: false,
            covered: range.clone(),
        });
    } else {
        split_prefix(prefix, bare, &groups, cfg, out);
    }
    for (_, child) in groups {
        visit_prefix(terms, depth + 1, child, cfg, out);
    }
}

fn split_prefix(
    prefix: &[u8],
    bare: Option<usize>,
    groups: &[(u8, Range<usize>)],
    cfg: &AutoPrefixConfig,
    out: &mut Vec<AutoPrefixTerm>,
) {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut run_start = 0;
    let mut count = usize::from(bare.is_some());
    for (g, (_, r)) in groups.iter().enumerate() {
        count += r.len();
        if count >= cfg.min_items_in_prefix {
            runs.push((run_start, g));
            run_start = g + 1;
            count = 0;
        }
    }
    if run_start < groups.len() {
        match runs.last_mut() {
            Some(last) => last.1 = groups.len() - 1,
            None => runs.push((0, groups.len() - 1)),
        }
    }

    for (i, &(first, last)) in runs.iter().enumerate() {
        let (lo, lo_range) = &groups[first];
        let (hi, hi_range) = &groups[last];
        match bare {
            Some(bare_idx) if i == 0 => out.push(AutoPrefixTerm {
                bytes: prefix.to_vec(),
                lead_end: *hi,
                floored: false,
                covered: bare_idx..hi_range.end,
            }),
            // A single lead byte is left to the child prefix.
            _ if first == last => {}
            _ => {
                let mut bytes = prefix.to_vec();
                bytes.push(*lo);
                out.push(AutoPrefixTerm {
                    bytes,
                    lead_end: *hi,
                    floored: true,
                    covered: lo_range.start..hi_range.end,
                });
            }
        }
    }
}

/// Split `range`, whose terms share their first `depth` bytes, by the byte at
/// `depth`. The bare prefix, if it is a term, is returned separately.
fn lead_groups(
    terms: &[&[u8]],
    depth: usize,
    range: Range<usize>,
) -> (Option<usize>, Vec<(u8, Range<usize>)>) {
    let mut i = range.start;
    let mut bare = None;
    if i < range.end && terms[i].len() == depth {
        bare = Some(i);
        i += 1;
    }
    let mut groups = Vec::new();
    while i < range.end {
        let b = terms[i][depth];
        let start = i;
        while i < range.end && terms[i][depth] == b {
            i += 1;
        }
        groups.push((b, start..i));
    }
    (bare, groups)
}

enum Pending {
    Term(usize),
    Block { prefix: Vec<u8>, fp: u64 },
}

struct WrittenBlock {
    prefix: Vec<u8>,
    fp: u64,
    has_terms: bool,
    is_floor: bool,
    lead_label: u8,
}

struct WriterStats {
    block_count: u64,
    floor_block_count: u64,
    terms_crc32: u32,
}

/// File writer tracking its position, optionally checksumming what it writes.
struct TrackingWriter {
    out: BufWriter<File>,
    pos: u64,
    crc: crc32fast::Hasher,
}

impl TrackingWriter {
    fn create(path: &Path, magic: &[u8; 4]) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            IndexError::Io(io::Error::new(
                e.kind(),
                format!("failed to create {:?}: {}", path, e),
            ))
        })?;
        let mut w = TrackingWriter {
            out: BufWriter::with_capacity(CHUNK_SIZE, file),
            pos: 0,
            crc: crc32fast::Hasher::new(),
        };
        let mut header = Vec::with_capacity(HEADER_LEN);
        storage::write_header(&mut header, magic, FORMAT_VERSION)?;
        w.write_all(&header)?;
        Ok(w)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.crc.update(bytes);
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> Result<u32> {
        self.out.flush()?;
        Ok(self.crc.finalize())
    }
}

/// Writes blocks bottom-up as sorted entries are pushed.
///
/// Entries wait on `pending` until the prefix they share with their neighbours
/// is abandoned; a prefix shared by at least `min_items_in_block` entries is
/// then written as a block (split into floor chunks when it is too large) and
/// replaced on `pending` by a single sub-block entry.
struct BlockTreeWriter<'a> {
    entries: &'a [BuildEntry],
    config: &'a BlockTreeConfig,
    has_freqs: bool,
    terms: TrackingWriter,
    codes: TrackingWriter,
    idx_path: PathBuf,
    index: Vec<(Vec<u8>, u64)>,
    pending: Vec<Pending>,
    prefix_starts: Vec<usize>,
    last_term: Vec<u8>,
    new_blocks: Vec<WrittenBlock>,
    suffix_buf: Vec<u8>,
    stats_buf: Vec<u8>,
    meta_buf: Vec<u8>,
    block_buf: Vec<u8>,
    block_count: u64,
    floor_block_count: u64,
}

impl<'a> BlockTreeWriter<'a> {
    fn create(
        base: &Path,
        entries: &'a [BuildEntry],
        config: &'a BlockTreeConfig,
        has_freqs: bool,
    ) -> Result<Self> {
        Ok(BlockTreeWriter {
            entries,
            config,
            has_freqs,
            terms: TrackingWriter::create(&base.with_extension("terms"), TERMS_MAGIC)?,
            codes: TrackingWriter::create(&base.with_extension("codes"), CODES_MAGIC)?,
            idx_path: base.with_extension("idx"),
            index: Vec::new(),
            pending: Vec::new(),
            prefix_starts: Vec::new(),
            last_term: Vec::new(),
            new_blocks: Vec::new(),
            suffix_buf: Vec::new(),
            stats_buf: Vec::new(),
            meta_buf: Vec::new(),
            block_buf: Vec::new(),
            block_count: 0,
            floor_block_count: 0,
        })
    }

    /// Close every prefix of the previous term that `text` does not share.
    fn push_term(&mut self, text: &[u8]) -> Result<()> {
        let pos = self
            .last_term
            .iter()
            .zip(text)
            .take_while(|(a, b)| a == b)
            .count();
        for i in (pos..self.last_term.len()).rev() {
            let top = self.pending.len() - self.prefix_starts[i];
            if top >= self.config.min_items_in_block {
                self.write_blocks(i + 1, top)?;
            }
        }
        if self.prefix_starts.len() < text.len() {
            self.prefix_starts.resize(text.len(), 0);
        }
        for start in &mut self.prefix_starts[pos..text.len()] {
            *start = self.pending.len();
        }
        self.last_term.clear();
        self.last_term.extend_from_slice(text);
        Ok(())
    }

    /// Write the top `count` pending entries, which share `prefix_len` bytes, as
    /// one block or a run of floor chunks.
    fn write_blocks(&mut self, prefix_len: usize, count: usize) -> Result<()> {
        let end = self.pending.len();
        let start = end - count;
        let min = self.config.min_items_in_block;
        let max = self.config.max_items_in_block;

        self.new_blocks.clear();
        let mut last_label: Option<u8> = None;
        let mut first_label_seen = false;
        let mut next_block_start = start;
        let mut next_lead: u8 = 0;
        for i in start..end {
            let label = match &self.pending[i] {
                Pending::Term(idx) => self.entries[*idx].bytes.get(prefix_len).copied(),
                Pending::Block { prefix, .. } => prefix.get(prefix_len).copied(),
            };
            if !first_label_seen || label != last_label {
                let items = i - next_block_start;
                if items >= min && end - next_block_start > max {
                    let is_floor = items < count;
                    self.write_block(prefix_len, is_floor, next_lead, next_block_start, i, false)?;
                    // Chunks after the first always start with a non-empty suffix.
                    next_lead = label.unwrap_or(0);
                    next_block_start = i;
                }
                last_label = label;
                first_label_seen = true;
            }
        }
        if next_block_start < end {
            let is_floor = end - next_block_start < count;
            self.write_block(prefix_len, is_floor, next_lead, next_block_start, end, true)?;
        }

        let mut blocks = self.new_blocks.drain(..);
        let Some(first) = blocks.next() else {
            return Ok(());
        };
        let follow: Vec<FloorChunk> = blocks
            .map(|b| FloorChunk {
                lead_label: b.lead_label,
                fp: b.fp,
                has_terms: b.has_terms,
            })
            .collect();
        let code = BlockCode {
            fp: first.fp,
            has_terms: first.has_terms,
            is_floor: first.is_floor,
        };
        let mut record = Vec::new();
        encode_index_record(&mut record, code, &follow);
        let offset = self.codes.pos;
        let mut len = Vec::new();
        write_vint(&mut len, record.len() as u32);
        self.codes.write_all(&len)?;
        self.codes.write_all(&record)?;
        self.index.push((first.prefix.clone(), offset));

        self.block_count += 1;
        if first.is_floor {
            self.floor_block_count += 1;
        }
        self.pending.truncate(start);
        self.pending.push(Pending::Block {
            prefix: first.prefix,
            fp: first.fp,
        });
        Ok(())
    }

    fn write_block(
        &mut self,
        prefix_len: usize,
        is_floor: bool,
        lead_label: u8,
        start: usize,
        end: usize,
        is_last_in_floor: bool,
    ) -> Result<()> {
        let fp = self.terms.pos;
        let prefix = self.last_term[..prefix_len].to_vec();
        let entries = self.entries;
        let is_leaf = self.pending[start..end].iter().all(|p| match p {
            Pending::Term(idx) => entries[*idx].kind == EntryKind::Term,
            Pending::Block { .. } => false,
        });

        self.suffix_buf.clear();
        self.stats_buf.clear();
        self.meta_buf.clear();
        let mut has_terms = false;
        let mut last_postings_fp = 0u64;
        for p in &self.pending[start..end] {
            match p {
                Pending::Term(idx) => {
                    let e = &entries[*idx];
                    let suffix = &e.bytes[prefix_len..];
                    if is_leaf {
                        write_vint(&mut self.suffix_buf, suffix.len() as u32);
                        self.suffix_buf.extend_from_slice(suffix);
                    } else {
                        let tag = match e.kind {
                            EntryKind::Term => 0,
                            EntryKind::AutoPrefixSimple { .. } => 2,
                            EntryKind::AutoPrefixFloored { .. } => 3,
                        };
                        write_vint(&mut self.suffix_buf, (suffix.len() as u32) << 2 | tag);
                        self.suffix_buf.extend_from_slice(suffix);
                        match e.kind {
                            EntryKind::AutoPrefixSimple { lead_end }
                            | EntryKind::AutoPrefixFloored { lead_end } => self.suffix_buf.push(lead_end),
                            EntryKind::Term => {}
                        }
                    }

                    let doc_freq = e.docs.len();
                    write_vint(&mut self.stats_buf, doc_freq as u32);
                    if self.has_freqs {
                        write_vlong(&mut self.stats_buf, e.total_term_freq - doc_freq);
                    }
                    write_vlong(&mut self.meta_buf, e.postings_fp - last_postings_fp);
                    last_postings_fp = e.postings_fp;
                    has_terms = true;
                }
                Pending::Block {
                    prefix: child_prefix,
                    fp: child_fp,
                } => {
                    let suffix = &child_prefix[prefix_len..];
                    write_vint(&mut self.suffix_buf, (suffix.len() as u32) << 2 | 1);
                    self.suffix_buf.extend_from_slice(suffix);
                    write_vlong(&mut self.suffix_buf, fp - child_fp);
                }
            }
        }

        self.block_buf.clear();
        write_vint(&mut self.block_buf, ((end - start) as u32) << 1 | is_last_in_floor as u32);
        write_vint(&mut self.block_buf, (self.suffix_buf.len() as u32) << 1 | is_leaf as u32);
        self.block_buf.extend_from_slice(&self.suffix_buf);
        write_vint(&mut self.block_buf, self.stats_buf.len() as u32);
        self.block_buf.extend_from_slice(&self.stats_buf);
        write_vint(&mut self.block_buf, self.meta_buf.len() as u32);
        self.block_buf.extend_from_slice(&self.meta_buf);
        self.terms.write_all(&self.block_buf)?;

        self.new_blocks.push(WrittenBlock {
            prefix,
            fp,
            has_terms,
            is_floor,
            lead_label,
        });
        Ok(())
    }

    /// Close all open prefixes, write the root block and the index FST.
    fn finish(mut self) -> Result<WriterStats> {
        if !self.pending.is_empty() {
            self.push_term(&[])?;
            let count = self.pending.len();
            self.write_blocks(0, count)?;
        }

        self.index.sort_by(|a, b| a.0.cmp(&b.0));
        let idx_file = File::create(&self.idx_path).map_err(|e| {
            IndexError::Io(io::Error::new(
                e.kind(),
                format!("failed to create index file {:?}: {}", self.idx_path, e),
            ))
        })?;
        let mut fst_builder = MapBuilder::new(BufWriter::with_capacity(CHUNK_SIZE, idx_file))?;
        for (prefix, offset) in &self.index {
            fst_builder.insert(prefix, *offset)?;
        }
        fst_builder.finish()?;

        self.codes.finish()?;
        let terms_crc32 = self.terms.finish()?;
        Ok(WriterStats {
            block_count: self.block_count,
            floor_block_count: self.floor_block_count,
            terms_crc32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(terms: &[&'static str]) -> Vec<&'static [u8]> {
        terms.iter().map(|t| t.as_bytes()).collect()
    }

    #[test]
    fn config_validation() {
        assert!(BlockTreeConfig::default().validate().is_ok());
        let bad = BlockTreeConfig {
            min_items_in_block: 10,
            max_items_in_block: 12,
            auto_prefix: None,
        };
        assert!(matches!(bad.validate(), Err(IndexError::InvalidConfig(_))));
        let bad_prefix = BlockTreeConfig {
            auto_prefix: Some(AutoPrefixConfig {
                min_items_in_prefix: 1,
                max_items_in_prefix: 4,
            }),
            ..BlockTreeConfig::default()
        };
        assert!(bad_prefix.validate().is_err());
    }

    #[test]
    fn small_prefix_gets_one_simple_term() {
        let terms = keys(&["cat", "cats", "dog", "door", "dot"]);
        let cfg = AutoPrefixConfig {
            min_items_in_prefix: 2,
            max_items_in_prefix: 4,
        };
        let picked = select_auto_prefixes(&terms, &cfg);
        let do_term = picked.iter().find(|p| p.bytes == b"do").unwrap();
        assert!(!do_term.floored);
        assert_eq!(do_term.lead_end, 0xff);
        assert_eq!(do_term.covered, 2..5);
        // "cat" is a prefix of "cats" and covers both.
        assert!(picked.iter().any(|p| p.bytes == b"cat" && p.covered == (0..2)));
        assert!(picked.iter().all(|p| !p.bytes.is_empty()));
    }

    #[test]
    fn large_prefix_is_split_into_floored_ranges() {
        let owned: Vec<String> = std::iter::once("p".to_string())
            .chain((b'a'..=b'h').flat_map(|c| {
                (0..3).map(move |i| format!("p{}{}", c as char, i))
            }))
            .collect();
        let terms: Vec<&[u8]> = owned.iter().map(|s| s.as_bytes()).collect();
        let cfg = AutoPrefixConfig {
            min_items_in_prefix: 6,
            max_items_in_prefix: 10,
        };
        let picked = select_auto_prefixes(&terms, &cfg);
        let top: Vec<&AutoPrefixTerm> = picked
            .iter()
            .filter(|p| p.bytes.len() <= 2 && p.lead_end != 0xff)
            .collect();
        // Bare "p" plus "pa*", "pb*" reach six terms first.
        assert_eq!(top[0].bytes, b"p");
        assert!(!top[0].floored);
        assert_eq!(top[0].lead_end, b'b');
        assert_eq!(top[0].covered, 0..7);
        for w in top.windows(2) {
            assert_eq!(w[0].covered.end, w[1].covered.start);
        }
        assert_eq!(top.last().unwrap().covered.end, terms.len());
        assert!(top[1..].iter().all(|p| p.floored && p.bytes.len() == 2));
    }

    #[test]
    fn entries_sort_auto_prefix_before_terms() {
        let mut docs = RoaringBitmap::new();
        docs.insert(1);
        let terms = ["do", "dog", "dot"]
            .iter()
            .map(|t| PendingTerm {
                bytes: t.as_bytes().to_vec(),
                docs: docs.clone(),
                total_term_freq: 1,
            })
            .collect();
        let cfg = AutoPrefixConfig {
            min_items_in_prefix: 2,
            max_items_in_prefix: 4,
        };
        let entries = collect_entries(terms, Some(&cfg));
        let kinds: Vec<(&[u8], EntryKind)> = entries.iter().map(|e| (e.bytes.as_slice(), e.kind)).collect();
        assert_eq!(kinds[0], (&b"d"[..], EntryKind::AutoPrefixSimple { lead_end: 0xff }));
        assert_eq!(kinds[1], (&b"do"[..], EntryKind::AutoPrefixSimple { lead_end: 0xff }));
        assert_eq!(kinds[2], (&b"do"[..], EntryKind::Term));
    }

    #[test]
    fn unsorted_insert_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = DictionaryBuilder::new(
            dir.path().join("d"),
            FieldInfo::new("f", false),
            BlockTreeConfig::default(),
        )
        .unwrap();
        let docs = RoaringBitmap::new();
        b.insert(b"b", &docs).unwrap();
        assert!(matches!(b.insert(b"a", &docs), Err(IndexError::UnsortedInput)));
        assert!(matches!(b.insert(b"b", &docs), Err(IndexError::UnsortedInput)));
    }
}
