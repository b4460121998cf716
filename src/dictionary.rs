use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use fst::Map;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::automaton::CompiledAutomaton;
use crate::builder::BlockTreeConfig;
use crate::codec::ByteReader;
use crate::error::{IndexError, Result};
use crate::frame::BlockCode;
use crate::intersect::{IntersectOptions, IntersectTermsEnum, TermSource};
use crate::postings::{FieldInfo, RoaringPostingsReader};
use crate::prefix::IndexArc;
use crate::storage::{
    self, read_index_record, BlockInput, SharedMmap, CODES_MAGIC, FORMAT_VERSION, HEADER_LEN,
    TERMS_MAGIC,
};

pub(crate) const META_VERSION: u16 = 1;

/// Contents of `<base>.meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryMeta {
    pub version: u16,
    pub field: FieldInfo,
    pub config: BlockTreeConfig,
    pub term_count: u64,
    pub auto_prefix_count: u64,
    pub block_count: u64,
    pub floor_block_count: u64,
    pub sum_doc_freq: u64,
    pub sum_total_term_freq: u64,
    /// Number of distinct docs with at least one term.
    pub doc_count: u64,
    pub min_term: Option<Vec<u8>>,
    pub max_term: Option<Vec<u8>>,
    pub terms_crc32: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Check the terms file against the checksum recorded in the meta file.
    pub verify_checksum: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            verify_checksum: true,
        }
    }
}

/// A read-only, memory-mapped block-tree dictionary for one field.
pub struct TermDictionary {
    base: PathBuf,
    meta: DictionaryMeta,
    terms: SharedMmap,
    codes: SharedMmap,
    index: Map<SharedMmap>,
    postings: RoaringPostingsReader,
}

impl TermDictionary {
    /// Open the dictionary written at `base`, verifying its checksum.
    pub fn open<P: AsRef<Path>>(base: P) -> Result<Self> {
        Self::open_with_options(base, OpenOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(base: P, options: OpenOptions) -> Result<Self> {
        let base = base.as_ref();
        let meta_path = base.with_extension("meta");
        let meta_file = File::open(&meta_path).map_err(|e| {
            IndexError::Io(io::Error::new(
                e.kind(),
                format!("failed to open meta file {:?}: {}", meta_path, e),
            ))
        })?;
        let meta: DictionaryMeta = serde_cbor::from_reader(BufReader::new(meta_file))?;
        if meta.version != META_VERSION {
            return Err(IndexError::InvalidFormat("unsupported meta version"));
        }

        let terms = storage::map_file(&base.with_extension("terms"), "terms")?;
        storage::check_header(terms.as_ref(), TERMS_MAGIC, FORMAT_VERSION)?;
        if options.verify_checksum && crc32fast::hash(terms.as_ref()) != meta.terms_crc32 {
            return Err(IndexError::InvalidFormat("terms file checksum mismatch"));
        }
        let codes = storage::map_file(&base.with_extension("codes"), "codes")?;
        storage::check_header(codes.as_ref(), CODES_MAGIC, FORMAT_VERSION)?;
        let index = Map::new(storage::map_file(&base.with_extension("idx"), "index")?)?;
        let postings = RoaringPostingsReader::open(&base.with_extension("postings"))?;

        let dict = TermDictionary {
            base: base.to_path_buf(),
            meta,
            terms,
            codes,
            index,
            postings,
        };
        dict.validate_root()?;
        debug!(
            base = ?dict.base,
            field = %dict.meta.field.name,
            terms = dict.meta.term_count,
            auto_prefix_terms = dict.meta.auto_prefix_count,
            blocks = dict.meta.block_count,
            "opened dictionary"
        );
        Ok(dict)
    }

    /// The root block must be reachable through a final root arc and lie inside the terms file.
    fn validate_root(&self) -> Result<()> {
        let fst = self.index.as_fst();
        let root_final = fst.root().is_final();
        if self.is_empty() {
            if root_final {
                return Err(IndexError::InvalidFormat("empty dictionary has a root block"));
            }
            warn!(base = ?self.base, "dictionary is empty");
            return Ok(());
        }
        let Some(offset) = IndexArc::root(fst).final_value(fst).filter(|_| root_final) else {
            return Err(IndexError::InvalidFormat("index root arc is not final"));
        };
        let record = read_index_record(self.codes.as_ref(), offset, 0)?;
        let code = BlockCode::decode(ByteReader::new(record).read_vlong()?);
        if code.fp < HEADER_LEN as u64 || code.fp >= self.terms.as_ref().len() as u64 {
            return Err(IndexError::Corrupt {
                fp: code.fp,
                reason: "root block outside terms file",
            });
        }
        Ok(())
    }

    /// Enumerate the terms `automaton` accepts, optionally starting strictly after `start_term`.
    ///
    /// Each enumerator reads through its own handle, so several may run at once.
    pub fn intersect<'a>(
        &'a self,
        automaton: &'a CompiledAutomaton,
        start_term: Option<&[u8]>,
        options: IntersectOptions,
    ) -> Result<IntersectTermsEnum<'a, RoaringPostingsReader>> {
        let source = TermSource {
            input: BlockInput::new(self.terms.clone()),
            index: self.index.as_fst(),
            codes: self.codes.as_ref(),
            postings: &self.postings,
            field: &self.meta.field,
        };
        IntersectTermsEnum::new(source, automaton, start_term, options)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn meta(&self) -> &DictionaryMeta {
        &self.meta
    }

    pub fn field(&self) -> &FieldInfo {
        &self.meta.field
    }

    pub fn term_count(&self) -> u64 {
        self.meta.term_count
    }

    pub fn auto_prefix_count(&self) -> u64 {
        self.meta.auto_prefix_count
    }

    pub fn is_empty(&self) -> bool {
        self.meta.term_count == 0
    }
}
