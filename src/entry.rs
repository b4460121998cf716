use std::cmp::Ordering;

/// One decoded entry of a block, as produced by `Frame::next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// A concrete term; `term_ord` is its ordinal among the block's term-like entries.
    Term { suffix_len: usize, term_ord: usize },
    /// A pointer to a deeper block whose prefix extends this frame's prefix by the suffix.
    SubBlock { suffix_len: usize, child_fp: u64 },
    /// Stands for every term starting with this entry's bytes whose next byte is `<= lead_end`,
    /// including the bare prefix itself.
    AutoPrefixSimple { suffix_len: usize, lead_end: u8 },
    /// Stands for every term `P·b·*` with `b` in `[lead_start, lead_end]`, where the
    /// entry's bytes are `P·lead_start`.
    AutoPrefixFloored {
        suffix_len: usize,
        lead_start: u8,
        lead_end: u8,
    },
}

impl Entry {
    #[inline]
    pub fn suffix_len(&self) -> usize {
        match *self {
            Entry::Term { suffix_len, .. }
            | Entry::SubBlock { suffix_len, .. }
            | Entry::AutoPrefixSimple { suffix_len, .. }
            | Entry::AutoPrefixFloored { suffix_len, .. } => suffix_len,
        }
    }

    /// Entries that carry stats and metadata.
    #[inline]
    pub fn has_term_state(&self) -> bool {
        !matches!(self, Entry::SubBlock { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Term { .. } => "Term",
            Entry::SubBlock { .. } => "SubBlock",
            Entry::AutoPrefixSimple { .. } => "AutoPrefixSimple",
            Entry::AutoPrefixFloored { .. } => "AutoPrefixFloored",
        }
    }
}

/// The set of concrete terms an auto-prefix term stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoPrefixRange {
    /// Bytes shared by every covered term.
    pub prefix: Vec<u8>,
    /// Inclusive bounds on the byte following `prefix`.
    pub lead_start: u8,
    pub lead_end: u8,
    /// Whether `prefix` itself is covered.
    pub includes_prefix: bool,
}

impl AutoPrefixRange {
    /// Range of an emitted auto-prefix term `term` decoded from `entry`.
    pub(crate) fn for_entry(term: &[u8], entry: &Entry) -> Option<AutoPrefixRange> {
        match *entry {
            Entry::AutoPrefixSimple { lead_end, .. } => Some(AutoPrefixRange {
                prefix: term.to_vec(),
                lead_start: 0,
                lead_end,
                includes_prefix: true,
            }),
            Entry::AutoPrefixFloored {
                lead_start,
                lead_end,
                ..
            } => {
                let (_, prefix) = term.split_last()?;
                Some(AutoPrefixRange {
                    prefix: prefix.to_vec(),
                    lead_start,
                    lead_end,
                    includes_prefix: false,
                })
            }
            _ => None,
        }
    }

    pub fn contains(&self, term: &[u8]) -> bool {
        match term.strip_prefix(self.prefix.as_slice()) {
            None => false,
            Some([]) => self.includes_prefix,
            Some([lead, ..]) => (self.lead_start..=self.lead_end).contains(lead),
        }
    }

    /// Length of the bytes shared by every covered term.
    #[inline]
    pub fn base_len(&self) -> usize {
        self.prefix.len()
    }
}

/// One result of an intersection, owned.
#[derive(Debug, Clone)]
pub enum TermMatch {
    Term(Vec<u8>),
    AutoPrefix { term: Vec<u8>, range: AutoPrefixRange },
}

impl TermMatch {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TermMatch::Term(t) | TermMatch::AutoPrefix { term: t, .. } => t,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TermMatch::Term(_) => "Term",
            TermMatch::AutoPrefix { .. } => "AutoPrefix",
        }
    }

    pub fn is_auto_prefix(&self) -> bool {
        matches!(self, TermMatch::AutoPrefix { .. })
    }

    /// True if `term` is this match itself or lies in its covered range.
    pub fn covers(&self, term: &[u8]) -> bool {
        match self {
            TermMatch::Term(t) => t.as_slice() == term,
            TermMatch::AutoPrefix { range, .. } => range.contains(term),
        }
    }
}

impl PartialEq for TermMatch {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for TermMatch {}

impl PartialOrd for TermMatch {
    fn partial_cmp(&self, other: &TermMatch) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermMatch {
    fn cmp(&self, other: &TermMatch) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}
