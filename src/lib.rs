//! Block-tree term dictionaries intersected with byte automata.
//!
//! A dictionary is a trie of on-disk blocks indexed by an FST over block
//! prefixes. [`TermDictionary::intersect`] walks only the blocks an automaton
//! can still match, optionally returning auto-prefix terms that stand for whole
//! ranges of matching terms.

mod automaton;
mod builder;
mod codec;
mod dictionary;
mod entry;
mod error;
mod frame;
mod intersect;
pub mod postings;
mod prefix;
mod storage;
mod streamer;

pub use automaton::{CompiledAutomaton, StateId, Transition};
pub use builder::{AutoPrefixConfig, BlockTreeConfig, DictionaryBuilder};
pub use codec::{write_vint, write_vlong, ByteReader};
pub use dictionary::{DictionaryMeta, OpenOptions, TermDictionary};
pub use entry::{AutoPrefixRange, Entry, TermMatch};
pub use error::{IndexError, Result};
pub use intersect::{IntersectOptions, IntersectTermsEnum};
pub use postings::{BlockTermState, FieldInfo, PostingsFlags, PostingsReader};
pub use streamer::Streamer;
