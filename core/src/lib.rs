//! Core of the search engine: tokenization, in-memory and on-disk inverted
//! indexes, wildcard and spelling support through a k-gram index, and query
//! evaluation with tf-idf, importance and HITS ranking.

pub mod build;
pub mod config;
pub mod error;
pub mod graph;
pub mod hits;
pub mod importance;
pub mod index;
pub mod kgram;
pub mod persist;
pub mod postings;
pub mod query;
pub mod search;
pub mod spelling;
pub mod tokenizer;

pub type DocId = u32;
pub type TermId = u32;
/// Node of the link graph; unrelated to [`DocId`].
pub type NodeId = u32;

pub use build::{BuildStats, IndexBuilder};
pub use config::EngineConfig;
pub use error::{IndexError, Result};
pub use index::{DocInfo, DocTable, HashedIndex, TermIndex};
pub use kgram::KGramIndex;
pub use persist::PersistentHashedIndex;
pub use postings::{PostingsEntry, PostingsList};
pub use query::{Query, QueryTerm};
pub use search::{QueryType, RankingType, SearchOutcome, Searcher};
pub use tokenizer::{Tokenizer, TokenizerConfig};
