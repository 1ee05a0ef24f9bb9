//! What the slot manager and writers need from a search-index library.
//!
//! [`crate::tantivy_index::TantivyLibrary`] is the implementation used in
//! production.

use std::path::Path;

use crate::{error::Result, postings::Posting, query::Query};

/// Identifier of an indexed document. 0 is reserved for "no object" and is
/// never stored.
pub type DocId = u32;

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub id: DocId,
    /// Match quality relative to the best hit, 1 to 100.
    pub percent: i32,
}

/// Opens indexes on disk.
pub trait SearchLibrary: Clone {
    type Reader: ReadIndex;
    type Writer: WriteIndex;

    fn open_reader(&self, path: &Path) -> Result<Self::Reader>;

    /// Open an existing index for writing. Fails if another writer holds it.
    fn open_writer(&self, path: &Path) -> Result<Self::Writer>;

    /// Create a new empty index at `path`. Fails if one already exists.
    fn create_index(&self, path: &Path) -> Result<()>;
}

/// A read view of one index.
pub trait ReadIndex {
    fn doc_count(&self) -> Result<u64>;

    /// Move the view forward to the latest committed state.
    fn reopen(&mut self) -> Result<()>;

    /// Run `query`, returning at most `limit` hits, best first.
    ///
    /// Fails with [`crate::Error::StaleView`] when concurrent writes
    /// invalidated the view mid-search; [`ReadIndex::reopen`] and retry.
    fn search(&self, query: &Query, limit: usize) -> Result<Vec<Hit>>;

    fn spelling_suggestion(&self, word: &str) -> Result<String>;
}

/// A writable index.
///
/// Outside a transaction each change is committed as soon as it is made.
pub trait WriteIndex {
    fn begin_transaction(&mut self) -> Result<()>;

    fn commit_transaction(&mut self) -> Result<()>;

    fn cancel_transaction(&mut self) -> Result<()>;

    /// Store `postings` as the whole content of document `id`, replacing
    /// anything previously stored under it.
    fn replace_document(&mut self, id: DocId, postings: &[Posting])
    -> Result<()>;

    fn delete_document(&mut self, id: DocId) -> Result<()>;

    /// Count one more occurrence of `word` in the spelling dictionary.
    fn add_spelling(&mut self, word: &[u8]) -> Result<()>;

    /// Flush and release the index. An open transaction is cancelled.
    fn close(&mut self) -> Result<()>;
}
