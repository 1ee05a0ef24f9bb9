//! One host session: every call a host can make, over shared state.
//!
//! A `Session` is created when the host session starts and dropped when it
//! ends. Arguments arrive as host values (integers, strings, comma-joined
//! lists) and are checked here before reaching the slot controller or the
//! writers.

use std::{collections::BTreeSet, path::Path};

use crate::{
    config::Config,
    controller::SlotController,
    error::Result,
    index_dir,
    library::{DocId, SearchLibrary},
    tantivy_index::TantivyLibrary,
    writer::IndexWriters,
};

pub struct Session<L: SearchLibrary = TantivyLibrary> {
    library: L,
    controller: SlotController<L>,
    writers: IndexWriters<L>,
}

impl Session<TantivyLibrary> {
    pub fn new(config: &Config) -> Self {
        Self::with_library(
            TantivyLibrary::new(config.writer_memory_bytes()),
            config,
        )
    }
}

impl<L: SearchLibrary> Session<L> {
    pub fn with_library(library: L, config: &Config) -> Self {
        Self {
            controller: SlotController::new(
                library.clone(),
                config.max_slots,
                config.max_open,
            ),
            writers: IndexWriters::new(
                library.clone(),
                config.effective_handle_base(),
            ),
            library,
        }
    }

    pub fn reset_all(&mut self) {
        self.controller.reset_all();
    }

    pub fn reset(&mut self) {
        self.controller.reset();
    }

    pub fn open(&mut self, slot: i64, path: &str) -> Result<()> {
        self.controller.open(slot, Path::new(path))
    }

    /// Ids of every document matching `query` in any of the comma-joined
    /// `prefixes`.
    pub fn simple_query(
        &mut self,
        slot: i64,
        query: &str,
        prefixes: &str,
    ) -> Result<Vec<DocId>> {
        let prefixes: Vec<&str> = split_list(prefixes).into_iter().collect();
        self.controller.query(slot, query, &prefixes)
    }

    pub fn disable_relevancy(&mut self) {
        self.controller.disable_relevancy();
    }

    pub fn relevancy(&self, id: i64) -> i32 {
        self.controller.relevancy(id)
    }

    pub fn spelling(&mut self, slot: i64, word: &str) -> Result<String> {
        self.controller.spelling(slot, word)
    }

    pub fn writer_open(
        &mut self,
        path_full: &str,
        path_fielded: &str,
    ) -> Result<i32> {
        self.writers
            .open(Path::new(path_full), Path::new(path_fielded))
    }

    pub fn writer_close(&mut self, handle: i32) -> Result<()> {
        self.writers.close(handle)
    }

    pub fn writer_start_transaction(&mut self, handle: i32) -> Result<()> {
        self.writers.start_transaction(handle)
    }

    pub fn writer_start_document(&mut self, handle: i32) -> Result<()> {
        self.writers.start_document(handle)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn writer_post_terms(
        &mut self,
        handle: i32,
        terms: &str,
        labels: &str,
        prefix1: &str,
        prefix2: Option<&str>,
        start_position: i64,
        weight: i64,
    ) -> Result<i64> {
        let labels: Vec<&str> = split_list(labels).into_iter().collect();
        self.writers.post_terms(
            handle,
            terms,
            &labels,
            prefix1,
            prefix2,
            start_position,
            weight,
        )
    }

    pub fn writer_finish_document(
        &mut self,
        handle: i32,
        id: i64,
    ) -> Result<()> {
        self.writers.finish_document(handle, id)
    }

    pub fn writer_delete_document(
        &mut self,
        handle: i32,
        id: i64,
    ) -> Result<()> {
        self.writers.delete_document(handle, id)
    }

    pub fn writer_cancel_transaction(&mut self, handle: i32) -> Result<()> {
        self.writers.cancel_transaction(handle)
    }

    pub fn writer_commit_transaction(&mut self, handle: i32) -> Result<()> {
        self.writers.commit_transaction(handle)
    }

    pub fn init_empty_index(&self, path: &str) -> Result<()> {
        index_dir::init_empty_index(&self.library, Path::new(path))
    }

    pub fn remove_index(&self, path: &str, remove_parent: bool) -> Result<()> {
        index_dir::remove_index(&self.library, Path::new(path), remove_parent)
    }
}

impl<L: SearchLibrary> Drop for Session<L> {
    fn drop(&mut self) {
        self.writers.close_all();
    }
}

/// Split a comma-joined list into its distinct, non-empty members.
pub fn split_list(list: &str) -> BTreeSet<&str> {
    list.split(',').filter(|item| !item.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryLibrary;

    #[test]
    fn split_list_drops_empty_and_duplicate_items() {
        assert!(split_list("").is_empty());
        assert!(split_list(",,").is_empty());
        let items: Vec<&str> = split_list(",b,a,,b,").into_iter().collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn writes_are_visible_after_reopening_the_slot() {
        let library = MemoryLibrary::with_indexes(&["/s/full", "/s/fielded"]);
        let config = Config::default().with_handle_base(1);
        let mut session = Session::with_library(library, &config);

        session.open(0, "/s/full").unwrap();
        session.open(1, "/s/fielded").unwrap();

        let h = session.writer_open("/s/full", "/s/fielded").unwrap();
        session.writer_start_document(h).unwrap();
        let next = session
            .writer_post_terms(h, "Plums:plum", ",title,", "t", None, 0, 1)
            .unwrap();
        assert_eq!(next, 1);
        session.writer_finish_document(h, 8).unwrap();

        session.open(0, "/s/full").unwrap();
        session.open(1, "/s/fielded").unwrap();
        assert_eq!(session.simple_query(0, "plum", "").unwrap(), vec![8]);
        assert_eq!(session.simple_query(1, "plum", "title").unwrap(), vec![8]);
        assert_eq!(session.simple_query(1, "plum", ",t,").unwrap(), vec![8]);
        assert!(session.simple_query(1, "plum", "x").unwrap().is_empty());
        assert!(session.relevancy(8) > 0);

        session.writer_close(h).unwrap();
        assert!(session.writer_start_document(h).is_err());
    }

    #[test]
    fn dropping_the_session_closes_writers() {
        let library = MemoryLibrary::with_indexes(&["/s/full", "/s/fielded"]);
        let mut session =
            Session::with_library(library.clone(), &Config::default());
        let h = session.writer_open("/s/full", "/s/fielded").unwrap();
        session.writer_start_transaction(h).unwrap();
        session.writer_start_document(h).unwrap();
        session.writer_post_terms(h, "a:a", "", "", None, 0, 1).unwrap();
        session.writer_finish_document(h, 1).unwrap();
        drop(session);

        assert!(library.stored("/s/full").docs.is_empty());
    }
}
