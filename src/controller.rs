//! Slot-addressed read access to indexes.
//!
//! Callers open an index into a numbered slot and query it by slot number.
//! Opened indexes are cached by path, so several slots can share one reader,
//! and the cache is kept to a bounded size by closing the least recently used
//! reader. Queries that race with a writer are retried on a refreshed view.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    error::{Result, UsageError},
    library::{DocId, ReadIndex, SearchLibrary},
    query::Query,
};

/// How many times a query is run before a stale view is reported.
pub const QUERY_ATTEMPTS: usize = 32;

/// Upper bound on evictions made by a single `open`.
const EVICTION_LIMIT: usize = 32;

struct OpenIndex<R> {
    reader: R,
    serial: u64,
}

pub struct SlotController<L: SearchLibrary> {
    library: L,
    max_slots: usize,
    max_open: usize,
    open: HashMap<PathBuf, OpenIndex<L::Reader>>,
    slots: Vec<Option<PathBuf>>,
    next_serial: u64,
    relevancy: HashMap<DocId, i32>,
    relevancy_enabled: bool,
}

impl<L: SearchLibrary> SlotController<L> {
    pub fn new(library: L, max_slots: usize, max_open: usize) -> Self {
        Self {
            library,
            max_slots,
            max_open,
            open: HashMap::new(),
            slots: Vec::new(),
            next_serial: 0,
            relevancy: HashMap::new(),
            relevancy_enabled: true,
        }
    }

    /// Forget slot bindings and relevancy scores. Open indexes stay cached.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.relevancy.clear();
        self.relevancy_enabled = true;
    }

    /// [`SlotController::reset`], then close every cached index.
    pub fn reset_all(&mut self) {
        self.reset();
        let closed = self.open.len();
        self.open.clear();
        if closed > 0 {
            info!(closed, "Closed all open indexes");
        }
    }

    /// Bind `slot` to the index at `path`, opening it if it is not cached.
    ///
    /// A cached index is refreshed so the slot sees the latest commits.
    pub fn open(&mut self, slot: i64, path: &Path) -> Result<()> {
        if slot < 0 || slot as u64 > self.max_slots as u64 {
            return Err(UsageError::SlotOutOfRange {
                slot,
                max: self.max_slots,
            }
            .into());
        }
        if !path.is_absolute() {
            return Err(UsageError::RelativePath(path.to_path_buf()).into());
        }
        let key =
            std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        if let Some(existing) = self.open.get_mut(&key) {
            debug!(path = %key.display(), "Reusing open index");
            existing.reader.reopen()?;
        } else {
            self.make_room();
            let reader = self.library.open_reader(&key)?;
            debug!(path = %key.display(), slot, "Cached new index");
            self.open.insert(key.clone(), OpenIndex { reader, serial: 0 });
        }
        self.touch(&key);

        let slot = slot as usize;
        if self.slots.len() <= slot {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(key);
        Ok(())
    }

    fn make_room(&mut self) {
        let mut evictions = 0;
        while self.open.len() >= self.max_open && evictions < EVICTION_LIMIT {
            evictions += 1;
            let Some(oldest) = self
                .open
                .iter()
                .min_by_key(|(_, index)| index.serial)
                .map(|(path, _)| path.clone())
            else {
                break;
            };
            self.open.remove(&oldest);
            for slot in &mut self.slots {
                if slot.as_deref() == Some(oldest.as_path()) {
                    *slot = None;
                }
            }
            info!(path = %oldest.display(), "Closed least recently used index");
        }
    }

    fn touch(&mut self, key: &Path) {
        self.next_serial += 1;
        if let Some(index) = self.open.get_mut(key) {
            index.serial = self.next_serial;
        }
    }

    fn bound_path(&self, slot: i64) -> Result<PathBuf> {
        if slot < 0 || slot as u64 > self.max_slots as u64 {
            return Err(UsageError::SlotOutOfRange {
                slot,
                max: self.max_slots,
            }
            .into());
        }
        self.slots
            .get(slot as usize)
            .cloned()
            .flatten()
            .filter(|path| self.open.contains_key(path))
            .ok_or_else(|| UsageError::UnboundSlot(slot).into())
    }

    /// Run `text` against the index in `slot`, once per prefix, and return
    /// the ids of every matching document, best first.
    pub fn query(
        &mut self,
        slot: i64,
        text: &str,
        prefixes: &[&str],
    ) -> Result<Vec<DocId>> {
        let key = self.bound_path(slot)?;
        let query = Query::parse_scoped(text, prefixes.iter().copied())?;
        self.touch(&key);
        let Some(index) = self.open.get_mut(&key) else {
            return Err(UsageError::UnboundSlot(slot).into());
        };

        let mut attempt = 1;
        let hits = loop {
            let result = index
                .reader
                .doc_count()
                .and_then(|count| index.reader.search(&query, count as usize));
            match result {
                Ok(hits) => break hits,
                Err(err) if err.is_stale_view() && attempt < QUERY_ATTEMPTS => {
                    warn!(
                        attempt,
                        path = %key.display(),
                        "Index changed during query, reopening and retrying"
                    );
                    index.reader.reopen()?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        if self.relevancy_enabled {
            for hit in &hits {
                let score = self.relevancy.entry(hit.id).or_insert(0);
                *score = score.saturating_add(hit.percent);
            }
        }
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    pub fn disable_relevancy(&mut self) {
        self.relevancy_enabled = false;
    }

    /// Accumulated score for `id`; 0 when tracking is disabled or `id` never
    /// matched.
    pub fn relevancy(&self, id: i64) -> i32 {
        if !self.relevancy_enabled {
            return 0;
        }
        DocId::try_from(id)
            .ok()
            .and_then(|id| self.relevancy.get(&id).copied())
            .unwrap_or(0)
    }

    pub fn spelling(&mut self, slot: i64, word: &str) -> Result<String> {
        let key = self.bound_path(slot)?;
        self.touch(&key);
        match self.open.get(&key) {
            Some(index) => index.reader.spelling_suggestion(word),
            None => Err(UsageError::UnboundSlot(slot).into()),
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open.contains_key(path)
    }
}
