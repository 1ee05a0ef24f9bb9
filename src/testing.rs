//! In-memory search library for unit tests.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    error::{Error, Result},
    library::{DocId, Hit, ReadIndex, SearchLibrary, WriteIndex},
    postings::{Posting, term_text},
    query::Query,
    spelling::SpellingDictionary,
};

#[derive(Debug, Clone, Default)]
pub struct StoredIndex {
    pub docs: BTreeMap<DocId, Vec<Posting>>,
    pub spelling: SpellingDictionary,
}

#[derive(Debug, Default)]
struct Disk {
    indexes: HashMap<PathBuf, StoredIndex>,
    reader_opens: HashMap<PathBuf, usize>,
    reopens: HashMap<PathBuf, usize>,
    stale_searches: HashMap<PathBuf, usize>,
    failing_commits: HashMap<PathBuf, usize>,
    broken_writers: Vec<PathBuf>,
}

/// Indexes live in a shared map keyed by path, standing in for the disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    disk: Rc<RefCell<Disk>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indexes(paths: &[&str]) -> Self {
        let library = Self::new();
        for path in paths {
            library.create_index(Path::new(path)).unwrap();
        }
        library
    }

    /// The next `count` searches against `path` fail with a stale view.
    pub fn fail_searches(&self, path: &str, count: usize) {
        self.disk
            .borrow_mut()
            .stale_searches
            .insert(PathBuf::from(path), count);
    }

    /// The next `count` transaction commits on `path` fail, discarding the
    /// staged changes.
    pub fn fail_commits(&self, path: &str, count: usize) {
        self.disk
            .borrow_mut()
            .failing_commits
            .insert(PathBuf::from(path), count);
    }

    /// Opening `path` for writing fails from now on.
    pub fn break_writer(&self, path: &str) {
        self.disk.borrow_mut().broken_writers.push(PathBuf::from(path));
    }

    pub fn reader_opens(&self, path: &str) -> usize {
        let disk = self.disk.borrow();
        disk.reader_opens.get(Path::new(path)).copied().unwrap_or(0)
    }

    pub fn reopens(&self, path: &str) -> usize {
        let disk = self.disk.borrow();
        disk.reopens.get(Path::new(path)).copied().unwrap_or(0)
    }

    pub fn stored(&self, path: &str) -> StoredIndex {
        self.disk
            .borrow()
            .indexes
            .get(Path::new(path))
            .cloned()
            .unwrap_or_default()
    }

    fn snapshot(&self, path: &Path) -> Result<StoredIndex> {
        self.disk
            .borrow()
            .indexes
            .get(path)
            .cloned()
            .ok_or_else(|| missing(path))
    }
}

fn missing(path: &Path) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no index at {}", path.display()),
    ))
}

impl SearchLibrary for MemoryLibrary {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn open_reader(&self, path: &Path) -> Result<MemoryReader> {
        let snapshot = self.snapshot(path)?;
        *self
            .disk
            .borrow_mut()
            .reader_opens
            .entry(path.to_path_buf())
            .or_insert(0) += 1;
        Ok(MemoryReader {
            library: self.clone(),
            path: path.to_path_buf(),
            snapshot,
        })
    }

    fn open_writer(&self, path: &Path) -> Result<MemoryWriter> {
        self.snapshot(path)?;
        if self.disk.borrow().broken_writers.iter().any(|p| p == path) {
            return Err(Error::Io(std::io::Error::other("writer refused")));
        }
        Ok(MemoryWriter {
            library: self.clone(),
            path: path.to_path_buf(),
            staged: None,
        })
    }

    fn create_index(&self, path: &Path) -> Result<()> {
        let mut disk = self.disk.borrow_mut();
        if disk.indexes.contains_key(path) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "index exists",
            )));
        }
        disk.indexes.insert(path.to_path_buf(), StoredIndex::default());
        Ok(())
    }
}

pub struct MemoryReader {
    library: MemoryLibrary,
    path: PathBuf,
    snapshot: StoredIndex,
}

impl ReadIndex for MemoryReader {
    fn doc_count(&self) -> Result<u64> {
        Ok(self.snapshot.docs.len() as u64)
    }

    fn reopen(&mut self) -> Result<()> {
        self.snapshot = self.library.snapshot(&self.path)?;
        *self
            .library
            .disk
            .borrow_mut()
            .reopens
            .entry(self.path.clone())
            .or_insert(0) += 1;
        Ok(())
    }

    fn search(&self, query: &Query, limit: usize) -> Result<Vec<Hit>> {
        {
            let mut disk = self.library.disk.borrow_mut();
            if let Some(left) = disk.stale_searches.get_mut(&self.path) {
                if *left > 0 {
                    *left -= 1;
                    return Err(Error::StaleView("modified".into()));
                }
            }
        }
        Ok(self
            .snapshot
            .docs
            .iter()
            .filter(|(_, postings)| matches(query, postings))
            .take(limit)
            .map(|(id, postings)| Hit {
                id: *id,
                percent: postings.len().min(100) as i32,
            })
            .collect())
    }

    fn spelling_suggestion(&self, word: &str) -> Result<String> {
        Ok(self.snapshot.spelling.suggest(word))
    }
}

fn positions(postings: &[Posting], term: &str) -> Vec<u32> {
    postings
        .iter()
        .filter(|p| term_text(&p.term) == term)
        .map(|p| p.position)
        .collect()
}

fn matches(query: &Query, postings: &[Posting]) -> bool {
    match query {
        Query::Term(term) => !positions(postings, term).is_empty(),
        Query::Wildcard(prefix) => postings
            .iter()
            .any(|p| term_text(&p.term).starts_with(prefix.as_str())),
        Query::Phrase { terms, slop } => {
            let Some((first, rest)) = terms.split_first() else {
                return false;
            };
            positions(postings, first).into_iter().any(|start| {
                rest.iter().enumerate().all(|(offset, term)| {
                    let wanted = start + offset as u32 + 1;
                    positions(postings, term)
                        .into_iter()
                        .any(|p| p >= wanted && p <= wanted + slop)
                })
            })
        }
        Query::And(parts) => parts.iter().all(|q| matches(q, postings)),
        Query::Or(parts) => parts.iter().any(|q| matches(q, postings)),
        Query::AndNot(positive, negative) => {
            matches(positive, postings) && !matches(negative, postings)
        }
        Query::Nothing => false,
    }
}

pub struct MemoryWriter {
    library: MemoryLibrary,
    path: PathBuf,
    staged: Option<StoredIndex>,
}

impl MemoryWriter {
    fn change(&mut self, apply: impl FnOnce(&mut StoredIndex)) -> Result<()> {
        if let Some(staged) = self.staged.as_mut() {
            apply(staged);
            return Ok(());
        }
        let mut disk = self.library.disk.borrow_mut();
        let stored = disk
            .indexes
            .get_mut(&self.path)
            .ok_or_else(|| missing(&self.path))?;
        apply(stored);
        Ok(())
    }
}

impl WriteIndex for MemoryWriter {
    fn begin_transaction(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(Error::Transaction("transaction already in progress"));
        }
        self.staged = Some(self.library.snapshot(&self.path)?);
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or(Error::Transaction("no transaction in progress"))?;
        let mut disk = self.library.disk.borrow_mut();
        if let Some(left) = disk.failing_commits.get_mut(&self.path)
            && *left > 0
        {
            *left -= 1;
            return Err(Error::Io(std::io::Error::other("commit failed")));
        }
        disk.indexes.insert(self.path.clone(), staged);
        Ok(())
    }

    fn cancel_transaction(&mut self) -> Result<()> {
        self.staged
            .take()
            .map(|_| ())
            .ok_or(Error::Transaction("no transaction in progress"))
    }

    fn replace_document(
        &mut self,
        id: DocId,
        postings: &[Posting],
    ) -> Result<()> {
        let postings = postings.to_vec();
        self.change(|index| {
            index.docs.insert(id, postings);
        })
    }

    fn delete_document(&mut self, id: DocId) -> Result<()> {
        self.change(|index| {
            index.docs.remove(&id);
        })
    }

    fn add_spelling(&mut self, word: &[u8]) -> Result<()> {
        let word = term_text(word).into_owned();
        self.change(|index| index.spelling.add(&word, 1))
    }

    fn close(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }
}
