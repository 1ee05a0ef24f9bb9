//! Write sessions over pairs of indexes.
//!
//! Each session writes to a "full" index holding every term unfielded and a
//! "fielded" index holding the same terms under field scopes. Documents are
//! built in memory and stored in both indexes when finished.
//!
//! ```text
//! open -> start_transaction -> start_document -> post_terms* -> finish
//!               ^                                                 |
//!               +----------- commit / cancel <--------------------+
//! ```

use std::{collections::BTreeSet, path::Path};

use tracing::{debug, info, warn};

use crate::{
    error::{Result, UsageError},
    handles::HandleTable,
    library::{DocId, SearchLibrary, WriteIndex},
    postings::DocumentBuilder,
};

struct WriteSession<W> {
    full: W,
    fielded: W,
    document: Option<DocumentBuilder>,
}

/// Every write session of one host session, addressed by integer handle.
pub struct IndexWriters<L: SearchLibrary> {
    library: L,
    sessions: HandleTable<WriteSession<L::Writer>>,
}

impl<L: SearchLibrary> IndexWriters<L> {
    pub fn new(library: L, handle_base: u32) -> Self {
        Self {
            library,
            sessions: HandleTable::new(handle_base),
        }
    }

    /// Open both indexes for writing and return the new session's handle.
    ///
    /// Nothing is allocated unless both indexes open.
    pub fn open(&mut self, full: &Path, fielded: &Path) -> Result<i32> {
        let session = WriteSession {
            full: self.library.open_writer(full)?,
            fielded: self.library.open_writer(fielded)?,
            document: None,
        };
        let handle = self.sessions.insert(session)?;
        let raw = self.sessions.encode(handle);
        info!(
            handle = raw,
            full = %full.display(),
            fielded = %fielded.display(),
            "Opened writer"
        );
        Ok(raw)
    }

    /// Close both indexes. The handle is released even if closing fails.
    pub fn close(&mut self, handle: i32) -> Result<()> {
        let decoded = self.sessions.decode(handle)?;
        let mut session = self
            .sessions
            .remove(decoded)
            .ok_or(UsageError::BadHandle(handle))?;
        let full = session.full.close();
        let fielded = session.fielded.close();
        info!(handle, "Closed writer");
        full.and(fielded)
    }

    /// Close every open session, logging failures.
    pub fn close_all(&mut self) {
        for mut session in self.sessions.drain() {
            for result in [session.full.close(), session.fielded.close()] {
                if let Err(err) = result {
                    warn!(error = %err, "Failed to close writer");
                }
            }
        }
    }

    fn session(&mut self, handle: i32) -> Result<&mut WriteSession<L::Writer>> {
        let decoded = self.sessions.decode(handle)?;
        self.sessions
            .get_mut(decoded)
            .ok_or_else(|| UsageError::BadHandle(handle).into())
    }

    pub fn start_transaction(&mut self, handle: i32) -> Result<()> {
        let session = self.session(handle)?;
        session.document = None;
        session.full.begin_transaction()?;
        if let Err(err) = session.fielded.begin_transaction() {
            if let Err(cancel) = session.full.cancel_transaction() {
                warn!(error = %cancel, "Failed to cancel transaction");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Begin a new document, dropping any unfinished one.
    pub fn start_document(&mut self, handle: i32) -> Result<()> {
        let session = self.session(handle)?;
        if session.document.is_some() {
            debug!(handle, "Discarding unfinished document");
        }
        session.document = Some(DocumentBuilder::new());
        Ok(())
    }

    /// Post the `word:stem` tokens in `text` to the current document and
    /// return the position after the last one.
    ///
    /// Fielded postings go under every non-empty label, under `prefix1`, and
    /// under `prefix2` when given. On failure the document is discarded.
    #[allow(clippy::too_many_arguments)]
    pub fn post_terms(
        &mut self,
        handle: i32,
        text: &str,
        labels: &[&str],
        prefix1: &str,
        prefix2: Option<&str>,
        start_position: i64,
        weight: i64,
    ) -> Result<i64> {
        let start = self::start_position(start_position)?;
        let weight = non_negative("weight", weight)?;

        let session = self.session(handle)?;
        let WriteSession { full, document, .. } = session;
        let Some(builder) = document.as_mut() else {
            return Err(UsageError::NoDocument("post_terms").into());
        };

        let labels: BTreeSet<&str> =
            labels.iter().copied().filter(|l| !l.is_empty()).collect();
        let mut scopes: Vec<&str> = labels.into_iter().collect();
        scopes.push(prefix1);
        scopes.extend(prefix2);

        match builder.post_terms(text, &scopes, start, weight, |word| {
            full.add_spelling(word)
        }) {
            Ok(next) => Ok(i64::from(next)),
            Err(err) => {
                *document = None;
                Err(err)
            }
        }
    }

    /// Store the current document under `id` in both indexes. Id 0 stands
    /// for "no object": the document is dropped without writing anything.
    pub fn finish_document(&mut self, handle: i32, id: i64) -> Result<()> {
        let session = self.session(handle)?;
        let builder = session
            .document
            .take()
            .ok_or(UsageError::NoDocument("finish_document"))?;
        let id = doc_id(id)?;
        if id == 0 {
            debug!(handle, "Dropping document for the null object");
            return Ok(());
        }

        let batch = builder.finish();
        session.full.replace_document(id, batch.full())?;
        session.fielded.replace_document(id, batch.fielded())?;
        debug!(handle, id, "Stored document");
        Ok(())
    }

    pub fn delete_document(&mut self, handle: i32, id: i64) -> Result<()> {
        let id = doc_id(id)?;
        let session = self.session(handle)?;
        session.full.delete_document(id)?;
        session.fielded.delete_document(id)?;
        debug!(handle, id, "Deleted document");
        Ok(())
    }

    pub fn cancel_transaction(&mut self, handle: i32) -> Result<()> {
        let session = self.session(handle)?;
        session.document = None;
        let full = session.full.cancel_transaction();
        let fielded = session.fielded.cancel_transaction();
        full.and(fielded)
    }

    /// Commit the full index, then the fielded one. If the full index fails
    /// to commit, the fielded transaction is cancelled too.
    pub fn commit_transaction(&mut self, handle: i32) -> Result<()> {
        let session = self.session(handle)?;
        session.document = None;
        if let Err(err) = session.full.commit_transaction() {
            if let Err(cancel) = session.fielded.cancel_transaction() {
                warn!(error = %cancel, "Failed to cancel transaction");
            }
            return Err(err);
        }
        session.fielded.commit_transaction()?;
        debug!(handle, "Committed transaction");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn non_negative(name: &'static str, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(UsageError::Negative { name, value }.into());
    }
    u32::try_from(value).map_err(|_| {
        UsageError::BadCall(format!("{name} {value} is too large")).into()
    })
}

fn start_position(value: i64) -> Result<u32> {
    let start = non_negative("start_position", value)?;
    if start > i32::MAX as u32 {
        return Err(UsageError::BadCall(format!(
            "start_position {value} is too large"
        ))
        .into());
    }
    Ok(start)
}

fn doc_id(id: i64) -> Result<DocId> {
    non_negative("id", id)
}
