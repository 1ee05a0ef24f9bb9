use std::path::{Path, PathBuf};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    TantivyDocument,
    TantivyError,
    Term,
    collector::TopDocs,
    query::{
        BooleanQuery,
        EmptyQuery,
        Occur,
        PhraseQuery,
        Query as TantivyQuery,
        RegexQuery,
        TermQuery,
    },
    schema::{
        FAST,
        Field,
        INDEXED,
        IndexRecordOption,
        STORED,
        Schema,
        TextFieldIndexing,
        TextOptions,
        Value,
    },
    tokenizer::{PreTokenizedString, Token},
};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    library::{DocId, Hit, ReadIndex, SearchLibrary, WriteIndex},
    postings::{Posting, term_text},
    query::Query,
    spelling::SpellingDictionary,
};

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const TERMS: &str = "terms";
}

/// Tantivy refuses writer budgets below this.
const MIN_WRITER_MEMORY: usize = 15_000_000;

/// A posting's weight is stored as repeated occurrences, up to this many.
const MAX_WEIGHT_REPEAT: u32 = 64;

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub id: Field,
    pub terms: Field,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_u64_field(fields::ID, INDEXED | STORED | FAST);

    // Terms arrive pre-tokenized with explicit positions; the tokenizer
    // named here is never run.
    let terms_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("raw")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    builder.add_text_field(fields::TERMS, terms_opts);

    builder.build()
}

fn resolve_fields(schema: &Schema) -> Result<SchemaFields> {
    Ok(SchemaFields {
        id: schema.get_field(fields::ID)?,
        terms: schema.get_field(fields::TERMS)?,
    })
}

/// Tantivy failures caused by files vanishing under a reader mean the view
/// is stale rather than broken.
fn classify(err: TantivyError) -> Error {
    match &err {
        TantivyError::OpenReadError(_) => Error::StaleView(err.to_string()),
        TantivyError::IoError(io)
            if io.kind() == std::io::ErrorKind::NotFound =>
        {
            Error::StaleView(err.to_string())
        }
        _ => Error::Tantivy(err),
    }
}

/// Opens on-disk Tantivy indexes, one per directory.
#[derive(Debug, Clone)]
pub struct TantivyLibrary {
    writer_memory_bytes: usize,
}

impl TantivyLibrary {
    pub fn new(writer_memory_bytes: usize) -> Self {
        Self {
            writer_memory_bytes: writer_memory_bytes.max(MIN_WRITER_MEMORY),
        }
    }
}

impl Default for TantivyLibrary {
    fn default() -> Self {
        Self::new(MIN_WRITER_MEMORY)
    }
}

impl SearchLibrary for TantivyLibrary {
    type Reader = TantivyReader;
    type Writer = TantivyWriter;

    fn open_reader(&self, path: &Path) -> Result<TantivyReader> {
        let index = Index::open_in_dir(path)?;
        let fields = resolve_fields(&index.schema())?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let spelling = SpellingDictionary::load(path)?;

        info!(path = %path.display(), "Opened index for reading");

        Ok(TantivyReader {
            path: path.to_path_buf(),
            reader,
            fields,
            spelling,
        })
    }

    fn open_writer(&self, path: &Path) -> Result<TantivyWriter> {
        let index = Index::open_in_dir(path)?;
        let fields = resolve_fields(&index.schema())?;
        let writer: IndexWriter =
            index.writer_with_num_threads(1, self.writer_memory_bytes)?;

        info!(path = %path.display(), "Opened index for writing");

        Ok(TantivyWriter {
            path: path.to_path_buf(),
            writer,
            fields,
            pending_spelling: SpellingDictionary::new(),
            in_transaction: false,
            broken: false,
        })
    }

    fn create_index(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Index::create_in_dir(path, build_schema())?;
        info!(path = %path.display(), "Created empty index");
        Ok(())
    }
}

/// Read view of one index, refreshed only on request.
pub struct TantivyReader {
    path: PathBuf,
    reader: IndexReader,
    fields: SchemaFields,
    spelling: SpellingDictionary,
}

impl TantivyReader {
    fn term(&self, text: &str) -> Term {
        Term::from_field_text(self.fields.terms, text)
    }

    fn compile(&self, query: &Query) -> Result<Box<dyn TantivyQuery>> {
        Ok(match query {
            Query::Term(text) => Box::new(TermQuery::new(
                self.term(text),
                IndexRecordOption::WithFreqs,
            )),
            Query::Wildcard(prefix) => Box::new(RegexQuery::from_pattern(
                &format!("{}.*", escape_regex(prefix)),
                self.fields.terms,
            )?),
            Query::Phrase { terms, slop } => match terms.as_slice() {
                [] => Box::new(EmptyQuery),
                [single] => Box::new(TermQuery::new(
                    self.term(single),
                    IndexRecordOption::WithFreqs,
                )),
                _ => {
                    let mut phrase = PhraseQuery::new(
                        terms.iter().map(|t| self.term(t)).collect(),
                    );
                    phrase.set_slop(*slop);
                    Box::new(phrase)
                }
            },
            Query::And(parts) => self.boolean(Occur::Must, parts)?,
            Query::Or(parts) => self.boolean(Occur::Should, parts)?,
            Query::AndNot(positive, negative) => {
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, self.compile(positive)?),
                    (Occur::MustNot, self.compile(negative)?),
                ]))
            }
            Query::Nothing => Box::new(EmptyQuery),
        })
    }

    fn boolean(
        &self,
        occur: Occur,
        parts: &[Query],
    ) -> Result<Box<dyn TantivyQuery>> {
        let clauses = parts
            .iter()
            .map(|part| Ok((occur, self.compile(part)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(BooleanQuery::new(clauses)))
    }
}

impl ReadIndex for TantivyReader {
    fn doc_count(&self) -> Result<u64> {
        Ok(self.reader.searcher().num_docs())
    }

    fn reopen(&mut self) -> Result<()> {
        self.reader.reload()?;
        self.spelling = SpellingDictionary::load(&self.path)?;
        debug!(path = %self.path.display(), "Reloaded index view");
        Ok(())
    }

    fn search(&self, query: &Query, limit: usize) -> Result<Vec<Hit>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let compiled = self.compile(query)?;
        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&*compiled, &TopDocs::with_limit(limit))
            .map_err(classify)?;

        let best = top_docs.first().map(|(score, _)| *score).unwrap_or(0.0);
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument =
                searcher.doc(doc_address).map_err(classify)?;
            let Some(id) = doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_u64())
                .and_then(|id| DocId::try_from(id).ok())
            else {
                continue;
            };
            hits.push(Hit {
                id,
                percent: percent(score, best),
            });
        }

        Ok(hits)
    }

    fn spelling_suggestion(&self, word: &str) -> Result<String> {
        Ok(self.spelling.suggest(word))
    }
}

fn percent(score: f32, best: f32) -> i32 {
    if best <= 0.0 {
        return 100;
    }
    ((score / best) * 100.0).round().clamp(1.0, 100.0) as i32
}

fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Writable side of one index. Holds the directory lock while open.
pub struct TantivyWriter {
    path: PathBuf,
    writer: IndexWriter,
    fields: SchemaFields,
    pending_spelling: SpellingDictionary,
    in_transaction: bool,
    /// Set when a failed write could not be rolled back.
    broken: bool,
}

impl TantivyWriter {
    fn build_document(&self, id: DocId, postings: &[Posting]) -> TantivyDocument {
        // Positions for a term must not go backwards, so postings are laid
        // out in position order.
        let mut ordered: Vec<&Posting> = postings.iter().collect();
        ordered.sort_by_key(|p| p.position);

        let mut tokens = Vec::with_capacity(ordered.len());
        for posting in ordered {
            let text = term_text(&posting.term);
            for _ in 0..posting.weight.clamp(1, MAX_WEIGHT_REPEAT) {
                tokens.push(Token {
                    offset_from: 0,
                    offset_to: 0,
                    position: posting.position as usize,
                    text: text.to_string(),
                    position_length: 1,
                });
            }
        }

        let mut doc = TantivyDocument::default();
        doc.add_u64(self.fields.id, u64::from(id));
        if !tokens.is_empty() {
            doc.add_pre_tokenized_text(
                self.fields.terms,
                PreTokenizedString {
                    text: String::new(),
                    tokens,
                },
            );
        }
        doc
    }

    fn usable(&self) -> Result<()> {
        if self.broken {
            return Err(Error::Transaction("writer must be reopened"));
        }
        Ok(())
    }

    /// Drop everything since the last commit after a failed write, so the
    /// writer keeps working from that commit. An open transaction is lost
    /// with it.
    fn roll_back_failure(&mut self, err: TantivyError) -> Error {
        self.in_transaction = false;
        self.pending_spelling.clear();
        if let Err(rollback) = self.writer.rollback() {
            warn!(
                path = %self.path.display(),
                error = %rollback,
                "Rollback after failed write failed"
            );
            self.broken = true;
        }
        err.into()
    }

    fn commit(&mut self) -> Result<()> {
        if let Err(err) = self.writer.commit() {
            return Err(self.roll_back_failure(err));
        }
        if !self.pending_spelling.is_empty() {
            let mut dictionary = SpellingDictionary::load(&self.path)?;
            dictionary.merge(&self.pending_spelling);
            dictionary.save(&self.path)?;
            self.pending_spelling.clear();
        }
        debug!(path = %self.path.display(), "Committed index changes");
        Ok(())
    }

    fn auto_commit(&mut self) -> Result<()> {
        if self.in_transaction {
            Ok(())
        } else {
            self.commit()
        }
    }
}

impl WriteIndex for TantivyWriter {
    fn begin_transaction(&mut self) -> Result<()> {
        self.usable()?;
        if self.in_transaction {
            return Err(Error::Transaction("transaction already in progress"));
        }
        if !self.pending_spelling.is_empty() {
            self.commit()?;
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::Transaction("no transaction in progress"));
        }
        self.in_transaction = false;
        self.usable()?;
        self.commit()
    }

    fn cancel_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::Transaction("no transaction in progress"));
        }
        self.in_transaction = false;
        self.pending_spelling.clear();
        self.writer.rollback()?;
        Ok(())
    }

    fn replace_document(
        &mut self,
        id: DocId,
        postings: &[Posting],
    ) -> Result<()> {
        self.usable()?;
        let doc = self.build_document(id, postings);
        self.writer
            .delete_term(Term::from_field_u64(self.fields.id, u64::from(id)));
        if let Err(err) = self.writer.add_document(doc) {
            return Err(self.roll_back_failure(err));
        }
        self.auto_commit()
    }

    fn delete_document(&mut self, id: DocId) -> Result<()> {
        self.usable()?;
        self.writer
            .delete_term(Term::from_field_u64(self.fields.id, u64::from(id)));
        self.auto_commit()
    }

    fn add_spelling(&mut self, word: &[u8]) -> Result<()> {
        self.pending_spelling.add(&term_text(word), 1);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.in_transaction {
            self.cancel_transaction()
        } else if !self.pending_spelling.is_empty() {
            self.commit()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(term: &str, position: u32) -> Posting {
        Posting {
            term: term.as_bytes().to_vec(),
            position,
            weight: 1,
        }
    }

    fn ids(reader: &TantivyReader, query: &Query) -> Vec<DocId> {
        let mut ids: Vec<DocId> = reader
            .search(query, reader.doc_count().unwrap() as usize)
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        ids.sort();
        ids
    }

    fn term(text: &str) -> Query {
        Query::Term(text.to_string())
    }

    fn fresh_index() -> (tempfile::TempDir, PathBuf, TantivyLibrary) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");
        let library = TantivyLibrary::default();
        library.create_index(&path).unwrap();
        (tmp, path, library)
    }

    #[test]
    fn replace_and_search() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        writer
            .replace_document(1, &[posting("big", 1), posting("cat", 2)])
            .unwrap();
        writer
            .replace_document(2, &[posting("cat", 1), posting("big", 2)])
            .unwrap();

        let reader = library.open_reader(&path).unwrap();
        assert_eq!(reader.doc_count().unwrap(), 2);
        assert_eq!(ids(&reader, &term("cat")), vec![1, 2]);

        let phrase = Query::Phrase {
            terms: vec!["big".into(), "cat".into()],
            slop: 0,
        };
        assert_eq!(ids(&reader, &phrase), vec![1]);
    }

    #[test]
    fn replacing_keeps_one_copy() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        writer.replace_document(7, &[posting("old", 1)]).unwrap();
        writer.replace_document(7, &[posting("new", 1)]).unwrap();

        let reader = library.open_reader(&path).unwrap();
        assert_eq!(reader.doc_count().unwrap(), 1);
        assert!(ids(&reader, &term("old")).is_empty());
        assert_eq!(ids(&reader, &term("new")), vec![7]);
    }

    #[test]
    fn postings_out_of_position_order_are_accepted() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        writer
            .replace_document(
                3,
                &[posting("b", 5), posting("a", 9), posting("b", 1)],
            )
            .unwrap();

        let reader = library.open_reader(&path).unwrap();
        assert_eq!(ids(&reader, &term("b")), vec![3]);
    }

    #[test]
    fn wildcard_and_boolean() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        writer.replace_document(1, &[posting("p:_running", 1)]).unwrap();
        writer.replace_document(2, &[posting("p:_runner", 1)]).unwrap();
        writer.replace_document(3, &[posting("q:_running", 1)]).unwrap();

        let reader = library.open_reader(&path).unwrap();
        assert_eq!(ids(&reader, &Query::Wildcard("p:_run".into())), vec![1, 2]);
        let or = Query::Or(vec![term("p:_running"), term("q:_running")]);
        assert_eq!(ids(&reader, &or), vec![1, 3]);
        let not = Query::AndNot(
            Box::new(Query::Wildcard("p:_run".into())),
            Box::new(term("p:_runner")),
        );
        assert_eq!(ids(&reader, &not), vec![1]);
        assert!(ids(&reader, &Query::Nothing).is_empty());
    }

    #[test]
    fn readers_see_commits_only_after_reopen() {
        let (_tmp, path, library) = fresh_index();
        let mut reader = library.open_reader(&path).unwrap();
        let mut writer = library.open_writer(&path).unwrap();
        writer.replace_document(1, &[posting("late", 1)]).unwrap();

        assert!(ids(&reader, &term("late")).is_empty());
        reader.reopen().unwrap();
        assert_eq!(ids(&reader, &term("late")), vec![1]);
    }

    #[test]
    fn cancelled_transaction_leaves_index_unchanged() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        writer.replace_document(1, &[posting("kept", 1)]).unwrap();

        writer.begin_transaction().unwrap();
        writer.replace_document(2, &[posting("dropped", 1)]).unwrap();
        writer.delete_document(1).unwrap();
        writer.add_spelling(b"dropped").unwrap();
        writer.cancel_transaction().unwrap();

        let reader = library.open_reader(&path).unwrap();
        assert_eq!(ids(&reader, &term("kept")), vec![1]);
        assert!(ids(&reader, &term("dropped")).is_empty());
        assert_eq!(reader.spelling_suggestion("droped").unwrap(), "");
    }

    #[test]
    fn transaction_misuse_is_reported() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        assert!(matches!(
            writer.commit_transaction(),
            Err(Error::Transaction(_))
        ));
        writer.begin_transaction().unwrap();
        assert!(matches!(
            writer.begin_transaction(),
            Err(Error::Transaction(_))
        ));
    }

    #[test]
    fn spelling_is_saved_on_commit() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        writer.begin_transaction().unwrap();
        writer.add_spelling(b"elephant").unwrap();
        writer.replace_document(1, &[posting("elephant", 1)]).unwrap();
        writer.commit_transaction().unwrap();

        let reader = library.open_reader(&path).unwrap();
        assert_eq!(reader.spelling_suggestion("elefant").unwrap(), "elephant");
    }

    // Positions this close to u32::MAX overflow inside tantivy's indexing
    // thread, which only panics with overflow checks on.
    #[cfg(debug_assertions)]
    #[test]
    fn writer_recovers_from_a_failed_commit() {
        let (_tmp, path, library) = fresh_index();
        let mut writer = library.open_writer(&path).unwrap();
        let overflowing = [posting("a", u32::MAX - 1), posting("b", u32::MAX)];
        assert!(writer.replace_document(1, &overflowing).is_err());

        writer.replace_document(2, &[posting("ok", 0)]).unwrap();
        let reader = library.open_reader(&path).unwrap();
        assert_eq!(ids(&reader, &term("ok")), vec![2]);
        assert!(ids(&reader, &term("a")).is_empty());

        writer.begin_transaction().unwrap();
        writer.add_spelling(b"overflow").unwrap();
        // Inside a transaction the failure may only surface at commit.
        writer.replace_document(3, &overflowing).ok();
        writer.commit_transaction().unwrap_err();
        writer.begin_transaction().unwrap();
        writer.replace_document(4, &[posting("later", 0)]).unwrap();
        writer.commit_transaction().unwrap();

        let reader = library.open_reader(&path).unwrap();
        assert_eq!(ids(&reader, &term("later")), vec![4]);
        assert_eq!(reader.spelling_suggestion("overflw").unwrap(), "");
    }

    #[test]
    fn second_writer_is_locked_out() {
        let (_tmp, path, library) = fresh_index();
        let _writer = library.open_writer(&path).unwrap();
        assert!(library.open_writer(&path).is_err());
    }

    #[test]
    fn creating_twice_fails() {
        let (_tmp, path, library) = fresh_index();
        assert!(library.create_index(&path).is_err());
    }

    #[test]
    fn empty_index_returns_no_hits() {
        let (_tmp, path, library) = fresh_index();
        let reader = library.open_reader(&path).unwrap();
        assert_eq!(reader.doc_count().unwrap(), 0);
        assert!(reader.search(&term("anything"), 0).unwrap().is_empty());
    }

    #[test]
    fn percent_is_relative_to_best() {
        assert_eq!(percent(2.0, 2.0), 100);
        assert_eq!(percent(1.0, 2.0), 50);
        assert_eq!(percent(0.0, 2.0), 1);
        assert_eq!(percent(0.0, 0.0), 100);
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("#l#1a:_x"), "\\#l\\#1a:_x");
        assert_eq!(escape_regex("a.b"), "a\\.b");
    }
}
