//! Textual form of host calls.
//!
//! A call is one line: the operation name followed by its arguments,
//! separated by whitespace.
//!
//! ```text
//! open 0 "/var/idx/full"
//! writer_post_terms 40001 "cats:cat sat:sit" "title,body" t NULL 0 1
//! simple_query 0 "cat AND NOT dog" ""
//! ```
//!
//! Arguments containing whitespace are double-quoted, with `\"` and `\\`
//! escapes inside the quotes. An unquoted `NULL` is an absent argument.

use std::fmt;

use crate::{
    error::{Result, UsageError},
    library::{DocId, SearchLibrary},
    session::Session,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ResetAll,
    Reset,
    Open {
        slot: i64,
        path: String,
    },
    SimpleQuery {
        slot: i64,
        query: String,
        prefixes: String,
    },
    DisableRelevancy,
    Relevancy {
        id: i64,
    },
    Spelling {
        slot: i64,
        word: String,
    },
    WriterOpen {
        path_full: String,
        path_fielded: String,
    },
    WriterClose {
        handle: i32,
    },
    WriterStartTransaction {
        handle: i32,
    },
    WriterStartDocument {
        handle: i32,
    },
    WriterPostTerms {
        handle: i32,
        terms: String,
        labels: String,
        prefix1: String,
        prefix2: Option<String>,
        start_position: i64,
        weight: i64,
    },
    WriterFinishDocument {
        handle: i32,
        id: i64,
    },
    WriterDeleteDocument {
        handle: i32,
        id: i64,
    },
    WriterCancelTransaction {
        handle: i32,
    },
    WriterCommitTransaction {
        handle: i32,
    },
    InitEmptyIndex {
        path: String,
    },
    RemoveIndex {
        path: String,
        remove_parent: bool,
    },
}

/// What a call hands back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Nothing,
    Ids(Vec<DocId>),
    Int(i64),
    Text(String),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Nothing => Ok(()),
            Output::Ids(ids) => {
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{id}")?;
                }
                Ok(())
            }
            Output::Int(value) => write!(f, "{value}"),
            Output::Text(text) => f.write_str(text),
        }
    }
}

impl Call {
    /// Parse one line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Call>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let words = split_words(line)?;
        let mut args = Args {
            words: words.into_iter(),
        };
        let name = args.string("operation")?;

        let call = match name.as_str() {
            "reset_all" => Call::ResetAll,
            "reset" => Call::Reset,
            "open" => Call::Open {
                slot: args.int("slot")?,
                path: args.string("path")?,
            },
            "simple_query" => Call::SimpleQuery {
                slot: args.int("slot")?,
                query: args.string("query")?,
                prefixes: args.string("prefixes")?,
            },
            "disable_relevancy" => Call::DisableRelevancy,
            "relevancy" => Call::Relevancy {
                id: args.int("id")?,
            },
            "spelling" => Call::Spelling {
                slot: args.int("slot")?,
                word: args.string("word")?,
            },
            "writer_open" => Call::WriterOpen {
                path_full: args.string("path_full")?,
                path_fielded: args.string("path_fielded")?,
            },
            "writer_close" => Call::WriterClose {
                handle: args.handle()?,
            },
            "writer_start_transaction" => Call::WriterStartTransaction {
                handle: args.handle()?,
            },
            "writer_start_document" => Call::WriterStartDocument {
                handle: args.handle()?,
            },
            "writer_post_terms" => Call::WriterPostTerms {
                handle: args.handle()?,
                terms: args.string("terms")?,
                labels: args.string("labels")?,
                prefix1: args.string("prefix1")?,
                prefix2: args.optional("prefix2")?,
                start_position: args.int("start_position")?,
                weight: args.int("weight")?,
            },
            "writer_finish_document" => Call::WriterFinishDocument {
                handle: args.handle()?,
                id: args.int("id")?,
            },
            "writer_delete_document" => Call::WriterDeleteDocument {
                handle: args.handle()?,
                id: args.int("id")?,
            },
            "writer_cancel_transaction" => Call::WriterCancelTransaction {
                handle: args.handle()?,
            },
            "writer_commit_transaction" => Call::WriterCommitTransaction {
                handle: args.handle()?,
            },
            "init_empty_index" => Call::InitEmptyIndex {
                path: args.string("path")?,
            },
            "remove_index" => Call::RemoveIndex {
                path: args.string("path")?,
                remove_parent: args.boolean("remove_parent")?,
            },
            other => return Err(bad(format!("unknown operation {other:?}"))),
        };
        args.finish()?;
        Ok(Some(call))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Call::ResetAll => "reset_all",
            Call::Reset => "reset",
            Call::Open { .. } => "open",
            Call::SimpleQuery { .. } => "simple_query",
            Call::DisableRelevancy => "disable_relevancy",
            Call::Relevancy { .. } => "relevancy",
            Call::Spelling { .. } => "spelling",
            Call::WriterOpen { .. } => "writer_open",
            Call::WriterClose { .. } => "writer_close",
            Call::WriterStartTransaction { .. } => "writer_start_transaction",
            Call::WriterStartDocument { .. } => "writer_start_document",
            Call::WriterPostTerms { .. } => "writer_post_terms",
            Call::WriterFinishDocument { .. } => "writer_finish_document",
            Call::WriterDeleteDocument { .. } => "writer_delete_document",
            Call::WriterCancelTransaction { .. } => "writer_cancel_transaction",
            Call::WriterCommitTransaction { .. } => "writer_commit_transaction",
            Call::InitEmptyIndex { .. } => "init_empty_index",
            Call::RemoveIndex { .. } => "remove_index",
        }
    }

    pub fn execute<L: SearchLibrary>(
        self,
        session: &mut Session<L>,
    ) -> Result<Output> {
        Ok(match self {
            Call::ResetAll => {
                session.reset_all();
                Output::Nothing
            }
            Call::Reset => {
                session.reset();
                Output::Nothing
            }
            Call::Open { slot, path } => {
                session.open(slot, &path)?;
                Output::Nothing
            }
            Call::SimpleQuery {
                slot,
                query,
                prefixes,
            } => Output::Ids(session.simple_query(slot, &query, &prefixes)?),
            Call::DisableRelevancy => {
                session.disable_relevancy();
                Output::Nothing
            }
            Call::Relevancy { id } => Output::Int(session.relevancy(id).into()),
            Call::Spelling { slot, word } => {
                Output::Text(session.spelling(slot, &word)?)
            }
            Call::WriterOpen {
                path_full,
                path_fielded,
            } => Output::Int(
                session.writer_open(&path_full, &path_fielded)?.into(),
            ),
            Call::WriterClose { handle } => {
                session.writer_close(handle)?;
                Output::Nothing
            }
            Call::WriterStartTransaction { handle } => {
                session.writer_start_transaction(handle)?;
                Output::Nothing
            }
            Call::WriterStartDocument { handle } => {
                session.writer_start_document(handle)?;
                Output::Nothing
            }
            Call::WriterPostTerms {
                handle,
                terms,
                labels,
                prefix1,
                prefix2,
                start_position,
                weight,
            } => Output::Int(session.writer_post_terms(
                handle,
                &terms,
                &labels,
                &prefix1,
                prefix2.as_deref(),
                start_position,
                weight,
            )?),
            Call::WriterFinishDocument { handle, id } => {
                session.writer_finish_document(handle, id)?;
                Output::Nothing
            }
            Call::WriterDeleteDocument { handle, id } => {
                session.writer_delete_document(handle, id)?;
                Output::Nothing
            }
            Call::WriterCancelTransaction { handle } => {
                session.writer_cancel_transaction(handle)?;
                Output::Nothing
            }
            Call::WriterCommitTransaction { handle } => {
                session.writer_commit_transaction(handle)?;
                Output::Nothing
            }
            Call::InitEmptyIndex { path } => {
                session.init_empty_index(&path)?;
                Output::Nothing
            }
            Call::RemoveIndex {
                path,
                remove_parent,
            } => {
                session.remove_index(&path, remove_parent)?;
                Output::Nothing
            }
        })
    }
}

fn bad(message: String) -> crate::Error {
    UsageError::BadCall(message).into()
}

/// Split a line into arguments; `None` stands for `NULL`.
fn split_words(line: &str) -> Result<Vec<Option<String>>> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut word = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped @ ('"' | '\\')) => word.push(escaped),
                        Some(other) => {
                            word.push('\\');
                            word.push(other);
                        }
                        None => return Err(bad("unterminated quote".into())),
                    },
                    Some(other) => word.push(other),
                    None => return Err(bad("unterminated quote".into())),
                }
            }
            words.push(Some(word));
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            word.push(c);
            chars.next();
        }
        words.push((word != "NULL").then_some(word));
    }

    Ok(words)
}

struct Args {
    words: std::vec::IntoIter<Option<String>>,
}

impl Args {
    fn optional(&mut self, name: &str) -> Result<Option<String>> {
        self.words
            .next()
            .ok_or_else(|| bad(format!("missing argument {name}")))
    }

    fn string(&mut self, name: &str) -> Result<String> {
        self.optional(name)?
            .ok_or_else(|| bad(format!("{name} must not be NULL")))
    }

    fn int(&mut self, name: &str) -> Result<i64> {
        let raw = self.string(name)?;
        raw.parse()
            .map_err(|_| bad(format!("{name} is not an integer: {raw:?}")))
    }

    fn handle(&mut self) -> Result<i32> {
        let raw = self.string("handle")?;
        raw.parse()
            .map_err(|_| bad(format!("handle is not an integer: {raw:?}")))
    }

    fn boolean(&mut self, name: &str) -> Result<bool> {
        match self.string(name)?.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            raw => Err(bad(format!("{name} is not a boolean: {raw:?}"))),
        }
    }

    fn finish(mut self) -> Result<()> {
        match self.words.next() {
            None => Ok(()),
            Some(_) => Err(bad("too many arguments".into())),
        }
    }
}
