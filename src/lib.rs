//! slotdex - slot-addressed access to full-text indexes.
//!
//! Readers bind on-disk [Tantivy](https://github.com/quickwit-oss/tantivy)
//! indexes to numbered slots and query them by slot; writers post
//! `word:stem` term strings into a pair of indexes, one unfielded and one
//! scoped by field, inside transactions addressed by integer handles.
//!
//! # Quick start
//!
//! ```no_run
//! use slotdex::{Config, Session};
//!
//! let mut session = Session::new(&Config::default());
//! session.init_empty_index("/tmp/slotdex/full").unwrap();
//! session.init_empty_index("/tmp/slotdex/fielded").unwrap();
//!
//! let h = session
//!     .writer_open("/tmp/slotdex/full", "/tmp/slotdex/fielded")
//!     .unwrap();
//! session.writer_start_transaction(h).unwrap();
//! session.writer_start_document(h).unwrap();
//! session
//!     .writer_post_terms(h, "Cats:cat sat:sit", "title", "t", None, 0, 1)
//!     .unwrap();
//! session.writer_finish_document(h, 42).unwrap();
//! session.writer_commit_transaction(h).unwrap();
//!
//! session.open(0, "/tmp/slotdex/fielded").unwrap();
//! for id in session.simple_query(0, "cat", "t").unwrap() {
//!     println!("{id} (relevancy {})", session.relevancy(id.into()));
//! }
//! ```

pub mod call;
pub mod config;
pub mod controller;
pub mod error;
pub mod handles;
pub mod index_dir;
pub mod library;
pub mod postings;
pub mod query;
pub mod session;
pub mod spelling;
pub mod tantivy_index;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use call::{Call, Output};
pub use config::Config;
pub use error::{Error, ErrorCategory, Result, UsageError};
pub use session::Session;
pub use tantivy_index::TantivyLibrary;
