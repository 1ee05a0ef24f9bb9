use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("spelling dictionary error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("query parse error: {0}")]
    QueryParse(String),

    #[error("index view is stale: {0}")]
    StaleView(String),

    #[error("transaction error: {0}")]
    Transaction(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Caller mistakes: bad arguments, bad handles, calls out of sequence.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("slot {slot} exceeds the maximum slot number {max}")]
    SlotOutOfRange { slot: i64, max: usize },

    #[error("nothing open in slot {0}")]
    UnboundSlot(i64),

    #[error("pathname is not absolute: {}", .0.display())]
    RelativePath(PathBuf),

    #[error("bad writer handle {0}")]
    BadHandle(i32),

    #[error("no document started before {0}")]
    NoDocument(&'static str),

    #[error("{name} must not be negative (got {value})")]
    Negative { name: &'static str, value: i64 },

    #[error("too many open writers")]
    HandlesExhausted,

    #[error("bad call: {0}")]
    BadCall(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Usage,
    Library,
}

impl ErrorCategory {
    pub fn prefix(self) -> &'static str {
        match self {
            ErrorCategory::Usage => "usage error",
            ErrorCategory::Library => "index error",
        }
    }
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Usage(_) => ErrorCategory::Usage,
            _ => ErrorCategory::Library,
        }
    }

    pub fn is_stale_view(&self) -> bool {
        matches!(self, Error::StaleView(_))
    }

    /// The single failure message handed back across the call boundary.
    pub fn report(&self) -> String {
        format!("{}: {self}", self.category().prefix())
    }
}
