//! Turns marked-up term strings into postings.
//!
//! Posted text is a sequence of `word:stem` tokens separated by whitespace
//! (any byte up to and including ASCII space). Each valid token lands at its
//! own position in the full index, once as the unstemmed word (behind
//! [`UNSTEMMED_MARKER`]) and once as the stem, and again in the fielded index
//! under every requested field scope.

use std::borrow::Cow;

use crate::error::{Result, UsageError};

/// Longest term stored, in bytes. Longer words and stems are cut at this
/// byte offset, even when that splits a multi-byte character.
pub const MAX_TERM_BYTES: usize = 176;

/// Highest position a posting may take. Positions are signed 32-bit on the
/// calling side, and the position after the last posting must fit too.
pub const MAX_POSITION: u32 = i32::MAX as u32 - 1;

/// Marks word postings so they never collide with stem postings.
pub const UNSTEMMED_MARKER: &str = "_";

/// One occurrence of a term within a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub term: Vec<u8>,
    pub position: u32,
    pub weight: u32,
}

/// A `word:stem` token taken from posted text, already truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub word: &'a [u8],
    pub stem: &'a [u8],
}

/// Split posted text into valid tokens. Tokens without exactly one `:` are
/// skipped.
pub fn tokens(text: &str) -> impl Iterator<Item = Token<'_>> {
    text.as_bytes()
        .split(|b| *b <= b' ')
        .filter_map(|raw| {
            let sep = raw.iter().position(|b| *b == b':')?;
            let (word, rest) = (&raw[..sep], &raw[sep + 1..]);
            if rest.contains(&b':') {
                return None;
            }
            Some(Token {
                word: truncate(word),
                stem: truncate(rest),
            })
        })
}

fn truncate(term: &[u8]) -> &[u8] {
    &term[..term.len().min(MAX_TERM_BYTES)]
}

/// The postings accumulated for one document before it is finished.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    full: Vec<Posting>,
    fielded: Vec<Posting>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one token at `position` to both halves of the document.
    ///
    /// Empty words or stems are not emitted.
    pub fn add_token(
        &mut self,
        token: Token<'_>,
        position: u32,
        weight: u32,
        scopes: &[&str],
    ) {
        if !token.word.is_empty() {
            self.full.push(Posting {
                term: tagged(UNSTEMMED_MARKER.as_bytes(), token.word),
                position,
                weight,
            });
        }
        if !token.stem.is_empty() {
            self.full.push(Posting {
                term: token.stem.to_vec(),
                position,
                weight,
            });
        }
        for scope in scopes {
            if !token.word.is_empty() {
                let mut prefix = scope.as_bytes().to_vec();
                prefix.extend_from_slice(UNSTEMMED_MARKER.as_bytes());
                self.fielded.push(Posting {
                    term: tagged(&prefix, token.word),
                    position,
                    weight,
                });
            }
            if !token.stem.is_empty() {
                self.fielded.push(Posting {
                    term: tagged(scope.as_bytes(), token.stem),
                    position,
                    weight,
                });
            }
        }
    }

    /// Post every valid token in `text`, starting at `start`.
    ///
    /// `register_word` is called with each token's word (when not empty) so
    /// it can be recorded for spelling suggestions. Returns the position after
    /// the last token posted. Fails if a token would land past
    /// [`MAX_POSITION`].
    pub fn post_terms(
        &mut self,
        text: &str,
        scopes: &[&str],
        start: u32,
        weight: u32,
        mut register_word: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<u32> {
        let mut position = start;
        for token in tokens(text) {
            if position > MAX_POSITION {
                return Err(UsageError::BadCall(format!(
                    "term position {position} is too large"
                ))
                .into());
            }
            self.add_token(token, position, weight, scopes);
            if !token.word.is_empty() {
                register_word(token.word)?;
            }
            position += 1;
        }
        Ok(position)
    }

    pub fn finish(self) -> PostingBatch {
        PostingBatch {
            full: self.full,
            fielded: self.fielded,
        }
    }
}

fn tagged(prefix: &[u8], term: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + term.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(term);
    out
}

/// A finished document: the unfielded and fielded posting sets, applied
/// together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingBatch {
    full: Vec<Posting>,
    fielded: Vec<Posting>,
}

impl PostingBatch {
    pub fn full(&self) -> &[Posting] {
        &self.full
    }

    pub fn fielded(&self) -> &[Posting] {
        &self.fielded
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.fielded.is_empty()
    }
}

/// Lossless text form of a raw term.
///
/// Valid UTF-8 is kept as is. Bytes that are not part of a valid sequence
/// (a character split by truncation) become `U+10FF00 + byte`.
pub fn term_text(term: &[u8]) -> Cow<'_, str> {
    if let Ok(text) = std::str::from_utf8(term) {
        return Cow::Borrowed(text);
    }

    let mut text = String::with_capacity(term.len() + 4);
    let mut rest = term;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let bad = err.error_len().unwrap_or(after.len());
                text.extend(after[..bad].iter().map(|b| escaped_byte(*b)));
                rest = &after[bad..];
            }
        }
    }
    Cow::Owned(text)
}

fn escaped_byte(byte: u8) -> char {
    char::from_u32(0x10_FF00 + u32::from(byte))
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}
