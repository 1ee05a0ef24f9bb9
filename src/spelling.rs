//! Word frequency dictionary behind spelling suggestions.
//!
//! Every registration bumps a word's frequency, so re-indexing the same text
//! inflates counts, and deleting documents never removes words. Suggestions
//! for existing content depend on both behaviours.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const SPELLING_FILE: &str = "spelling.json";

/// Furthest edit distance a suggestion may be from the input word.
pub const MAX_EDIT_DISTANCE: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellingDictionary {
    words: BTreeMap<String, u64>,
}

impl SpellingDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the dictionary inside an index directory.
    pub fn path_in(index_dir: &Path) -> PathBuf {
        index_dir.join(SPELLING_FILE)
    }

    /// Load the dictionary stored in `index_dir`; empty if there is none yet.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let path = Self::path_in(index_dir);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the dictionary into `index_dir`, replacing the old file in one
    /// rename.
    pub fn save(&self, index_dir: &Path) -> Result<()> {
        let path = Self::path_in(index_dir);
        let tmp = index_dir.join(format!("{SPELLING_FILE}.tmp"));
        {
            let mut file = std::fs::File::create(&tmp)?;
            serde_json::to_writer(&mut file, self)?;
            file.flush()?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn add(&mut self, word: &str, count: u64) {
        if word.is_empty() {
            return;
        }
        *self.words.entry(word.to_string()).or_insert(0) += count;
    }

    /// Fold every count in `other` into this dictionary.
    pub fn merge(&mut self, other: &SpellingDictionary) {
        for (word, count) in &other.words {
            self.add(word, *count);
        }
    }

    pub fn frequency(&self, word: &str) -> u64 {
        self.words.get(word).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Best replacement for `word`, or an empty string when the word is
    /// already known or nothing is close enough.
    ///
    /// Candidates are ranked by edit distance, then by frequency, then
    /// alphabetically.
    pub fn suggest(&self, word: &str) -> String {
        if word.is_empty() || self.words.contains_key(word) {
            return String::new();
        }

        let target: Vec<char> = word.chars().collect();
        let mut best: Option<(usize, u64, &str)> = None;
        for (candidate, freq) in &self.words {
            let chars: Vec<char> = candidate.chars().collect();
            if chars.len().abs_diff(target.len()) > MAX_EDIT_DISTANCE {
                continue;
            }
            let distance = edit_distance(&target, &chars);
            if distance > MAX_EDIT_DISTANCE {
                continue;
            }
            let better = match best {
                None => true,
                Some((d, f, _)) => distance < d || (distance == d && *freq > f),
            };
            if better {
                best = Some((distance, *freq, candidate.as_str()));
            }
        }

        best.map(|(_, _, w)| w.to_string()).unwrap_or_default()
    }
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            row[j + 1] = substitute.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}
