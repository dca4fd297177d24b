//! Domain dictionary for enhancement and quality scoring.
//!
//! A base English word list ships embedded; game-specific jargon from the
//! catalog is layered on as protected terms so spell correction never
//! rewrites it. Extra corpus words can be loaded from a file at runtime.

use std::collections::HashSet;
use std::path::Path;

/// Word lookup plus bounded-edit-distance correction.
pub struct Dictionary {
    words: HashSet<String>,
    protected: HashSet<String>,
}

static BASE_WORDS: &str = include_str!("base_words.txt");

impl Dictionary {
    /// Dictionary with the embedded base word list.
    pub fn builtin() -> Self {
        let words = BASE_WORDS
            .lines()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self { words, protected: HashSet::new() }
    }

    /// Empty dictionary (corrections become no-ops).
    pub fn empty() -> Self {
        Self { words: HashSet::new(), protected: HashSet::new() }
    }

    /// Add words from an iterator (lowercased).
    pub fn add_words<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for w in words {
            self.words.insert(w.as_ref().to_lowercase());
        }
    }

    /// Add protected terms — counted as known words and never corrected.
    pub fn add_protected<I, S>(&mut self, terms: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for t in terms {
            let lower = t.as_ref().to_lowercase();
            self.words.insert(lower.clone());
            self.protected.insert(lower);
        }
    }

    /// Load additional one-word-per-line corpus words from a file.
    pub fn load_corpus(&mut self, path: &Path) -> std::io::Result<usize> {
        let contents = std::fs::read_to_string(path)?;
        let before = self.words.len();
        self.add_words(contents.lines().map(str::trim).filter(|w| !w.is_empty()));
        Ok(self.words.len() - before)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Case-insensitive membership.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    pub fn is_protected(&self, word: &str) -> bool {
        self.protected.contains(&word.to_lowercase())
    }

    /// Propose a correction within `max_distance` edits.
    ///
    /// Candidates share the word's first letter and a length within the
    /// edit budget. Ties resolve to the smallest distance, then
    /// alphabetically, so correction is deterministic.
    pub fn correct(&self, word: &str, max_distance: usize) -> Option<String> {
        let lower = word.to_lowercase();
        if lower.len() < 3 || self.words.contains(&lower) || self.protected.contains(&lower) {
            return None;
        }
        let first = lower.chars().next()?;

        let mut best: Option<(usize, &String)> = None;
        for candidate in &self.words {
            if !candidate.starts_with(first) {
                continue;
            }
            if candidate.len().abs_diff(lower.len()) > max_distance {
                continue;
            }
            let distance = strsim::levenshtein(&lower, candidate);
            if distance == 0 || distance > max_distance {
                continue;
            }
            best = match best {
                Some((d, w)) if (distance, candidate.as_str()) < (d, w.as_str()) => {
                    Some((distance, candidate))
                }
                None => Some((distance, candidate)),
                keep => keep,
            };
        }
        best.map(|(_, w)| w.clone())
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::builtin()
    }
}
