//! Ordered symbol dictionary for CTC decoding

use crate::error::{OcrError, Result};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Token reserved for the CTC blank at index 0
pub const BLANK_TOKEN: &str = "blank";

/// Ordered symbols; index 0 is always the CTC blank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDictionary {
    symbols: Vec<String>,
}

impl SymbolDictionary {
    /// Build from one symbol per line.
    ///
    /// The blank token is inserted at index 0. Line terminators are stripped but
    /// whitespace symbols are kept verbatim; empty lines are skipped. With
    /// `append_space`, a `" "` symbol is pushed at the end unless one is already present.
    ///
    /// # Errors
    ///
    /// Returns [`OcrError::DictionaryError`] if no symbols remain.
    pub fn from_lines<I, S>(lines: I, append_space: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols = vec![BLANK_TOKEN.to_string()];
        for line in lines {
            let symbol = line.as_ref().trim_end_matches(['\r', '\n']);
            if !symbol.is_empty() {
                symbols.push(symbol.to_string());
            }
        }
        if symbols.len() == 1 {
            return Err(OcrError::DictionaryError(
                "dictionary contains no symbols".to_string(),
            ));
        }
        if append_space && !symbols[1..].iter().any(|s| s == " ") {
            symbols.push(" ".to_string());
        }
        Ok(Self { symbols })
    }

    /// Load a dictionary file with one symbol per line
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds no symbols.
    pub fn from_file(path: &Path, append_space: bool) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            OcrError::DictionaryError(format!("failed to open {}: {e}", path.display()))
        })?;
        let lines = BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<String>>>()?;
        let dict = Self::from_lines(lines, append_space)?;
        log::debug!(
            "Loaded symbol dictionary {} ({} symbols)",
            path.display(),
            dict.len()
        );
        Ok(dict)
    }

    /// Symbol at `index`, `None` for the blank or out-of-range indices
    #[inline]
    #[must_use = "symbol lookup result is returned but not used"]
    pub fn symbol(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.symbols.get(index).map(String::as_str)
    }

    /// Number of entries including the blank
    #[inline]
    #[must_use = "vocabulary size is computed but not used"]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false: a dictionary holds at least the blank and one symbol
    #[inline]
    #[must_use = "emptiness check result is returned but not used"]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
