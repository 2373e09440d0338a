// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sentence-level text splitter
//!
//! Splits documents into chunks of at most `chunk_size` characters without
//! breaking sentences:
//!
//! 1. Pick the first separator pattern that occurs in the text (paragraph
//!    break, line break, CJK sentence enders, `. ! ?`, semicolons, commas).
//! 2. Split on it, keeping each separator at the end of its piece.
//! 3. Split every piece into sentences.
//! 4. Greedily merge consecutive sentences while the chunk stays within
//!    `chunk_size`. A single longer sentence becomes its own chunk.
//!
//! Chunks are trimmed, empty chunks dropped and runs of blank lines
//! collapsed to one newline.

use regex::Regex;
use std::sync::OnceLock;

/// Default separator patterns, coarsest first
pub const DEFAULT_SEPARATORS: &[&str] = &[
    r"\n\n",
    r"\n",
    r"。|！|？",
    r"\.\s|!\s|\?\s",
    r"；|;\s",
    r"，|,\s",
];

/// Default maximum chunk length in characters
pub const DEFAULT_CHUNK_SIZE: usize = 250;

fn default_separators() -> &'static [Regex] {
    static SEPARATORS: OnceLock<Vec<Regex>> = OnceLock::new();
    SEPARATORS.get_or_init(|| {
        DEFAULT_SEPARATORS
            .iter()
            .map(|pattern| Regex::new(pattern).expect("default separator pattern is valid"))
            .collect()
    })
}

fn sentence_end() -> &'static Regex {
    static SENTENCE_END: OnceLock<Regex> = OnceLock::new();
    SENTENCE_END.get_or_init(|| {
        Regex::new(r#"[。！？]+|[.!?]+["'”’)\]]*\s+"#).expect("sentence pattern is valid")
    })
}

fn blank_lines() -> &'static Regex {
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();
    BLANK_LINES.get_or_init(|| Regex::new(r"\n{2,}").expect("blank line pattern is valid"))
}

/// Splits text into sentence-aligned chunks
#[derive(Debug, Clone)]
pub struct SentenceTextSplitter {
    chunk_size: usize,
    separators: Vec<Regex>,
    keep_separator: bool,
}

impl Default for SentenceTextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl SentenceTextSplitter {
    /// Splitter with the default separators, keeping separators
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            separators: default_separators().to_vec(),
            keep_separator: true,
        }
    }

    /// Replace the separator patterns (regular expressions, coarsest first)
    pub fn with_separators<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, regex::Error> {
        self.separators = patterns
            .iter()
            .map(|pattern| Regex::new(pattern.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Whether separators stay attached to the preceding piece
    pub fn with_keep_separator(mut self, keep_separator: bool) -> Self {
        self.keep_separator = keep_separator;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let pieces = match self.separators.iter().find(|sep| sep.is_match(text)) {
            Some(separator) => split_with_separator(text, separator, self.keep_separator),
            None => vec![text],
        };

        let joiner = if self.keep_separator { "" } else { " " };
        let joiner_len = joiner.chars().count();
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for sentence in pieces.into_iter().flat_map(split_sentences) {
            let len = sentence.chars().count();
            // The joiner counts toward the chunk it would be added to
            if current_len > 0 && current_len + joiner_len + len > self.chunk_size {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push_str(joiner);
                current_len += joiner_len;
            }
            current.push_str(sentence);
            current_len += len;
        }
        if current_len > 0 {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .map(|chunk| blank_lines().replace_all(chunk.trim(), "\n").into_owned())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    /// Split several texts, flattening the chunks
    pub fn split_texts<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String> {
        texts
            .iter()
            .flat_map(|text| self.split_text(text.as_ref()))
            .collect()
    }
}

/// Split on `separator`, optionally keeping each match at the end of the
/// preceding piece. Empty pieces are dropped.
fn split_with_separator<'a>(text: &'a str, separator: &Regex, keep_separator: bool) -> Vec<&'a str> {
    let pieces: Vec<&str> = if keep_separator {
        let mut pieces = Vec::new();
        let mut start = 0;
        for m in separator.find_iter(text) {
            pieces.push(&text[start..m.end()]);
            start = m.end();
        }
        pieces.push(&text[start..]);
        pieces
    } else {
        separator.split(text).collect()
    };

    pieces.into_iter().filter(|piece| !piece.is_empty()).collect()
}

/// Split a piece into sentences, each keeping its terminator and trailing
/// whitespace
fn split_sentences(piece: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_end().find_iter(piece) {
        sentences.push(&piece[start..m.end()]);
        start = m.end();
    }
    if start < piece.len() {
        sentences.push(&piece[start..]);
    }
    sentences
}
