//! Recursive character splitter.
//!
//! Splits text by trying a prioritized list of separators, accumulating spans
//! up to the chunk size and carrying `chunk_overlap` characters into the next
//! chunk. Used directly for unsupported languages and as the last-resort
//! refinement step of the AST splitter.

use super::line_span;
use crate::domain::ports::splitter::{Splitter, SplitterOptions};
use crate::domain::types::{Chunk, Language};
use std::collections::VecDeque;

/// Splitter that works on raw text with no parsing.
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    options: SplitterOptions,
}

impl CharacterSplitter {
    /// Create a splitter with the given size bounds.
    pub fn new(options: SplitterOptions) -> Self {
        Self { options }
    }

    /// Separator priority for a language, most structural first. The empty
    /// separator always terminates the list and splits at char boundaries.
    pub fn separators_for(language: Language) -> &'static [&'static str] {
        match language {
            Language::Markdown => &["\n## ", "\n# ", "\n\n", "\n", ". ", " ", ""],
            Language::Unknown => &["\n\n", "\n", ". ", " ", ""],
            // Code: prefer blank lines, then statement ends, then words.
            _ => &["\n\n", "\n", "; ", ". ", " ", ""],
        }
    }

    /// Split `source[start..end]` into byte ranges.
    ///
    /// Each range stays within `chunk_size` where the separators allow it;
    /// adjacent ranges overlap by at most `chunk_overlap` bytes. Ranges are
    /// relative to `source`, so line numbers computed against the full file
    /// remain correct when this runs on an AST node's slice.
    pub(crate) fn split_range(
        &self,
        source: &str,
        start: usize,
        end: usize,
        language: Language,
    ) -> Vec<(usize, usize)> {
        let text = &source[start..end];
        let mut pieces = Vec::new();
        self.collect_pieces(text, start, Self::separators_for(language), &mut pieces);
        self.merge_pieces(&pieces)
    }

    /// Cut `text` into pieces no longer than the chunk size, preferring the
    /// earliest separator in the priority list that occurs in the text.
    fn collect_pieces(
        &self,
        text: &str,
        base: usize,
        separators: &[&str],
        out: &mut Vec<(usize, usize)>,
    ) {
        if text.is_empty() {
            return;
        }
        if text.len() <= self.options.chunk_size {
            out.push((base, base + text.len()));
            return;
        }

        let (sep_index, sep) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len().saturating_sub(1), ""));

        if sep.is_empty() {
            // No separator left: hard windows at char boundaries.
            let mut window_start = 0;
            let mut window_len = 0;
            for (offset, ch) in text.char_indices() {
                if window_len + ch.len_utf8() > self.options.chunk_size && window_len > 0 {
                    out.push((base + window_start, base + offset));
                    window_start = offset;
                    window_len = 0;
                }
                window_len += ch.len_utf8();
            }
            if window_len > 0 {
                out.push((base + window_start, base + text.len()));
            }
            return;
        }

        let rest = &separators[sep_index + 1..];
        for piece in text.split_inclusive(sep) {
            let offset = piece.as_ptr() as usize - text.as_ptr() as usize;
            if piece.len() <= self.options.chunk_size {
                out.push((base + offset, base + offset + piece.len()));
            } else {
                self.collect_pieces(piece, base + offset, rest, out);
            }
        }
    }

    /// Greedily merge contiguous pieces into chunk-sized spans, retaining a
    /// tail of pieces up to the overlap budget between spans.
    fn merge_pieces(&self, pieces: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut window: VecDeque<(usize, usize)> = VecDeque::new();
        let mut window_len = 0usize;

        for &piece in pieces {
            let piece_len = piece.1 - piece.0;
            if window_len + piece_len > self.options.chunk_size && !window.is_empty() {
                spans.push((window.front().unwrap().0, window.back().unwrap().1));
                while !window.is_empty()
                    && (window_len > self.options.chunk_overlap
                        || window_len + piece_len > self.options.chunk_size)
                {
                    let dropped = window.pop_front().unwrap();
                    window_len -= dropped.1 - dropped.0;
                }
            }
            window.push_back(piece);
            window_len += piece_len;
        }
        if !window.is_empty() {
            spans.push((window.front().unwrap().0, window.back().unwrap().1));
        }
        spans
    }
}

impl Splitter for CharacterSplitter {
    fn split(&self, source: &str, language: Language, relative_path: &str) -> Vec<Chunk> {
        self.split_range(source, 0, source.len(), language)
            .into_iter()
            .filter_map(|(start, end)| {
                let content = &source[start..end];
                if content.trim().is_empty() {
                    return None;
                }
                let (start_line, end_line) = line_span(source, start, end);
                Some(Chunk::new(
                    content.to_string(),
                    relative_path,
                    start_line,
                    end_line,
                    language,
                    None,
                ))
            })
            .collect()
    }
}
