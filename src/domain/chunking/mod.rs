//! Code chunking: AST-aware splitting with a character-based fallback.
//!
//! [`AstSplitter`] parses supported languages with tree-sitter and extracts
//! structural units (functions, classes, methods, grouped imports), refining
//! oversize nodes by descending into their children. Unsupported languages,
//! parse failures, and oversize leaves degrade to [`CharacterSplitter`],
//! which splits on a prioritized separator list and applies overlap.
//!
//! Splitting never fails; the worst input still yields character chunks.

pub mod ast;
pub mod character;
pub mod languages;

pub use ast::AstSplitter;
pub use character::CharacterSplitter;

use crate::domain::ports::splitter::{Splitter, SplitterOptions};
use crate::domain::types::SplitterKind;

/// Build the splitter for a request.
pub fn create_splitter(kind: SplitterKind, options: SplitterOptions) -> Box<dyn Splitter> {
    match kind {
        SplitterKind::Ast => Box::new(AstSplitter::new(options)),
        SplitterKind::Character => Box::new(CharacterSplitter::new(options)),
    }
}

/// 1-based inclusive line range of `source[start..end]`.
///
/// A trailing newline terminates the last line rather than opening a new one.
pub(crate) fn line_span(source: &str, start: usize, end: usize) -> (u32, u32) {
    let newlines_before = source.as_bytes()[..start]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u32;
    let start_line = newlines_before + 1;

    let content = &source[start..end];
    let mut newlines_within = content.as_bytes().iter().filter(|&&b| b == b'\n').count() as u32;
    if content.ends_with('\n') {
        newlines_within = newlines_within.saturating_sub(1);
    }
    (start_line, start_line + newlines_within)
}
