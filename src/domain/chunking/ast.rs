//! AST-aware splitter built on tree-sitter.
//!
//! Walks the parse tree collecting candidate nodes from the per-language
//! extraction sets, then runs a refinement pass: oversize candidates descend
//! into their children, small adjacent siblings coalesce, and anything still
//! oversize at a leaf goes to the character splitter carrying its byte range
//! so line numbers stay correct. Contiguous top-level imports collapse into a
//! single chunk.
//!
//! Parse failures never propagate: the whole file degrades to the character
//! splitter and a `parse_failed` event is logged.

use super::character::CharacterSplitter;
use super::languages;
use super::line_span;
use crate::domain::ports::splitter::{Splitter, SplitterOptions};
use crate::domain::types::{Chunk, Language};
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};

/// A byte range scheduled to become a chunk.
#[derive(Debug, Clone)]
struct Piece {
    start: usize,
    end: usize,
    node_kind: Option<String>,
    /// Small pieces are eligible for coalescing with small neighbors
    small: bool,
}

/// Structural splitter with character fallback.
#[derive(Debug, Clone)]
pub struct AstSplitter {
    options: SplitterOptions,
    fallback: CharacterSplitter,
}

impl AstSplitter {
    /// Create a splitter with the given size bounds.
    pub fn new(options: SplitterOptions) -> Self {
        Self {
            options,
            fallback: CharacterSplitter::new(options),
        }
    }

    fn small_bound(&self) -> usize {
        self.options.chunk_size / 4
    }

    /// Collect candidate nodes below `node`, stopping at the first match on
    /// each branch. Descending continues through non-candidate containers so
    /// nested definitions (methods inside an unlisted wrapper) still surface.
    fn collect_candidates<'t>(
        &self,
        node: Node<'t>,
        kinds: &[&str],
        out: &mut Vec<Node<'t>>,
    ) {
        for i in 0..node.named_child_count() {
            if let Some(child) = node.named_child(i) {
                if kinds.contains(&child.kind()) {
                    out.push(child);
                } else {
                    self.collect_candidates(child, kinds, out);
                }
            }
        }
    }

    /// Group contiguous runs of top-level import nodes into single pieces.
    fn import_pieces(&self, root: Node<'_>, language: Language) -> Vec<Piece> {
        let import_kinds = languages::import_kinds(language);
        if import_kinds.is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        let mut run: Option<(usize, usize)> = None;
        for i in 0..root.named_child_count() {
            let Some(child) = root.named_child(i) else {
                continue;
            };
            if import_kinds.contains(&child.kind()) {
                run = Some(match run {
                    Some((start, _)) => (start, child.end_byte()),
                    None => (child.start_byte(), child.end_byte()),
                });
            } else if let Some((start, end)) = run.take() {
                pieces.push(Piece {
                    start,
                    end,
                    node_kind: Some("import".to_string()),
                    small: false,
                });
            }
        }
        if let Some((start, end)) = run {
            pieces.push(Piece {
                start,
                end,
                node_kind: Some("import".to_string()),
                small: false,
            });
        }
        pieces
    }

    /// Refinement: emit the node whole when it fits, otherwise descend into
    /// its children; leaves that still exceed the bound are character-split.
    fn refine(&self, node: Node<'_>, source: &str, language: Language, out: &mut Vec<Piece>) {
        let start = node.start_byte();
        let end = node.end_byte();
        let len = end - start;

        if len <= self.options.chunk_size {
            out.push(Piece {
                start,
                end,
                node_kind: Some(languages::kind_label(node.kind()).to_string()),
                small: len < self.small_bound(),
            });
            return;
        }

        if node.named_child_count() == 0 {
            self.character_pieces(source, start, end, language, out);
            return;
        }

        for i in 0..node.named_child_count() {
            if let Some(child) = node.named_child(i) {
                self.refine(child, source, language, out);
            }
        }
    }

    fn character_pieces(
        &self,
        source: &str,
        start: usize,
        end: usize,
        language: Language,
        out: &mut Vec<Piece>,
    ) {
        for (span_start, span_end) in self.fallback.split_range(source, start, end, language) {
            out.push(Piece {
                start: span_start,
                end: span_end,
                node_kind: None,
                small: false,
            });
        }
    }

    /// Merge runs of small adjacent pieces up to the chunk size.
    fn coalesce(&self, pieces: Vec<Piece>) -> Vec<Piece> {
        let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if let Some(last) = out.last_mut() {
                if last.small
                    && piece.small
                    && piece.start >= last.end
                    && piece.end - last.start <= self.options.chunk_size
                {
                    last.end = piece.end;
                    last.node_kind = None;
                    continue;
                }
            }
            out.push(piece);
        }
        out
    }

    fn pieces_to_chunks(
        &self,
        pieces: Vec<Piece>,
        source: &str,
        language: Language,
        relative_path: &str,
    ) -> Vec<Chunk> {
        pieces
            .into_iter()
            .filter_map(|piece| {
                let content = &source[piece.start..piece.end];
                if content.trim().is_empty() {
                    return None;
                }
                let (start_line, end_line) = line_span(source, piece.start, piece.end);
                Some(Chunk::new(
                    content.to_string(),
                    relative_path,
                    start_line,
                    end_line,
                    language,
                    piece.node_kind,
                ))
            })
            .collect()
    }
}

impl Splitter for AstSplitter {
    fn split(&self, source: &str, language: Language, relative_path: &str) -> Vec<Chunk> {
        let Some(grammar) = languages::grammar(language) else {
            return self.fallback.split(source, language, relative_path);
        };

        let mut parser = Parser::new();
        if parser.set_language(&grammar).is_err() {
            warn!(language = %language, "grammar rejected by parser, using character splitter");
            return self.fallback.split(source, language, relative_path);
        }

        let Some(tree) = parser.parse(source, None) else {
            debug!(
                event = "parse_failed",
                language = %language,
                path = relative_path,
                "parse aborted, using character splitter"
            );
            return self.fallback.split(source, language, relative_path);
        };

        let root = tree.root_node();
        let kinds = languages::extraction_kinds(language);
        let mut candidates = Vec::new();
        self.collect_candidates(root, kinds, &mut candidates);

        let mut pieces = self.import_pieces(root, language);
        // Import runs were already captured; drop candidates that an import
        // group covers (export/import overlap in TS extraction sets).
        let import_spans: Vec<(usize, usize)> = pieces.iter().map(|p| (p.start, p.end)).collect();
        for node in candidates {
            let (start, end) = (node.start_byte(), node.end_byte());
            if import_spans.iter().any(|&(s, e)| start >= s && end <= e) {
                continue;
            }
            self.refine(node, source, language, &mut pieces);
        }

        if pieces.is_empty() {
            if root.has_error() {
                debug!(
                    event = "parse_failed",
                    language = %language,
                    path = relative_path,
                    "no extractable nodes in errored tree, using character splitter"
                );
            }
            return self.fallback.split(source, language, relative_path);
        }

        pieces.sort_by_key(|p| (p.start, p.end));
        let pieces = self.coalesce(pieces);
        self.pieces_to_chunks(pieces, source, language, relative_path)
    }
}
