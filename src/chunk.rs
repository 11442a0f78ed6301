//! Structure-first text segmenter.
//!
//! Splits normalized text into pieces that fit both a character budget and
//! the embedding model's input limit.
//!
//! # Algorithm
//!
//! ```text
//! text ──▶ sections (divider lines: ---, ***, ___; a --- under a text
//!            line starts a section at that heading)
//!            │
//!            ▼
//!        paragraphs (\n\n) merged greedily while ≤ chunk_size chars
//!            │
//!            ▼
//!        piece with > max_input_length tokens?
//!            ├─ no  → kept whole
//!            └─ yes → token windows of max_input_length,
//!                     stepping by max_input_length - chunk_overlap
//! ```
//!
//! Tokens are whitespace-separated words. A piece of exactly
//! `max_input_length` tokens is not re-split. A single paragraph longer
//! than `chunk_size` stays whole unless it is over the token limit.
//!
//! Empty input yields exactly one empty piece so a source document always
//! owns at least one chunk.

use crate::config::Config;

/// Budgets the segmenter works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentParams {
    /// Character budget for merged paragraphs.
    pub chunk_size: usize,
    /// Tokens shared between consecutive windows of a re-split piece.
    pub chunk_overlap: usize,
    /// Embedder input limit, in tokens.
    pub max_input_length: usize,
}

impl SegmentParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            max_input_length: config.embedding.max_input_length,
        }
    }
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            max_input_length: 256,
        }
    }
}

/// Split `text` into ordered chunk texts.
pub fn segment(text: &str, params: &SegmentParams) -> Vec<String> {
    let mut pieces = Vec::new();

    for section in split_sections(text) {
        for merged in merge_paragraphs(&section, params.chunk_size) {
            if token_count(&merged) > params.max_input_length {
                pieces.extend(split_by_tokens(
                    &merged,
                    params.max_input_length,
                    params.chunk_overlap,
                ));
            } else {
                pieces.push(merged);
            }
        }
    }

    if pieces.is_empty() {
        pieces.push(String::new());
    }

    pieces
}

/// Whitespace token count.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_divider(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|d| t.chars().all(|c| c == *d))
}

/// A `---` line directly under a text line is a markdown heading
/// underline: the heading opens a new section instead of trailing the
/// previous one.
fn split_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    fn flush(sections: &mut Vec<String>, lines: &[&str]) {
        let joined = lines.join("\n");
        if !joined.trim().is_empty() {
            sections.push(joined.trim().to_string());
        }
    }

    for line in text.lines() {
        if !is_divider(line) {
            current.push(line);
            continue;
        }
        let heading = match current.last() {
            Some(prev) if !prev.trim().is_empty() && line.trim().starts_with('-') => {
                current.pop()
            }
            _ => None,
        };
        flush(&mut sections, &current);
        current.clear();
        current.extend(heading);
    }
    flush(&mut sections, &current);

    sections
}

/// Greedy merge; `chunk_size` counts characters, not bytes.
fn merge_paragraphs(section: &str, chunk_size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0;

    for para in section.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_chars = trimmed.chars().count();

        let would_be = if buf.is_empty() {
            para_chars
        } else {
            buf_chars + 2 + para_chars
        };

        if would_be > chunk_size && !buf.is_empty() {
            out.push(std::mem::take(&mut buf));
            buf_chars = 0;
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
            buf_chars += 2;
        }
        buf.push_str(trimmed);
        buf_chars += para_chars;
    }

    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

/// Byte spans of whitespace-separated words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Token windows over `text`, preserving the original spacing inside each.
fn split_by_tokens(text: &str, max_tokens: usize, overlap: usize) -> Vec<String> {
    let spans = word_spans(text);
    let step = max_tokens.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0;

    while start < spans.len() {
        let end = (start + max_tokens).min(spans.len());
        out.push(text[spans[start].0..spans[end - 1].1].to_string());
        if end == spans.len() {
            break;
        }
        start += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(chunk_size: usize, overlap: usize, max_input: usize) -> SegmentParams {
        SegmentParams {
            chunk_size,
            chunk_overlap: overlap,
            max_input_length: max_input,
        }
    }

    #[test]
    fn test_splits_at_divider() {
        let text = "# Intro\n\nHello world.\n\n---\n\n# Setup\n\nRun docker compose up -d";
        let chunks = segment(text, &params(1000, 50, 256));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "# Intro\n\nHello world.");
        assert_eq!(chunks[1], "# Setup\n\nRun docker compose up -d");
    }

    #[test]
    fn test_empty_text_yields_one_empty_chunk() {
        assert_eq!(segment("", &SegmentParams::default()), vec![String::new()]);
        assert_eq!(segment("  \n\n ", &SegmentParams::default()), vec![String::new()]);
        assert_eq!(segment("---\n***", &SegmentParams::default()), vec![String::new()]);
    }

    #[test]
    fn test_paragraphs_merge_within_budget() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = segment(text, &params(500, 5, 256));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("Third paragraph."));
    }

    #[test]
    fn test_paragraphs_respect_char_budget() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = segment(text, &params(30, 2, 256));
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.len() <= 30, "chunk too long: {:?}", c);
        }
    }

    #[test]
    fn test_piece_at_token_limit_is_not_split() {
        let text = (0..10).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = segment(&text, &params(1000, 2, 10));
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn test_over_limit_piece_is_split_with_overlap() {
        let text = (0..12).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = segment(&text, &params(1000, 2, 10));
        assert_eq!(chunks.len(), 2);
        assert_eq!(token_count(&chunks[0]), 10);
        assert!(chunks[0].starts_with("w0 "));
        // second window starts 8 tokens in, sharing w8 and w9
        assert_eq!(chunks[1], "w8 w9 w10 w11");
    }

    #[test]
    fn test_oversized_single_paragraph_stays_whole_under_token_limit() {
        let para = "x".repeat(80);
        let chunks = segment(&para, &params(20, 2, 10));
        assert_eq!(chunks, vec![para]);
    }

    #[test]
    fn test_divider_needs_three_marks() {
        let chunks = segment("a\n\n--\n\nb", &params(1000, 2, 10));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_char_budget_counts_characters() {
        // 20 chars each, 40 bytes each
        let para = "é".repeat(20);
        let text = format!("{}\n\n{}", para, para);
        let chunks = segment(&text, &params(42, 2, 256));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 42);
    }

    #[test]
    fn test_heading_underline_opens_section() {
        let text = "Intro text.\n\nSetup\n-----\nRun docker compose up -d";
        let chunks = segment(text, &params(1000, 2, 256));
        assert_eq!(chunks, vec!["Intro text.", "Setup\nRun docker compose up -d"]);
    }

    #[test]
    fn test_star_rule_under_text_is_still_a_divider() {
        let chunks = segment("one\n***\ntwo", &params(1000, 2, 256));
        assert_eq!(chunks, vec!["one", "two"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\n___\n\nGamma\n\nDelta";
        let p = params(8, 1, 4);
        assert_eq!(segment(text, &p), segment(text, &p));
    }
}
