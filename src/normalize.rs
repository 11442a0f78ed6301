//! Text normalization.
//!
//! Turns a multi-field [`RawContent`] into one [`CleanedText`] blob.
//!
//! # Rules
//!
//! Applied to each field value independently:
//!
//! 1. Drop control characters (except `\n` and `\t`) and zero-width
//!    characters (`U+200B..=U+200D`, `U+2060`, `U+FEFF`).
//! 2. Drop decorative symbols: anything that is not alphanumeric,
//!    whitespace, or ASCII punctuation (emoji, box drawing, bullets).
//! 3. Collapse runs of spaces/tabs to one space and trim every line.
//! 4. Collapse three or more newlines to a single blank line, so paragraph
//!    breaks and section dividers survive for the segmenter.
//!
//! Non-empty fields are then joined with a blank line, in insertion order.

use crate::models::{CleanedText, RawContent};

pub fn normalize(raw: &RawContent) -> CleanedText {
    let text = raw
        .content
        .iter()
        .map(|(_, value)| clean_text(value))
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    CleanedText {
        text,
        platform: raw.platform.clone(),
        author_id: raw.author_id.clone(),
        author_full_name: raw.author_full_name.clone(),
    }
}

/// Clean a single text value.
pub fn clean_text(input: &str) -> String {
    let filtered: String = input
        .replace("\r\n", "\n")
        .chars()
        .filter(|c| keep_char(*c))
        .collect();

    let mut out = String::with_capacity(filtered.len());
    let mut blank_run = 0usize;

    for line in filtered.lines() {
        let collapsed = collapse_spaces(line);
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&collapsed);
        blank_run = 0;
    }

    out
}

fn keep_char(c: char) -> bool {
    if c == '\n' || c == '\t' {
        return true;
    }
    if c.is_control() || matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}') {
        return false;
    }
    c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation()
}

fn collapse_spaces(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
