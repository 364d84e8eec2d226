//! Deterministic, referentially transparent text normalization.
//!
//! Normalization is a pure function of its input: identical `(text)` always
//! produces identical output, which is what lets anchors and content hashes
//! survive round-trips through storage.

use unicode_normalization::UnicodeNormalization;

/// Normalize Markdown source text:
/// 1. Apply Unicode NFC.
/// 2. Convert all line endings to LF.
/// 3. Collapse runs of whitespace to a single space, except inside fenced or
///    inline code spans, whose content is preserved byte-for-byte. A run
///    that contains a newline collapses to a single newline rather than a
///    space, since Markdown heading syntax is line-anchored and the
///    Structure Extractor walks this same normalized text.
pub fn normalize(text: &str) -> String {
    let nfc: String = text.nfc().collect();
    let lf = crlf_to_lf(&nfc);
    collapse_whitespace_outside_code(&lf)
}

fn crlf_to_lf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// A contiguous run of the input classified as either prose (whitespace may
/// be collapsed) or code (preserved verbatim).
enum Span<'a> {
    Prose(&'a str),
    Code(&'a str),
}

/// Split `text` into prose/code spans, recognizing fenced code blocks
/// (` ``` ` delimited, line-oriented) and inline code spans (backtick
/// delimited, possibly multi-backtick to allow literal backticks inside).
fn split_code_spans(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut rest = text;
    let mut consumed = 0usize;

    while !rest.is_empty() {
        match find_fence_or_inline(rest) {
            Some((start, end)) => {
                if start > 0 {
                    spans.push(Span::Prose(&rest[..start]));
                }
                spans.push(Span::Code(&rest[start..end]));
                consumed += end;
                rest = &text[consumed..];
            }
            None => {
                spans.push(Span::Prose(rest));
                break;
            }
        }
    }
    spans
}

/// Find the next code span (fenced or inline) in `text`, returning its
/// `(start, end)` byte range.
fn find_fence_or_inline(text: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;

    // Fenced blocks: a line starting with ``` up to the next such line (or EOF).
    if let Some(fence_start) = find_line_start_with(text, "```") {
        let after_open = text[fence_start..]
            .find('\n')
            .map(|i| fence_start + i + 1)
            .unwrap_or(text.len());
        let close_rel = text[after_open..].find("```");
        let end = match close_rel {
            Some(rel) => {
                let close_line_start = after_open + rel;
                text[close_line_start..]
                    .find('\n')
                    .map(|i| close_line_start + i + 1)
                    .unwrap_or(text.len())
            }
            None => text.len(),
        };
        best = Some((fence_start, end));
    }

    // Inline spans: shortest run of backticks, matched by an equal-length run.
    if let Some(tick_start) = text.find('`') {
        if best.map(|(s, _)| tick_start < s).unwrap_or(true) {
            let tick_len = text[tick_start..].bytes().take_while(|&b| b == b'`').count();
            let delim = "`".repeat(tick_len);
            if let Some(rel) = text[tick_start + tick_len..].find(&delim) {
                let end = tick_start + tick_len + rel + tick_len;
                best = Some((tick_start, end));
            }
        }
    }

    best
}

fn find_line_start_with(text: &str, needle: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with(needle) {
            return Some(offset + (line.len() - line.trim_start().len()));
        }
        offset += line.len();
    }
    None
}

fn collapse_whitespace_outside_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for span in split_code_spans(text) {
        match span {
            Span::Code(code) => out.push_str(code),
            Span::Prose(prose) => {
                let mut run: Vec<char> = Vec::new();
                let flush = |run: &mut Vec<char>, out: &mut String| {
                    if !run.is_empty() {
                        out.push(if run.contains(&'\n') { '\n' } else { ' ' });
                        run.clear();
                    }
                };
                for ch in prose.chars() {
                    if ch.is_whitespace() {
                        run.push(ch);
                    } else {
                        flush(&mut run, &mut out);
                        out.push(ch);
                    }
                }
                flush(&mut run, &mut out);
            }
        }
    }
    out
}
