//! Word-boundary tokenizer over normalized Markdown text.
//!
//! Segmentation follows UAX-29 word boundaries via `unicode-segmentation`,
//! with overrides layered on top: `_` and `/` always split a word even
//! though UAX-29 would keep them joined; internal `'` and `-` stay inside a
//! word; CJK text without dictionary segmentation falls back to
//! per-codepoint tokens.

use unicode_segmentation::UnicodeSegmentation;

/// Bump whenever tokenization rules change shape in a way that could change
/// an existing anchor's fingerprint for unchanged content. Anchors carry
/// this value; a mismatch forces re-anchoring by structure path and content
/// match rather than trusting stored offsets.
pub const TOKENIZATION_VERSION: u32 = 1;

/// Unit separator used to canonicalize a token span before hashing.
const FINGERPRINT_JOINER: char = '\u{001F}';

/// A tokenized document: parallel `tokens` and `token_offsets`, where
/// `token_offsets[i]` is the character offset of `tokens[i]` in the
/// normalized text that was tokenized.
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub tokens: Vec<String>,
    pub token_offsets: Vec<usize>,
}

impl Tokenized {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The canonical form of the token span `[offset, offset+length)`:
    /// its tokens joined by the fingerprint separator. Defined purely by
    /// token content, so text outside the span never affects it.
    pub fn canonical_span(&self, offset: usize, length: usize) -> Option<String> {
        let end = offset.checked_add(length)?;
        if end > self.tokens.len() {
            return None;
        }
        Some(self.tokens[offset..end].join(&FINGERPRINT_JOINER.to_string()))
    }
}

/// Tokenize already-normalized text into words, numbers, and CJK codepoints.
/// Whitespace and punctuation (other than the overrides below) are dropped;
/// only content-bearing tokens feed the chunker and index.
pub fn tokenize(normalized_text: &str) -> Tokenized {
    let mut tokens = Vec::new();
    let mut token_offsets = Vec::new();

    for (byte_start, word) in normalized_text.split_word_bound_indices() {
        if word.trim().is_empty() {
            continue;
        }
        let char_offset = normalized_text[..byte_start].chars().count();
        for (sub_offset, sub_word) in split_overrides(word) {
            if sub_word.is_empty() {
                continue;
            }
            if is_cjk_run(sub_word) {
                for (i, ch) in sub_word.chars().enumerate() {
                    tokens.push(ch.to_string());
                    token_offsets.push(char_offset + sub_offset + i);
                }
            } else {
                tokens.push(sub_word.to_string());
                token_offsets.push(char_offset + sub_offset);
            }
        }
    }

    Tokenized { tokens, token_offsets }
}

/// Split a UAX-29 word on `_` and `/`, which that algorithm keeps joined to
/// adjacent letters but this tokenizer treats as hard separators. Internal
/// `'` and `-` are left untouched (stay inside the word).
fn split_overrides(word: &str) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    for (byte_idx, ch) in word.char_indices() {
        if ch == '_' || ch == '/' {
            if byte_idx > start {
                parts.push((char_offset_of(word, start), &word[start..byte_idx]));
            }
            start = byte_idx + ch.len_utf8();
        }
    }
    if start < word.len() {
        parts.push((char_offset_of(word, start), &word[start..]));
    }
    parts
}

fn char_offset_of(word: &str, byte_idx: usize) -> usize {
    word[..byte_idx].chars().count()
}

/// True if every character in `s` is a CJK ideograph or kana codepoint,
/// meaning no dictionary segmentation is available and per-codepoint
/// tokens are the right fallback.
fn is_cjk_run(s: &str) -> bool {
    s.chars().all(is_cjk_char)
}

fn is_cjk_char(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3040..=0x309F // Hiragana
        | 0x30A0..=0x30FF // Katakana
        | 0x3400..=0x4DBF // CJK Extension A
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    #[test]
    fn splits_on_underscore_and_slash() {
        let t = tokenize("foo_bar baz/qux");
        assert!(t.tokens.contains(&"foo".to_string()));
        assert!(t.tokens.contains(&"bar".to_string()));
        assert!(t.tokens.contains(&"baz".to_string()));
        assert!(t.tokens.contains(&"qux".to_string()));
    }

    #[test]
    fn keeps_internal_apostrophe_and_hyphen() {
        let t = tokenize("don't state-of-the-art");
        assert!(t.tokens.contains(&"don't".to_string()));
        assert!(t.tokens.iter().any(|tok| tok.contains('-')));
    }

    #[test]
    fn decimal_numbers_form_one_token() {
        let t = tokenize("price 3.14 units");
        assert!(t.tokens.contains(&"3.14".to_string()));
    }

    #[test]
    fn cjk_falls_back_to_per_codepoint() {
        let t = tokenize("你好世界");
        assert_eq!(t.tokens.len(), 4);
    }

    #[test]
    fn offsets_are_char_offsets_into_normalized_text() {
        let normalized = normalize("hello world");
        let t = tokenize(&normalized);
        assert_eq!(t.token_offsets[0], 0);
        assert_eq!(t.token_offsets[1], 6);
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        let t = tokenize("");
        assert!(t.is_empty());
    }

    #[test]
    fn canonical_span_depends_only_on_tokens_in_range() {
        let t = tokenize("alpha beta gamma delta");
        let a = t.canonical_span(1, 2).unwrap();
        assert_eq!(a, "beta\u{001F}gamma");
    }

    #[test]
    fn canonical_span_out_of_range_is_none() {
        let t = tokenize("alpha");
        assert!(t.canonical_span(0, 5).is_none());
    }
}
