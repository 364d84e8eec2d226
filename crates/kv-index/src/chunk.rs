//! Fixed-stride, structure-aware passage chunker.

use kv_core::hash::compute_content_hash;
use kv_core::ids::passage_id;

use crate::model::{Passage, TokenSpan};
use crate::structure::StructureIndex;
use crate::tokenize::Tokenized;

const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub max_tokens_per_passage: usize,
    pub overlap_tokens: usize,
    pub max_note_tokens: usize,
    pub min_passage_tokens: usize,
    pub preserve_structure_boundaries: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_passage: 180,
            overlap_tokens: 90,
            max_note_tokens: 20_000,
            min_passage_tokens: 10,
            preserve_structure_boundaries: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("content too large: {token_count} tokens exceeds max_note_tokens {max}")]
    ContentTooLarge { token_count: usize, max: usize },
}

/// Chunk `normalized_content` (already tokenized as `tokenized`) into
/// overlapping passages per `config`. Deterministic and total: identical
/// `(normalized_content, config)` always produce an identical sequence of
/// `{structure_path, token_offset, token_length, content_hash}` tuples
/// (passage ids are surrogate keys and vary by design).
pub fn chunk(
    version_id: &str,
    normalized_content: &str,
    tokenized: &Tokenized,
    config: &ChunkConfig,
) -> Result<Vec<Passage>, ChunkError> {
    if tokenized.len() > config.max_note_tokens {
        return Err(ChunkError::ContentTooLarge {
            token_count: tokenized.len(),
            max: config.max_note_tokens,
        });
    }
    if tokenized.is_empty() {
        return Ok(Vec::new());
    }

    let structure = if config.preserve_structure_boundaries {
        Some(StructureIndex::build(normalized_content))
    } else {
        None
    };

    let total = tokenized.len();
    let stride = config.max_tokens_per_passage.saturating_sub(config.overlap_tokens).max(1);

    let mut starts = Vec::new();
    let mut start = 0usize;
    loop {
        starts.push(start);
        let end = (start + config.max_tokens_per_passage).min(total);
        if end >= total {
            break;
        }
        start += stride;
    }

    // Absorb a too-short final passage into the previous one rather than
    // dropping it.
    if starts.len() > 1 {
        let last_start = *starts.last().unwrap();
        let last_len = total - last_start;
        if last_len < config.min_passage_tokens {
            starts.pop();
        }
    }

    let mut passages = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = if i + 1 < starts.len() {
            (start + config.max_tokens_per_passage).min(total)
        } else {
            total
        };
        let length = end - start;

        let content = token_span_text(normalized_content, tokenized, start, end);
        let structure_path = structure
            .as_ref()
            .map(|s| s.path_at(tokenized.token_offsets[start]))
            .unwrap_or_else(|| "/".to_string());
        let content_hash = compute_content_hash(&content);
        let snippet = truncate_snippet(&content);

        passages.push(Passage {
            id: passage_id(),
            version_id: version_id.to_string(),
            structure_path,
            token_span: TokenSpan { offset: start, length },
            snippet,
            content,
            content_hash,
        });
    }

    Ok(passages)
}

/// Reconstruct the substring of `normalized_content` spanning tokens
/// `[start, end)`, from the first token's offset through the character
/// just before the next token after `end` (or end of text).
fn token_span_text(normalized_content: &str, tokenized: &Tokenized, start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    let chars: Vec<char> = normalized_content.chars().collect();
    let first_offset = tokenized.token_offsets[start];
    let last_offset = if end < tokenized.len() {
        tokenized.token_offsets[end]
    } else {
        chars.len()
    };
    chars[first_offset..last_offset.min(chars.len())]
        .iter()
        .collect::<String>()
        .trim()
        .to_string()
}

/// Truncate `content` to `SNIPPET_MAX_CHARS` at a word boundary, appending
/// an ellipsis when truncated.
fn truncate_snippet(content: &str) -> String {
    if content.chars().count() <= SNIPPET_MAX_CHARS {
        return content.to_string();
    }
    let truncated: String = content.chars().take(SNIPPET_MAX_CHARS).collect();
    let boundary = truncated.rfind(' ').unwrap_or(truncated.len());
    format!("{}…", &truncated[..boundary])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::tokenize::tokenize;

    fn chunk_text(text: &str, config: &ChunkConfig) -> Result<Vec<Passage>, ChunkError> {
        let normalized = normalize(text);
        let tokenized = tokenize(&normalized);
        chunk("ver_1", &normalized, &tokenized, config)
    }

    #[test]
    fn empty_content_yields_no_passages() {
        let passages = chunk_text("", &ChunkConfig::default()).unwrap();
        assert!(passages.is_empty());
    }

    #[test]
    fn short_content_is_a_single_passage() {
        let passages = chunk_text("a short note about testing", &ChunkConfig::default()).unwrap();
        assert_eq!(passages.len(), 1);
    }

    #[test]
    fn content_too_large_errors() {
        let config = ChunkConfig {
            max_note_tokens: 5,
            ..Default::default()
        };
        let text = (0..20).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let err = chunk_text(&text, &config).unwrap_err();
        assert!(matches!(err, ChunkError::ContentTooLarge { .. }));
    }

    #[test]
    fn long_content_produces_overlapping_passages() {
        let config = ChunkConfig {
            max_tokens_per_passage: 10,
            overlap_tokens: 4,
            min_passage_tokens: 2,
            ..Default::default()
        };
        let text = (0..50).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let passages = chunk_text(&text, &config).unwrap();
        assert!(passages.len() > 1);
        for p in &passages {
            assert!(p.token_span.length <= config.max_tokens_per_passage);
        }
    }

    #[test]
    fn short_tail_is_absorbed_not_dropped() {
        let config = ChunkConfig {
            max_tokens_per_passage: 10,
            overlap_tokens: 5,
            min_passage_tokens: 3,
            ..Default::default()
        };
        let text = (0..12).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let passages = chunk_text(&text, &config).unwrap();
        let last = passages.last().unwrap();
        assert!(last.token_span.offset + last.token_span.length <= 12);
        let covered: usize = last.token_span.offset + last.token_span.length;
        assert_eq!(covered, 12);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = (0..50).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let a = chunk_text(&text, &ChunkConfig::default()).unwrap();
        let b = chunk_text(&text, &ChunkConfig::default()).unwrap();
        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.iter().zip(b.iter()) {
            assert_eq!(pa.structure_path, pb.structure_path);
            assert_eq!(pa.token_span, pb.token_span);
            assert_eq!(pa.content_hash, pb.content_hash);
        }
    }

    #[test]
    fn snippet_truncates_at_word_boundary() {
        let long_word_content = "word ".repeat(100);
        let snippet = truncate_snippet(long_word_content.trim());
        assert!(snippet.chars().count() <= SNIPPET_MAX_CHARS + 1);
        assert!(snippet.ends_with('…'));
    }

    #[test]
    fn structure_path_reflects_heading_at_passage_start() {
        let text = "# Intro\nword0 word1 word2 word3 word4";
        let config = ChunkConfig {
            max_tokens_per_passage: 3,
            overlap_tokens: 0,
            min_passage_tokens: 1,
            ..Default::default()
        };
        let passages = chunk_text(text, &config).unwrap();
        assert!(passages.iter().all(|p| p.structure_path == "/intro"));
    }
}
