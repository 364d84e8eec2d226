//! Anchor creation and resolution.
//!
//! An anchor addresses a token span by structure path plus a content
//! fingerprint rather than by raw offset, so it can be re-resolved after an
//! edit that shifts surrounding text without touching the anchored span
//! itself.

use kv_core::hash::sha256_hex;

use crate::model::{Anchor, DriftReport, FingerprintAlgo, Resolution, UnresolvedReason};
use crate::structure::StructureIndex;
use crate::tokenize::{tokenize, Tokenized, TOKENIZATION_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("invalid token span: offset {offset} length {length} exceeds {total} tokens")]
    InvalidTokenSpan { offset: usize, length: usize, total: usize },
    #[error("anchor resolution failed: {reason}")]
    AnchorResolutionFailed { reason: String },
}

fn digest(canonical: &str, algo: FingerprintAlgo) -> String {
    match algo {
        FingerprintAlgo::Sha256 => sha256_hex(canonical),
        FingerprintAlgo::Blake3 => blake3::hash(canonical.as_bytes()).to_hex().to_string(),
    }
}

fn fingerprint(tokenized: &Tokenized, offset: usize, length: usize, algo: FingerprintAlgo) -> Result<String, AnchorError> {
    let canonical = tokenized
        .canonical_span(offset, length)
        .ok_or(AnchorError::InvalidTokenSpan {
            offset,
            length,
            total: tokenized.len(),
        })?;
    Ok(digest(&canonical, algo))
}

/// Create an anchor over `[token_offset, token_offset+token_length)` of
/// `normalized_content`.
pub fn create_anchor(
    normalized_content: &str,
    structure_path: &str,
    token_offset: usize,
    token_length: usize,
    algo: FingerprintAlgo,
) -> Result<Anchor, AnchorError> {
    let tokenized = tokenize(normalized_content);
    let fp = fingerprint(&tokenized, token_offset, token_length, algo)?;
    let canonical_tokens = tokenized.tokens[token_offset..token_offset + token_length].to_vec();
    Ok(Anchor {
        structure_path: structure_path.to_string(),
        token_offset,
        token_length,
        fingerprint: fp,
        tokenization_version: TOKENIZATION_VERSION,
        fingerprint_algo: algo,
        canonical_tokens,
    })
}

/// Resolve `anchor` against `candidate_content`.
pub fn resolve(anchor: &Anchor, candidate_content: &str) -> Resolution {
    if anchor.tokenization_version != TOKENIZATION_VERSION {
        return resolve_by_search(anchor, candidate_content);
    }

    let tokenized = tokenize(candidate_content);
    if let Some(canonical) = tokenized.canonical_span(anchor.token_offset, anchor.token_length) {
        if digest(&canonical, anchor.fingerprint_algo) == anchor.fingerprint {
            return Resolution::Unchanged;
        }
    }
    resolve_by_search(anchor, candidate_content)
}

/// Search for the anchor's original canonical span within the subtree whose
/// structure path prefix-matches `anchor.structure_path`.
fn resolve_by_search(anchor: &Anchor, candidate_content: &str) -> Resolution {
    let tokenized = tokenize(candidate_content);
    let structure = StructureIndex::build(candidate_content);

    let mut matches = Vec::new();
    if tokenized.len() >= anchor.token_length {
        for start in 0..=(tokenized.len() - anchor.token_length) {
            let offset_in_text = tokenized.token_offsets.get(start).copied().unwrap_or(0);
            let path = structure.path_at(offset_in_text);
            if !path.starts_with(&anchor.structure_path) {
                continue;
            }
            if let Some(canonical) = tokenized.canonical_span(start, anchor.token_length) {
                if digest(&canonical, anchor.fingerprint_algo) == anchor.fingerprint {
                    matches.push(start);
                }
            }
        }
    }

    match matches.len() {
        1 => Resolution::Reanchored {
            token_offset: matches[0],
            token_length: anchor.token_length,
        },
        0 => Resolution::Unresolved {
            reason: UnresolvedReason::NoMatch,
            nearest_offset: nearest_offset_by_levenshtein(anchor, &tokenized),
        },
        _ => Resolution::Unresolved {
            reason: UnresolvedReason::AmbiguousMatch,
            nearest_offset: nearest_offset_by_levenshtein(anchor, &tokenized),
        },
    }
}

/// The candidate window of length `anchor.token_length` whose tokens have
/// the smallest Levenshtein distance to `anchor.canonical_tokens`, ties
/// broken by proximity to `anchor.token_offset`. `None` if `tokenized` has
/// no window of that length.
fn nearest_offset_by_levenshtein(anchor: &Anchor, tokenized: &Tokenized) -> Option<usize> {
    if anchor.token_length == 0 || tokenized.len() < anchor.token_length {
        return None;
    }
    (0..=(tokenized.len() - anchor.token_length))
        .min_by_key(|&start| {
            let window = &tokenized.tokens[start..start + anchor.token_length];
            let distance = levenshtein_distance(&anchor.canonical_tokens, window);
            let proximity = (start as i64 - anchor.token_offset as i64).unsigned_abs();
            (distance, proximity)
        })
}

/// Levenshtein distance between two token streams, used by the Structure
/// Extractor's diagnostics and exposed for callers that want an explicit
/// distance rather than just a resolution verdict.
pub fn levenshtein_distance(a: &[String], b: &[String]) -> usize {
    let (n, m) = (a.len(), b.len());
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];
    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// Classify drift between an anchor and a candidate body, independent of
/// whether `resolve` succeeded.
pub fn drift_report(anchor: &Anchor, candidate_content: &str) -> DriftReport {
    let resolution = resolve(anchor, candidate_content);
    match resolution {
        Resolution::Unchanged => DriftReport::default(),
        Resolution::Reanchored { token_offset, token_length } => DriftReport {
            content_changed: false,
            structure_changed: token_offset != anchor.token_offset,
            fingerprint_mismatch: false,
            suggested_reanchor: Some(crate::model::TokenSpan {
                offset: token_offset,
                length: token_length,
            }),
        },
        Resolution::Unresolved { .. } => DriftReport {
            content_changed: true,
            structure_changed: true,
            fingerprint_mismatch: true,
            suggested_reanchor: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    #[test]
    fn create_then_resolve_unchanged_content() {
        let text = normalize("# Intro\nalpha beta gamma delta");
        let anchor = create_anchor(&text, "/intro", 1, 2, FingerprintAlgo::Sha256).unwrap();
        assert!(matches!(resolve(&anchor, &text), Resolution::Unchanged));
    }

    #[test]
    fn create_rejects_out_of_range_span() {
        let text = normalize("alpha beta");
        let err = create_anchor(&text, "/", 0, 99, FingerprintAlgo::Sha256).unwrap_err();
        assert!(matches!(err, AnchorError::InvalidTokenSpan { .. }));
    }

    #[test]
    fn resolve_reanchors_after_prefix_insertion() {
        let original = normalize("# Intro\nalpha beta gamma delta");
        let anchor = create_anchor(&original, "/intro", 1, 2, FingerprintAlgo::Sha256).unwrap();
        let edited = normalize("# Intro\nzeta alpha beta gamma delta");
        match resolve(&anchor, &edited) {
            Resolution::Reanchored { token_offset, .. } => assert_eq!(token_offset, 2),
            other => panic!("expected reanchor, got {other:?}"),
        }
    }

    #[test]
    fn resolve_unresolved_when_span_removed() {
        let original = normalize("# Intro\nalpha beta gamma delta");
        let anchor = create_anchor(&original, "/intro", 1, 2, FingerprintAlgo::Sha256).unwrap();
        let edited = normalize("# Intro\ncompletely different words now");
        assert!(matches!(resolve(&anchor, &edited), Resolution::Unresolved { .. }));
    }

    #[test]
    fn unresolved_nearest_offset_picks_the_closest_edit_distance_window() {
        let original = normalize("alpha beta gamma delta");
        let anchor = create_anchor(&original, "/", 0, 2, FingerprintAlgo::Sha256).unwrap();
        // "alpha beta" survives as "alpha beto" (one substitution), followed
        // by tokens sharing nothing with the anchored span.
        let edited = normalize("alpha beto zzz qqq www");
        match resolve(&anchor, &edited) {
            Resolution::Unresolved { reason: UnresolvedReason::NoMatch, nearest_offset } => {
                assert_eq!(nearest_offset, Some(0));
            }
            other => panic!("expected unresolved no-match, got {other:?}"),
        }
    }

    #[test]
    fn blake3_fingerprint_detects_unchanged_and_changed_content() {
        let text = normalize("alpha beta gamma delta");
        let anchor = create_anchor(&text, "/", 1, 2, FingerprintAlgo::Blake3).unwrap();
        assert!(matches!(resolve(&anchor, &text), Resolution::Unchanged));

        let edited = normalize("alpha zeta gamma delta");
        assert!(!matches!(resolve(&anchor, &edited), Resolution::Unchanged));
    }

    #[test]
    fn create_anchor_records_its_canonical_tokens() {
        let text = normalize("alpha beta gamma delta");
        let anchor = create_anchor(&text, "/", 1, 2, FingerprintAlgo::Sha256).unwrap();
        assert_eq!(anchor.canonical_tokens, vec!["beta".to_string(), "gamma".to_string()]);
    }

    #[test]
    fn levenshtein_distance_identical_streams_is_zero() {
        let a = vec!["a".to_string(), "b".to_string()];
        assert_eq!(levenshtein_distance(&a, &a), 0);
    }

    #[test]
    fn levenshtein_distance_counts_substitutions() {
        let a = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let b = vec!["a".to_string(), "x".to_string(), "c".to_string()];
        assert_eq!(levenshtein_distance(&a, &b), 1);
    }

    #[test]
    fn drift_report_clean_on_unchanged_content() {
        let text = normalize("alpha beta gamma");
        let anchor = create_anchor(&text, "/", 0, 2, FingerprintAlgo::Sha256).unwrap();
        let report = drift_report(&anchor, &text);
        assert!(!report.content_changed);
        assert!(!report.fingerprint_mismatch);
    }
}
