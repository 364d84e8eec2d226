use sha2::{Digest, Sha256};

/// Generic SHA256 helper — returns a lowercase hex-encoded digest.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content hash of a Version's body.
///
/// Always applied after normalization so identical semantic content
/// produces an identical hash regardless of source formatting.
pub fn compute_content_hash(normalized_body: &str) -> String {
    sha256_hex(normalized_body)
}
