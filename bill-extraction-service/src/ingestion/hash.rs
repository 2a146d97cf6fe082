//! Content fingerprints for acquired documents.

use sha2::{Digest, Sha256};

/// SHA-256 of the document bytes as a lowercase hex string.
///
/// Logged after acquisition so repeated submissions of the same bill can be
/// correlated across requests.
pub fn document_fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
