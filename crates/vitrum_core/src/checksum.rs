//! Content checksums.
//!
//! A document's checksum is the SHA-256 of its body bytes (the content after
//! the front-matter fence), serialized as `sha256:<hex>`. Checksums are the
//! identity used for convergence and divergence detection between an adopted
//! document and its origin; because the front-matter is excluded, metadata
//! writes by the sync service never change a document's checksum.

use sha2::{Digest, Sha256};

/// Prefix carried by every serialized checksum.
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// Compute the `sha256:<hex>` checksum of a document body.
pub fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{CHECKSUM_PREFIX}{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_value() {
        // sha256("hello")
        assert_eq!(
            checksum("hello"),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(
            checksum(""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_checksum_differs_on_content() {
        assert_ne!(checksum("hello"), checksum("hello world"));
    }
}
