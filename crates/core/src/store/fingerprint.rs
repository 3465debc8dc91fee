//! Content fingerprints for change detection.

use sha2::{Digest, Sha256};

/// Compute the fingerprint of a page's textual content.
///
/// Only ever compared for equality; never used to address rows.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stability() {
        let a = fingerprint("# React Hooks\n\nuseState is...");
        let b = fingerprint("# React Hooks\n\nuseState is...");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_detects_change() {
        assert_ne!(fingerprint("# Version 1"), fingerprint("# Version 2"));
        assert_ne!(fingerprint("trailing"), fingerprint("trailing "));
    }

    #[test]
    fn test_fingerprint_format() {
        let hash = fingerprint("");
        assert_eq!(hash, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
        assert!(fingerprint("日本語 🔥").chars().all(|c| c.is_ascii_hexdigit()));
    }
}
