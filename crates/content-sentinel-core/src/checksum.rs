//! Content identity digests.
//!
//! A [`Checksum`] is a SHA-256-class digest rendered as exactly 64
//! hexadecimal characters. Comparison is byte-exact: `"ab…"` and `"AB…"`
//! are different checksums, and no case folding is applied on parse.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Required length of every checksum string.
pub const CHECKSUM_LEN: usize = 64;

/// A validated 64-character hexadecimal content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Validate a digest string, returning a human-readable reason on failure.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.len() != CHECKSUM_LEN {
            return Err(format!(
                "checksum must be {} characters, got {}",
                CHECKSUM_LEN,
                raw.len()
            ));
        }
        if let Some(bad) = raw.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(format!("checksum contains non-hex character '{}'", bad));
        }
        Ok(Self(raw.to_string()))
    }

    /// SHA-256 of `bytes`, lowercase hex. Used by ingestion collaborators only;
    /// the detection engine never hashes content itself.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Checksum {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_64_hex_chars() {
        let c = Checksum::parse(&"A".repeat(64)).unwrap();
        assert_eq!(c.as_str().len(), 64);
    }

    #[test]
    fn test_rejects_short_digest() {
        let err = Checksum::parse("abc").unwrap_err();
        assert!(err.contains("64"));
        assert!(err.contains("got 3"));
    }

    #[test]
    fn test_rejects_non_hex() {
        let raw = format!("{}z", "a".repeat(63));
        let err = Checksum::parse(&raw).unwrap_err();
        assert!(err.contains("'z'"));
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let lower = Checksum::parse(&"a".repeat(64)).unwrap();
        let upper = Checksum::parse(&"A".repeat(64)).unwrap();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_of_bytes_known_vector() {
        let c = Checksum::of_bytes(b"abc");
        assert_eq!(
            c.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_serde_rejects_malformed() {
        let ok: Result<Checksum, _> = serde_json::from_str(&format!("\"{}\"", "b".repeat(64)));
        assert!(ok.is_ok());
        let bad: Result<Checksum, _> = serde_json::from_str("\"short\"");
        assert!(bad.is_err());
    }
}
