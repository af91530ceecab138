//! Identifier generators for [`crate::recordset::RecordSet`].
//!
//! Three implementations share one contract: `generate(document) -> String`.
//! The choice of generator is a construction-time decision on the record
//! set, never inferred from content.

use sha2::{Digest, Sha256};

/// Assigns identifiers to records lacking one.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, document: Option<&str>) -> String;
}

/// SHA-256 of the UTF-8 document bytes, hex-encoded. Deterministic: two
/// calls with the same document produce the same id, which makes this
/// generator useful for idempotent re-ingestion but unsuitable when
/// `document` is absent or when duplicate content is expected to get
/// distinct ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentHashId;

impl IdGenerator for ContentHashId {
    fn generate(&self, document: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(document.unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// RFC 4122 random (v4-shaped) 128-bit identifier. Non-deterministic,
/// collision-free in practice; ignores `document`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomId;

impl IdGenerator for RandomId {
    fn generate(&self, _document: Option<&str>) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// 128-bit identifier with a millisecond-resolution timestamp prefix and a
/// random tail, encoded so that lexicographic string order approximates
/// insertion order. Layout: 12 hex digits of the millisecond timestamp,
/// followed by 20 hex digits (80 bits) of random tail.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicographicId;

impl IdGenerator for LexicographicId {
    fn generate(&self, _document: Option<&str>) -> String {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let tail: [u8; 10] = rand::random();
        format!("{millis:012x}{}", hex::encode(tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let gen = ContentHashId;
        assert_eq!(gen.generate(Some("hello")), gen.generate(Some("hello")));
        assert_ne!(gen.generate(Some("hello")), gen.generate(Some("world")));
    }

    #[test]
    fn random_ids_do_not_collide() {
        let gen = RandomId;
        let a = gen.generate(None);
        let b = gen.generate(None);
        assert_ne!(a, b);
    }

    #[test]
    fn lexicographic_ids_sort_with_time() {
        let gen = LexicographicId;
        let a = gen.generate(None);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = gen.generate(None);
        assert!(a < b);
        assert_eq!(a.len(), 32);
    }
}
