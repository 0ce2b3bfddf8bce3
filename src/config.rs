//! Service-wide tunables (SPEC_FULL.md §4.7).

use std::time::Duration;

use crate::ids::token::SigningKey;

/// Redundancy-scheme-independent limits and knobs the service enforces.
#[derive(Clone)]
pub struct Config {
    /// Maximum size of `EncryptedMetadata` accepted by `CommitObject`.
    pub max_metadata_size: usize,
    /// Maximum size of an inline segment's ciphertext.
    pub max_inline_segment_size: usize,
    /// Maximum size of a single remote segment's ciphertext.
    pub max_encrypted_segment_size: usize,
    /// How long a signed session token remains valid after issuance.
    pub token_ttl: Duration,
    /// Key used to MAC-sign session tokens.
    pub signing_key: SigningKey,
    /// Fraction of piece-delete requests per dispatch that must succeed
    /// before the dispatcher considers the round acceptable (spec.md §4.6).
    pub piece_deletion_success_threshold: f64,
    /// Cap on segments a single `FinishCopyObject` transaction will load
    /// (SPEC_FULL.md §3).
    pub max_copy_segments: usize,
    /// Capacity of the per-process auth rate-limiter cache (spec.md §5).
    pub rate_limiter_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_metadata_size: 64 * 1024,
            max_inline_segment_size: 4 * 1024,
            max_encrypted_segment_size: 64 * 1024 * 1024,
            token_ttl: Duration::from_secs(48 * 3600),
            signing_key: SigningKey::generate(),
            piece_deletion_success_threshold: 0.75,
            max_copy_segments: 10_000,
            rate_limiter_cache_capacity: 10_000,
        }
    }
}

impl Config {
    /// A configuration tuned for deterministic, fast tests: a fixed signing
    /// key so signed tokens are reproducible across test runs, and a short
    /// TTL so expiry can be exercised without sleeping.
    pub fn for_tests() -> Self {
        Self {
            signing_key: SigningKey::from_bytes([7u8; 32]),
            token_ttl: Duration::from_secs(60),
            ..Self::default()
        }
    }
}
