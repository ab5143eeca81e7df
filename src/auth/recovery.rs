use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// Raw token entropy: 20 random bytes, hex-encoded (160 bits).
pub const TOKEN_BYTES: usize = 20;

/// How long a recovery token stays redeemable.
pub const RECOVERY_WINDOW: Duration = Duration::minutes(20);

/// One-time reset token in its dual representation: the raw value goes to the
/// user exactly once (inside the reset URL); only the digest is persisted.
#[derive(Debug, Clone)]
pub struct RecoveryToken {
    pub raw: String,
    pub hashed: String,
    pub expires_at: OffsetDateTime,
}

pub fn generate(now: OffsetDateTime) -> RecoveryToken {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    let raw = hex::encode(buf);
    RecoveryToken {
        hashed: digest(&raw),
        expires_at: now + RECOVERY_WINDOW,
        raw,
    }
}

/// Deterministic lookup digest of a caller-supplied raw token.
pub fn digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
