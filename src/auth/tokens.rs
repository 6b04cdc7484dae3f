//! Session token issuance and validation.
//!
//! Tokens are opaque `"<nonce>.<mac>"` strings: a random 128-bit nonce,
//! hex-encoded, plus an HMAC-SHA256 tag over it under a per-process
//! random key. Validation runs in two explicit stages:
//! 1. Signature check — rejects anything this process never minted,
//!    including structurally valid tokens from a previous run.
//! 2. Registry check — rejects revoked or superseded tokens even when
//!    their signature still verifies.
//!
//! At most one token is live per identity: issuing a new one supersedes
//! the previous token before `issue` returns. Both maps are sharded by
//! key, so sessions for unrelated identities never contend.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::TryRngCore;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Session lifetime: 2 hours.
const TOKEN_LIFETIME_SECS: i64 = 2 * 60 * 60;

/// Nonce byte length before hex encoding.
const NONCE_BYTES: usize = 16;

/// Signing key byte length.
const KEY_BYTES: usize = 32;

/// Failure modes for token validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Unknown, malformed, or failed the signature check.
    #[error("session token is invalid")]
    Invalid,
    /// Known but past its expiry; it has been removed from the registry.
    #[error("session token has expired")]
    Expired,
}

#[derive(Debug, Clone)]
struct TokenInfo {
    identity: String,
    expires_at: DateTime<Utc>,
}

/// Concurrent registry of live session tokens.
pub struct SessionTokenRegistry {
    signing_key: [u8; KEY_BYTES],
    lifetime: Duration,
    /// token -> bound identity + expiry.
    tokens: DashMap<String, TokenInfo>,
    /// identity -> its single live token.
    by_identity: DashMap<String, String>,
}

impl SessionTokenRegistry {
    /// Registry with the standard 2-hour session lifetime.
    pub fn new() -> Self {
        Self::with_lifetime(TOKEN_LIFETIME_SECS)
    }

    /// Registry with a custom lifetime in seconds.
    pub fn with_lifetime(lifetime_secs: i64) -> Self {
        let mut signing_key = [0u8; KEY_BYTES];
        rand::rngs::OsRng
            .try_fill_bytes(&mut signing_key)
            .expect("OS RNG failure");
        Self {
            signing_key,
            lifetime: Duration::seconds(lifetime_secs),
            tokens: DashMap::new(),
            by_identity: DashMap::new(),
        }
    }

    /// Mint a fresh token for `identity`, superseding any previous one.
    ///
    /// Under concurrent calls for the same identity the last writer of
    /// the identity index wins; every superseded token is removed by
    /// whichever call displaced it.
    pub fn issue(&self, identity: &str) -> String {
        let token = self.mint();
        let info = TokenInfo {
            identity: identity.to_owned(),
            expires_at: Utc::now() + self.lifetime,
        };
        self.tokens.insert(token.clone(), info);

        if let Some(previous) = self.by_identity.insert(identity.to_owned(), token.clone()) {
            if previous != token {
                self.tokens.remove(&previous);
            }
        }

        tracing::debug!(identity, "session token issued");
        token
    }

    /// Resolve a token to its bound identity.
    ///
    /// An expired token is removed from the registry as a side effect,
    /// so a second call reports it as `Invalid`.
    pub fn validate(&self, token: &str) -> Result<String, TokenError> {
        if !self.verify_signature(token) {
            return Err(TokenError::Invalid);
        }

        // Clone out and release the shard lock before any removal below.
        let (identity, expires_at) = {
            let info = self.tokens.get(token).ok_or(TokenError::Invalid)?;
            (info.identity.clone(), info.expires_at)
        };

        if Utc::now() > expires_at {
            self.tokens.remove(token);
            self.by_identity
                .remove_if(&identity, |_, current| current == token);
            return Err(TokenError::Expired);
        }

        Ok(identity)
    }

    /// Remove a token. Unknown tokens are a no-op, so revocation is
    /// idempotent.
    pub fn revoke(&self, token: &str) {
        if let Some((_, info)) = self.tokens.remove(token) {
            self.by_identity
                .remove_if(&info.identity, |_, current| current == token);
            tracing::debug!(identity = %info.identity, "session token revoked");
        }
    }

    fn mint(&self) -> String {
        let mut nonce = [0u8; NONCE_BYTES];
        rand::rngs::OsRng
            .try_fill_bytes(&mut nonce)
            .expect("OS RNG failure");
        let nonce_hex = hex::encode(nonce);
        format!("{nonce_hex}.{}", self.sign(&nonce_hex))
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify_signature(&self, token: &str) -> bool {
        let Some((nonce_hex, mac_hex)) = token.split_once('.') else {
            return false;
        };
        let Ok(mac_bytes) = hex::decode(mac_hex) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(nonce_hex.as_bytes());
        mac.verify_slice(&mac_bytes).is_ok()
    }
}

impl Default for SessionTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
