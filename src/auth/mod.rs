//! Authentication: login credentials and session tokens.
//!
//! Two collaborating stores with distinct lifetimes:
//! - [`CredentialStore`]: SQLite-persisted logins with PBKDF2-stretched
//!   password hashes.
//! - [`SessionTokenRegistry`]: in-memory HMAC-signed bearer tokens,
//!   one live token per identity, 2-hour lifetime.
//!
//! ## Design Decisions
//! - No external JWT dependency — tokens are opaque signed nonces with
//!   a server-side registry lookup, so revocation and supersession take
//!   effect immediately.
//! - Validation is deliberately two-staged (signature, then registry)
//!   so a superseded token is rejected even though its signature still
//!   verifies.

pub mod credentials;
pub mod tokens;

pub use credentials::CredentialStore;
pub use tokens::{SessionTokenRegistry, TokenError};
