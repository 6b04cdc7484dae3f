//! SQLite-backed credential store.
//!
//! Table:
//! - `users`: login, password_hash, salt, created_at
//!
//! Passwords are stretched with PBKDF2-HMAC-SHA256 (100k rounds) over a
//! per-user random salt; hash and salt are stored hex-encoded.
//! Verification compares in constant time and performs a dummy
//! derivation for unknown logins so lookups are timing-uniform.

use anyhow::{bail, Result};
use parking_lot::Mutex;
use rand::TryRngCore;
use sha2::Sha256;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Derived key byte length.
const DERIVED_KEY_BYTES: usize = 32;

/// Number of PBKDF2 rounds for password stretching.
const PBKDF2_ROUNDS: u32 = 100_000;

/// SQLite-backed store of login credentials.
pub struct CredentialStore {
    conn: Mutex<rusqlite::Connection>,
}

impl CredentialStore {
    /// Open (or create) the credential database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register a new login.
    pub fn register(&self, login: &str, password: &str) -> Result<()> {
        let trimmed = login.trim();
        if trimmed.is_empty() {
            bail!("Login cannot be empty");
        }
        if password.trim().is_empty() {
            bail!("Password cannot be empty");
        }

        let salt = generate_salt();
        let password_hash = hash_password(password, &salt);
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (login, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![trimmed, password_hash, salt, now as i64],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("Login '{}' is already registered", trimmed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check a login/password pair. `Ok(false)` covers both unknown
    /// logins and wrong passwords.
    pub fn verify(&self, login: &str, password: &str) -> Result<bool> {
        let row: Result<(String, String), _> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT password_hash, salt FROM users WHERE login = ?1",
                rusqlite::params![login.trim()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
        };

        match row {
            Ok((stored_hash, salt)) => {
                let attempt_hash = hash_password(password, &salt);
                Ok(constant_time_eq(
                    stored_hash.as_bytes(),
                    attempt_hash.as_bytes(),
                ))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                // Dummy derivation to level out the timing side-channel
                let _ = hash_password(password, "00000000000000000000000000000000");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ── Cryptographic Helpers ───────────────────────────────────────────

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure");
    hex::encode(bytes)
}

/// Stretch a password over a hex-encoded salt with PBKDF2-HMAC-SHA256.
fn hash_password(password: &str, salt: &str) -> String {
    let mut derived = [0u8; DERIVED_KEY_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ROUNDS,
        &mut derived,
    );
    hex::encode(derived)
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn register_and_verify() {
        let store = CredentialStore::open_in_memory().unwrap();

        store.register("test_user", "correct horse").unwrap();
        assert!(store.verify("test_user", "correct horse").unwrap());
        assert!(!store.verify("test_user", "wrong horse").unwrap());
    }

    #[test]
    fn register_duplicate_login_fails() {
        let store = CredentialStore::open_in_memory().unwrap();

        store.register("test_user", "password").unwrap();
        let result = store.register("test_user", "other_password");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already registered"));
    }

    #[test]
    fn register_trims_login() {
        let store = CredentialStore::open_in_memory().unwrap();

        store.register("  test_user  ", "password").unwrap();
        assert!(store.verify("test_user", "password").unwrap());
        let duplicate = store.register("test_user", "password");
        assert!(duplicate.is_err());
    }

    #[test]
    fn register_empty_login_fails() {
        let store = CredentialStore::open_in_memory().unwrap();

        let result = store.register("   ", "password");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn register_empty_password_fails() {
        let store = CredentialStore::open_in_memory().unwrap();

        let result = store.register("test_user", "");
        assert!(result.is_err());
    }

    #[test]
    fn verify_unknown_login_is_false() {
        let store = CredentialStore::open_in_memory().unwrap();
        assert!(!store.verify("ghost", "anything").unwrap());
    }

    #[test]
    fn store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("credentials.db");

        {
            let store = CredentialStore::open(&db_path).unwrap();
            store.register("test_user", "password").unwrap();
        }

        let reopened = CredentialStore::open(&db_path).unwrap();
        assert!(reopened.verify("test_user", "password").unwrap());
    }

    #[test]
    fn password_hash_is_deterministic_with_same_salt() {
        let h1 = hash_password("test_password", "fixed_salt_value");
        let h2 = hash_password("test_password", "fixed_salt_value");
        assert_eq!(h1, h2);
    }

    #[test]
    fn password_hash_differs_with_different_salt() {
        let h1 = hash_password("test_password", "salt_a");
        let h2 = hash_password("test_password", "salt_b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
