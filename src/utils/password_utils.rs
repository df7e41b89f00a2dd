//! Password hashing and verification

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHashString, PasswordVerifier, SaltString},
    Argon2, PasswordHasher,
};
use derive_more::derive::Display;
use log::error;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::sync::LazyLock;
use thiserror::Error;

static DEFAULT_HASHER: LazyLock<Argon2<'static>> = LazyLock::new(Argon2::default);

/// Hash of the empty password, checked when the user does not exist so that
/// unknown and known usernames take the same time to reject.
static EMPTY_HASH: LazyLock<Option<PWHash>> = LazyLock::new(|| hash("").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("Password hashing failed")]
    Hashing,
    #[error("Stored password hash is not a valid PHC string")]
    Malformed,
}

/// A hashed password, stored as its PHC string.
#[derive(Clone, Debug, Display)]
pub struct PWHash(PasswordHashString);

impl PWHash {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<&str> for PWHash {
    type Error = HashError;

    fn try_from(phc: &str) -> Result<Self, Self::Error> {
        PasswordHashString::new(phc)
            .map(PWHash)
            .map_err(|_| HashError::Malformed)
    }
}

impl ToSql for PWHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for PWHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let phc = value.as_str()?;
        PWHash::try_from(phc).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Hashes a clear-text password with Argon2id and a random salt.
pub fn hash(password: &str) -> Result<PWHash, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = DEFAULT_HASHER
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| HashError::Hashing)?
        .serialize();

    Ok(PWHash(hash))
}

/// Checks `password` against the stored hash.
///
/// Without a stored hash the password is still checked against a dummy hash,
/// and the answer is always `false`.
pub fn verify(password: &str, maybe_hash: Option<&PWHash>) -> bool {
    let Some(hash) = maybe_hash.or(EMPTY_HASH.as_ref()) else {
        return false;
    };

    let matches = DEFAULT_HASHER
        .verify_password(password.as_bytes(), &hash.0.password_hash())
        .is_ok();

    matches && maybe_hash.is_some()
}

/// Runs a hashing job on the blocking pool, away from the async workers.
pub async fn off_thread<T, F>(job: F) -> Result<T, HashError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|e| {
        error!("Password job did not complete: {e}");
        HashError::Hashing
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let stored = hash("adminpass").unwrap();
        assert!(verify("adminpass", Some(&stored)));
        assert!(!verify("adminPass", Some(&stored)));
    }

    #[test]
    fn test_unknown_user_never_matches() {
        assert!(!verify("", None));
        assert!(!verify("anything", None));
    }

    #[test]
    fn test_phc_string_round_trip() {
        let stored = hash("secret").unwrap();
        let parsed = PWHash::try_from(stored.as_str()).unwrap();
        assert!(verify("secret", Some(&parsed)));
        assert_eq!(PWHash::try_from("not a hash").unwrap_err(), HashError::Malformed);
    }

    #[tokio::test]
    async fn test_off_thread_hashing() {
        let stored = off_thread(|| hash("frontdesk")).await.unwrap().unwrap();
        let matches = off_thread(move || verify("frontdesk", Some(&stored)))
            .await
            .unwrap();
        assert!(matches);
    }
}
