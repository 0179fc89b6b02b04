//! Password hashing for student credentials (Argon2id, PHC strings).

use crate::error::CredentialError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};

pub const MIN_PASSWORD_LEN: usize = 6;

/// The engine never inspects the returned string.
pub trait CredentialHasher: Sync {
    fn hash(&self, plaintext: &str) -> Result<String, CredentialError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| CredentialError(e.to_string()))
    }
}
