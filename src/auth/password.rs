use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::AccountError;

/// Pluggable password hashing strategy.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a storable digest.
    fn hash(&self, plain: &str) -> Result<String, AccountError>;

    /// Verify a plaintext password against a stored digest. An unreadable
    /// digest counts as a mismatch.
    fn verify(&self, plain: &str, digest: &str) -> bool;
}

/// Argon2id hasher, the default strategy.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, AccountError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AccountError::Hasher(format!("Failed to hash password: {}", e)))
    }

    fn verify(&self, plain: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
