//! Argon2id password hashing in PHC string format.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use merx_domain::Password;

use crate::error::AuthError;

fn hasher(pepper: Option<&str>) -> Result<Argon2<'_>, AuthError> {
    match pepper {
        Some(p) => Argon2::new_with_secret(
            p.as_bytes(),
            Algorithm::Argon2id,
            Version::V0x13,
            Params::default(),
        )
        .map_err(|e| AuthError::Crypto(e.to_string())),
        None => Ok(Argon2::default()),
    }
}

/// Hash a cleartext password. Output is a PHC string embedding algorithm,
/// parameters, and salt.
pub fn hash_password(password: &Password, pepper: Option<&str>) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher(pepper)?
        .hash_password(password.expose().as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Crypto(e.to_string()))
}

/// Verify a cleartext password against a stored PHC hash.
pub fn verify_password(
    password: &Password,
    phc_hash: &str,
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(phc_hash).map_err(|e| AuthError::Crypto(e.to_string()))?;
    match hasher(pepper)?.verify_password(password.expose().as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(e.to_string())),
    }
}
