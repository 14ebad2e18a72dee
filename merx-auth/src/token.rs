//! Access tokens (signed, stateless) and refresh tokens (opaque,
//! stateful).
//!
//! The access token is an HS256 JWT carrying the tenant binding in its
//! claims; verification is pure signature and claim checking with no
//! storage round-trip. The refresh token is 32 random bytes encoded
//! URL-safe; only its SHA-256 hex digest is ever persisted or compared.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use merx_domain::{Principal, PrincipalId, Role, TenantId};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims of one access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Principal ID.
    pub sub: String,
    /// Tenant the token is bound to.
    pub tenant_id: String,
    /// Role string (see [`Role::as_str`]).
    pub role: String,
    /// Issuer.
    pub iss: String,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Token ID.
    pub jti: String,
}

impl AccessClaims {
    /// Parsed principal ID.
    pub fn principal_id(&self) -> Result<PrincipalId, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenInvalid)
    }

    /// Parsed tenant binding.
    pub fn tenant_id(&self) -> Result<TenantId, AuthError> {
        Uuid::parse_str(&self.tenant_id).map_err(|_| AuthError::TokenInvalid)
    }

    /// Parsed role.
    pub fn role(&self) -> Result<Role, AuthError> {
        Role::parse(&self.role).ok_or(AuthError::TokenInvalid)
    }
}

/// Sign an access token for a principal.
pub fn issue_access_token(config: &AuthConfig, principal: &Principal) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = AccessClaims {
        sub: principal.id.to_string(),
        tenant_id: principal.tenant_id.to_string(),
        role: principal.role.as_str().to_string(),
        iss: config.issuer.clone(),
        iat: now,
        exp: now + config.access_ttl_secs as i64,
        jti: Uuid::now_v7().to_string(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AuthError::Crypto(e.to_string()))
}

/// Verify signature, expiry, and issuer of an access token.
pub fn verify_access_token(config: &AuthConfig, token: &str) -> Result<AccessClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "iss"]);
    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    })
}

/// Generate an opaque refresh token. Returns `(raw, sha256_hex)`; the raw
/// form goes to the client once and is never stored.
pub fn generate_refresh_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let raw = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_refresh_token(&raw);
    (raw, hash)
}

/// SHA-256 hex digest of a raw refresh token, the only stored form.
pub fn hash_refresh_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use merx_domain::Principal;

    fn principal() -> Principal {
        Principal::new(Uuid::now_v7(), "a@b.c", Role::Customer, "$argon2id$stub")
    }

    #[test]
    fn token_roundtrip_preserves_claims() {
        let cfg = AuthConfig::test();
        let p = principal();
        let token = issue_access_token(&cfg, &p).unwrap();
        let claims = verify_access_token(&cfg, &token).unwrap();
        assert_eq!(claims.principal_id().unwrap(), p.id);
        assert_eq!(claims.tenant_id().unwrap(), p.tenant_id);
        assert_eq!(claims.role().unwrap(), Role::Customer);
        assert_eq!(claims.iss, "merx-test");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let cfg = AuthConfig::test();
        let token = issue_access_token(&cfg, &principal()).unwrap();
        let mut other = AuthConfig::test();
        other.jwt_secret = "another-secret-another-secret-12345!".to_string();
        assert!(matches!(
            verify_access_token(&other, &token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn expired_token_is_classified_as_expired() {
        let mut cfg = AuthConfig::test();
        cfg.access_ttl_secs = 0;
        let token = issue_access_token(&cfg, &principal()).unwrap();
        // Default validation leeway is 60s; turn it off to test expiry.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&cfg.issuer]);
        let err = decode::<AccessClaims>(
            &token,
            &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            &validation,
        )
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            jsonwebtoken::errors::ErrorKind::ExpiredSignature
        ));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let cfg = AuthConfig::test();
        let token = issue_access_token(&cfg, &principal()).unwrap();
        let mut other = AuthConfig::test();
        other.issuer = "someone-else".to_string();
        assert!(matches!(
            verify_access_token(&other, &token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn refresh_tokens_are_unique_and_url_safe() {
        let (raw1, hash1) = generate_refresh_token();
        let (raw2, hash2) = generate_refresh_token();
        assert_ne!(raw1, raw2);
        assert_ne!(hash1, hash2);
        assert_eq!(raw1.len(), 43);
        assert!(raw1.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(hash_refresh_token(&raw1), hash1);
        assert_eq!(hash1.len(), 64);
    }
}
