//! Administrator authentication and opaque session credentials.
//!
//! Secrets are hashed with argon2 (salted; verification is
//! constant-time by construction). Issued credentials are Ed25519-signed
//! tokens carrying the administrator's username and an expiry, encoded
//! as `hex(payload).hex(signature)` — opaque to holders and valid for
//! 24 hours. The signing key is derived from a configured secret with a
//! BLAKE3 KDF so it survives restarts.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use tracing::info;

use crate::error::AuthError;
use crate::traits::CouponStore;
use crate::types::Administrator;

/// BLAKE3 KDF context for deriving the token signing key.
const TOKEN_KDF_CONTEXT: &str = "coupon-admin-token-signing-v1";

/// Credential validity from issuance.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Hash a secret for storage.
pub fn hash_secret(secret: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a secret against a stored hash.
pub fn verify_secret(secret: &str, credential_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(credential_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// The signed payload inside a credential token.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TokenClaims {
    pub username: String,
    /// Expiry as unix seconds.
    pub expires_at: i64,
}

/// Derive the token signing key from a configured secret.
pub fn derive_signing_key(secret: &[u8]) -> SigningKey {
    let key = blake3::derive_key(TOKEN_KDF_CONTEXT, secret);
    SigningKey::from_bytes(&key)
}

/// Encode and sign a token: `hex(payload).hex(signature)`.
pub fn sign_token(key: &SigningKey, claims: &TokenClaims) -> Result<String, AuthError> {
    let payload = bincode::encode_to_vec(claims, bincode::config::standard())
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    let signature = key.sign(&payload);
    Ok(format!("{}.{}", hex::encode(&payload), hex::encode(signature.to_bytes())))
}

/// Decode a token and verify its signature and expiry as of `now`.
///
/// Any malformation — wrong shape, bad hex, bad signature, undecodable
/// payload, or expiry in the past — collapses to `Unauthorized`; the
/// holder learns nothing about which check failed.
pub fn verify_token_at(
    key: &SigningKey,
    token: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, AuthError> {
    let (payload_hex, sig_hex) = token.split_once('.').ok_or(AuthError::Unauthorized)?;
    let payload = hex::decode(payload_hex).map_err(|_| AuthError::Unauthorized)?;
    let sig_bytes = hex::decode(sig_hex).map_err(|_| AuthError::Unauthorized)?;
    let sig_array: [u8; 64] = sig_bytes.try_into().map_err(|_| AuthError::Unauthorized)?;
    let signature = Signature::from_bytes(&sig_array);

    key.verifying_key()
        .verify(&payload, &signature)
        .map_err(|_| AuthError::Unauthorized)?;

    let (claims, _): (TokenClaims, usize) =
        bincode::decode_from_slice(&payload, bincode::config::standard())
            .map_err(|_| AuthError::Unauthorized)?;

    if claims.expires_at <= now.timestamp() {
        return Err(AuthError::Unauthorized);
    }
    Ok(claims)
}

/// Guard in front of all inventory mutation and ledger reads: issues
/// credentials on login and verifies them before a handler touches the
/// store.
#[derive(Clone)]
pub struct AdminAuth {
    store: Arc<dyn CouponStore>,
    signing_key: SigningKey,
}

impl AdminAuth {
    pub fn new(store: Arc<dyn CouponStore>, token_secret: &[u8]) -> Self {
        Self { store, signing_key: derive_signing_key(token_secret) }
    }

    /// Exchange a username and secret for a time-bounded credential.
    pub fn authenticate(&self, username: &str, secret: &str) -> Result<String, AuthError> {
        let admin = self
            .store
            .find_admin(username)?
            .ok_or(AuthError::UnknownUser)?;

        if !verify_secret(secret, &admin.credential_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let claims = TokenClaims {
            username: admin.username,
            expires_at: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        sign_token(&self.signing_key, &claims)
    }

    /// Verify a credential and resolve it to a live administrator.
    ///
    /// Fails with `Unauthorized` if the token is malformed, expired, or
    /// names an administrator that no longer exists.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let claims = verify_token_at(&self.signing_key, token, Utc::now())?;
        match self.store.find_admin(&claims.username)? {
            Some(admin) => Ok(admin.username),
            None => Err(AuthError::Unauthorized),
        }
    }

    /// Create the default administrator iff none exists yet. Returns
    /// whether an account was created.
    pub fn bootstrap(&self, username: &str, secret: &str) -> Result<bool, AuthError> {
        if self.store.admin_count()? > 0 {
            return Ok(false);
        }
        let admin = Administrator {
            username: username.to_string(),
            credential_hash: hash_secret(secret)?,
        };
        self.store.insert_admin(admin)?;
        info!(%username, "default administrator created");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_verifies() {
        let hash = hash_secret("hunter2").unwrap();
        assert!(verify_secret("hunter2", &hash));
        assert!(!verify_secret("hunter3", &hash));
    }

    #[test]
    fn verify_secret_rejects_garbage_hash() {
        assert!(!verify_secret("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn token_roundtrip() {
        let key = derive_signing_key(b"test secret");
        let claims = TokenClaims {
            username: "admin".into(),
            expires_at: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = sign_token(&key, &claims).unwrap();
        let back = verify_token_at(&key, &token, Utc::now()).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn expired_token_rejected() {
        let key = derive_signing_key(b"test secret");
        let claims = TokenClaims { username: "admin".into(), expires_at: 1_000 };
        let token = sign_token(&key, &claims).unwrap();
        let err = verify_token_at(&key, &token, Utc::now()).unwrap_err();
        assert_eq!(err, AuthError::Unauthorized);
    }

    #[test]
    fn tampered_token_rejected() {
        let key = derive_signing_key(b"test secret");
        let claims = TokenClaims {
            username: "admin".into(),
            expires_at: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = sign_token(&key, &claims).unwrap();

        // Flip one nibble of the payload.
        let mut chars: Vec<char> = token.chars().collect();
        chars[0] = if chars[0] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();
        assert_eq!(
            verify_token_at(&key, &tampered, Utc::now()).unwrap_err(),
            AuthError::Unauthorized
        );
    }

    #[test]
    fn token_from_other_key_rejected() {
        let key_a = derive_signing_key(b"secret a");
        let key_b = derive_signing_key(b"secret b");
        let claims = TokenClaims {
            username: "admin".into(),
            expires_at: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = sign_token(&key_a, &claims).unwrap();
        assert!(verify_token_at(&key_b, &token, Utc::now()).is_err());
    }

    #[test]
    fn malformed_tokens_rejected() {
        let key = derive_signing_key(b"test secret");
        for token in ["", "nodot", "zz.zz", "abcd.", ".abcd", "abcd.abcd"] {
            assert!(verify_token_at(&key, token, Utc::now()).is_err(), "{token:?}");
        }
    }
}
