//! Error types for the coupon service.
use thiserror::Error;

use crate::types::CodeId;

/// An identifier string that is not 32 hex characters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid id format: {0}")]
pub struct InvalidId(pub String);

/// Errors from the persistence layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("code not found: {0}")] CodeNotFound(CodeId),
    #[error("duplicate code value: {0}")] DuplicateValue(String),
    #[error("storage: {0}")] Backend(String),
    #[error("serialization: {0}")] Serialization(String),
}

/// Errors from the claim workflow. Each variant is a terminal outcome
/// for the current request; the allocator's internal retry on a lost
/// conditional update is not visible here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("session ID is required")] SessionRequired,
    #[error("address cooldown active: one code per cooldown window")] CooldownActive,
    #[error("session already claimed a code")] SessionAlreadyClaimed,
    #[error("no codes available")] NoCodesAvailable,
    /// The code was marked claimed but the claim record could not be
    /// written. The code's `claimed_by` field is the durable source of
    /// truth for operator remediation.
    #[error("claim record failed after allocating code {code_id}")]
    ClaimRecordFailed { code_id: CodeId },
    #[error(transparent)] Store(#[from] StoreError),
}

/// Errors from admin authentication and credential verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("user not found")] UnknownUser,
    #[error("invalid credentials")] InvalidCredentials,
    #[error("credential is missing")] MissingCredential,
    #[error("credential is invalid or expired")] Unauthorized,
    #[error("credential hashing: {0}")] Hashing(String),
    #[error(transparent)] Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_session_required() {
        assert_eq!(ClaimError::SessionRequired.to_string(), "session ID is required");
    }

    #[test]
    fn display_claim_record_failed_names_code() {
        let id = CodeId::from_bytes([1; 16]);
        let e = ClaimError::ClaimRecordFailed { code_id: id };
        assert!(e.to_string().contains(&id.to_string()));
    }

    #[test]
    fn store_error_converts_into_claim_error() {
        let e: ClaimError = StoreError::Backend("db closed".into()).into();
        assert_eq!(e, ClaimError::Store(StoreError::Backend("db closed".into())));
    }

    #[test]
    fn clone_and_eq() {
        let e1 = AuthError::InvalidCredentials;
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }
}
