use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while running a registration or authentication ceremony.
///
/// Every variant is terminal for the current `finish_*` call: no partial
/// credential is persisted and the client must restart the ceremony from
/// `start_registration`/`start_authentication`.
#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("truncated authenticator data: {0}")]
    TruncatedAuthenticatorData(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Covers a missing pending ceremony, an expired challenge, a consumed
    /// challenge, and a challenge bound to the other ceremony kind.
    #[error("challenge mismatch or no pending ceremony")]
    ChallengeMismatch,

    #[error("unknown credential: {0}")]
    UnknownCredential(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Reported signature counter did not advance past the stored one,
    /// which indicates a possible cloned authenticator. The ceremony fails
    /// and state is not advanced; the caller decides account policy.
    #[error("signature counter did not advance: stored {stored}, reported {reported}")]
    SuspiciousSignatureCounter { stored: u32, reported: u32 },

    #[error("relying party id hash mismatch")]
    RelyingPartyMismatch,

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification required but not performed")]
    UserVerificationRequired,

    #[error("origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    #[error("unsupported attestation format: {0}")]
    UnsupportedAttestationFormat(String),

    #[error("invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CeremonyError>;
