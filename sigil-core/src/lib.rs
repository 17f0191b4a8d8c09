//! Sigil Core - Passkey ceremony manager
//!
//! This crate implements the registration and authentication handshakes of a
//! WebAuthn-style passkey protocol: it issues one-time challenges, decodes
//! the CBOR attestation/assertion objects produced by client authenticators,
//! verifies ES256 signatures, and records credentials against stored public
//! keys.
//!
//! # Features
//!
//! - One-time challenges with TTL expiry, atomically consumed on finish
//! - Adversarial-input parsing of attestation objects and authenticator data
//! - ES256 (ECDSA/P-256/SHA-256) signature verification, other algorithms
//!   rejected explicitly
//! - Signature-counter monotonicity check against cloned authenticators
//! - Pluggable storage: in-process maps or PostgreSQL (feature `postgres`)
//!
//! # Example
//!
//! ```no_run
//! use sigil_core::{CeremonyManager, RelyingParty, Subject};
//!
//! # async fn example() -> sigil_core::Result<()> {
//! let manager = CeremonyManager::in_memory(RelyingParty::new("Example", "example.com"));
//!
//! let subject = Subject::new("u1", "alice", "Alice Example");
//! let options = manager.start_registration(&subject).await?;
//! // Forward `options` to the client credential API; pass the returned
//! // response to `manager.finish_registration(&subject, &response)`.
//! # Ok(())
//! # }
//! ```

pub mod ceremony;
pub mod codec;
pub mod config;
pub mod cose;
pub mod crypto;
pub mod error;
pub mod store;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use ceremony::CeremonyManager;
pub use codec::{AttestationObject, AttestedCredential, AuthenticatorData};
pub use config::{parse_ttl, IdentityAttribute, RelyingParty};
pub use error::{CeremonyError, Result};
pub use store::{ChallengeStore, CredentialRepository, PendingCeremony, StoreError};
pub use types::{
    AuthenticationOptions, AuthenticationOutcome, AuthenticationResponse, CeremonyKind,
    CollectedClientData, Credential, CredentialDescriptor, RegistrationOptions,
    RegistrationOutcome, RegistrationResponse, Subject,
};
