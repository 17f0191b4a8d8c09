//! Challenge and credential storage
//!
//! Two fronts, each pluggable between an in-process map and PostgreSQL:
//!
//! - [`ChallengeStore`] holds the single outstanding challenge per subject.
//!   Challenges are short-lived and consumed atomically, so the in-memory
//!   backend is the usual choice even when credentials are persisted.
//! - [`CredentialRepository`] owns the mapping from subject to registered
//!   credentials and survives restarts when backed by PostgreSQL.
//!
//! If `DATABASE_URL` is not set, `from_env` falls back to in-memory storage
//! (useful for development, state is lost on restart).

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::{MemoryChallengeStore, MemoryCredentialStore};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresChallengeStore, PostgresCredentialStore};

use std::time::Duration;

use crate::types::{CeremonyKind, Credential};

/// Storage errors, surfaced to callers as `BackendUnavailable`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The outstanding ceremony for a subject: which kind was started and the
/// challenge that must come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCeremony {
    pub kind: CeremonyKind,
    pub challenge: String,
}

enum ChallengeBackend {
    Memory(MemoryChallengeStore),
    #[cfg(feature = "postgres")]
    Postgres(PostgresChallengeStore),
}

/// TTL-scoped storage of the outstanding challenge per subject key.
pub struct ChallengeStore {
    backend: ChallengeBackend,
}

impl ChallengeStore {
    /// In-process store backed by a concurrent map.
    pub fn in_memory() -> Self {
        Self {
            backend: ChallengeBackend::Memory(MemoryChallengeStore::new()),
        }
    }

    /// PostgreSQL-backed store; creates the challenge table if needed.
    #[cfg(feature = "postgres")]
    pub async fn with_postgres(database_url: &str) -> Result<Self, StoreError> {
        let store = PostgresChallengeStore::new(database_url).await?;
        store.migrate().await?;
        Ok(Self {
            backend: ChallengeBackend::Postgres(store),
        })
    }

    /// Use PostgreSQL when `DATABASE_URL` is set, otherwise memory.
    pub async fn from_env() -> Result<Self, StoreError> {
        #[cfg(feature = "postgres")]
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                tracing::info!("using PostgreSQL challenge store");
                return Self::with_postgres(&url).await;
            }
        }
        tracing::debug!("DATABASE_URL not set, challenges held in memory");
        Ok(Self::in_memory())
    }

    pub fn is_persistent(&self) -> bool {
        match &self.backend {
            ChallengeBackend::Memory(_) => false,
            #[cfg(feature = "postgres")]
            ChallengeBackend::Postgres(_) => true,
        }
    }

    /// Store the pending ceremony for a subject, replacing any prior entry
    /// (last challenge wins).
    pub async fn put(
        &self,
        subject_key: &str,
        pending: PendingCeremony,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        match &self.backend {
            ChallengeBackend::Memory(store) => {
                store.put(subject_key, pending, ttl);
                Ok(())
            }
            #[cfg(feature = "postgres")]
            ChallengeBackend::Postgres(store) => store.put(subject_key, &pending, ttl).await,
        }
    }

    /// Non-consuming, expiry-checked read of the pending ceremony.
    pub async fn peek(&self, subject_key: &str) -> Result<Option<PendingCeremony>, StoreError> {
        match &self.backend {
            ChallengeBackend::Memory(store) => Ok(store.peek(subject_key)),
            #[cfg(feature = "postgres")]
            ChallengeBackend::Postgres(store) => store.peek(subject_key).await,
        }
    }

    /// Atomic compare-and-delete: consume the pending entry only if its kind
    /// and challenge both match. Linearizable per subject key; two racing
    /// callers get exactly one `true`.
    pub async fn take_if_matches(
        &self,
        subject_key: &str,
        kind: CeremonyKind,
        challenge: &str,
    ) -> Result<bool, StoreError> {
        match &self.backend {
            ChallengeBackend::Memory(store) => {
                Ok(store.take_if_matches(subject_key, kind, challenge))
            }
            #[cfg(feature = "postgres")]
            ChallengeBackend::Postgres(store) => {
                store.take_if_matches(subject_key, kind, challenge).await
            }
        }
    }

    /// Coalesced sweep removing expired entries. Returns how many were
    /// dropped. Expiry is otherwise lazy on read; there is no per-entry
    /// timer.
    pub async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        match &self.backend {
            ChallengeBackend::Memory(store) => Ok(store.cleanup_expired()),
            #[cfg(feature = "postgres")]
            ChallengeBackend::Postgres(store) => store.cleanup_expired().await,
        }
    }
}

impl std::fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            ChallengeBackend::Memory(_) => "Memory",
            #[cfg(feature = "postgres")]
            ChallengeBackend::Postgres(_) => "PostgreSQL",
        };
        f.debug_struct("ChallengeStore")
            .field("backend", &backend)
            .finish()
    }
}

enum CredentialBackend {
    Memory(MemoryCredentialStore),
    #[cfg(feature = "postgres")]
    Postgres(PostgresCredentialStore),
}

/// Mapping from subject key to the subject's registered credentials.
pub struct CredentialRepository {
    backend: CredentialBackend,
}

impl CredentialRepository {
    pub fn in_memory() -> Self {
        Self {
            backend: CredentialBackend::Memory(MemoryCredentialStore::new()),
        }
    }

    #[cfg(feature = "postgres")]
    pub async fn with_postgres(database_url: &str) -> Result<Self, StoreError> {
        let store = PostgresCredentialStore::new(database_url).await?;
        store.migrate().await?;
        Ok(Self {
            backend: CredentialBackend::Postgres(store),
        })
    }

    /// Use PostgreSQL when `DATABASE_URL` is set, otherwise memory.
    pub async fn from_env() -> Result<Self, StoreError> {
        #[cfg(feature = "postgres")]
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                tracing::info!("using PostgreSQL credential repository");
                return Self::with_postgres(&url).await;
            }
        }
        tracing::warn!("DATABASE_URL not set, credentials will be lost on restart");
        Ok(Self::in_memory())
    }

    pub fn is_persistent(&self) -> bool {
        match &self.backend {
            CredentialBackend::Memory(_) => false,
            #[cfg(feature = "postgres")]
            CredentialBackend::Postgres(_) => true,
        }
    }

    /// Add a credential to the subject's set. Re-registering an existing
    /// credential id replaces the stored entry.
    pub async fn append(&self, subject_key: &str, credential: Credential) -> Result<(), StoreError> {
        match &self.backend {
            CredentialBackend::Memory(store) => {
                store.append(subject_key, credential);
                Ok(())
            }
            #[cfg(feature = "postgres")]
            CredentialBackend::Postgres(store) => store.append(subject_key, &credential).await,
        }
    }

    pub async fn find(
        &self,
        subject_key: &str,
        credential_id: &str,
    ) -> Result<Option<Credential>, StoreError> {
        match &self.backend {
            CredentialBackend::Memory(store) => Ok(store.find(subject_key, credential_id)),
            #[cfg(feature = "postgres")]
            CredentialBackend::Postgres(store) => store.find(subject_key, credential_id).await,
        }
    }

    pub async fn list(&self, subject_key: &str) -> Result<Vec<Credential>, StoreError> {
        match &self.backend {
            CredentialBackend::Memory(store) => Ok(store.list(subject_key)),
            #[cfg(feature = "postgres")]
            CredentialBackend::Postgres(store) => store.list(subject_key).await,
        }
    }

    /// Record a new signature counter after a successful authentication.
    /// Returns `false` when the credential does not exist.
    pub async fn update_counter(
        &self,
        subject_key: &str,
        credential_id: &str,
        new_count: u32,
    ) -> Result<bool, StoreError> {
        match &self.backend {
            CredentialBackend::Memory(store) => {
                Ok(store.update_counter(subject_key, credential_id, new_count))
            }
            #[cfg(feature = "postgres")]
            CredentialBackend::Postgres(store) => {
                store.update_counter(subject_key, credential_id, new_count).await
            }
        }
    }
}

impl std::fmt::Debug for CredentialRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            CredentialBackend::Memory(_) => "Memory",
            #[cfg(feature = "postgres")]
            CredentialBackend::Postgres(_) => "PostgreSQL",
        };
        f.debug_struct("CredentialRepository")
            .field("backend", &backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_stores_are_not_persistent() {
        assert!(!ChallengeStore::in_memory().is_persistent());
        assert!(!CredentialRepository::in_memory().is_persistent());
    }

    #[tokio::test]
    async fn take_if_matches_consumes_exactly_once() {
        let store = ChallengeStore::in_memory();
        let pending = PendingCeremony {
            kind: CeremonyKind::Register,
            challenge: "challenge-1".to_string(),
        };
        store
            .put("u1", pending, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store
            .take_if_matches("u1", CeremonyKind::Register, "challenge-1")
            .await
            .unwrap());
        assert!(!store
            .take_if_matches("u1", CeremonyKind::Register, "challenge-1")
            .await
            .unwrap());
    }
}
