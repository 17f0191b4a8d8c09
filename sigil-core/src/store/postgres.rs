//! PostgreSQL storage backends
//!
//! The challenge table keeps a single row per subject so an upsert gives the
//! last-challenge-wins semantics, and `take_if_matches` is one conditional
//! `DELETE`, linearizable per key by the database.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{PendingCeremony, StoreError};
use crate::types::{CeremonyKind, Credential};

fn kind_from_str(value: &str) -> Result<CeremonyKind, StoreError> {
    match value {
        "register" => Ok(CeremonyKind::Register),
        "login" => Ok(CeremonyKind::Login),
        other => Err(StoreError::Serialization(format!(
            "unknown ceremony kind {:?}",
            other
        ))),
    }
}

fn expiry_timestamp(ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| StoreError::Serialization(format!("ttl out of range: {}", e)))?;
    Ok(Utc::now() + ttl)
}

/// PostgreSQL-backed challenge store.
pub struct PostgresChallengeStore {
    pool: PgPool,
}

impl PostgresChallengeStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!("connected to PostgreSQL challenge store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the challenge table if it does not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sigil_challenges (
                subject_key TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                challenge TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(())
    }

    /// Upsert the subject's pending ceremony (last challenge wins).
    pub async fn put(
        &self,
        subject_key: &str,
        pending: &PendingCeremony,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = expiry_timestamp(ttl)?;

        sqlx::query(
            r#"
            INSERT INTO sigil_challenges (subject_key, kind, challenge, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subject_key) DO UPDATE SET
                kind = EXCLUDED.kind,
                challenge = EXCLUDED.challenge,
                created_at = NOW(),
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(subject_key)
        .bind(pending.kind.as_str())
        .bind(&pending.challenge)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    pub async fn peek(&self, subject_key: &str) -> Result<Option<PendingCeremony>, StoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT kind, challenge FROM sigil_challenges
            WHERE subject_key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(subject_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        row.map(|(kind, challenge)| {
            Ok(PendingCeremony {
                kind: kind_from_str(&kind)?,
                challenge,
            })
        })
        .transpose()
    }

    /// One conditional DELETE; the row count says whether this caller won.
    pub async fn take_if_matches(
        &self,
        subject_key: &str,
        kind: CeremonyKind,
        challenge: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sigil_challenges
            WHERE subject_key = $1 AND kind = $2 AND challenge = $3 AND expires_at > NOW()
            "#,
        )
        .bind(subject_key)
        .bind(kind.as_str())
        .bind(challenge)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM sigil_challenges WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }
}

impl std::fmt::Debug for PostgresChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresChallengeStore")
            .field("pool", &"<PgPool>")
            .finish()
    }
}

/// PostgreSQL-backed credential repository.
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!("connected to PostgreSQL credential repository");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the credential table if it does not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sigil_credentials (
                subject_key TEXT NOT NULL,
                credential_id TEXT NOT NULL,
                public_key BYTEA NOT NULL,
                sign_count BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_used_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (subject_key, credential_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(())
    }

    pub async fn append(
        &self,
        subject_key: &str,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sigil_credentials (subject_key, credential_id, public_key, sign_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subject_key, credential_id) DO UPDATE SET
                public_key = EXCLUDED.public_key,
                sign_count = EXCLUDED.sign_count,
                last_used_at = NOW()
            "#,
        )
        .bind(subject_key)
        .bind(&credential.id)
        .bind(&credential.public_key)
        .bind(credential.signature_counter as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tracing::info!(credential_id = %credential.id, "credential stored");
        Ok(())
    }

    pub async fn find(
        &self,
        subject_key: &str,
        credential_id: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r#"
            SELECT credential_id, public_key, sign_count FROM sigil_credentials
            WHERE subject_key = $1 AND credential_id = $2
            "#,
        )
        .bind(subject_key)
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(row.map(CredentialRow::into_credential))
    }

    pub async fn list(&self, subject_key: &str) -> Result<Vec<Credential>, StoreError> {
        let rows: Vec<CredentialRow> = sqlx::query_as(
            r#"
            SELECT credential_id, public_key, sign_count FROM sigil_credentials
            WHERE subject_key = $1
            ORDER BY created_at
            "#,
        )
        .bind(subject_key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(CredentialRow::into_credential).collect())
    }

    pub async fn update_counter(
        &self,
        subject_key: &str,
        credential_id: &str,
        new_count: u32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sigil_credentials
            SET sign_count = $3, last_used_at = NOW()
            WHERE subject_key = $1 AND credential_id = $2
            "#,
        )
        .bind(subject_key)
        .bind(credential_id)
        .bind(new_count as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Database row for credentials
#[derive(sqlx::FromRow)]
struct CredentialRow {
    credential_id: String,
    public_key: Vec<u8>,
    sign_count: i64,
}

impl CredentialRow {
    fn into_credential(self) -> Credential {
        Credential {
            id: self.credential_id,
            public_key: self.public_key,
            signature_counter: self.sign_count as u32,
        }
    }
}

impl std::fmt::Debug for PostgresCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCredentialStore")
            .field("pool", &"<PgPool>")
            .finish()
    }
}
