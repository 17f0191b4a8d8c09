//! In-process storage backends
//!
//! Challenge entries expire lazily on read, with `cleanup_expired` available
//! as a coalesced sweep. No timer is scheduled per entry.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::PendingCeremony;
use crate::types::{CeremonyKind, Credential};

struct ChallengeEntry {
    pending: PendingCeremony,
    expires_at: Instant,
}

/// In-memory challenge store keyed by subject.
#[derive(Default)]
pub struct MemoryChallengeStore {
    entries: DashMap<String, ChallengeEntry>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the subject's pending ceremony.
    pub fn put(&self, subject_key: &str, pending: PendingCeremony, ttl: Duration) {
        self.entries.insert(
            subject_key.to_string(),
            ChallengeEntry {
                pending,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Read without consuming. Drops the entry first if it has expired.
    pub fn peek(&self, subject_key: &str) -> Option<PendingCeremony> {
        let now = Instant::now();
        let _ = self
            .entries
            .remove_if(subject_key, |_, entry| entry.expires_at <= now);
        self.entries
            .get(subject_key)
            .map(|entry| entry.pending.clone())
    }

    /// Compare-and-delete. `remove_if` holds the shard lock across the
    /// predicate, so two racing callers observe exactly one `true`.
    pub fn take_if_matches(&self, subject_key: &str, kind: CeremonyKind, challenge: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove_if(subject_key, |_, entry| {
                entry.expires_at > now
                    && entry.pending.kind == kind
                    && entry.pending.challenge == challenge
            })
            .is_some()
    }

    /// Sweep out expired entries; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-memory credential lists keyed by subject. The per-key entry guard
/// serializes `append`/`update_counter` against concurrent logins.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<String, Vec<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a credential, replacing any existing entry with the same id.
    pub fn append(&self, subject_key: &str, credential: Credential) {
        let mut list = self.credentials.entry(subject_key.to_string()).or_default();
        match list.iter_mut().find(|c| c.id == credential.id) {
            Some(existing) => *existing = credential,
            None => list.push(credential),
        }
    }

    pub fn find(&self, subject_key: &str, credential_id: &str) -> Option<Credential> {
        self.credentials
            .get(subject_key)
            .and_then(|list| list.iter().find(|c| c.id == credential_id).cloned())
    }

    pub fn list(&self, subject_key: &str) -> Vec<Credential> {
        self.credentials
            .get(subject_key)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    pub fn update_counter(&self, subject_key: &str, credential_id: &str, new_count: u32) -> bool {
        if let Some(mut list) = self.credentials.get_mut(subject_key) {
            if let Some(credential) = list.iter_mut().find(|c| c.id == credential_id) {
                credential.signature_counter = new_count;
                return true;
            }
        }
        false
    }
}
