//! Duplicate registry.
//!
//! A persisted set of previously-ingested works keyed by canonical ISBN,
//! stored in the document store's reserved `rpger_registry` collection.
//! Operations are serialized per canonical ISBN through an async mutex
//! table so two concurrent ingests of the same book cannot race.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::address::REGISTRY_COLLECTION;
use crate::storage::{DocumentStore, StoreError, StoreResult};

/// Lock acquisition gives up after this long.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStatus {
    /// Tentative claim written at dedup-check time; finalized or dropped
    /// when the session reaches a terminal state.
    Pending,
    Completed,
    Superseded,
}

/// One document per canonical ISBN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Canonical ISBN-13.
    pub isbn: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub first_ingested_at: DateTime<Utc>,
    pub last_session: String,
    pub sections: u64,
    pub words: u64,
    pub status: RegistryStatus,
}

impl RegistryEntry {
    pub fn tentative(isbn: impl Into<String>, title: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            title: title.into(),
            author: None,
            first_ingested_at: Utc::now(),
            last_session: session.into(),
            sections: 0,
            words: 0,
            status: RegistryStatus::Pending,
        }
    }
}

pub struct DuplicateRegistry {
    store: Arc<dyn DocumentStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DuplicateRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, locks: Mutex::new(HashMap::new()) }
    }

    /// Acquire the per-ISBN mutex, yielding `store_unreachable` after the
    /// acquisition timeout.
    pub async fn lock(&self, canonical_isbn: &str) -> StoreResult<OwnedMutexGuard<()>> {
        let entry = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(canonical_isbn.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        tokio::time::timeout(LOCK_TIMEOUT, entry.lock_owned())
            .await
            .map_err(|_| {
                StoreError::unreachable(format!(
                    "registry lock for {canonical_isbn} not acquired within {}s",
                    LOCK_TIMEOUT.as_secs()
                ))
            })
    }

    pub async fn lookup(&self, canonical_isbn: &str) -> StoreResult<Option<RegistryEntry>> {
        let doc = self.store.get(REGISTRY_COLLECTION, canonical_isbn).await?;
        match doc {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Protocol(format!("registry entry: {e}"))),
        }
    }

    /// Write a tentative claim for an ISBN.
    pub async fn put_tentative(&self, entry: &RegistryEntry) -> StoreResult<()> {
        let value = serde_json::to_value(entry)
            .map_err(|e| StoreError::Protocol(format!("registry entry: {e}")))?;
        self.store.put(REGISTRY_COLLECTION, &entry.isbn, value).await
    }

    /// Promote a tentative claim to completed, recording final counts.
    pub async fn finalize(
        &self,
        canonical_isbn: &str,
        sections: u64,
        words: u64,
    ) -> StoreResult<()> {
        let mut entry = self
            .lookup(canonical_isbn)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("registry entry {canonical_isbn}")))?;
        entry.sections = sections;
        entry.words = words;
        entry.status = RegistryStatus::Completed;
        self.put_tentative(&entry).await
    }

    /// Roll back a tentative claim after a failed or cancelled run. Entries
    /// that already completed are left alone.
    pub async fn drop_tentative(&self, canonical_isbn: &str) -> StoreResult<()> {
        match self.lookup(canonical_isbn).await? {
            Some(entry) if entry.status == RegistryStatus::Pending => {
                self.store.delete(REGISTRY_COLLECTION, canonical_isbn).await
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDocumentStore;

    fn registry() -> DuplicateRegistry {
        DuplicateRegistry::new(Arc::new(MemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn test_tentative_lifecycle() {
        let registry = registry();
        let isbn = "9780306406157";
        assert!(registry.lookup(isbn).await.unwrap().is_none());

        registry
            .put_tentative(&RegistryEntry::tentative(isbn, "PHB", "sess-1"))
            .await
            .unwrap();
        let entry = registry.lookup(isbn).await.unwrap().unwrap();
        assert_eq!(entry.status, RegistryStatus::Pending);

        registry.finalize(isbn, 120, 45_000).await.unwrap();
        let entry = registry.lookup(isbn).await.unwrap().unwrap();
        assert_eq!(entry.status, RegistryStatus::Completed);
        assert_eq!(entry.sections, 120);
        assert_eq!(entry.words, 45_000);
    }

    #[tokio::test]
    async fn test_drop_tentative_only_drops_pending() {
        let registry = registry();
        let isbn = "9780306406157";
        registry
            .put_tentative(&RegistryEntry::tentative(isbn, "PHB", "sess-1"))
            .await
            .unwrap();
        registry.finalize(isbn, 1, 1).await.unwrap();
        registry.drop_tentative(isbn).await.unwrap();
        // Completed entry survives a rollback attempt.
        assert!(registry.lookup(isbn).await.unwrap().is_some());

        registry
            .put_tentative(&RegistryEntry::tentative("9781861972712", "Other", "sess-2"))
            .await
            .unwrap();
        registry.drop_tentative("9781861972712").await.unwrap();
        assert!(registry.lookup("9781861972712").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_per_isbn_lock_serializes() {
        let registry = Arc::new(registry());
        let isbn = "9780306406157";

        let guard = registry.lock(isbn).await.unwrap();
        let registry2 = Arc::clone(&registry);
        let contender = tokio::spawn(async move {
            let _guard = registry2.lock("9780306406157").await.unwrap();
        });
        // The contender cannot finish while the guard is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_isbns_do_not_contend() {
        let registry = registry();
        let _a = registry.lock("9780306406157").await.unwrap();
        let _b = registry.lock("9781861972712").await.unwrap();
    }
}
