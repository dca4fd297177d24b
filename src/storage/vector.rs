//! Vector store adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{EnsureOutcome, StoreError, StoreHealth, StoreResult};

/// One section record headed for the vector index.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorRecord {
    /// `${collection}_page${page}_${ordinal}` — upserts are idempotent by id.
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Map<String, Value>,
}

/// Typed operations the pipeline needs from a vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> StoreResult<EnsureOutcome>;

    /// Idempotent by record id.
    async fn upsert_sections(&self, name: &str, records: &[VectorRecord]) -> StoreResult<()>;

    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    async fn sample(&self, name: &str, limit: usize) -> StoreResult<Vec<Value>>;

    async fn count(&self, name: &str) -> StoreResult<u64>;

    async fn health(&self) -> StoreHealth;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Test/offline adapter. Order-preserving, with an optional per-value size
/// limit and an outage toggle for failure-path tests.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, IndexMap<String, VectorRecord>>>,
    value_limit: Option<usize>,
    unreachable: AtomicBool,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value_limit(limit: usize) -> Self {
        Self { value_limit: Some(limit), ..Default::default() }
    }

    /// Simulate an outage.
    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> StoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(StoreError::unreachable("memory vector store offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, name: &str) -> StoreResult<EnsureOutcome> {
        self.check_up()?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            Ok(EnsureOutcome::AlreadyExists)
        } else {
            collections.insert(name.to_string(), IndexMap::new());
            Ok(EnsureOutcome::Created)
        }
    }

    async fn upsert_sections(&self, name: &str, records: &[VectorRecord]) -> StoreResult<()> {
        self.check_up()?;
        if let Some(limit) = self.value_limit {
            if records.iter().any(|r| r.text.len() > limit) {
                return Err(StoreError::Oversize { limit });
            }
        }
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(format!("collection '{name}'")))?;
        for record in records {
            collection.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.check_up()?;
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn sample(&self, name: &str, limit: usize) -> StoreResult<Vec<Value>> {
        self.check_up()?;
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::not_found(format!("collection '{name}'")))?;
        Ok(collection
            .values()
            .take(limit)
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
            .collect())
    }

    async fn count(&self, name: &str) -> StoreResult<u64> {
        self.check_up()?;
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::not_found(format!("collection '{name}'")))?;
        Ok(collection.len() as u64)
    }

    async fn health(&self) -> StoreHealth {
        if self.unreachable.load(Ordering::SeqCst) {
            StoreHealth::Down
        } else {
            StoreHealth::Ok
        }
    }
}

// ============================================================================
// HTTP implementation (Chroma-style REST)
// ============================================================================

pub struct HttpVectorStore {
    base: String,
    client: Client,
}

impl HttpVectorStore {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { base: base_url.trim_end_matches('/').to_string(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base, path)
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::unreachable(e.to_string())
}

fn check_status(status: reqwest::StatusCode, context: &str) -> StoreResult<()> {
    match status.as_u16() {
        200..=299 => Ok(()),
        404 => Err(StoreError::not_found(context.to_string())),
        409 => Err(StoreError::conflict(context.to_string())),
        413 => Err(StoreError::Oversize { limit: 0 }),
        code => Err(StoreError::unreachable(format!("{context}: HTTP {code}"))),
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn ensure_collection(&self, name: &str) -> StoreResult<EnsureOutcome> {
        let body = serde_json::json!({ "name": name, "get_or_create": true });
        let response = self
            .client
            .post(self.url("collections"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        match response.status().as_u16() {
            200 => Ok(EnsureOutcome::AlreadyExists),
            201 => Ok(EnsureOutcome::Created),
            409 => Err(StoreError::conflict(format!("collection '{name}'"))),
            code => Err(StoreError::unreachable(format!(
                "ensure '{name}': HTTP {code}"
            ))),
        }
    }

    async fn upsert_sections(&self, name: &str, records: &[VectorRecord]) -> StoreResult<()> {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let documents: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let metadatas: Vec<&serde_json::Map<String, Value>> =
            records.iter().map(|r| &r.metadata).collect();
        let body = serde_json::json!({
            "ids": ids,
            "documents": documents,
            "metadatas": metadatas,
        });
        let response = self
            .client
            .post(self.url(&format!("collections/{name}/upsert")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), &format!("upsert into '{name}'"))
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let response = self
            .client
            .get(self.url("collections"))
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), "list collections")?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        let names = value
            .as_array()
            .ok_or_else(|| StoreError::Protocol("collection list is not an array".into()))?
            .iter()
            .filter_map(|c| c.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();
        Ok(names)
    }

    async fn sample(&self, name: &str, limit: usize) -> StoreResult<Vec<Value>> {
        let body = serde_json::json!({ "limit": limit, "include": ["documents", "metadatas"] });
        let response = self
            .client
            .post(self.url(&format!("collections/{name}/get")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), &format!("sample '{name}'"))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        // Chroma returns parallel arrays; zip them into documents.
        let ids = value["ids"].as_array().cloned().unwrap_or_default();
        let documents = value["documents"].as_array().cloned().unwrap_or_default();
        let metadatas = value["metadatas"].as_array().cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            out.push(serde_json::json!({
                "id": id,
                "text": documents.get(i).cloned().unwrap_or(Value::Null),
                "metadata": metadatas.get(i).cloned().unwrap_or(Value::Null),
            }));
        }
        Ok(out)
    }

    async fn count(&self, name: &str) -> StoreResult<u64> {
        let response = self
            .client
            .get(self.url(&format!("collections/{name}/count")))
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), &format!("count '{name}'"))?;
        response
            .json::<u64>()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))
    }

    async fn health(&self) -> StoreHealth {
        let probe = self
            .client
            .get(self.url("heartbeat"))
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        match probe {
            Ok(r) if r.status().is_success() => StoreHealth::Ok,
            Ok(_) => StoreHealth::Degraded,
            Err(_) => StoreHealth::Down,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
