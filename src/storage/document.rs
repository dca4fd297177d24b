//! Document store adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{EnsureOutcome, StoreError, StoreHealth, StoreResult};

/// One page of documents.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PagedDocs {
    pub docs: Vec<Value>,
    pub total: u64,
}

/// Typed operations the pipeline and the duplicate registry need from a
/// document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> StoreResult<EnsureOutcome>;

    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Insert a whole artifact document; returns the new document id.
    async fn insert_whole(&self, name: &str, doc: Value) -> StoreResult<String>;

    /// Insert per-section documents sharing metadata; returns the ids.
    async fn insert_split(&self, name: &str, docs: Vec<Value>) -> StoreResult<Vec<String>>;

    async fn page(
        &self,
        name: &str,
        offset: usize,
        limit: usize,
        filter: Option<Value>,
    ) -> StoreResult<PagedDocs>;

    async fn search_text(&self, name: &str, query: &str, limit: usize) -> StoreResult<Vec<Value>>;

    /// Fetch a document by id. `None` when absent.
    async fn get(&self, name: &str, id: &str) -> StoreResult<Option<Value>>;

    /// Insert or replace a document under an explicit id.
    async fn put(&self, name: &str, id: &str, doc: Value) -> StoreResult<()>;

    async fn delete(&self, name: &str, id: &str) -> StoreResult<()>;

    async fn health(&self) -> StoreHealth;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, IndexMap<String, Value>>>,
    unreachable: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> StoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(StoreError::unreachable("memory document store offline"))
        } else {
            Ok(())
        }
    }
}

fn matches_filter(doc: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields.iter().all(|(k, v)| doc.get(k) == Some(v)),
        None => true,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
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

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.check_up()?;
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn insert_whole(&self, name: &str, doc: Value) -> StoreResult<String> {
        self.check_up()?;
        let id = uuid::Uuid::new_v4().to_string();
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(format!("collection '{name}'")))?;
        collection.insert(id.clone(), doc);
        Ok(id)
    }

    async fn insert_split(&self, name: &str, docs: Vec<Value>) -> StoreResult<Vec<String>> {
        self.check_up()?;
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(format!("collection '{name}'")))?;
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = uuid::Uuid::new_v4().to_string();
            collection.insert(id.clone(), doc);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn page(
        &self,
        name: &str,
        offset: usize,
        limit: usize,
        filter: Option<Value>,
    ) -> StoreResult<PagedDocs> {
        self.check_up()?;
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::not_found(format!("collection '{name}'")))?;
        let matching: Vec<&Value> = collection
            .values()
            .filter(|doc| filter.as_ref().map_or(true, |f| matches_filter(doc, f)))
            .collect();
        let total = matching.len() as u64;
        let docs = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(PagedDocs { docs, total })
    }

    async fn search_text(&self, name: &str, query: &str, limit: usize) -> StoreResult<Vec<Value>> {
        self.check_up()?;
        let needle = query.to_lowercase();
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::not_found(format!("collection '{name}'")))?;
        Ok(collection
            .values()
            .filter(|doc| doc.to_string().to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str, id: &str) -> StoreResult<Option<Value>> {
        self.check_up()?;
        let collections = self.collections.read().await;
        Ok(collections.get(name).and_then(|c| c.get(id)).cloned())
    }

    async fn put(&self, name: &str, id: &str, doc: Value) -> StoreResult<()> {
        self.check_up()?;
        let mut collections = self.collections.write().await;
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(IndexMap::new);
        collection.insert(id.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, name: &str, id: &str) -> StoreResult<()> {
        self.check_up()?;
        let mut collections = self.collections.write().await;
        if let Some(collection) = collections.get_mut(name) {
            collection.shift_remove(id);
        }
        Ok(())
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
// HTTP implementation (generic JSON REST)
// ============================================================================

pub struct HttpDocumentStore {
    base: String,
    client: Client,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { base: base_url.trim_end_matches('/').to_string(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
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
impl DocumentStore for HttpDocumentStore {
    async fn ensure_collection(&self, name: &str) -> StoreResult<EnsureOutcome> {
        let response = self
            .client
            .put(self.url(&format!("collections/{name}")))
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
            .filter_map(|c| match c {
                Value::String(s) => Some(s.clone()),
                other => other.get("name").and_then(Value::as_str).map(str::to_string),
            })
            .collect();
        Ok(names)
    }

    async fn insert_whole(&self, name: &str, doc: Value) -> StoreResult<String> {
        let response = self
            .client
            .post(self.url(&format!("collections/{name}/documents")))
            .json(&doc)
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), &format!("insert into '{name}'"))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        value["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| StoreError::Protocol("insert reply missing 'id'".into()))
    }

    async fn insert_split(&self, name: &str, docs: Vec<Value>) -> StoreResult<Vec<String>> {
        let body = serde_json::json!({ "documents": docs });
        let response = self
            .client
            .post(self.url(&format!("collections/{name}/documents/batch")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), &format!("batch insert into '{name}'"))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        serde_json::from_value(value["ids"].clone())
            .map_err(|e| StoreError::Protocol(format!("batch reply: {e}")))
    }

    async fn page(
        &self,
        name: &str,
        offset: usize,
        limit: usize,
        filter: Option<Value>,
    ) -> StoreResult<PagedDocs> {
        let mut request = self
            .client
            .get(self.url(&format!("collections/{name}/documents")))
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())]);
        if let Some(filter) = &filter {
            request = request.query(&[("filter", filter.to_string())]);
        }
        let response = request.send().await.map_err(transport)?;
        check_status(response.status(), &format!("page '{name}'"))?;
        response
            .json::<PagedDocs>()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))
    }

    async fn search_text(&self, name: &str, query: &str, limit: usize) -> StoreResult<Vec<Value>> {
        let response = self
            .client
            .get(self.url(&format!("collections/{name}/search")))
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), &format!("search '{name}'"))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        serde_json::from_value(value["docs"].clone())
            .map_err(|e| StoreError::Protocol(format!("search reply: {e}")))
    }

    async fn get(&self, name: &str, id: &str) -> StoreResult<Option<Value>> {
        let response = self
            .client
            .get(self.url(&format!("collections/{name}/documents/{id}")))
            .send()
            .await
            .map_err(transport)?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        check_status(response.status(), &format!("get '{id}' from '{name}'"))?;
        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| StoreError::Protocol(e.to_string()))
    }

    async fn put(&self, name: &str, id: &str, doc: Value) -> StoreResult<()> {
        let response = self
            .client
            .put(self.url(&format!("collections/{name}/documents/{id}")))
            .json(&doc)
            .send()
            .await
            .map_err(transport)?;
        check_status(response.status(), &format!("put '{id}' into '{name}'"))
    }

    async fn delete(&self, name: &str, id: &str) -> StoreResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("collections/{name}/documents/{id}")))
            .send()
            .await
            .map_err(transport)?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        check_status(response.status(), &format!("delete '{id}' from '{name}'"))
    }

    async fn health(&self) -> StoreHealth {
        let probe = self
            .client
            .get(self.url("health"))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_insert_and_page() {
        let store = MemoryDocumentStore::new();
        store.ensure_collection("c").await.unwrap();
        for i in 0..5 {
            store
                .insert_whole("c", serde_json::json!({ "n": i }))
                .await
                .unwrap();
        }
        let page = store.page("c", 1, 2, None).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.docs.len(), 2);
        assert_eq!(page.docs[0]["n"], 1);
    }

    #[tokio::test]
    async fn test_memory_page_with_filter() {
        let store = MemoryDocumentStore::new();
        store.ensure_collection("c").await.unwrap();
        store
            .insert_split(
                "c",
                vec![
                    serde_json::json!({ "game": "dnd", "page": 1 }),
                    serde_json::json!({ "game": "coc", "page": 2 }),
                ],
            )
            .await
            .unwrap();
        let page = store
            .page("c", 0, 10, Some(serde_json::json!({ "game": "dnd" })))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.docs[0]["page"], 1);
    }

    #[tokio::test]
    async fn test_memory_search_text() {
        let store = MemoryDocumentStore::new();
        store.ensure_collection("c").await.unwrap();
        store
            .insert_whole("c", serde_json::json!({ "text": "the Fireball spell" }))
            .await
            .unwrap();
        store
            .insert_whole("c", serde_json::json!({ "text": "mundane gear list" }))
            .await
            .unwrap();
        let hits = store.search_text("c", "fireball", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_get_put_delete() {
        let store = MemoryDocumentStore::new();
        store
            .put("registry", "isbn13", serde_json::json!({ "title": "PHB" }))
            .await
            .unwrap();
        let doc = store.get("registry", "isbn13").await.unwrap().unwrap();
        assert_eq!(doc["title"], "PHB");
        store.delete("registry", "isbn13").await.unwrap();
        assert!(store.get("registry", "isbn13").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_outage() {
        let store = MemoryDocumentStore::new();
        store.set_unreachable(true);
        let err = store
            .insert_whole("c", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "store_unreachable");
        assert_eq!(store.health().await, StoreHealth::Down);
    }
}
