//! Session API facade.
//!
//! `ExtractorService` owns the session registry, catalog, providers, and
//! store adapters, and exposes the abstract session verbs the CLI (or any
//! UI collaborator) drives: upload, analyze, extract, cancel, progress
//! stream, status, artifact, health, and collection browsing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::config::AppConfig;
use crate::catalog::GameCatalog;
use crate::dedup::DuplicateRegistry;
use crate::llm::{create_provider, ProviderClient, ProviderKind};
use crate::pdf::{LopdfFacade, PdfFacade};
use crate::pipeline::{
    AnalyzeOptions, Artifact, ExtractOptions, Pipeline, PipelineDeps, PipelineError,
    PipelineResult, ProgressEvent, SessionRegistry, SessionSnapshot, Stage, Verdict,
};
use crate::storage::{
    DocumentStore, HttpDocumentStore, HttpVectorStore, MemoryDocumentStore, MemoryVectorStore,
    VectorStore,
};

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub vector_store: String,
    pub document_store: String,
    pub providers: BTreeMap<String, String>,
}

/// Which backing store a browse call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Vector,
    Document,
}

impl StoreKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vector" => Some(Self::Vector),
            "document" | "doc" => Some(Self::Document),
            _ => None,
        }
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct ExtractorService {
    pipeline: Pipeline,
    sessions: Arc<SessionRegistry>,
}

impl ExtractorService {
    /// Build from configuration: HTTP adapters when store URLs are set,
    /// in-memory adapters otherwise; all four providers registered.
    pub fn new(config: AppConfig) -> Self {
        let vector: Arc<dyn VectorStore> = match &config.stores.vector_url {
            Some(url) => Arc::new(HttpVectorStore::new(url, config.stores.timeout())),
            None => Arc::new(MemoryVectorStore::new()),
        };
        let document: Arc<dyn DocumentStore> = match &config.stores.document_url {
            Some(url) => Arc::new(HttpDocumentStore::new(url, config.stores.timeout())),
            None => Arc::new(MemoryDocumentStore::new()),
        };
        Self::with_parts(config, Arc::new(LopdfFacade::new()), vector, document)
    }

    /// Build with explicit collaborators (tests inject fixtures here).
    pub fn with_parts(
        config: AppConfig,
        pdf: Arc<dyn PdfFacade>,
        vector: Arc<dyn VectorStore>,
        document: Arc<dyn DocumentStore>,
    ) -> Self {
        let catalog = Arc::new(GameCatalog::new());
        let mut providers: HashMap<ProviderKind, Arc<ProviderClient>> = HashMap::new();
        for kind in ProviderKind::all() {
            let provider = create_provider(kind, &config.ai, Arc::clone(&catalog));
            providers.insert(
                kind,
                Arc::new(ProviderClient::new(provider, config.ai.max_concurrency)),
            );
        }
        let registry = Arc::new(DuplicateRegistry::new(Arc::clone(&document)));

        let deps = Arc::new(PipelineDeps {
            config,
            catalog,
            pdf,
            vector,
            document,
            registry,
            providers,
        });
        Self {
            pipeline: Pipeline::new(deps),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    fn deps(&self) -> &Arc<PipelineDeps> {
        self.pipeline.deps()
    }

    pub fn config(&self) -> &AppConfig {
        &self.deps().config
    }

    // ========================================================================
    // Session verbs
    // ========================================================================

    /// Create an `uploaded` session from document bytes.
    pub async fn upload(&self, bytes: Vec<u8>, origin_name: &str) -> PipelineResult<String> {
        let limit = self.deps().config.session.upload_max_bytes;
        if bytes.len() as u64 > limit {
            return Err(PipelineError::UploadTooLarge { size: bytes.len() as u64, limit });
        }
        let session = self.sessions.create(origin_name.to_string(), bytes).await;
        session.transition(Stage::Uploaded, 100, Some(origin_name.to_string()));
        tracing::info!(session = session.id(), origin_name, "session uploaded");
        Ok(session.id().to_string())
    }

    /// Drive to `identified`; returns the verdict.
    pub async fn analyze(&self, session_id: &str, options: AnalyzeOptions) -> PipelineResult<Verdict> {
        let session = self.session(session_id).await?;
        self.pipeline.analyze(&session, options).await
    }

    /// Drive to `completed` (or a terminal error); returns the artifact.
    pub async fn extract(
        &self,
        session_id: &str,
        options: ExtractOptions,
    ) -> PipelineResult<Arc<Artifact>> {
        let session = self.session(session_id).await?;
        self.pipeline.extract(&session, options).await
    }

    /// Mark a session for cancellation. Idempotent and safe at any time;
    /// an idle session transitions immediately.
    pub async fn cancel(&self, session_id: &str) -> PipelineResult<()> {
        let session = self.session(session_id).await?;
        session.request_cancel();
        if !session.is_running() && !session.stage().is_terminal() {
            session.fail(Stage::Cancelled, "cancelled", "cancelled before running".to_string());
        }
        Ok(())
    }

    /// Lazy, finite sequence of progress events ending at a terminal state.
    /// Re-subscribing replays the latest per-stage event first.
    pub async fn progress_stream(
        &self,
        session_id: &str,
    ) -> PipelineResult<mpsc::Receiver<ProgressEvent>> {
        let session = self.session(session_id).await?;
        let (replay, mut live) = session.subscribe();
        let (tx, out) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut saw_terminal = false;
            for event in replay {
                saw_terminal |= event.stage.is_terminal();
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if saw_terminal {
                return;
            }
            loop {
                match live.recv().await {
                    Ok(event) => {
                        let terminal = event.stage.is_terminal();
                        if tx.send(event).await.is_err() || terminal {
                            return;
                        }
                    }
                    // Slow subscribers drop events, never see them reordered.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(out)
    }

    pub async fn status(&self, session_id: &str) -> PipelineResult<SessionSnapshot> {
        Ok(self.session(session_id).await?.snapshot())
    }

    pub async fn artifact(&self, session_id: &str) -> PipelineResult<Arc<Artifact>> {
        self.session(session_id)
            .await?
            .artifact()
            .ok_or_else(|| PipelineError::BadSession(format!("{session_id} has no artifact")))
    }

    pub async fn recent_sessions(&self, limit: usize) -> Vec<SessionSnapshot> {
        self.sessions.recent(limit).await
    }

    // ========================================================================
    // Health and browsing
    // ========================================================================

    pub async fn health(&self) -> HealthReport {
        let deps = self.deps();
        let mut providers = BTreeMap::new();
        for (kind, client) in &deps.providers {
            providers.insert(
                kind.as_str().to_string(),
                client.health().await.as_str().to_string(),
            );
        }
        HealthReport {
            vector_store: deps.vector.health().await.as_str().to_string(),
            document_store: deps.document.health().await.as_str().to_string(),
            providers,
        }
    }

    pub async fn list_collections(&self, store: StoreKind) -> PipelineResult<Vec<String>> {
        let deps = self.deps();
        let names = match store {
            StoreKind::Vector => deps.vector.list_collections().await?,
            StoreKind::Document => deps.document.list_collections().await?,
        };
        Ok(names)
    }

    pub async fn browse_collection(
        &self,
        store: StoreKind,
        name: &str,
        offset: usize,
        limit: usize,
    ) -> PipelineResult<serde_json::Value> {
        let deps = self.deps();
        let value = match store {
            StoreKind::Vector => {
                let total = deps.vector.count(name).await?;
                let docs = deps.vector.sample(name, offset + limit).await?;
                let docs: Vec<_> = docs.into_iter().skip(offset).collect();
                serde_json::json!({ "docs": docs, "total": total })
            }
            StoreKind::Document => {
                let page = deps.document.page(name, offset, limit, None).await?;
                serde_json::to_value(page)
                    .unwrap_or_else(|_| serde_json::json!({ "docs": [], "total": 0 }))
            }
        };
        Ok(value)
    }

    // ========================================================================
    // Sweeper
    // ========================================================================

    /// Background task expiring idle sessions past the TTL. Never removes
    /// a running session.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let ttl = Duration::from_secs(self.deps().config.session.ttl_seconds.max(1));
        let period = Duration::from_secs((ttl.as_secs() / 4).clamp(30, 300));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = sessions.sweep(ttl).await;
                if swept > 0 {
                    tracing::debug!(swept, "expired idle sessions");
                }
            }
        })
    }

    async fn session(&self, id: &str) -> PipelineResult<Arc<crate::pipeline::Session>> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| PipelineError::BadSession(id.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
