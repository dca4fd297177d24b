//! Extraction sessions and the in-process session registry.
//!
//! A session owns the document bytes and the artifact until terminal
//! state. The registry is the sole process-wide shared mutable state; a
//! sweeper expires idle sessions past their TTL but never removes a
//! running one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::models::{Artifact, Verdict};
use super::progress::{ProgressChannel, ProgressEvent};
use super::Stage;
use crate::llm::ProviderKind;

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Read-only snapshot for `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub origin_name: String,
    pub stage: Stage,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub size_bytes: u64,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
}

struct SessionState {
    stage: Stage,
    percent: u8,
    verdict: Option<Verdict>,
    artifact: Option<Arc<Artifact>>,
    error: Option<ErrorInfo>,
    provider: ProviderKind,
    last_touched_at: DateTime<Utc>,
    running: bool,
}

pub struct Session {
    id: String,
    origin_name: String,
    bytes: Arc<Vec<u8>>,
    digest: String,
    created_at: DateTime<Utc>,
    cancel: AtomicBool,
    progress: ProgressChannel,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(origin_name: String, bytes: Vec<u8>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            origin_name,
            bytes: Arc::new(bytes),
            digest,
            created_at: now,
            cancel: AtomicBool::new(false),
            progress: ProgressChannel::new(),
            state: Mutex::new(SessionState {
                stage: Stage::Uploaded,
                percent: 0,
                verdict: None,
                artifact: None,
                error: None,
                provider: ProviderKind::Mock,
                last_touched_at: now,
                running: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn stage(&self) -> Stage {
        self.state.lock().expect("session state poisoned").stage
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.state.lock().expect("session state poisoned").verdict.clone()
    }

    pub fn artifact(&self) -> Option<Arc<Artifact>> {
        self.state.lock().expect("session state poisoned").artifact.clone()
    }

    pub fn provider(&self) -> ProviderKind {
        self.state.lock().expect("session state poisoned").provider
    }

    pub fn set_provider(&self, provider: ProviderKind) {
        self.state.lock().expect("session state poisoned").provider = provider;
    }

    pub fn set_verdict(&self, verdict: Verdict) {
        self.state.lock().expect("session state poisoned").verdict = Some(verdict);
    }

    pub fn set_artifact(&self, artifact: Arc<Artifact>) {
        self.state.lock().expect("session state poisoned").artifact = Some(artifact);
    }

    pub fn set_running(&self, running: bool) {
        self.state.lock().expect("session state poisoned").running = running;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().expect("session state poisoned").running
    }

    /// Mark for cancellation. Idempotent and safe at any time.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Advance the state machine and emit a progress event.
    ///
    /// Regressions are ignored: a transition to a lower stage index, or a
    /// lower percent within the same stage, is a no-op, and terminal
    /// states are absorbing.
    pub fn transition(&self, stage: Stage, percent: u8, note: Option<String>) {
        let percent = percent.min(100);
        let event = {
            let mut state = self.state.lock().expect("session state poisoned");
            if state.stage.is_terminal() {
                return;
            }
            if stage.index() < state.stage.index() {
                return;
            }
            if stage == state.stage && percent < state.percent {
                return;
            }
            state.stage = stage;
            state.percent = percent;
            state.last_touched_at = Utc::now();
            ProgressEvent {
                session: self.id.clone(),
                stage,
                percent,
                note,
                at: state.last_touched_at,
            }
        };
        self.progress.emit(event);
    }

    /// Record a terminal failure.
    pub fn fail(&self, stage: Stage, code: &str, message: String) {
        debug_assert!(stage.is_terminal());
        {
            let mut state = self.state.lock().expect("session state poisoned");
            if state.stage.is_terminal() {
                return;
            }
            state.error = Some(ErrorInfo { code: code.to_string(), message: message.clone() });
            state.running = false;
        }
        self.transition(stage, 100, Some(message));
    }

    pub fn subscribe(&self) -> (Vec<ProgressEvent>, tokio::sync::broadcast::Receiver<ProgressEvent>) {
        self.progress.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().expect("session state poisoned");
        SessionSnapshot {
            id: self.id.clone(),
            origin_name: self.origin_name.clone(),
            stage: state.stage,
            percent: state.percent,
            verdict: state.verdict.clone(),
            error: state.error.clone(),
            size_bytes: self.bytes.len() as u64,
            digest: self.digest.clone(),
            created_at: self.created_at,
            last_touched_at: state.last_touched_at,
        }
    }

    fn last_touched(&self) -> DateTime<Utc> {
        self.state.lock().expect("session state poisoned").last_touched_at
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Concurrent mapping of session id to session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, origin_name: String, bytes: Vec<u8>) -> Arc<Session> {
        let session = Arc::new(Session::new(origin_name, bytes));
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), Arc::clone(&session));
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Most recently touched sessions first.
    pub async fn recent(&self, limit: usize) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let mut snapshots: Vec<SessionSnapshot> =
            sessions.values().map(|s| s.snapshot()).collect();
        snapshots.sort_by(|a, b| b.last_touched_at.cmp(&a.last_touched_at));
        snapshots.truncate(limit);
        snapshots
    }

    /// Remove sessions idle past the TTL. Running non-terminal sessions
    /// are never removed. Returns how many were swept.
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.is_running() || session.last_touched() > cutoff
        });
        before - sessions.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
