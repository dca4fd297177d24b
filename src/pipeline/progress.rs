//! Per-session progress events.
//!
//! Events broadcast best-effort: slow subscribers may drop events but never
//! observe them out of order. The channel keeps the latest event per stage
//! so a re-subscribing client can replay where the session stands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::Stage;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session: String,
    pub stage: Stage,
    /// 0-100, non-decreasing within a stage.
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
    /// Latest event per stage, in emission order.
    latest: Mutex<Vec<ProgressEvent>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, latest: Mutex::new(Vec::new()) }
    }

    /// Emit an event. Delivery is best-effort; the replay buffer always
    /// reflects the latest per-stage state.
    pub fn emit(&self, event: ProgressEvent) {
        {
            let mut latest = self.latest.lock().expect("progress buffer poisoned");
            match latest.iter_mut().rev().find(|e| e.stage == event.stage) {
                Some(existing) => *existing = event.clone(),
                None => latest.push(event.clone()),
            }
        }
        let _ = self.tx.send(event);
    }

    /// Replay of the latest per-stage events plus a live receiver.
    pub fn subscribe(&self) -> (Vec<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        let latest = self.latest.lock().expect("progress buffer poisoned");
        (latest.clone(), self.tx.subscribe())
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(stage: Stage, percent: u8) -> ProgressEvent {
        ProgressEvent {
            session: "s".to_string(),
            stage,
            percent,
            note: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_replay_keeps_latest_per_stage() {
        let channel = ProgressChannel::new();
        channel.emit(event(Stage::Extracting, 10));
        channel.emit(event(Stage::Extracting, 60));
        channel.emit(event(Stage::Enhancing, 5));
        let (replay, _rx) = channel.subscribe();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].stage, Stage::Extracting);
        assert_eq!(replay[0].percent, 60);
        assert_eq!(replay[1].stage, Stage::Enhancing);
    }

    #[tokio::test]
    async fn test_live_delivery_in_order() {
        let channel = ProgressChannel::new();
        let (_, mut rx) = channel.subscribe();
        channel.emit(event(Stage::Extracting, 1));
        channel.emit(event(Stage::Extracting, 2));
        assert_eq!(rx.recv().await.unwrap().percent, 1);
        assert_eq!(rx.recv().await.unwrap().percent, 2);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let channel = ProgressChannel::new();
        channel.emit(event(Stage::Persisting, 100));
    }
}
