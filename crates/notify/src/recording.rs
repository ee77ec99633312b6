//! Recording notifier for tests.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatcher::{NotificationDispatcher, PushMessage, StaffTopic};
use crate::error::{NotifyError, Result};

#[derive(Debug, Default)]
struct RecordingState {
    broadcasts: Vec<(StaffTopic, Value)>,
    pushes: Vec<(String, PushMessage)>,
    fail_on_broadcast: bool,
    fail_on_push: bool,
}

/// Notifier that keeps every delivered message in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures broadcasts to fail.
    pub fn set_fail_on_broadcast(&self, fail: bool) {
        self.state.write().unwrap().fail_on_broadcast = fail;
    }

    /// Configures pushes to fail.
    pub fn set_fail_on_push(&self, fail: bool) {
        self.state.write().unwrap().fail_on_push = fail;
    }

    pub fn broadcasts(&self) -> Vec<(StaffTopic, Value)> {
        self.state.read().unwrap().broadcasts.clone()
    }

    /// Returns the payloads broadcast on one topic, oldest first.
    pub fn broadcasts_on(&self, topic: StaffTopic) -> Vec<Value> {
        self.state
            .read()
            .unwrap()
            .broadcasts
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn pushes(&self) -> Vec<(String, PushMessage)> {
        self.state.read().unwrap().pushes.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn broadcast(&self, topic: StaffTopic, payload: Value) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_broadcast {
            return Err(NotifyError::Delivery("broadcast unavailable".to_string()));
        }
        state.broadcasts.push((topic, payload));
        Ok(())
    }

    async fn push(&self, device_token: &str, message: PushMessage) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_push {
            return Err(NotifyError::Delivery("push gateway unavailable".to_string()));
        }
        state.pushes.push((device_token.to_string(), message));
        Ok(())
    }
}
