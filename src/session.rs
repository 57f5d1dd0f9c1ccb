//! Conversation sessions
//!
//! Each conversation owns an accumulating history buffer. Sessions live in a
//! registry keyed by session id; every session sits behind its own async mutex
//! so a turn can hold it from history snapshot to history append without
//! blocking other conversations.

use crate::key::TURN_SEPARATOR;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct ConversationSession {
    history: String,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn unless the history already ends with it.
    ///
    /// Guards against double-appending when both the hit and miss paths of
    /// the same logical turn record it.
    pub fn append_turn(&mut self, text: &str) {
        if self.history.ends_with(text) {
            return;
        }
        self.history.push(' ');
        self.history.push_str(TURN_SEPARATOR);
        self.history.push(' ');
        self.history.push_str(text);
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn snapshot(&self) -> String {
        self.history.clone()
    }
}

/// Process-lifetime registry of conversation sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<ConversationSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a session for the duration of one turn, creating it on first use.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<ConversationSession> {
        // Clone the Arc out first so no map shard stays locked across the await.
        let session = {
            let entry = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    debug!("Opening conversation session '{}'", session_id);
                    Arc::new(Mutex::new(ConversationSession::new()))
                });
            Arc::clone(entry.value())
        };
        session.lock_owned().await
    }

    /// Clear a session's history and drop it from the registry.
    ///
    /// An entry another turn is holding or waiting on stays in place, empty.
    pub async fn reset(&self, session_id: &str) {
        let Some(session) = self.sessions.get(session_id).map(|entry| Arc::clone(entry.value())) else {
            return;
        };
        session.lock().await.reset();
        drop(session);

        if self
            .sessions
            .remove_if(session_id, |_, session| Arc::strong_count(session) == 1)
            .is_some()
        {
            debug!("Closed conversation session '{}'", session_id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
