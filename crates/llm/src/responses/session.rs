//! Responses-API session state: the FSM that lets a single SSE connection span a
//! model turn, a tool round-trip, and the next turn.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::{messages::unified::UnifiedRequest, request::RequestContext};

/// Warn when a (tool, arguments) pair has been seen this many times.
pub(crate) const WARN_AT: u32 = 3;
/// Terminate the session with a synthetic stop once a pair has been seen this many times.
pub(crate) const STOP_AT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    StreamingFirstTurn,
    AwaitingToolOutputs,
    StreamingNextTurn,
}

/// A single in-flight Responses-API conversation. Ephemeral: lives only in the
/// process's memory, never persisted.
pub(crate) struct Session {
    pub(crate) id: String,
    pub(crate) conversation: UnifiedRequest,
    pub(crate) context: RequestContext,
    pub(crate) events_tx: mpsc::UnboundedSender<axum::response::sse::Event>,
    pub(crate) state: SessionState,
    pub(crate) sequence: u64,
    fingerprints: HashMap<(String, String), u32>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        conversation: UnifiedRequest,
        context: RequestContext,
        events_tx: mpsc::UnboundedSender<axum::response::sse::Event>,
    ) -> Self {
        Self {
            id,
            conversation,
            context,
            events_tx,
            state: SessionState::StreamingFirstTurn,
            sequence: 0,
            fingerprints: HashMap::new(),
        }
    }

    /// Next monotonic sequence number for an outgoing event.
    pub(crate) fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    /// Record a completed tool call and report how many times this exact
    /// `(tool_name, arguments)` pair has now been seen in this session.
    pub(crate) fn record_tool_call(&mut self, tool_name: &str, canonical_arguments: &str) -> u32 {
        let key = (tool_name.to_string(), canonical_arguments.to_string());
        let count = self.fingerprints.entry(key).or_insert(0);
        *count += 1;
        *count
    }
}

/// Registry of live sessions, keyed by session id.
///
/// `take` atomically removes and returns a session so exactly one task ever owns it
/// at a time; callers that want the session to remain reachable reinsert it when done.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub(crate) fn take(&self, id: &str) -> Option<Session> {
        self.sessions.remove(id).map(|(_, session)| session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RequestContext {
        RequestContext::default()
    }

    fn conversation() -> UnifiedRequest {
        UnifiedRequest {
            model: "test".to_string(),
            messages: Vec::new(),
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: None,
            stream: Some(true),
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            metadata: None,
        }
    }

    #[test]
    fn registry_take_removes_and_returns_the_session() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.insert(Session::new("s1".to_string(), conversation(), context(), tx));

        assert!(registry.take("s1").is_some());
        assert!(registry.take("s1").is_none());
    }

    #[test]
    fn fingerprint_count_increments_per_identical_call() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = Session::new("s1".to_string(), conversation(), context(), tx);

        assert_eq!(session.record_tool_call("search", "{}"), 1);
        assert_eq!(session.record_tool_call("search", "{}"), 2);
        assert_eq!(session.record_tool_call("search", r#"{"q":1}"#), 1);
    }
}
