//! Per-session agent state with TTL eviction.
//!
//! One mutex guards the whole mapping; every mutation happens under it and
//! evaluators receive deep-copied snapshots so detection can run without
//! holding the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Prompt history is bounded to the most recent entries.
const HISTORY_LIMIT: usize = 20;

/// One recorded prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptEntry {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Metrics for one agent session. Snapshots handed to evaluators are deep
/// copies; the store owns the live state exclusively.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub total_tokens: u64,
    pub request_count: u64,
    pub prompt_history: Vec<PromptEntry>,
    /// Tool name → ordered call timestamps.
    pub tool_calls: HashMap<String, Vec<DateTime<Utc>>>,
    pub consecutive_errors: u32,
}

impl SessionState {
    fn new(session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            last_active: now,
            total_tokens: 0,
            request_count: 0,
            prompt_history: Vec::new(),
            tool_calls: HashMap::new(),
            consecutive_errors: 0,
        }
    }
}

/// All active sessions, keyed by session id, with automatic cleanup of
/// idle entries.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store that evicts sessions idle for longer than `ttl`.
    /// The background sweep is started separately via [`Self::spawn_sweeper`].
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return a snapshot of the session, creating it first if needed.
    pub fn get_or_create(&self, session_id: &str) -> SessionState {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id, Utc::now()))
            .clone()
    }

    /// Record a parsed request before forwarding: appends the prompt
    /// (trimming history to the last 20) and a timestamp per tool name.
    /// No-op for unknown sessions.
    pub fn record_request(&self, session_id: &str, prompt_text: &str, tool_names: &[String]) {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(s) = sessions.get_mut(session_id) else {
            return;
        };

        let now = Utc::now();
        s.last_active = now;
        s.request_count += 1;

        if !prompt_text.is_empty() {
            s.prompt_history.push(PromptEntry {
                text: prompt_text.to_string(),
                timestamp: now,
            });
            if s.prompt_history.len() > HISTORY_LIMIT {
                let excess = s.prompt_history.len() - HISTORY_LIMIT;
                s.prompt_history.drain(..excess);
            }
        }

        for tool in tool_names {
            s.tool_calls.entry(tool.clone()).or_default().push(now);
        }
    }

    /// Record the upstream outcome: adds tokens and tracks the
    /// consecutive-error counter (reset on success).
    pub fn record_response(&self, session_id: &str, tokens: u64, is_error: bool) {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(s) = sessions.get_mut(session_id) else {
            return;
        };

        s.total_tokens += tokens;
        if is_error {
            s.consecutive_errors += 1;
        } else {
            s.consecutive_errors = 0;
        }
    }

    /// Total tokens consumed by a session, 0 if unknown.
    pub fn session_tokens(&self, session_id: &str) -> u64 {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(session_id).map_or(0, |s| s.total_tokens)
    }

    /// Deep-copied snapshot for evaluators, `None` for unknown sessions.
    pub fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(session_id).cloned()
    }

    /// Delete a session. Used when a guardrail terminates it.
    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(session_id);
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions idle longer than the ttl, relative to `now`.
    /// Returns how many were evicted.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::minutes(5));
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_active <= ttl);
        before - sessions.len()
    }

    /// Start the once-per-minute eviction sweep. Runs until the token is
    /// cancelled.
    pub fn spawn_sweeper(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = store.sweep_idle(Utc::now());
                        if evicted > 0 {
                            debug!(evicted, "session sweep");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_initializes_session() {
        let store = SessionStore::new(Duration::from_secs(300));
        let s = store.get_or_create("sess-1");
        assert_eq!(s.session_id, "sess-1");
        assert_eq!(s.total_tokens, 0);
        assert_eq!(store.len(), 1);

        // Second call returns the same session, not a new one.
        store.record_response("sess-1", 10, false);
        let s = store.get_or_create("sess-1");
        assert_eq!(s.total_tokens, 10);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn record_request_tracks_prompts_and_tools() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.get_or_create("sess-1");
        store.record_request(
            "sess-1",
            "fix the bug",
            &["search".to_string(), "calculator".to_string()],
        );
        store.record_request("sess-1", "fix the bug again", &["search".to_string()]);

        let s = store.snapshot("sess-1").unwrap();
        assert_eq!(s.request_count, 2);
        assert_eq!(s.prompt_history.len(), 2);
        assert_eq!(s.tool_calls["search"].len(), 2);
        assert_eq!(s.tool_calls["calculator"].len(), 1);
    }

    #[test]
    fn prompt_history_is_bounded_to_twenty() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.get_or_create("sess-1");
        for i in 0..25 {
            store.record_request("sess-1", &format!("prompt {i}"), &[]);
        }

        let s = store.snapshot("sess-1").unwrap();
        assert_eq!(s.prompt_history.len(), 20);
        assert_eq!(s.prompt_history[0].text, "prompt 5");
        assert_eq!(s.prompt_history[19].text, "prompt 24");
    }

    #[test]
    fn empty_prompts_are_not_recorded() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.get_or_create("sess-1");
        store.record_request("sess-1", "", &[]);
        let s = store.snapshot("sess-1").unwrap();
        assert!(s.prompt_history.is_empty());
        assert_eq!(s.request_count, 1);
    }

    #[test]
    fn consecutive_errors_reset_on_success() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.get_or_create("sess-1");

        store.record_response("sess-1", 0, true);
        store.record_response("sess-1", 0, true);
        assert_eq!(store.snapshot("sess-1").unwrap().consecutive_errors, 2);

        store.record_response("sess-1", 0, false);
        assert_eq!(store.snapshot("sess-1").unwrap().consecutive_errors, 0);
    }

    #[test]
    fn record_on_unknown_session_is_a_noop() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.record_request("ghost", "hello", &[]);
        store.record_response("ghost", 5, false);
        assert!(store.is_empty());
    }

    #[test]
    fn remove_deletes_session() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.get_or_create("sess-1");
        store.remove("sess-1");
        assert!(store.snapshot("sess-1").is_none());
    }

    #[test]
    fn sweep_evicts_idle_sessions() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.get_or_create("old");
        store.get_or_create("fresh");

        // "old" last active 10 minutes in the past from the sweep's view.
        let future = Utc::now() + chrono::Duration::minutes(10);
        store.record_request("fresh", "", &[]); // refresh, still old relative to `future`

        // Make "fresh" actually fresh by sweeping from a point just after now.
        let evicted = store.sweep_idle(future);
        assert_eq!(evicted, 2);

        store.get_or_create("kept");
        let evicted = store.sweep_idle(Utc::now());
        assert_eq!(evicted, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_is_a_deep_copy() {
        let store = SessionStore::new(Duration::from_secs(300));
        store.get_or_create("sess-1");
        store.record_request("sess-1", "hello", &["search".to_string()]);

        let snap = store.snapshot("sess-1").unwrap();
        store.record_request("sess-1", "world", &["search".to_string()]);

        // The earlier snapshot must not observe the later mutation.
        assert_eq!(snap.prompt_history.len(), 1);
        assert_eq!(snap.tool_calls["search"].len(), 1);
    }
}
