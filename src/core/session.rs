//! Session tracking for read-after-write consistency.
//!
//! A session is created the first time a write is observed for a session
//! key; reads under `ReadAfterWrite` stay pinned to the primary until the
//! sticky window elapses, after which they fall back to normal replica
//! routing. Expiry is a TTL comparison, so an expired session costs nothing
//! until the cleanup sweep removes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Per-session write bookkeeping
#[derive(Debug, Clone)]
pub struct Session {
    pub last_write_at: Instant,
    pub sticky_until: Instant,
}

struct Worker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Tracks last-write times per session key
pub struct SessionTracker {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    sticky_window: Duration,
    worker: Mutex<Option<Worker>>,
}

impl SessionTracker {
    pub fn new(sticky_window: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            sticky_window,
            worker: Mutex::new(None),
        }
    }

    /// Record a write for a session, opening (or refreshing) its sticky window
    pub async fn record_write(&self, session_key: &str) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_key.to_string(),
            Session {
                last_write_at: now,
                sticky_until: now + self.sticky_window,
            },
        );
    }

    /// Whether reads for this session must still go to the primary
    pub async fn is_sticky(&self, session_key: &str) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(session_key) {
            Some(session) => Instant::now() < session.sticky_until,
            None => false,
        }
    }

    /// Get session bookkeeping for a key
    pub async fn get_session(&self, session_key: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(session_key).cloned()
    }

    /// Total tracked session count, expired entries included
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Remove sessions whose sticky window has elapsed
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, session| now < session.sticky_until);
        before - sessions.len()
    }

    /// Start the periodic cleanup sweep
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            tracing::warn!("Session cleanup task already running");
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let tracker = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(tracker.sticky_window.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let cleaned = tracker.cleanup_expired_sessions().await;
                        if cleaned > 0 {
                            tracing::debug!("Cleaned up {} expired sessions", cleaned);
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            tracing::debug!("Session cleanup loop exited");
        });

        *worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop the cleanup sweep and wait for it to exit. Idempotent.
    pub async fn stop_cleanup_task(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            let _ = worker.handle.await;
        }
    }
}
