//! Process-wide session cache
//!
//! Scripts that talk to the same host from many places share one session
//! per key instead of opening a new connection each time.

use crate::result::SessionError;
use crate::session::Session;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::debug;

/// A shared session.
pub type SharedSession = Arc<Mutex<Session>>;

/// Sessions cached by key.
///
/// Creation is serialised: two tasks asking for the same missing key get
/// the same session, and the factory runs once.
///
/// # Examples
///
/// ```no_run
/// use interactrust::{Session, SessionRegistry, SendOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let local = SessionRegistry::global()
///     .get_or_create("local", || Session::builder().pty(true).spawn("sh -i"))
///     .await?;
/// local.lock().await.cmd("uptime", SendOptions::default()).await?;
///
/// // At exit
/// SessionRegistry::global().shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static SessionRegistry {
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    /// Session stored under `key`, created with `factory` when missing.
    ///
    /// A failing factory stores nothing.
    pub async fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> Result<SharedSession, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Session, SessionError>>,
    {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(key) {
            return Ok(Arc::clone(session));
        }
        let session = Arc::new(Mutex::new(factory().await?));
        debug!(key, "registered session");
        sessions.insert(key.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, key: &str) -> Option<SharedSession> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Forget a session. It stays open while other handles exist.
    pub async fn remove(&self, key: &str) -> Option<SharedSession> {
        self.sessions.lock().await.remove(key)
    }

    /// Registered keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Close and forget every registered session.
    pub async fn shutdown(&self) {
        let sessions: Vec<(String, SharedSession)> = self.sessions.lock().await.drain().collect();
        for (key, session) in sessions {
            debug!(key = %key, "closing registered session");
            session.lock().await.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unconnected(cmd: &str) -> Session {
        Session::builder().lazy(true).build(cmd)
    }

    #[tokio::test]
    async fn test_factory_runs_once_per_key() {
        let registry = SessionRegistry::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let first = registry
            .get_or_create("host", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(unconnected("sh"))
            })
            .await
            .unwrap();
        let second = registry
            .get_or_create("host", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(unconnected("bash"))
            })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(first.lock().await.command_line(), "sh");
    }

    #[tokio::test]
    async fn test_failed_factory_stores_nothing() {
        let registry = SessionRegistry::new();
        let result = registry
            .get_or_create("broken", || async {
                Err(SessionError::NoCommand {
                    name: "broken".to_string(),
                })
            })
            .await;
        assert!(result.is_err());
        assert!(registry.get("broken").await.is_none());
    }

    #[tokio::test]
    async fn test_keys_remove_and_shutdown() {
        let registry = SessionRegistry::new();
        for key in ["b", "a"] {
            registry
                .get_or_create(key, || async { Ok(unconnected("sh")) })
                .await
                .unwrap();
        }
        assert_eq!(registry.keys().await, vec!["a".to_string(), "b".to_string()]);

        let removed = registry.remove("a").await.unwrap();
        assert_eq!(registry.keys().await, vec!["b".to_string()]);
        assert_eq!(removed.lock().await.state(), ConnectionState::Unconnected);

        let kept = registry.get("b").await.unwrap();
        registry.shutdown().await;
        assert!(registry.keys().await.is_empty());
        assert_eq!(kept.lock().await.state(), ConnectionState::Closed);
    }
}
