use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

#[derive(Debug)]
struct AbortHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl AbortHandle {
    fn abort(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Best-effort cancellation for in-flight generations, keyed by session.
///
/// Aborting stops local publication into session state; it does not promise
/// the upstream request is torn down.
#[derive(Clone, Default)]
pub struct AbortRegistry {
    inner: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight generation, replacing any stale handle.
    pub fn register(&self, key: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut map) = self.inner.lock() {
            map.insert(key.to_string(), AbortHandle { tx: Some(tx) });
        }
        rx
    }

    /// Signal the generation for `key`, if any. Returns whether a handle was
    /// found.
    pub fn abort(&self, key: &str) -> bool {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(mut handle) = map.remove(key) {
                handle.abort();
                return true;
            }
        }
        false
    }

    /// Drop the handle once the stream settles. Must happen after the final
    /// state write so a late abort cannot race a fresh registration.
    pub fn unregister(&self, key: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_fires_the_receiver() {
        let registry = AbortRegistry::new();
        let rx = registry.register("s1");
        assert!(registry.abort("s1"));
        rx.await.expect("abort signal");
    }

    #[test]
    fn abort_of_unknown_key_reports_false() {
        let registry = AbortRegistry::new();
        assert!(!registry.abort("missing"));
    }
}
