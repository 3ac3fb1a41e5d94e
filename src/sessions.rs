//! Per-session analyzers for the upload endpoint.
//!
//! Keys only partition smoothing state; they carry no authentication.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::info;

use crate::posture::{AnalyzerSettings, PostureAnalyzer};

pub type SharedAnalyzer = Arc<Mutex<PostureAnalyzer>>;

pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

pub struct SessionRegistry {
    sessions: Mutex<LruCache<String, SharedAnalyzer>>,
    settings: AnalyzerSettings,
}

impl SessionRegistry {
    pub fn new(capacity: usize, settings: AnalyzerSettings) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            settings,
        }
    }

    /// The analyzer for `key`, created on first use. May evict the least recently used session.
    pub fn analyzer(&self, key: &str) -> SharedAnalyzer {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(key) {
            return Arc::clone(existing);
        }

        let analyzer = Arc::new(Mutex::new(PostureAnalyzer::new(self.settings)));
        if let Some((evicted, _)) = sessions.push(key.to_string(), Arc::clone(&analyzer)) {
            info!(session = %evicted, "session evicted");
        }
        info!(session = %key, active = sessions.len(), "session created");
        analyzer
    }

    pub fn remove(&self, key: &str) -> bool {
        self.sessions.lock().pop(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

/// Best-effort key for callers that send no session id.
pub fn fallback_key(remote_ip: Option<&str>, user_agent: Option<&str>, ua_prefix: usize) -> String {
    let ua: String = user_agent.unwrap_or("").chars().take(ua_prefix).collect();
    format!("{}|{}", remote_ip.unwrap_or("unknown"), ua)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RawMetrics;

    #[test]
    fn same_key_shares_state() {
        let registry = SessionRegistry::new(4, AnalyzerSettings::default());
        registry.analyzer("a").lock().evaluate(&RawMetrics::default());
        assert_eq!(registry.analyzer("a").lock().frames(), 1);
        assert_eq!(registry.analyzer("b").lock().frames(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let registry = SessionRegistry::new(2, AnalyzerSettings::default());
        registry.analyzer("a").lock().evaluate(&RawMetrics::default());
        registry.analyzer("b");
        registry.analyzer("a");
        registry.analyzer("c");
        assert_eq!(registry.len(), 2);
        // "a" was touched after "b", so "b" went.
        assert_eq!(registry.analyzer("a").lock().frames(), 1);
        assert!(!registry.remove("b"));
    }

    #[test]
    fn remove_drops_state() {
        let registry = SessionRegistry::new(2, AnalyzerSettings::default());
        registry.analyzer("a").lock().evaluate(&RawMetrics::default());
        assert!(registry.remove("a"));
        assert!(registry.is_empty());
        assert_eq!(registry.analyzer("a").lock().frames(), 0);
    }

    #[test]
    fn fallback_key_truncates_user_agent() {
        assert_eq!(
            fallback_key(Some("10.0.0.1"), Some("Mozilla/5.0 (X11)"), 7),
            "10.0.0.1|Mozilla"
        );
        assert_eq!(fallback_key(None, None, 50), "unknown|");
    }
}
