//! Registry of models currently held warm behind the backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::DEFAULT_PORT;

/// Reference to whatever serves a loaded model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelHandle {
    /// Served by the shared backend at this base URL.
    Endpoint(String),
}

/// One tracked model.
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub name: String,
    pub endpoint_port: u16,
    pub last_used: Instant,
    pub ttl_minutes: u64,
    pub handle: Option<ModelHandle>,
}

impl ModelEntry {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    /// Whether the entry has been idle for longer than its TTL at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_used) > self.ttl()
    }
}

/// In-memory table of loaded models.
///
/// Every operation takes the single table lock and does nothing but
/// in-memory work while holding it, so calls are linearizable and never
/// wait on the network.
#[derive(Debug)]
pub struct ModelRegistry {
    base_url: String,
    port: u16,
    entries: Mutex<HashMap<String, ModelEntry>>,
}

impl ModelRegistry {
    /// Create a registry for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let port = port_from_url(&base_url).unwrap_or(DEFAULT_PORT);
        Self {
            base_url,
            port,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Port every entry is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ModelEntry>> {
        // The table holds plain data, so a panic elsewhere cannot leave it torn.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `name`, returning the port it is served on.
    ///
    /// Loading an already tracked model only refreshes its timestamp.
    pub fn load(&self, name: &str, ttl_minutes: u64) -> u16 {
        let mut entries = self.lock();

        if let Some(entry) = entries.get_mut(name) {
            entry.last_used = Instant::now();
            debug!("Model '{}' already loaded on port {}", name, entry.endpoint_port);
            return entry.endpoint_port;
        }

        entries.insert(
            name.to_string(),
            ModelEntry {
                name: name.to_string(),
                endpoint_port: self.port,
                last_used: Instant::now(),
                ttl_minutes,
                handle: Some(ModelHandle::Endpoint(self.base_url.clone())),
            },
        );
        info!(
            "Model '{}' registered on port {} (ttl {} min)",
            name, self.port, ttl_minutes
        );
        self.port
    }

    /// Drop the registry's claim on `name`. Returns whether it was tracked.
    pub fn unload(&self, name: &str) -> bool {
        let removed = self.lock().remove(name).is_some();
        if removed {
            info!("Model '{}' unloaded", name);
        }
        removed
    }

    /// Refresh the idle timer of `name`; unknown names are ignored.
    pub fn touch(&self, name: &str) {
        if let Some(entry) = self.lock().get_mut(name) {
            entry.last_used = Instant::now();
        }
    }

    /// Names of all tracked models.
    pub fn list_active(&self) -> BTreeSet<String> {
        self.lock().keys().cloned().collect()
    }

    /// Snapshot of one entry.
    pub fn get(&self, name: &str) -> Option<ModelEntry> {
        self.lock().get(name).cloned()
    }

    /// Names whose idle time exceeds their TTL at `now`.
    pub fn expired(&self, now: Instant) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn port_from_url(url: &str) -> Option<u16> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split('/').next()?;
    let (_, port) = authority.rsplit_once(':')?;
    port.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_port_from_url() {
        assert_eq!(port_from_url("http://localhost:1234"), Some(1234));
        assert_eq!(port_from_url("http://127.0.0.1:8080/v1"), Some(8080));
        assert_eq!(port_from_url("http://localhost"), None);
    }

    #[test]
    fn test_registry_port_defaults() {
        assert_eq!(ModelRegistry::new("http://localhost:9999").port(), 9999);
        assert_eq!(ModelRegistry::new("http://backend").port(), DEFAULT_PORT);
    }

    #[test]
    fn test_load_is_idempotent() {
        let registry = ModelRegistry::new("http://localhost:1234");
        let first = registry.load("qwen3-8b-mlx", 30);
        let second = registry.load("qwen3-8b-mlx", 30);

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_refreshes_timestamp() {
        let registry = ModelRegistry::new("http://localhost:1234");
        registry.load("m", 30);
        let before = registry.get("m").unwrap().last_used;
        std::thread::sleep(Duration::from_millis(5));
        registry.load("m", 30);
        assert!(registry.get("m").unwrap().last_used > before);
    }

    #[test]
    fn test_unload() {
        let registry = ModelRegistry::new("http://localhost:1234");
        registry.load("m", 30);

        assert!(registry.unload("m"));
        assert!(!registry.unload("m"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_touch_absent_is_noop() {
        let registry = ModelRegistry::new("http://localhost:1234");
        registry.touch("ghost");
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn test_list_active() {
        let registry = ModelRegistry::new("http://localhost:1234");
        registry.load("b", 30);
        registry.load("a", 30);
        let names: Vec<_> = registry.list_active().into_iter().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_expired() {
        let registry = ModelRegistry::new("http://localhost:1234");
        registry.load("short", 1);
        registry.load("long", 30);

        let later = Instant::now() + Duration::from_secs(5 * 60);
        assert_eq!(registry.expired(later), vec!["short".to_string()]);
        assert!(registry.expired(Instant::now()).is_empty());
    }

    #[test]
    fn test_concurrent_loads_share_one_entry() {
        let registry = Arc::new(ModelRegistry::new("http://localhost:1234"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.load("shared", 30))
            })
            .collect();

        let ports: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ports.iter().all(|&p| p == 1234));
        assert_eq!(registry.len(), 1);
    }
}
