//! Background eviction of idle models.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::registry::ModelRegistry;

/// Default sweep interval.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic task that unloads models idle past their TTL.
///
/// Owned by whoever composes the pipeline; stop it with [`TtlReaper::shutdown`].
#[derive(Debug)]
pub struct TtlReaper {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

/// Evict every entry of `registry` that is expired at `now`.
///
/// The expired names are collected under the registry lock; the unloads
/// happen afterwards, one lock acquisition each. A touch that lands between
/// the two steps does not save the model.
pub fn sweep(registry: &ModelRegistry, now: Instant) -> Vec<String> {
    let expired = registry.expired(now);
    let mut evicted = Vec::with_capacity(expired.len());

    for name in expired {
        if registry.unload(&name) {
            evicted.push(name);
        }
    }

    evicted
}

impl TtlReaper {
    /// Start sweeping `registry` every `interval`. Must be called inside a tokio runtime.
    pub fn spawn(registry: Arc<ModelRegistry>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = sweep(&registry, Instant::now());
                        if !evicted.is_empty() {
                            info!("Evicted idle models: {}", evicted.join(", "));
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            debug!("TTL reaper stopping");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TtlReaper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_evicts_only_expired() {
        let registry = ModelRegistry::new("http://localhost:1234");
        registry.load("idle", 1);
        registry.load("busy", 10);

        let now = Instant::now() + Duration::from_secs(2 * 60);
        let evicted = sweep(&registry, now);

        assert_eq!(evicted, vec!["idle".to_string()]);
        assert!(registry.get("idle").is_none());
        assert!(registry.get("busy").is_some());
    }

    #[test]
    fn test_sweep_respects_exact_ttl() {
        let registry = ModelRegistry::new("http://localhost:1234");
        registry.load("m", 1);
        let loaded_at = registry.get("m").unwrap().last_used;

        // Idle for exactly the TTL is not yet expired.
        assert!(sweep(&registry, loaded_at + Duration::from_secs(60)).is_empty());
        assert_eq!(
            sweep(&registry, loaded_at + Duration::from_secs(61)),
            vec!["m".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_evicts_on_tick() {
        let registry = Arc::new(ModelRegistry::new("http://localhost:1234"));
        registry.load("zero-ttl", 0);

        let reaper = TtlReaper::spawn(Arc::clone(&registry), Duration::from_secs(60));
        assert!(reaper.is_running());

        // Wall-clock idle time must exceed the zero TTL before the tick fires.
        std::thread::sleep(Duration::from_millis(2));
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..10 {
            if registry.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(registry.is_empty());
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let registry = Arc::new(ModelRegistry::new("http://localhost:1234"));
        let reaper = TtlReaper::spawn(registry, Duration::from_secs(3600));
        reaper.shutdown().await;
    }
}
