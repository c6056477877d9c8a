use crate::logger::SyslogPriority;
use crate::registry::ServiceRegistry;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Shared context the command handlers execute against: the service
/// registry plus supervisor-level state (forced log level, shutdown).
///
/// The forced log level is explicit controller state rather than a
/// process-wide singleton; applying it to the `log` facade happens here and
/// nowhere else.
pub struct Controller {
    pub services: Arc<dyn ServiceRegistry>,
    version: String,
    started_at: Instant,
    forced_log_level: Mutex<Option<SyslogPriority>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Controller {
    pub fn new(services: Arc<dyn ServiceRegistry>) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            services,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            forced_log_level: Mutex::new(None),
            shutdown_tx,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_secs(self.started_at.elapsed().as_secs())
    }

    pub fn forced_log_level(&self) -> Option<SyslogPriority> {
        *self.forced_log_level.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn force_log_level(&self, priority: SyslogPriority) {
        log::set_max_level(priority.level_filter());
        *self
            .forced_log_level
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(priority);
    }

    /// Request whole-supervisor termination. Idempotent. `send_replace`
    /// updates the value even while nobody is subscribed yet, so a request
    /// arriving before `wait_for_shutdown` is never lost.
    pub fn kill_system(&self) {
        info!("system shutdown requested");
        self.shutdown_tx.send_replace(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::control::dispatch::tests::make_controller;

    #[tokio::test]
    async fn test_kill_system_before_any_subscriber() {
        let (ctl, _) = make_controller();
        assert!(!ctl.shutdown_requested());
        ctl.kill_system();
        assert!(ctl.shutdown_requested());
        // late subscriber still observes the request
        ctl.wait_for_shutdown().await;
    }
}
