use crate::Result;
use crate::service::Service;
use async_trait::async_trait;

/// The service-registry surface the control channel dispatches against.
///
/// All batch operations take an explicit list of service names; an empty
/// list means every configured service. Batches are best-effort: every
/// service is attempted and failures are collected, never short-circuited.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Start services. `force` restarts running services and ignores the
    /// disabled flag; `wait` blocks until each start completes (startup
    /// pause + pidfile wait); `enable` persists the enabled flag first.
    async fn start(&self, names: &[String], force: bool, wait: bool, enable: bool) -> Result<()>;

    /// Stop services. `force` suppresses not-running errors; `wait` blocks
    /// until each process has terminated; `disable` persists the disabled
    /// flag as well.
    async fn stop(&self, names: &[String], force: bool, wait: bool, disable: bool) -> Result<()>;

    /// Stop then start services.
    async fn reset(&self, names: &[String], force: bool, wait: bool) -> Result<()>;

    async fn enable(&self, names: &[String]) -> Result<()>;
    async fn disable(&self, names: &[String]) -> Result<()>;

    /// Snapshot of every configured service, deterministic order.
    async fn values(&self) -> Vec<Service>;

    /// Per-service status table for the `status` verb.
    async fn status_table(&self) -> String;

    /// Declared dependency edges for the `dependencies` verb.
    fn dependency_graph(&self) -> Vec<String>;
}
