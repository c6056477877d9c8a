//! Supervisor module - the concrete service registry
//!
//! Split into focused submodules:
//! - `lifecycle`: child spawn and stop operations
//! - `monitor`: startup pause, pidfile wait, exit watcher

mod lifecycle;
mod monitor;

use crate::Result;
use crate::config::ShepherdToml;
use crate::error::{BatchError, ServiceError, find_similar_service};
use crate::registry::ServiceRegistry;
use crate::service::{Service, ServiceStatus};
use crate::state_file::StateFile;
use async_trait::async_trait;
use comfy_table::Table;
use indexmap::IndexMap;
use itertools::Itertools;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct Supervisor {
    pub(crate) config: ShepherdToml,
    pub(crate) state_file: Mutex<StateFile>,
    pub(crate) handles: Mutex<IndexMap<String, ServiceHandle>>,
    /// Per-service operation locks. Start/stop/reset hold the service's
    /// lock for their full duration so handle mutations never interleave
    /// and at most one monitor task is attached per handle.
    service_locks: IndexMap<String, Mutex<()>>,
    /// Self-reference for tasks spawned by monitor/lifecycle code.
    pub(crate) me: Weak<Supervisor>,
}

/// Live bookkeeping for one supervised child. At most one monitor task is
/// attached at any time; a superseding start aborts and awaits the old one.
#[derive(Debug, Default)]
pub(crate) struct ServiceHandle {
    pub pid: Option<u32>,
    pub status: Option<ServiceStatus>,
    pub monitor: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(config: ShepherdToml, mut state_file: StateFile) -> Arc<Self> {
        // Services shipped disabled in config are seeded into the persisted
        // disabled set; from then on that set is the single source of truth
        // for the enabled flag.
        let mut dirty = false;
        for (name, service) in &config.services {
            if !service.enabled && state_file.disabled.insert(name.clone()) {
                dirty = true;
            }
        }
        if dirty && let Err(err) = state_file.write() {
            warn!("failed to seed state file: {err:#}");
        }
        let handles = config
            .services
            .keys()
            .map(|name| (name.clone(), ServiceHandle::default()))
            .collect();
        let service_locks = config
            .services
            .keys()
            .map(|name| (name.clone(), Mutex::new(())))
            .collect();
        Arc::new_cyclic(|me| Self {
            config,
            state_file: Mutex::new(state_file),
            handles: Mutex::new(handles),
            service_locks,
            me: me.clone(),
        })
    }

    /// Take the operation lock for one service. Unknown names yield no
    /// guard; the operation itself reports NotFound.
    pub(crate) async fn lock_service(&self, name: &str) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match self.service_locks.get(name) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }

    /// Expand a name list (empty = all configured services), collecting an
    /// error per unknown name so the rest of the batch still runs.
    fn resolve(&self, names: &[String]) -> (Vec<String>, Vec<miette::Report>) {
        if names.is_empty() {
            return (self.config.services.keys().cloned().collect(), vec![]);
        }
        let mut targets = vec![];
        let mut errors = vec![];
        for name in names {
            if self.config.services.contains_key(name) {
                targets.push(name.clone());
            } else {
                let suggestion =
                    find_similar_service(name, self.config.services.keys().map(|s| s.as_str()));
                errors.push(miette::Report::new(ServiceError::NotFound {
                    name: name.clone(),
                    suggestion,
                }));
            }
        }
        (targets, errors)
    }

    fn finish_batch(&self, attempted: usize, errors: Vec<miette::Report>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BatchError::new(attempted, errors).into())
        }
    }

    pub(crate) async fn is_enabled(&self, name: &str) -> bool {
        !self.state_file.lock().await.disabled.contains(name)
    }

    async fn set_enabled(&self, names: &[String], enabled: bool) -> Result<()> {
        let mut state_file = self.state_file.lock().await;
        for name in names {
            if enabled {
                state_file.disabled.remove(name);
            } else {
                state_file.disabled.insert(name.clone());
            }
        }
        state_file.write()
    }

    async fn snapshot(&self, name: &str) -> Service {
        let handles = self.handles.lock().await;
        let handle = handles.get(name);
        Service {
            name: name.to_string(),
            pid: handle.and_then(|h| h.pid),
            status: handle
                .and_then(|h| h.status.clone())
                .unwrap_or(ServiceStatus::Stopped),
            enabled: self.is_enabled(name).await,
            pidfile: self
                .config
                .services
                .get(name)
                .and_then(|c| c.pidfile.clone()),
        }
    }

    /// Start every enabled service without waiting on pidfiles.
    pub async fn autostart(&self) -> Result<()> {
        let mut names = vec![];
        for name in self.config.services.keys() {
            if self.is_enabled(name).await {
                names.push(name.clone());
            }
        }
        if names.is_empty() {
            return Ok(());
        }
        self.start(&names, false, false, false).await
    }

    /// Stop every running service; used during supervisor shutdown.
    pub async fn close(&self) {
        let names: Vec<_> = self.handles.lock().await.keys().cloned().collect();
        for name in names {
            if let Err(err) = self.stop_service(&name, true, true).await {
                error!("failed to stop service {name}: {err}");
            }
        }
    }
}

#[async_trait]
impl ServiceRegistry for Supervisor {
    async fn start(&self, names: &[String], force: bool, wait: bool, enable: bool) -> Result<()> {
        let (targets, mut errors) = self.resolve(names);
        let attempted = targets.len() + errors.len();
        if enable {
            self.set_enabled(&targets, true).await?;
        }
        if wait {
            for name in &targets {
                if let Err(err) = self.start_service(name, force).await {
                    errors.push(err);
                }
            }
        } else {
            for name in targets {
                let Some(sup) = self.me.upgrade() else { break };
                tokio::spawn(async move {
                    if let Err(err) = sup.start_service(&name, force).await {
                        warn!("queued start of {name} failed: {err}");
                    }
                });
            }
        }
        self.finish_batch(attempted, errors)
    }

    async fn stop(&self, names: &[String], force: bool, wait: bool, disable: bool) -> Result<()> {
        let (targets, mut errors) = self.resolve(names);
        let attempted = targets.len() + errors.len();
        if disable {
            self.set_enabled(&targets, false).await?;
        }
        for name in &targets {
            if let Err(err) = self.stop_service(name, force, wait).await {
                errors.push(err);
            }
        }
        self.finish_batch(attempted, errors)
    }

    async fn reset(&self, names: &[String], force: bool, wait: bool) -> Result<()> {
        let (targets, mut errors) = self.resolve(names);
        let attempted = targets.len() + errors.len();
        if wait {
            for name in &targets {
                if let Err(err) = self.reset_service(name, force).await {
                    errors.push(err);
                }
            }
        } else {
            for name in targets {
                let Some(sup) = self.me.upgrade() else { break };
                tokio::spawn(async move {
                    if let Err(err) = sup.reset_service(&name, force).await {
                        warn!("queued reset of {name} failed: {err}");
                    }
                });
            }
        }
        self.finish_batch(attempted, errors)
    }

    async fn enable(&self, names: &[String]) -> Result<()> {
        let (targets, errors) = self.resolve(names);
        let attempted = targets.len() + errors.len();
        self.set_enabled(&targets, true).await?;
        self.finish_batch(attempted, errors)
    }

    async fn disable(&self, names: &[String]) -> Result<()> {
        let (targets, errors) = self.resolve(names);
        let attempted = targets.len() + errors.len();
        self.set_enabled(&targets, false).await?;
        self.finish_batch(attempted, errors)
    }

    async fn values(&self) -> Vec<Service> {
        let names = self.config.services.keys().sorted().cloned().collect_vec();
        let mut services = Vec::with_capacity(names.len());
        for name in names {
            services.push(self.snapshot(&name).await);
        }
        services
    }

    async fn status_table(&self) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Name", "PID", "Status", "Enabled"]);
        for service in self.values().await {
            let status = match service.status.error_message() {
                Some(msg) => format!("{} ({msg})", service.status.style()),
                None => service.status.style(),
            };
            table.add_row(vec![
                service.name.clone(),
                service.pid.map(|p| p.to_string()).unwrap_or_default(),
                status,
                if service.enabled { "yes" } else { "no" }.to_string(),
            ]);
        }
        table.to_string()
    }

    fn dependency_graph(&self) -> Vec<String> {
        self.config.dependency_graph()
    }
}
