//! Child spawn and stop operations.

use super::Supervisor;
use crate::error::ServiceError;
use crate::procs::PROCS;
use crate::service::ServiceStatus;
use crate::{Result, env};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time;

impl Supervisor {
    /// Start one service: enabled/running checks, then spawn + monitor.
    /// Returns once the startup pause and any pidfile wait have passed.
    pub(crate) async fn start_service(&self, name: &str, force: bool) -> Result<()> {
        let _guard = self.lock_service(name).await;
        self.start_service_locked(name, force).await
    }

    async fn start_service_locked(&self, name: &str, force: bool) -> Result<()> {
        let running_pid = {
            let handles = self.handles.lock().await;
            handles.get(name).and_then(|h| h.pid)
        };
        if let Some(pid) = running_pid {
            if !force {
                return Err(ServiceError::AlreadyRunning {
                    name: name.to_string(),
                    pid,
                }
                .into());
            }
            self.stop_service_locked(name, true, true).await?;
        }
        if !force && !self.is_enabled(name).await {
            return Err(ServiceError::Disabled {
                name: name.to_string(),
            }
            .into());
        }
        self.start_and_monitor_locked(name).await
    }

    pub(crate) async fn reset_service(&self, name: &str, force: bool) -> Result<()> {
        let _guard = self.lock_service(name).await;
        // stop is forced so a stopped service resets cleanly into a start
        self.stop_service_locked(name, true, true).await?;
        self.start_service_locked(name, force).await
    }

    /// Stop one service. `force` turns a not-running service into a no-op;
    /// `wait` polls until the process table agrees the pid is gone.
    pub(crate) async fn stop_service(&self, name: &str, force: bool, wait: bool) -> Result<()> {
        let _guard = self.lock_service(name).await;
        self.stop_service_locked(name, force, wait).await
    }

    pub(super) async fn stop_service_locked(&self, name: &str, force: bool, wait: bool) -> Result<()> {
        let (pid, monitor) = {
            let mut handles = self.handles.lock().await;
            let Some(handle) = handles.get_mut(name) else {
                return Err(ServiceError::NotFound {
                    name: name.to_string(),
                    suggestion: None,
                }
                .into());
            };
            (handle.pid, handle.monitor.take())
        };
        // Cancel the monitor before killing so the exit watcher does not
        // race the Stopping/Stopped transitions below.
        if let Some(monitor) = monitor {
            monitor.abort();
            let _ = monitor.await;
        }
        let Some(pid) = pid else {
            if force {
                debug!("service {name} not running");
                return Ok(());
            }
            return Err(ServiceError::NotRunning {
                name: name.to_string(),
            }
            .into());
        };
        info!("stopping service {name} (pid {pid})");
        self.update_handle(name, Some(pid), Some(ServiceStatus::Stopping))
            .await;

        PROCS.refresh_pids(&[pid]);
        if PROCS.is_running(pid) {
            if let Err(err) = PROCS.kill_async(pid).await {
                debug!("failed to kill pid {pid}: {err}");
            }
            if wait {
                let mut terminated = false;
                for i in 0..10 {
                    PROCS.refresh_pids(&[pid]);
                    if !PROCS.is_running(pid) {
                        terminated = true;
                        break;
                    }
                    debug!("waiting for pid {pid} to terminate ({}/10)", i + 1);
                    time::sleep(Duration::from_millis(50)).await;
                }
                if !terminated {
                    self.update_handle(name, Some(pid), Some(ServiceStatus::Running))
                        .await;
                    return Err(ServiceError::StopFailed {
                        name: name.to_string(),
                        error: format!("process {pid} still running after SIGTERM"),
                    }
                    .into());
                }
            }
        } else {
            debug!("pid {pid} already gone, marking {name} stopped");
        }

        self.update_handle(name, None, Some(ServiceStatus::Stopped))
            .await;
        Ok(())
    }

    /// Spawn the child for a service. stdout/stderr append to the service's
    /// log file under the logs dir.
    pub(crate) fn spawn_service(&self, name: &str) -> Result<Child> {
        let config = self.config.services.get(name).ok_or(ServiceError::NotFound {
            name: name.to_string(),
            suggestion: None,
        })?;
        let log_path = env::SHEPHERD_LOGS_DIR.join(name).join(format!("{name}.log"));
        let log_file = log_path
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| {
                std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&log_path)
                    .map(Some)
            })
            .map_err(|source| ServiceError::SpawnFailed {
                name: name.to_string(),
                source,
            })?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&config.run)
            .stdin(std::process::Stdio::null());
        if let Some(log_file) = log_file {
            let stderr = log_file
                .try_clone()
                .map_err(|source| ServiceError::SpawnFailed {
                    name: name.to_string(),
                    source,
                })?;
            cmd.stdout(std::process::Stdio::from(log_file))
                .stderr(std::process::Stdio::from(stderr));
        }
        if let Some(dir) = &config.dir {
            cmd.current_dir(dir);
        }
        if let Some(envs) = &config.env {
            cmd.envs(envs);
        }
        let child = cmd.spawn().map_err(|source| ServiceError::SpawnFailed {
            name: name.to_string(),
            source,
        })?;
        info!("spawned service {name} with pid {:?}", child.id());
        Ok(child)
    }

    pub(crate) async fn update_handle(
        &self,
        name: &str,
        pid: Option<u32>,
        status: Option<ServiceStatus>,
    ) {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get_mut(name) {
            handle.pid = pid;
            if let Some(status) = status {
                handle.status = Some(status);
            }
        }
    }
}
