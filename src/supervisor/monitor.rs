//! Per-child lifecycle driver: startup pause, pidfile wait, exit watcher.

use super::Supervisor;
use crate::Result;
use crate::error::ServiceError;
use crate::service::ServiceStatus;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Weak;
use std::time::Duration;
use tokio::process::Child;
use tokio::time;

impl Supervisor {
    /// Spawn a service's child and attach an exit watcher to it.
    ///
    /// Any previous monitor task for the same service is aborted and awaited
    /// first, so at most one watcher is ever attached per service. Startup
    /// failures (immediate exit during the startup pause, pidfile timeout)
    /// are returned to the caller; once this returns Ok the watcher runs in
    /// the background and start is complete.
    pub(crate) fn start_and_monitor<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let _guard = self.lock_service(name).await;
            self.start_and_monitor_locked(name).await
        })
    }

    /// Core of `start_and_monitor`; the caller holds the service lock.
    pub(super) async fn start_and_monitor_locked(&self, name: &str) -> Result<()> {
        let config = self
            .config
            .services
            .get(name)
            .ok_or(ServiceError::NotFound {
                name: name.to_string(),
                suggestion: None,
            })?
            .clone();

        let prev = self.handles.lock().await.get_mut(name).and_then(|h| h.monitor.take());
        if let Some(prev) = prev {
            debug!("superseding monitor task for {name}");
            prev.abort();
            let _ = prev.await;
        }

        let mut child = self.spawn_service(name)?;
        let pid = child.id();
        self.update_handle(name, pid, Some(ServiceStatus::Waiting))
            .await;

        // Short grace period so a command that errors out immediately fails
        // the start call itself instead of entering a silent retry loop.
        time::sleep(config.startup_pause()).await;
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                self.update_handle(name, None, Some(ServiceStatus::Errored(code.max(0))))
                    .await;
                return Err(ServiceError::StartupFailed {
                    name: name.to_string(),
                    code,
                }
                .into());
            }
            Ok(None) => {}
            Err(err) => warn!("could not poll service {name} during startup: {err}"),
        }

        if let Some(pidfile) = &config.pidfile {
            let timeout = config.pidfile_timeout();
            if !wait_for_pidfile(pidfile, timeout).await {
                let _ = child.start_kill();
                self.update_handle(name, None, Some(ServiceStatus::Stopped))
                    .await;
                return Err(ServiceError::PidfileTimeout {
                    name: name.to_string(),
                    path: pidfile.clone(),
                    timeout_secs: timeout.as_secs(),
                }
                .into());
            }
        }

        self.update_handle(name, pid, Some(ServiceStatus::Running))
            .await;
        let watcher = tokio::spawn(watch_exit(self.me.clone(), name.to_string(), child));
        if let Some(handle) = self.handles.lock().await.get_mut(name) {
            handle.monitor = Some(watcher);
        }
        info!("service {name} started (pid {:?})", pid);
        Ok(())
    }

    /// Abnormal exit (positive exit code): record it and, when the service
    /// opts in, respawn it once. Start failures of the respawn are logged,
    /// not retried.
    async fn handle_abnormal_exit(&self, name: &str, code: i32) {
        warn!("service {name} exited abnormally with code {code}");
        {
            let mut handles = self.handles.lock().await;
            if let Some(handle) = handles.get_mut(name) {
                handle.pid = None;
                handle.status = Some(ServiceStatus::Errored(code));
                // this runs inside the watcher itself; the handle must not
                // point at a task a restart would then abort
                handle.monitor = None;
            }
        }
        let restart = self
            .config
            .services
            .get(name)
            .map(|c| c.restart)
            .unwrap_or(false);
        if restart {
            info!("restarting service {name} after abnormal exit");
            // boxed so the watcher future does not embed its own type
            let respawn: Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> =
                self.start_and_monitor(name);
            if let Err(err) = respawn.await {
                error!("restart of {name} failed: {err}");
            }
        }
    }

    async fn mark_exited(&self, name: &str) {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get_mut(name) {
            handle.pid = None;
            handle.status = Some(ServiceStatus::Stopped);
            handle.monitor = None;
        }
    }
}

/// Poll for the pidfile to appear within `timeout`. Returns false on timeout.
async fn wait_for_pidfile(path: &Path, timeout: Duration) -> bool {
    debug!("waiting up to {timeout:?} for pidfile {}", path.display());
    time::timeout(timeout, async {
        while !path.exists() {
            time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .is_ok()
}

/// Exit watcher: suspends until the child terminates. Only a strictly
/// positive exit code counts as abnormal; zero and signal deaths do not.
/// Wait errors are logged and never surface past this task.
async fn watch_exit(sup: Weak<Supervisor>, name: String, mut child: Child) {
    match child.wait().await {
        Ok(status) => {
            let Some(sup) = sup.upgrade() else { return };
            match status.code() {
                Some(code) if code > 0 => sup.handle_abnormal_exit(&name, code).await,
                _ => {
                    info!("service {name} exited with {status}");
                    sup.mark_exited(&name).await;
                }
            }
        }
        Err(err) => warn!("failed waiting on service {name}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{make_config, make_supervisor, make_supervisor_from};
    use crate::service::ServiceStatus;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time;

    #[tokio::test]
    async fn test_immediate_exit_fails_start() {
        let dir = TempDir::new().unwrap();
        let sup = make_supervisor(&dir, &[("flaky", "exit 3")]);

        let err = sup.start_and_monitor("flaky").await.unwrap_err();
        assert!(err.to_string().contains("exited during startup"));
        assert!(err.to_string().contains("3"));

        let handles = sup.handles.lock().await;
        let handle = handles.get("flaky").unwrap();
        assert_eq!(handle.status, Some(ServiceStatus::Errored(3)));
        assert!(handle.monitor.is_none());
    }

    #[tokio::test]
    async fn test_start_attaches_monitor() {
        let dir = TempDir::new().unwrap();
        let sup = make_supervisor(&dir, &[("steady", "sleep 30")]);

        sup.start_and_monitor("steady").await.unwrap();

        let handles = sup.handles.lock().await;
        let handle = handles.get("steady").unwrap();
        assert_eq!(handle.status, Some(ServiceStatus::Running));
        assert!(handle.pid.is_some());
        assert!(handle.monitor.is_some());
        drop(handles);

        sup.stop_service("steady", true, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_pidfile_wait_success() {
        let dir = TempDir::new().unwrap();
        let pidfile = dir.path().join("svc.pid");
        let run = format!("sleep 0.2 && echo $$ > {} && sleep 5", pidfile.display());
        let mut config = make_config(&[("svc", &run)]);
        config.services.get_mut("svc").unwrap().pidfile = Some(pidfile.clone());
        let sup = make_supervisor_from(&dir, config);

        sup.start_and_monitor("svc").await.unwrap();
        assert!(pidfile.exists());

        sup.stop_service("svc", true, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_pidfile_timeout_fails_start() {
        let dir = TempDir::new().unwrap();
        let pidfile = dir.path().join("never.pid");
        let mut config = make_config(&[("svc", "sleep 30")]);
        let svc = config.services.get_mut("svc").unwrap();
        svc.pidfile = Some(pidfile.clone());
        svc.pidfile_timeout = Some("300ms".to_string());
        let sup = make_supervisor_from(&dir, config);

        let err = sup.start_and_monitor("svc").await.unwrap_err();
        assert!(err.to_string().contains("did not write pidfile"));
    }

    #[tokio::test]
    async fn test_abnormal_exit_marks_errored() {
        let dir = TempDir::new().unwrap();
        let sup = make_supervisor(&dir, &[("crasher", "sleep 0.2; exit 2")]);

        sup.start_and_monitor("crasher").await.unwrap();
        time::sleep(Duration::from_millis(600)).await;

        let handles = sup.handles.lock().await;
        let handle = handles.get("crasher").unwrap();
        assert_eq!(handle.status, Some(ServiceStatus::Errored(2)));
        assert!(handle.pid.is_none());
    }

    #[tokio::test]
    async fn test_clean_exit_is_not_abnormal() {
        let dir = TempDir::new().unwrap();
        let sup = make_supervisor(&dir, &[("oneshot", "sleep 0.2; exit 0")]);

        sup.start_and_monitor("oneshot").await.unwrap();
        time::sleep(Duration::from_millis(600)).await;

        let handles = sup.handles.lock().await;
        let handle = handles.get("oneshot").unwrap();
        assert_eq!(handle.status, Some(ServiceStatus::Stopped));
    }

    #[tokio::test]
    async fn test_compound_run_line_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("done");
        // multi-statement line with shell builtins; every statement must run
        let run = format!("sleep 0.2; touch {}; exit 4", marker.display());
        let sup = make_supervisor(&dir, &[("job", &run)]);

        sup.start_and_monitor("job").await.unwrap();
        time::sleep(Duration::from_millis(600)).await;

        assert!(marker.exists());
        let handles = sup.handles.lock().await;
        let handle = handles.get("job").unwrap();
        assert_eq!(handle.status, Some(ServiceStatus::Errored(4)));
    }

    #[tokio::test]
    async fn test_concurrent_starts_attach_one_watcher() {
        let dir = TempDir::new().unwrap();
        let flag = dir.path().join("first");
        // first spawn exits 5 at ~300ms, any later spawn stays up
        let run = format!(
            "if [ -e {f} ]; then sleep 5; else touch {f}; sleep 0.3; exit 5; fi",
            f = flag.display()
        );
        let sup = make_supervisor(&dir, &[("svc", &run)]);

        let (a, b) = tokio::join!(sup.start_and_monitor("svc"), sup.start_and_monitor("svc"));
        a.unwrap();
        b.unwrap();

        // the superseded watcher must be aborted: the first child's exit 5
        // must not clobber the second child's running state
        time::sleep(Duration::from_millis(700)).await;
        let handles = sup.handles.lock().await;
        let handle = handles.get("svc").unwrap();
        assert_eq!(handle.status, Some(ServiceStatus::Running));
        assert!(handle.monitor.is_some());
        drop(handles);

        sup.stop_service("svc", true, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_monitor_supersession() {
        let dir = TempDir::new().unwrap();
        let sup = make_supervisor(&dir, &[("svc", "sleep 2")]);

        sup.start_and_monitor("svc").await.unwrap();
        let first_pid = {
            let handles = sup.handles.lock().await;
            let handle = handles.get("svc").unwrap();
            assert!(handle.monitor.is_some());
            handle.pid.unwrap()
        };

        // second start cancels the first watcher before attaching a new one
        sup.start_and_monitor("svc").await.unwrap();
        let handles = sup.handles.lock().await;
        let handle = handles.get("svc").unwrap();
        assert!(handle.monitor.is_some());
        assert_ne!(handle.pid, Some(first_pid));
        drop(handles);

        sup.stop_service("svc", true, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_after_abnormal_exit() {
        let dir = TempDir::new().unwrap();
        let flag = dir.path().join("crashed-once");
        // survives the startup pause on the first run, crashes at ~200ms,
        // then stays up on the respawn
        let run = format!(
            "if [ -e {f} ]; then sleep 5; else touch {f}; sleep 0.2; exit 7; fi",
            f = flag.display()
        );
        let mut config = make_config(&[("phoenix", &run)]);
        config.services.get_mut("phoenix").unwrap().restart = true;
        let sup = make_supervisor_from(&dir, config);

        sup.start_and_monitor("phoenix").await.unwrap();
        time::sleep(Duration::from_millis(900)).await;

        let handles = sup.handles.lock().await;
        let handle = handles.get("phoenix").unwrap();
        assert_eq!(handle.status, Some(ServiceStatus::Running));
        drop(handles);
        sup.stop_service("phoenix", true, true).await.unwrap();
    }
}
