//! Fire-and-forget FIFO control channel.
//!
//! Any process that can open the pipe may write command lines into it.
//! Lines are executed but never answered, so interactive-only verbs and
//! `--wait` have no effect on this channel.

use crate::controller::Controller;
use crate::{Result, control};
use miette::{Context, IntoDiagnostic};
use nix::sys::stat::Mode;
use nix::unistd;
use std::fs::Permissions;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;

pub struct PipeChannel {
    path: PathBuf,
    receiver: pipe::Receiver,
}

impl PipeChannel {
    /// Create (or re-create) the FIFO and open it for reading. Opening
    /// read-write keeps the pipe from signalling EOF whenever the last
    /// writer closes its end.
    pub fn bind(path: &PathBuf) -> Result<Self> {
        match std::fs::metadata(path) {
            Ok(meta) if !meta.file_type().is_fifo() => {
                warn!("removing stale non-fifo file {}", path.display());
                xx::file::remove_file(path).into_diagnostic()?;
            }
            _ => {}
        }
        if !path.exists() {
            unistd::mkfifo(path, Mode::from_bits_truncate(0o666))
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to create fifo {}", path.display()))?;
        }
        // the pipe is intentionally open to every local user
        std::fs::set_permissions(path, Permissions::from_mode(0o777)).into_diagnostic()?;
        let receiver = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to open fifo {}", path.display()))?;
        debug!("listening on pipe {}", path.display());
        Ok(Self {
            path: path.clone(),
            receiver,
        })
    }

    /// Read command lines until the daemon shuts down. Each line is run on
    /// its own task and its reply is discarded.
    pub async fn serve(mut self, ctl: Arc<Controller>) -> Result<()> {
        let mut buf = vec![0u8; 4096];
        loop {
            let n = match self.receiver.read(&mut buf).await {
                Ok(0) => continue,
                Ok(n) => n,
                Err(err) => {
                    error!("pipe read failed: {err:?}");
                    continue;
                }
            };
            let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
            for line in chunk.split('\n') {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let ctl = ctl.clone();
                tokio::spawn(async move {
                    if let Some(reply) = control::dispatch::interpret(&ctl, &line, false).await {
                        trace!("pipe command {line:?} -> {reply:?}");
                    }
                });
            }
        }
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::dispatch::tests::{Call, make_controller};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_pipe_executes_lines_without_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("control");
        let channel = PipeChannel::bind(&path).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
        assert_eq!(meta.permissions().mode() & 0o777, 0o777);

        let (ctl, registry) = make_controller();
        let server = tokio::spawn(channel.serve(ctl));

        let mut sender = pipe::OpenOptions::new().open_sender(&path).unwrap();
        sender
            .write_all(b"enable api\nstatus\ndisable db\n")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        // status is interactive-only and silently skipped on the pipe
        assert_eq!(
            registry.calls(),
            vec![
                Call::Enable(vec!["api".to_string()]),
                Call::Disable(vec!["db".to_string()]),
            ]
        );
        server.abort();
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("control");
        std::fs::write(&path, "junk").unwrap();
        let _channel = PipeChannel::bind(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
    }
}
