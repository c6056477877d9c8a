//! Interactive control channel over a local socket.
//!
//! Each connection carries exactly one command line. The reply is an
//! envelope (`RESULT`, `EXCEPTION` or `COMMAND-ERROR` header plus body)
//! and the connection is closed once it has been written.

use crate::controller::Controller;
use crate::{Result, control};
use interprocess::local_socket::tokio::Listener as TokioListener;
use interprocess::local_socket::traits::tokio::{Listener, Stream};
use interprocess::local_socket::{GenericFilePath, ListenerOptions, ToFsName};
use miette::{Context, IntoDiagnostic};
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub struct SocketChannel {
    path: PathBuf,
    listener: TokioListener,
}

impl SocketChannel {
    pub fn bind(path: &PathBuf) -> Result<Self> {
        let _ = xx::file::remove_file(path);
        let name = path
            .as_path()
            .to_fs_name::<GenericFilePath>()
            .into_diagnostic()
            .wrap_err_with(|| format!("invalid socket path {}", path.display()))?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to bind socket {}", path.display()))?;
        // any local user may issue interactive commands
        std::fs::set_permissions(path, Permissions::from_mode(0o777)).into_diagnostic()?;
        debug!("listening on socket {}", path.display());
        Ok(Self {
            path: path.clone(),
            listener,
        })
    }

    /// Accept connections until the daemon shuts down.
    pub async fn serve(self, ctl: Arc<Controller>) -> Result<()> {
        loop {
            let conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    error!("socket accept failed: {err:?}");
                    continue;
                }
            };
            let ctl = ctl.clone();
            tokio::spawn(async move {
                if let Err(err) = Self::handle(ctl, conn).await {
                    warn!("control connection failed: {err:?}");
                }
            });
        }
    }

    async fn handle(
        ctl: Arc<Controller>,
        conn: interprocess::local_socket::tokio::Stream,
    ) -> Result<()> {
        let (mut recv, mut send) = conn.split();
        let mut buf = vec![0u8; 4096];
        let n = recv.read(&mut buf).await.into_diagnostic()?;
        let line = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        if let Some(reply) = control::dispatch::interpret(&ctl, &line, true).await {
            send.write_all(reply.as_bytes()).await.into_diagnostic()?;
        }
        Ok(())
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
