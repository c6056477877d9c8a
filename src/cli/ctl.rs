use crate::control::{COMMAND_ERROR_PREFIX, EXCEPTION_PREFIX, RESULT_PREFIX};
use crate::{Result, env};
use exponential_backoff::Backoff;
use interprocess::local_socket::traits::tokio::Stream;
use interprocess::local_socket::{GenericFilePath, ToFsName};
use miette::{IntoDiagnostic, miette};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_MIN_DELAY: Duration = Duration::from_millis(100);
const CONNECT_MAX_DELAY: Duration = Duration::from_secs(1);

/// Sends one command to a running supervisor and prints the reply
#[derive(Debug, clap::Args)]
#[clap(trailing_var_arg = true)]
pub struct Ctl {
    /// Command line to send, e.g. `status` or `stop --wait api`
    #[clap(allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

impl Ctl {
    pub async fn run(&self) -> Result<()> {
        let line = shell_words::join(&self.command);
        let reply = self.send(&line).await?;
        if let Some(body) = reply.strip_prefix(RESULT_PREFIX) {
            println!("{body}");
            Ok(())
        } else if let Some(body) = reply
            .strip_prefix(EXCEPTION_PREFIX)
            .or_else(|| reply.strip_prefix(COMMAND_ERROR_PREFIX))
        {
            Err(miette!("{body}"))
        } else {
            Err(miette!("malformed reply: {reply:?}"))
        }
    }

    async fn send(&self, line: &str) -> Result<String> {
        let conn = self.connect().await?;
        let (mut recv, mut send) = conn.split();
        send.write_all(line.as_bytes()).await.into_diagnostic()?;
        drop(send);
        let mut reply = Vec::new();
        recv.read_to_end(&mut reply).await.into_diagnostic()?;
        String::from_utf8(reply).into_diagnostic()
    }

    async fn connect(&self) -> Result<interprocess::local_socket::tokio::Stream> {
        let path = &*env::SHEPHERD_CONTROL_SOCK;
        let mut last_err = None;
        for duration in Backoff::new(CONNECT_ATTEMPTS, CONNECT_MIN_DELAY, CONNECT_MAX_DELAY) {
            let name = path.as_path().to_fs_name::<GenericFilePath>().into_diagnostic()?;
            match interprocess::local_socket::tokio::Stream::connect(name).await {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    trace!("connect to {} failed: {err}", path.display());
                    last_err = Some(err);
                }
            }
            if let Some(duration) = duration {
                tokio::time::sleep(duration).await;
            }
        }
        Err(miette!(
            "unable to reach supervisor on {}: {}",
            path.display(),
            last_err.map(|e| e.to_string()).unwrap_or_default()
        ))
    }
}
