use shepherd_cli::Result;
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::SignalKind;

#[tokio::main]
async fn main() -> Result<()> {
    shepherd_cli::logger::init();
    #[cfg(unix)]
    handle_epipe();
    shepherd_cli::cli::run().await
}

#[cfg(unix)]
fn handle_epipe() {
    match signal::unix::signal(SignalKind::pipe()) {
        Ok(mut pipe_stream) => {
            tokio::spawn(async move {
                pipe_stream.recv().await;
                log::debug!("received SIGPIPE");
            });
        }
        Err(e) => {
            log::warn!("could not set up SIGPIPE handler: {e}");
        }
    }
}
