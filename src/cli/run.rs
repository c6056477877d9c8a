use crate::config::ShepherdToml;
use crate::control::pipe::PipeChannel;
use crate::control::socket::SocketChannel;
use crate::controller::Controller;
use crate::state_file::StateFile;
use crate::supervisor::Supervisor;
use crate::{Result, env};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};
use tokio::signal;
use tokio::signal::unix::SignalKind;

/// Runs the supervisor in the foreground
#[derive(Debug, clap::Args)]
pub struct Run {
    /// Path to the services file
    #[clap(long, short)]
    config: Option<PathBuf>,
}

impl Run {
    pub async fn run(&self) -> Result<()> {
        let config_path = self.config.clone().unwrap_or(env::SHEPHERD_CONFIG.clone());
        let config = ShepherdToml::read(&config_path)?;
        info!(
            "starting with {} services from {}",
            config.services.len(),
            config_path.display()
        );

        xx::file::mkdirp(&*env::SHEPHERD_STATE_DIR)?;
        xx::file::mkdirp(&*env::SHEPHERD_LOGS_DIR)?;

        let supervisor = Supervisor::new(config, StateFile::load());
        let ctl = Controller::new(supervisor.clone());

        let pipe = PipeChannel::bind(&env::SHEPHERD_CONTROL_PIPE)?;
        let socket = SocketChannel::bind(&env::SHEPHERD_CONTROL_SOCK)?;
        let pipe_task = tokio::spawn(pipe.serve(ctl.clone()));
        let socket_task = tokio::spawn(socket.serve(ctl.clone()));

        self.signals(&ctl)?;

        // fire off enabled services without waiting for their pidfiles
        if let Err(err) = supervisor.autostart().await {
            warn!("autostart: {err:?}");
        }

        ctl.wait_for_shutdown().await;
        info!("shutting down");
        pipe_task.abort();
        socket_task.abort();
        supervisor.close().await;
        Ok(())
    }

    fn signals(&self, ctl: &Arc<Controller>) -> Result<()> {
        let signals = [
            SignalKind::terminate(),
            SignalKind::interrupt(),
            SignalKind::quit(),
            SignalKind::hangup(),
        ];
        static RECEIVED_SIGNAL: AtomicBool = AtomicBool::new(false);
        for sig in signals {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                let mut stream = signal::unix::signal(sig).unwrap();
                loop {
                    stream.recv().await;
                    if RECEIVED_SIGNAL.swap(true, atomic::Ordering::SeqCst) {
                        exit(1);
                    } else {
                        info!("received signal, shutting down");
                        ctl.kill_system();
                    }
                }
            });
        }
        Ok(())
    }
}
