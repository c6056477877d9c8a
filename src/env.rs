use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;
use std::time::Duration;

pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_else(|_| PathBuf::from(".")));

pub static HOME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir().unwrap_or_else(|| {
        eprintln!("Warning: Could not determine home directory");
        PathBuf::from("/tmp")
    })
});

pub static SHEPHERD_CONFIG: Lazy<PathBuf> =
    Lazy::new(|| var_path("SHEPHERD_CONFIG").unwrap_or(CWD.join("shepherd.toml")));

pub static SHEPHERD_STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("SHEPHERD_STATE_DIR").unwrap_or(
        dirs::state_dir()
            .unwrap_or(HOME_DIR.join(".local").join("state"))
            .join("shepherd"),
    )
});
pub static SHEPHERD_STATE_FILE: Lazy<PathBuf> =
    Lazy::new(|| SHEPHERD_STATE_DIR.join("state.toml"));
pub static SHEPHERD_LOGS_DIR: Lazy<PathBuf> =
    Lazy::new(|| var_path("SHEPHERD_LOGS_DIR").unwrap_or(SHEPHERD_STATE_DIR.join("logs")));
pub static SHEPHERD_LOG_FILE: Lazy<PathBuf> =
    Lazy::new(|| SHEPHERD_LOGS_DIR.join("shepherd").join("shepherd.log"));
pub static SHEPHERD_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("SHEPHERD_LOG").unwrap_or(log::LevelFilter::Info));

/// Fire-and-forget control FIFO, chmod 0777 so any local principal can write.
pub static SHEPHERD_CONTROL_PIPE: Lazy<PathBuf> =
    Lazy::new(|| var_path("SHEPHERD_CONTROL_PIPE").unwrap_or(SHEPHERD_STATE_DIR.join("control")));

/// Request/response control socket.
pub static SHEPHERD_CONTROL_SOCK: Lazy<PathBuf> = Lazy::new(|| {
    var_path("SHEPHERD_CONTROL_SOCK").unwrap_or(SHEPHERD_STATE_DIR.join("control.sock"))
});

// Grace period after spawning a child before the first monitor attaches.
// Catches immediate startup failures so they surface on the start call itself.
pub static SHEPHERD_STARTUP_PAUSE: Lazy<Duration> = Lazy::new(|| {
    var_u64("SHEPHERD_STARTUP_PAUSE_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(500))
});

// Upper bound on waiting for a declared pidfile to appear.
pub static SHEPHERD_PIDFILE_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    var_u64("SHEPHERD_PIDFILE_TIMEOUT_SECS")
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30))
});

fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_u64(name: &str) -> Option<u64> {
    var(name).ok().and_then(|val| val.parse().ok())
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}
