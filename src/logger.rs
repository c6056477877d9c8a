use crate::env;
use console::style;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

/// Syslog priority names accepted by the `loglevel` control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SyslogPriority {
    Emerg,
    Alert,
    Crit,
    #[strum(to_string = "err", serialize = "error")]
    Err,
    #[strum(to_string = "warning", serialize = "warn")]
    Warning,
    Notice,
    Info,
    Debug,
}

impl SyslogPriority {
    /// Priorities at or above this one remain visible when forced.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            SyslogPriority::Emerg | SyslogPriority::Alert | SyslogPriority::Crit => {
                LevelFilter::Error
            }
            SyslogPriority::Err => LevelFilter::Error,
            SyslogPriority::Warning => LevelFilter::Warn,
            SyslogPriority::Notice | SyslogPriority::Info => LevelFilter::Info,
            SyslogPriority::Debug => LevelFilter::Debug,
        }
    }
}

struct Logger {
    file: Option<Mutex<File>>,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => style("ERROR").red().to_string(),
            Level::Warn => style("WARN").yellow().to_string(),
            Level::Info => style("INFO").green().to_string(),
            Level::Debug => style("DEBUG").dim().to_string(),
            Level::Trace => style("TRACE").dim().to_string(),
        };
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        eprintln!("{ts} {level} {}", record.args());
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = writeln!(file, "{ts} {} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.flush();
        }
    }
}

pub fn init() {
    let file = env::SHEPHERD_LOG_FILE
        .parent()
        .and_then(|dir| std::fs::create_dir_all(dir).ok())
        .and_then(|()| {
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(&*env::SHEPHERD_LOG_FILE)
                .ok()
        })
        .map(Mutex::new);
    if log::set_boxed_logger(Box::new(Logger { file })).is_ok() {
        log::set_max_level(*env::SHEPHERD_LOG);
    }
}
