use std::fmt::Display;
use std::path::PathBuf;

/// Point-in-time snapshot of a supervised service, as reported over the
/// control channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Service {
    pub name: String,
    pub pid: Option<u32>,
    pub status: ServiceStatus,
    pub enabled: bool,
    pub pidfile: Option<PathBuf>,
}

impl Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Spawned, waiting out the startup pause / pidfile wait.
    Waiting,
    Running,
    Stopping,
    Stopped,
    /// Exited abnormally (positive exit code).
    Errored(i32),
}

impl ServiceStatus {
    pub fn style(&self) -> String {
        let s = self.to_string();
        match self {
            ServiceStatus::Waiting => console::style(s).yellow().to_string(),
            ServiceStatus::Running => console::style(s).green().to_string(),
            ServiceStatus::Stopping => console::style(s).yellow().to_string(),
            ServiceStatus::Stopped => console::style(s).dim().to_string(),
            ServiceStatus::Errored(_) => console::style(s).red().to_string(),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            ServiceStatus::Errored(code) => Some(format!("exit code {code}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ServiceStatus::Running.to_string(), "running");
        assert_eq!(ServiceStatus::Errored(2).to_string(), "errored");
    }

    #[test]
    fn test_status_error_message() {
        assert_eq!(
            ServiceStatus::Errored(3).error_message(),
            Some("exit code 3".to_string())
        );
        assert_eq!(ServiceStatus::Running.error_message(), None);
    }
}
