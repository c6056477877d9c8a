use crate::error::{ConfigParseError, FileError};
use crate::{Result, env};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `shepherd.toml`, the service definitions the supervisor manages.
///
/// ```toml
/// [services.api]
/// run = "node server.js"
/// pidfile = "/run/api.pid"
/// startup_pause = "250ms"
/// restart = true
/// depends = ["postgres"]
/// ```
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct ShepherdToml {
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceConfig {
    /// Shell command line, run via `sh -c`.
    pub run: String,
    /// Readiness signal: startup holds until this file exists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pidfile: Option<PathBuf>,
    /// Grace period before the monitor attaches, humantime syntax.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub startup_pause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pidfile_timeout: Option<String>,
    /// Startable without --force/--enable. Runtime toggles are persisted in
    /// the state file, not written back here.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Respawn after an abnormal exit (positive exit code).
    #[serde(default)]
    pub restart: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub env: Option<IndexMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub depends: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ServiceConfig {
    pub fn startup_pause(&self) -> Duration {
        self.startup_pause
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
            .unwrap_or(*env::SHEPHERD_STARTUP_PAUSE)
    }

    pub fn pidfile_timeout(&self) -> Duration {
        self.pidfile_timeout
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
            .unwrap_or(*env::SHEPHERD_PIDFILE_TIMEOUT)
    }
}

impl ShepherdToml {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no config file at {}", path.display());
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Default::default()
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|source| FileError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw)
            .map_err(|err| ConfigParseError::from_toml_error(path, raw.clone(), err))?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Declared dependency edges, one line per service, deterministic order.
    /// This renders the graph as written; resolution order is out of scope.
    pub fn dependency_graph(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let deps = &self.services[&name].depends;
                if deps.is_empty() {
                    name
                } else {
                    format!("{name} -> {}", deps.join(", "))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("shepherd.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[services.api]
run = "node server.js"
pidfile = "/run/api.pid"
startup_pause = "250ms"
restart = true
depends = ["postgres"]

[services.postgres]
run = "postgres -D /var/db"
enabled = false
"#,
        );
        let config = ShepherdToml::read(&path).unwrap();
        assert_eq!(config.services.len(), 2);

        let api = &config.services["api"];
        assert_eq!(api.run, "node server.js");
        assert_eq!(api.pidfile, Some(PathBuf::from("/run/api.pid")));
        assert_eq!(api.startup_pause(), Duration::from_millis(250));
        assert!(api.enabled);
        assert!(api.restart);
        assert_eq!(api.depends, vec!["postgres".to_string()]);

        let postgres = &config.services["postgres"];
        assert!(!postgres.enabled);
        assert!(!postgres.restart);
        assert!(postgres.pidfile.is_none());
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = ShepherdToml::read(dir.path().join("nope.toml")).unwrap();
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_read_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[services.api]\nrun = ");
        assert!(ShepherdToml::read(&path).is_err());
    }

    #[test]
    fn test_dependency_graph_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[services.web]
run = "true"
depends = ["api", "cache"]

[services.api]
run = "true"

[services.cache]
run = "true"
"#,
        );
        let config = ShepherdToml::read(&path).unwrap();
        let graph = config.dependency_graph();
        assert_eq!(graph, vec!["api", "cache", "web -> api, cache"]);
        assert_eq!(graph, config.dependency_graph());
    }
}
