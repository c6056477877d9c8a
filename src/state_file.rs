use crate::error::FileError;
use crate::{Result, env};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Runtime state persisted across supervisor restarts. Currently just the
/// set of services disabled at runtime (the `enable`/`disable` verbs).
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct StateFile {
    pub disabled: BTreeSet<String>,
    #[serde(skip)]
    pub(crate) path: PathBuf,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            disabled: Default::default(),
            path,
        }
    }

    pub fn load() -> Self {
        let path = &*env::SHEPHERD_STATE_FILE;
        Self::read(path).unwrap_or_else(|e| {
            warn!("Could not read state file: {e}, starting fresh");
            Self::new(path.to_path_buf())
        })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new(path.to_path_buf()));
        }
        let _lock = xx::fslock::get(path, false)?;
        let raw = xx::file::read_to_string(path).unwrap_or_else(|e| {
            warn!("Error reading state file {:?}: {}", path, e);
            String::new()
        });
        let mut state_file: Self = toml::from_str(&raw).unwrap_or_else(|e| {
            warn!("Error parsing state file {:?}: {}", path, e);
            Self::new(path.to_path_buf())
        });
        state_file.path = path.to_path_buf();
        Ok(state_file)
    }

    pub fn write(&self) -> Result<()> {
        let _lock = xx::fslock::get(&self.path, false)?;
        let raw = toml::to_string(self).map_err(|e| FileError::WriteError {
            path: self.path.clone(),
            details: Some(format!("serialization failed: {}", e)),
        })?;
        xx::file::write(&self.path, raw).map_err(|e| FileError::WriteError {
            path: self.path.clone(),
            details: Some(e.to_string()),
        })?;
        Ok(())
    }
}
