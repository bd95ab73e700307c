//! Runtime configuration.
//!
//! Resolution order: built-in defaults < YAML file (`--config` or
//! `MSSH_CONFIG`) < command line flags.
//!
//! ```yaml
//! prompt: mssh
//! history_file: /tmp/mssh.tmp
//! init_script: .msshrc
//! download_root: download
//! fallback: echo          # echo | remote
//! remote_mode: sequential # sequential | parallel
//! barrier: batch          # batch | global
//! max_parallel: 32
//! default_port: 22
//! connect_timeout_secs: 5
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::fleet::{BarrierScope, FleetSettings, RemoteMode};
use crate::shell::Fallback;
use crate::ssh::{DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};

pub const CONFIG_ENV: &str = "MSSH_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub prompt: String,
    pub history_file: Option<PathBuf>,
    pub init_script: Option<PathBuf>,
    pub download_root: PathBuf,
    pub fallback: Fallback,
    pub remote_mode: RemoteMode,
    pub barrier: BarrierScope,
    pub max_parallel: Option<usize>,
    pub default_port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: "mssh".to_string(),
            history_file: Some(std::env::temp_dir().join("mssh.tmp")),
            init_script: Some(PathBuf::from(".msshrc")),
            download_root: PathBuf::from("download"),
            fallback: Fallback::Echo,
            remote_mode: RemoteMode::Sequential,
            barrier: BarrierScope::Batch,
            max_parallel: None,
            default_port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from an explicit path, else from `MSSH_CONFIG`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("failed to parse config '{}'", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.default_port == 0 {
            bail!("default_port must be non-zero");
        }
        if self.max_parallel == Some(0) {
            bail!("max_parallel must be at least 1 (omit it for no limit)");
        }
        if self.download_root.as_os_str().is_empty() {
            bail!("download_root must not be empty");
        }
        Ok(())
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        FleetSettings {
            download_root: self.download_root.clone(),
            barrier: self.barrier,
            remote_mode: self.remote_mode,
            max_parallel: self.max_parallel,
            default_port: self.default_port,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}
