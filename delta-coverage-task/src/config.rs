// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use delta_coverage::MethodMatch;

const DEFAULT_INTERVAL_SECS: u64 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 600;
const REGISTRY_FILE_NAME: &str = "registry.json";

/// An external program invoked with `{placeholder}` expanded arguments.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CommandConfig {
    pub exe: String,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Substituted for `{extra_options}`, joined with spaces.
    #[serde(default)]
    pub extra_options: Vec<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Config {
    pub exec_data_dir: PathBuf,

    pub xml_data_dir: PathBuf,

    pub git_dir: PathBuf,

    pub git_account: Option<String>,

    pub git_password: Option<String>,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default)]
    pub method_match: MethodMatch,

    pub registry_file: Option<PathBuf>,

    /// Dumps execution data from a running agent.
    pub agent: CommandConfig,

    /// Produces the XML report from execution data and a checkout.
    pub generator: CommandConfig,

    pub quality_gate: Option<CommandConfig>,

    /// Parses a source file into a JSON `SourceUnit`.
    pub parser: Option<CommandConfig>,
}

impl Config {
    pub fn new(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)?;

        if config.interval_secs == 0 {
            bail!("interval_secs must be greater than zero");
        }

        Ok(config)
    }

    pub async fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let data = tokio::fs::read(config_path)
            .await
            .with_context(|| format!("unable to read config {}", config_path.display()))?;
        Self::new(&data).with_context(|| format!("invalid config {}", config_path.display()))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn registry_file(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.xml_data_dir.join(REGISTRY_FILE_NAME))
    }

    pub fn exec_file(&self, application: &str) -> PathBuf {
        self.exec_data_dir.join(format!("{application}.exec"))
    }

    pub fn report_file(&self, application: &str) -> PathBuf {
        self.xml_data_dir.join(format!("{application}.xml"))
    }

    pub fn old_report_file(&self, application: &str) -> PathBuf {
        self.xml_data_dir.join(format!("{application}_old.xml"))
    }

    pub fn checkout_dir(&self, application: &str) -> PathBuf {
        self.git_dir.join(application)
    }
}
