// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6300;
pub const DEFAULT_OLD_BRANCH: &str = "master";
pub const DEFAULT_NEW_BRANCH: &str = "pre";

fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_old_branch() -> String {
    DEFAULT_OLD_BRANCH.to_owned()
}

fn default_new_branch() -> String {
    DEFAULT_NEW_BRANCH.to_owned()
}

/// An application asking to have its coverage tracked.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub application_name: String,

    pub git_url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_old_branch")]
    pub old_branch: String,

    #[serde(default = "default_new_branch")]
    pub new_branch: String,

    #[serde(default)]
    pub old_commit: Option<String>,

    #[serde(default)]
    pub new_commit: Option<String>,
}

impl RegisterRequest {
    pub fn new(application_name: impl Into<String>, git_url: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            git_url: git_url.into(),
            host: default_host(),
            port: default_port(),
            old_branch: default_old_branch(),
            new_branch: default_new_branch(),
            old_commit: None,
            new_commit: None,
        }
    }
}

/// Per-application state owned by the [`Registry`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Registration {
    pub application_name: String,
    pub git_url: String,
    pub host: String,
    pub port: u16,
    pub old_branch: String,
    pub new_branch: String,
    pub old_commit: Option<String>,
    pub new_commit: Option<String>,
    pub checkout_dir: PathBuf,

    #[serde(default)]
    pub fail_times: u64,
}

impl Registration {
    pub fn new(request: RegisterRequest, checkout_dir: PathBuf) -> Self {
        Self {
            application_name: request.application_name,
            git_url: request.git_url,
            host: request.host,
            port: request.port,
            old_branch: request.old_branch,
            new_branch: request.new_branch,
            old_commit: request.old_commit,
            new_commit: request.new_commit,
            checkout_dir,
            fail_times: 0,
        }
    }

    /// Revision the change detector treats as the baseline.
    pub fn old_revision(&self) -> &str {
        self.old_commit.as_deref().unwrap_or(&self.old_branch)
    }

    /// Revision the report was generated from.
    pub fn new_revision(&self) -> &str {
        self.new_commit.as_deref().unwrap_or(&self.new_branch)
    }
}

/// Application name to registration, persisted as JSON.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    apps: BTreeMap<String, Registration>,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            apps: BTreeMap::new(),
        }
    }

    /// Load the registry at `path`. A missing file is an empty registry.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let apps = match tokio::fs::read(path).await {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("invalid registry {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no registry at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("unable to read registry {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_owned(),
            apps,
        })
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(&self.apps)?;
        tokio::fs::write(&self.path, data)
            .await
            .with_context(|| format!("unable to write registry {}", self.path.display()))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pick up what was saved to disk since this registry was loaded. Saved
    /// entries replace in-memory ones and entries not yet saved are kept.
    pub async fn refresh(&mut self) -> Result<()> {
        let mut latest = Self::load(&self.path).await?.apps;

        for (name, app) in std::mem::take(&mut self.apps) {
            latest.entry(name).or_insert(app);
        }

        self.apps = latest;
        Ok(())
    }

    /// Add or replace an application. A re-registration keeps the failure
    /// count of the previous entry.
    pub fn register(&mut self, request: RegisterRequest, checkout_dir: PathBuf) -> &Registration {
        let name = request.application_name.clone();
        let mut registration = Registration::new(request, checkout_dir);

        if let Some(previous) = self.apps.get(&name) {
            registration.fail_times = previous.fail_times;
        }

        info!("registered application {}", name);
        self.apps.insert(name.clone(), registration);
        &self.apps[&name]
    }

    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.apps.get(name)
    }

    /// Increment the failure counter of `name`, returning the new count.
    pub fn record_failure(&mut self, name: &str) -> Option<u64> {
        let app = self.apps.get_mut(name)?;
        app.fail_times += 1;
        Some(app.fail_times)
    }

    pub fn names(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.apps.values()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
