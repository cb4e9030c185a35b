// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::collaborators::{CoverageAgent, QualityGate, ReportGenerator};
use crate::config::CommandConfig;
use crate::expand::Expand;
use crate::process::{run_checked, Output};
use crate::registry::Registration;

/// A configured command, run with its options expanded.
#[derive(Clone, Debug)]
pub struct ExternalCommand {
    config: CommandConfig,
}

impl ExternalCommand {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// An [`Expand`] with this command's `{extra_options}` set.
    pub fn expand(&self) -> Expand<'_> {
        let mut expand = Expand::new();
        expand.extra_options(&self.config.extra_options);
        expand
    }

    pub async fn run(&self, expand: &Expand<'_>) -> Result<Output> {
        let exe = expand.evaluate_value(&self.config.exe)?;
        let argv = expand.evaluate(&self.config.options)?;

        let mut env = self.config.env.clone();
        for value in env.values_mut() {
            *value = expand.evaluate_value(value.as_str())?;
        }

        run_checked(&exe, argv, &env, self.config.timeout())
            .await
            .with_context(|| format!("running {exe}"))
    }
}

pub struct CommandAgent(pub ExternalCommand);

#[async_trait]
impl CoverageAgent for CommandAgent {
    async fn dump(&self, app: &Registration, exec_file: &Path) -> Result<()> {
        if let Some(parent) = exec_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut expand = self.0.expand();
        expand.registration(app).exec_file(exec_file);
        self.0.run(&expand).await?;

        if !tokio::fs::try_exists(exec_file).await? {
            bail!(
                "agent for {} wrote no execution data to {}",
                app.application_name,
                exec_file.display()
            );
        }

        Ok(())
    }
}

pub struct CommandGenerator(pub ExternalCommand);

#[async_trait]
impl ReportGenerator for CommandGenerator {
    async fn generate(
        &self,
        app: &Registration,
        exec_file: &Path,
        report_file: &Path,
    ) -> Result<()> {
        if let Some(parent) = report_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut expand = self.0.expand();
        expand
            .registration(app)
            .exec_file(exec_file)
            .report_file(report_file);
        self.0.run(&expand).await?;

        if !tokio::fs::try_exists(report_file).await? {
            bail!(
                "report generator for {} wrote no report to {}",
                app.application_name,
                report_file.display()
            );
        }

        Ok(())
    }
}

pub struct CommandQualityGate(pub ExternalCommand);

#[async_trait]
impl QualityGate for CommandQualityGate {
    async fn analyze(&self, app: &Registration, report_file: &Path) -> Result<()> {
        let mut expand = self.0.expand();
        expand.registration(app).report_file(report_file);
        self.0.run(&expand).await?;
        Ok(())
    }
}
