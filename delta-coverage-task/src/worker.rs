// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use delta_coverage::pipeline::apply_files;
use delta_coverage::{ChangeDetection, ChangeDetector, ChangeKind, ChangedFile, SourceProvider};
use tokio::time::MissedTickBehavior;

use crate::collaborators::{CoverageAgent, QualityGate, ReportGenerator, SourceRepository};
use crate::command::{CommandAgent, CommandGenerator, CommandQualityGate, ExternalCommand};
use crate::config::Config;
use crate::git::GitRepository;
use crate::parser::Parser;
use crate::registry::{Registration, Registry};

pub struct Collaborators {
    pub agent: Box<dyn CoverageAgent>,
    pub generator: Box<dyn ReportGenerator>,
    pub repository: Box<dyn SourceRepository>,
    pub quality_gate: Option<Box<dyn QualityGate>>,
}

impl Collaborators {
    /// Command-backed agent, generator and quality gate over a git checkout.
    pub fn from_config(config: &Config) -> Self {
        let quality_gate = config.quality_gate.clone().map(|gate| {
            Box::new(CommandQualityGate(ExternalCommand::new(gate))) as Box<dyn QualityGate>
        });

        Self {
            agent: Box::new(CommandAgent(ExternalCommand::new(config.agent.clone()))),
            generator: Box::new(CommandGenerator(ExternalCommand::new(
                config.generator.clone(),
            ))),
            repository: Box::new(GitRepository::new(
                config.git_account.clone(),
                config.git_password.clone(),
            )),
            quality_gate,
        }
    }
}

/// File texts read ahead of change detection, keyed by path and revision.
#[derive(Debug, Default)]
pub struct SourceSnapshot {
    files: HashMap<(String, String), Result<String, String>>,
}

impl SourceSnapshot {
    /// Read every revision of `files` that change detection will ask for.
    pub async fn load(
        repository: &dyn SourceRepository,
        app: &Registration,
        files: &[ChangedFile],
    ) -> Self {
        let old = app.old_revision();
        let new = app.new_revision();

        let mut snapshot = Self::default();
        for file in files {
            let revisions = match file.kind {
                ChangeKind::Modified => vec![old, new],
                ChangeKind::Added => vec![new],
                ChangeKind::Removed => vec![],
            };

            for revision in revisions {
                let text = repository
                    .read_file(app, &file.path, revision)
                    .await
                    .map_err(|err| format!("{err:#}"));
                snapshot
                    .files
                    .insert((file.path.clone(), revision.to_string()), text);
            }
        }

        snapshot
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceProvider for SourceSnapshot {
    fn read(&self, path: &str, revision: &str) -> Result<String> {
        match self.files.get(&(path.to_owned(), revision.to_owned())) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(err)) => bail!("{}", err),
            None => bail!("{} was not read at {}", path, revision),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CycleSummary {
    pub changed_files: usize,
    pub changed_classes: usize,
    pub failed_files: usize,
    pub merged_previous: bool,
}

/// Move the last cycle's report out of the way of the next one. Returns
/// whether there was a report to move.
pub async fn rename_aside(report_file: &Path, old_report_file: &Path) -> Result<bool> {
    if !tokio::fs::try_exists(report_file).await? {
        return Ok(false);
    }

    match tokio::fs::remove_file(old_report_file).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("unable to remove {}", old_report_file.display()))
        }
    }

    tokio::fs::rename(report_file, old_report_file)
        .await
        .with_context(|| {
            format!(
                "unable to move {} to {}",
                report_file.display(),
                old_report_file.display()
            )
        })?;

    Ok(true)
}

pub struct Worker {
    config: Config,
    collaborators: Collaborators,
    parser: Parser,
}

impl Worker {
    pub fn new(config: Config, collaborators: Collaborators, parser: Parser) -> Self {
        Self {
            config,
            collaborators,
            parser,
        }
    }

    pub fn from_config(config: Config) -> Self {
        let collaborators = Collaborators::from_config(&config);
        let parser = Parser::from_config(config.parser.as_ref());
        Self::new(config, collaborators, parser)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn sync(&self, app: &Registration) -> Result<()> {
        self.collaborators
            .repository
            .sync(app)
            .await
            .context("syncing repository")
    }

    /// Changed methods between the registered branches of `app`. The
    /// checkout is expected to be synced.
    pub async fn detect_changes(&self, app: &Registration) -> Result<(usize, ChangeDetection)> {
        let repository = self.collaborators.repository.as_ref();

        let files = repository
            .changed_files(app)
            .await
            .context("listing changed files")?;
        let snapshot = SourceSnapshot::load(repository, app, &files).await;

        let parser = self.parser.clone();
        let old = app.old_revision().to_owned();
        let new = app.new_revision().to_owned();
        let count = files.len();

        let detection = tokio::task::spawn_blocking(move || {
            ChangeDetector::new(&snapshot, &parser).find_multi_file_changes(&files, &old, &new)
        })
        .await?;

        Ok((count, detection))
    }

    /// Run one coverage cycle for `app`.
    pub async fn run_cycle(&self, app: &Registration) -> Result<CycleSummary> {
        let name = &app.application_name;
        let exec_file = self.config.exec_file(name);
        let report_file = self.config.report_file(name);
        let old_report_file = self.config.old_report_file(name);

        self.collaborators
            .agent
            .dump(app, &exec_file)
            .await
            .context("dumping execution data")?;

        if rename_aside(&report_file, &old_report_file).await? {
            debug!("kept previous report of {} at {}", name, old_report_file.display());
        }

        self.sync(app).await?;

        self.collaborators
            .generator
            .generate(app, &exec_file, &report_file)
            .await
            .context("generating report")?;

        let (changed_files, detection) = self.detect_changes(app).await?;
        let merged_previous = tokio::fs::try_exists(&old_report_file).await?;

        let summary = CycleSummary {
            changed_files,
            changed_classes: detection.changes.len(),
            failed_files: detection.failures.len(),
            merged_previous,
        };

        let matching = self.config.method_match;
        let changes = detection.changes;
        let report = report_file.clone();
        tokio::task::spawn_blocking(move || {
            apply_files(&report, Some(old_report_file.as_path()), &changes, matching)
        })
        .await?
        .context("applying changes to report")?;

        if let Some(gate) = &self.collaborators.quality_gate {
            gate.analyze(app, &report_file)
                .await
                .context("running quality gate")?;
        }

        Ok(summary)
    }

    /// Run a cycle for every registered application. A failed cycle is
    /// counted against its application and does not stop the others.
    ///
    /// The registry is refreshed from disk before it is saved, so
    /// registrations made while the cycles ran are kept.
    pub async fn run_once(&self, registry: &mut Registry) -> Result<()> {
        let mut failed = Vec::new();

        for name in registry.names() {
            let Some(app) = registry.get(&name).cloned() else {
                continue;
            };

            match self.run_cycle(&app).await {
                Ok(summary) => info!(
                    "{}: {} changed files, {} changed classes, {} unreadable files, history merged: {}",
                    name,
                    summary.changed_files,
                    summary.changed_classes,
                    summary.failed_files,
                    summary.merged_previous
                ),
                Err(err) => {
                    error!("coverage cycle for {} failed: {:?}", name, err);
                    failed.push(name);
                }
            }
        }

        registry.refresh().await?;

        for name in failed {
            if let Some(fail_times) = registry.record_failure(&name) {
                warn!("{} has failed {} cycles", name, fail_times);
            }
        }

        registry.save().await
    }

    /// Re-read the registry and run every application, once per interval.
    pub async fn run_forever(&self) -> Result<()> {
        let registry_file = self.config.registry_file();
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if let Err(err) = self.tick(&registry_file).await {
                error!("coverage run failed: {:?}", err);
            }
        }
    }

    async fn tick(&self, registry_file: &Path) -> Result<()> {
        let mut registry = Registry::load(registry_file).await?;

        if registry.is_empty() {
            debug!("no registered applications");
            return Ok(());
        }

        self.run_once(&mut registry).await
    }
}
