// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[macro_use]
extern crate log;

use std::io::{stdout, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use delta_coverage::pipeline::{apply, load_changes, log_summary};
use delta_coverage::{merge, MethodMatch};
use delta_coverage_task::config::Config;
use delta_coverage_task::registry::{RegisterRequest, Registry};
use delta_coverage_task::worker::Worker;
use jacoco_report::Report;

#[derive(Parser, Debug)]
#[command(version, about = "Incremental coverage for JaCoCo reports")]
struct Opt {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run coverage cycles for every registered application.
    Run(RunOpt),

    /// Register an application, or update its registration.
    Register(RegisterOpt),

    /// Print the changed methods of a registered application as JSON.
    Detect(DetectOpt),

    /// Credit unchanged code in a report as covered.
    Refactor(RefactorOpt),

    /// Carry coverage of changed methods forward from a previous report.
    Merge(MergeOpt),

    /// Recompute the aggregate counters of a report.
    Recount(RecountOpt),
}

#[derive(Args, Debug)]
struct RunOpt {
    #[arg(short, long)]
    config: PathBuf,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
}

#[derive(Args, Debug)]
struct RegisterOpt {
    #[arg(short, long)]
    config: PathBuf,

    #[arg(long)]
    application_name: String,

    #[arg(long)]
    git_url: String,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    old_branch: Option<String>,

    #[arg(long)]
    new_branch: Option<String>,

    #[arg(long)]
    old_commit: Option<String>,

    #[arg(long)]
    new_commit: Option<String>,
}

#[derive(Args, Debug)]
struct DetectOpt {
    #[arg(short, long)]
    config: PathBuf,

    #[arg(long)]
    application_name: String,

    /// Fetch both branches before comparing them.
    #[arg(long)]
    sync: bool,
}

#[derive(Args, Debug)]
struct RefactorOpt {
    #[arg(long)]
    report: PathBuf,

    /// JSON map of class name to changed methods.
    #[arg(long)]
    changes: PathBuf,

    /// Merge this previous report after transforming.
    #[arg(long)]
    previous: Option<PathBuf>,

    /// Require an exact parameter descriptor match.
    #[arg(long)]
    exact: bool,

    /// Defaults to rewriting the report in place.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MergeOpt {
    #[arg(long)]
    old: PathBuf,

    #[arg(long)]
    new: PathBuf,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RecountOpt {
    #[arg(long)]
    report: PathBuf,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::parse();

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run(opt));

    if let Err(err) = &result {
        error!("error running delta-coverage: {:?}", err);
    }

    result
}

async fn run(opt: Opt) -> Result<()> {
    match opt.command {
        Command::Run(opt) => run_cycles(opt).await,
        Command::Register(opt) => register(opt).await,
        Command::Detect(opt) => detect(opt).await,
        Command::Refactor(opt) => refactor_report(opt),
        Command::Merge(opt) => merge_reports(opt),
        Command::Recount(opt) => recount_report(opt),
    }
}

async fn run_cycles(opt: RunOpt) -> Result<()> {
    let config = Config::load(&opt.config).await?;
    let worker = Worker::from_config(config);

    if opt.once {
        let mut registry = Registry::load(worker.config().registry_file()).await?;
        return worker.run_once(&mut registry).await;
    }

    info!(
        "checking registered applications every {:?}",
        worker.config().interval()
    );
    worker.run_forever().await
}

async fn register(opt: RegisterOpt) -> Result<()> {
    let config = Config::load(&opt.config).await?;
    let mut registry = Registry::load(config.registry_file()).await?;

    let mut request = RegisterRequest::new(opt.application_name, opt.git_url);
    if let Some(host) = opt.host {
        request.host = host;
    }
    if let Some(port) = opt.port {
        request.port = port;
    }
    if let Some(branch) = opt.old_branch {
        request.old_branch = branch;
    }
    if let Some(branch) = opt.new_branch {
        request.new_branch = branch;
    }
    request.old_commit = opt.old_commit;
    request.new_commit = opt.new_commit;

    let checkout_dir = config.checkout_dir(&request.application_name);
    let app = registry.register(request, checkout_dir);
    println!("{}", serde_json::to_string_pretty(app)?);

    registry.save().await
}

async fn detect(opt: DetectOpt) -> Result<()> {
    let config = Config::load(&opt.config).await?;
    let registry = Registry::load(config.registry_file()).await?;

    let app = registry
        .get(&opt.application_name)
        .cloned()
        .ok_or_else(|| anyhow::format_err!("{} is not registered", opt.application_name))?;

    let worker = Worker::from_config(config);
    if opt.sync {
        worker.sync(&app).await?;
    }

    let (files, detection) = worker.detect_changes(&app).await?;
    info!(
        "{} changed files, {} could not be compared",
        files,
        detection.failures.len()
    );

    let mut out = stdout();
    serde_json::to_writer_pretty(&mut out, &detection.changes)?;
    writeln!(out)?;

    Ok(())
}

fn output_path<'a>(input: &'a Path, output: &'a Option<PathBuf>) -> &'a Path {
    output.as_deref().unwrap_or(input)
}

fn save(report: &Report, path: &Path) -> Result<()> {
    report
        .save(path)
        .with_context(|| format!("saving coverage report {}", path.display()))?;
    log_summary(report);
    Ok(())
}

fn load(path: &Path) -> Result<Report> {
    Report::load(path).with_context(|| format!("loading coverage report {}", path.display()))
}

fn refactor_report(opt: RefactorOpt) -> Result<()> {
    let changes = load_changes(&opt.changes)?;
    let matching = if opt.exact {
        MethodMatch::Exact
    } else {
        MethodMatch::Prefix
    };

    let previous = match &opt.previous {
        Some(path) => Some(load(path)?),
        None => None,
    };

    let mut report = load(&opt.report)?;
    apply(&mut report, &changes, previous.as_ref(), matching);

    save(&report, output_path(&opt.report, &opt.output))
}

fn merge_reports(opt: MergeOpt) -> Result<()> {
    let old = load(&opt.old)?;
    let mut new = load(&opt.new)?;

    let merged = merge(&old, &mut new);
    debug!("{} methods merged", merged);

    save(&new, output_path(&opt.new, &opt.output))
}

fn recount_report(opt: RecountOpt) -> Result<()> {
    let mut report = load(&opt.report)?;
    report.recount();
    save(&report, output_path(&opt.report, &opt.output))
}
