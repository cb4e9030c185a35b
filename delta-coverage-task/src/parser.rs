// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;

use anyhow::{Context, Result};
use delta_coverage::{JsonParser, SourceParser, SourceUnit};
use tempfile::NamedTempFile;
use tokio::runtime::Handle;

use crate::config::CommandConfig;
use crate::expand::Expand;
use crate::process::run_checked;

/// Runs an external parser on a copy of the source text. The parser is
/// expected to print the [`SourceUnit`] as JSON.
#[derive(Clone, Debug)]
pub struct CommandParser {
    config: CommandConfig,
}

impl CommandParser {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// Run the parser on `text`, killing it once the configured timeout
    /// elapses.
    pub async fn run(&self, text: &str) -> Result<SourceUnit> {
        let mut source = tempfile::Builder::new()
            .prefix("delta-coverage-")
            .suffix(".java")
            .tempfile()?;
        source.write_all(text.as_bytes())?;
        source.flush()?;

        let mut expand = Expand::new();
        expand
            .source_file(source.path())
            .extra_options(&self.config.extra_options);

        let exe = expand.evaluate_value(&self.config.exe)?;
        let argv = expand.evaluate(&self.config.options)?;

        let output = run_checked(&exe, argv, &self.config.env, self.config.timeout())
            .await
            .with_context(|| format!("running parser {exe}"))?;

        let unit = serde_json::from_str(&output.stdout)
            .with_context(|| format!("parser {exe} printed invalid JSON"))?;

        close(source);
        Ok(unit)
    }
}

/// Change detection calls this from a blocking thread of the runtime.
impl SourceParser for CommandParser {
    fn parse(&self, text: &str) -> Result<SourceUnit> {
        let handle =
            Handle::try_current().context("the parser command requires a tokio runtime")?;
        handle.block_on(self.run(text))
    }
}

fn close(file: NamedTempFile) {
    if let Err(err) = file.close() {
        warn!("unable to remove parser input: {}", err);
    }
}

/// The parser selected by configuration.
#[derive(Clone, Debug)]
pub enum Parser {
    Json(JsonParser),
    Command(CommandParser),
}

impl Parser {
    pub fn from_config(config: Option<&CommandConfig>) -> Self {
        match config {
            Some(config) => Self::Command(CommandParser::new(config.clone())),
            None => Self::Json(JsonParser),
        }
    }
}

impl SourceParser for Parser {
    fn parse(&self, text: &str) -> Result<SourceUnit> {
        match self {
            Self::Json(parser) => parser.parse(text),
            Self::Command(parser) => parser.parse(text),
        }
    }
}
