// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;

/// Serializable representation of a process output.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Output {
    pub exit_status: ExitStatus,
    pub stderr: String,
    pub stdout: String,
}

impl From<std::process::Output> for Output {
    fn from(output: std::process::Output) -> Self {
        let exit_status = output.status.into();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        Self {
            exit_status,
            stderr,
            stdout,
        }
    }
}

/// Serializable representation of a process exit status.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub success: bool,
}

impl From<std::process::ExitStatus> for ExitStatus {
    #[cfg(not(unix))]
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: None,
            success: status.success(),
        }
    }

    #[cfg(unix)]
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        Self {
            code: status.code(),
            signal: status.signal(),
            success: status.success(),
        }
    }
}

pub async fn run_cmd<S: ::std::hash::BuildHasher>(
    program: impl AsRef<Path>,
    argv: Vec<String>,
    env: &HashMap<String, String, S>,
    timeout: Duration,
) -> Result<Output> {
    let program = program.as_ref();
    debug!(
        "running command with timeout: cmd:{:?} argv:{:?} timeout:{:?}",
        program, argv, timeout
    );

    let mut cmd = Command::new(program);
    cmd.env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .args(argv)
        .envs(env);

    let child = cmd
        .spawn()
        .with_context(|| format!("process failed to start: {}", program.display()))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| format_err!("process timed out: {}", program.display()))??;

    Ok(output.into())
}

/// Like [`run_cmd`], but a non-zero exit is an error. The output is logged
/// one line at a time.
pub async fn run_checked<S: ::std::hash::BuildHasher>(
    program: impl AsRef<Path>,
    argv: Vec<String>,
    env: &HashMap<String, String, S>,
    timeout: Duration,
) -> Result<Output> {
    let program = program.as_ref();
    let output = run_cmd(program, argv, env, timeout).await?;

    let name = program.display().to_string();
    log_stream(&name, "stdout", &output.stdout);
    log_stream(&name, "stderr", &output.stderr);

    if !output.exit_status.success {
        bail!(
            "{} failed with {:?}: {}",
            name,
            output.exit_status,
            output.stderr.trim()
        );
    }

    Ok(output)
}

fn log_stream(name: &str, context: &str, text: &str) {
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        debug!("[{}:{}] {}", name, context, line);
    }
}
