// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Seams to the systems a coverage cycle depends on.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use delta_coverage::ChangedFile;

use crate::registry::Registration;

/// Retrieves execution data from a running application.
#[async_trait]
pub trait CoverageAgent: Send + Sync {
    async fn dump(&self, app: &Registration, exec_file: &Path) -> Result<()>;
}

/// Turns execution data and a checkout into an XML report.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, app: &Registration, exec_file: &Path, report_file: &Path)
        -> Result<()>;
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Make the checkout at `app.checkout_dir` current for both branches.
    async fn sync(&self, app: &Registration) -> Result<()>;

    /// Source files that differ between the old and the new revision.
    async fn changed_files(&self, app: &Registration) -> Result<Vec<ChangedFile>>;

    /// Content of `path` at `revision`.
    async fn read_file(&self, app: &Registration, path: &str, revision: &str) -> Result<String>;
}

/// Receives the finished report.
#[async_trait]
pub trait QualityGate: Send + Sync {
    async fn analyze(&self, app: &Registration, report_file: &Path) -> Result<()>;
}
