// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::Cell;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use delta_coverage::{ChangeKind, ChangedFile};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, Cred, Delta, FetchOptions, RemoteCallbacks, Repository};

use crate::collaborators::SourceRepository;
use crate::registry::Registration;

const SOURCE_EXTENSION: &str = ".java";
const REMOTE: &str = "origin";

#[derive(Clone, Debug)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

/// [`SourceRepository`] over a local git2 checkout.
#[derive(Clone, Debug, Default)]
pub struct GitRepository {
    credentials: Option<Credentials>,
}

impl GitRepository {
    pub fn new(account: Option<String>, password: Option<String>) -> Self {
        let credentials = match (account, password) {
            (Some(account), Some(password)) => Some(Credentials { account, password }),
            _ => None,
        };

        Self { credentials }
    }
}

#[async_trait]
impl SourceRepository for GitRepository {
    async fn sync(&self, app: &Registration) -> Result<()> {
        let credentials = self.credentials.clone();
        let app = app.clone();

        tokio::task::spawn_blocking(move || sync(&app, credentials.as_ref())).await?
    }

    async fn changed_files(&self, app: &Registration) -> Result<Vec<ChangedFile>> {
        let dir = app.checkout_dir.clone();
        let old = app.old_revision().to_owned();
        let new = app.new_revision().to_owned();

        tokio::task::spawn_blocking(move || changed_files(&dir, &old, &new)).await?
    }

    async fn read_file(&self, app: &Registration, path: &str, revision: &str) -> Result<String> {
        let dir = app.checkout_dir.clone();
        let path = path.to_owned();
        let revision = revision.to_owned();

        tokio::task::spawn_blocking(move || read_file(&dir, &path, &revision)).await?
    }
}

fn fetch_options(credentials: Option<&Credentials>) -> FetchOptions<'_> {
    let mut callbacks = RemoteCallbacks::new();

    if let Some(credentials) = credentials {
        // libgit2 keeps asking while the server rejects the answer.
        let attempted = Cell::new(false);
        callbacks.credentials(move |_url, _username, _allowed| {
            if attempted.replace(true) {
                return Err(git2::Error::from_str("git credentials were rejected"));
            }
            Cred::userpass_plaintext(&credentials.account, &credentials.password)
        });
    }

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn open_or_clone(app: &Registration, credentials: Option<&Credentials>) -> Result<Repository> {
    let dir = &app.checkout_dir;

    if dir.join(".git").exists() {
        return Repository::open(dir)
            .with_context(|| format!("failed to open repository {}", dir.display()));
    }

    info!("cloning {} into {}", app.git_url, dir.display());
    RepoBuilder::new()
        .fetch_options(fetch_options(credentials))
        .clone(&app.git_url, dir)
        .with_context(|| format!("failed to clone {}", app.git_url))
}

/// Fetch both branches and point the local branches at the fetched commits,
/// leaving the new branch checked out.
fn sync(app: &Registration, credentials: Option<&Credentials>) -> Result<()> {
    let repo = open_or_clone(app, credentials)?;

    let branches = [app.old_branch.as_str(), app.new_branch.as_str()];
    let refspecs: Vec<String> = branches
        .iter()
        .map(|branch| format!("+refs/heads/{branch}:refs/remotes/{REMOTE}/{branch}"))
        .collect();

    let mut remote = repo
        .find_remote(REMOTE)
        .context("checkout has no origin remote")?;
    remote
        .fetch(&refspecs, Some(&mut fetch_options(credentials)), None)
        .with_context(|| format!("failed to fetch {}", app.git_url))?;

    // A checked out branch cannot be force-updated.
    let new_head = repo
        .find_branch(&format!("{REMOTE}/{}", app.new_branch), BranchType::Remote)
        .with_context(|| format!("branch '{}' not found on {REMOTE}", app.new_branch))?
        .get()
        .peel_to_commit()?;
    repo.set_head_detached(new_head.id())?;

    for branch in branches {
        let commit = repo
            .find_branch(&format!("{REMOTE}/{branch}"), BranchType::Remote)
            .with_context(|| format!("branch '{branch}' not found on {REMOTE}"))?
            .get()
            .peel_to_commit()?;
        repo.branch(branch, &commit, true)
            .with_context(|| format!("failed to update branch '{branch}'"))?;
        debug!("{} {} at {}", app.application_name, branch, commit.id());
    }

    repo.set_head(&format!("refs/heads/{}", app.new_branch))
        .context("failed to set HEAD")?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))
        .context("failed to checkout new branch")?;

    Ok(())
}

fn is_source(path: &str) -> bool {
    path.ends_with(SOURCE_EXTENSION)
}

fn changed_files(dir: &Path, old: &str, new: &str) -> Result<Vec<ChangedFile>> {
    let repo = Repository::open(dir)
        .with_context(|| format!("failed to open repository {}", dir.display()))?;

    let old_tree = repo
        .revparse_single(old)
        .with_context(|| format!("unknown revision '{old}'"))?
        .peel_to_tree()?;
    let new_tree = repo
        .revparse_single(new)
        .with_context(|| format!("unknown revision '{new}'"))?
        .peel_to_tree()?;

    let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;

    let mut files = Vec::new();
    for delta in diff.deltas() {
        let (file, kind) = match delta.status() {
            Delta::Added | Delta::Renamed | Delta::Copied => (delta.new_file(), ChangeKind::Added),
            Delta::Deleted => (delta.old_file(), ChangeKind::Removed),
            Delta::Modified | Delta::Typechange => (delta.new_file(), ChangeKind::Modified),
            _ => continue,
        };

        let Some(path) = file.path().and_then(|path| path.to_str()) else {
            continue;
        };

        if is_source(path) {
            files.push(ChangedFile::new(path, kind));
        }
    }

    debug!(
        "{} source files differ between {} and {}",
        files.len(),
        old,
        new
    );

    Ok(files)
}

fn read_file(dir: &Path, path: &str, revision: &str) -> Result<String> {
    let repo = Repository::open(dir)
        .with_context(|| format!("failed to open repository {}", dir.display()))?;

    let tree = repo
        .revparse_single(revision)
        .with_context(|| format!("unknown revision '{revision}'"))?
        .peel_to_tree()?;
    let entry = tree
        .get_path(Path::new(path))
        .with_context(|| format!("{path} not found at '{revision}'"))?;
    let blob = repo.find_blob(entry.id())?;

    let content = std::str::from_utf8(blob.content())
        .with_context(|| format!("{path} is not valid UTF-8"))?
        .to_owned();

    Ok(content)
}
