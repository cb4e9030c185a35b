// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::index::{MethodTable, StructuralIndex};
use crate::signature::MethodSignature;
use crate::structure::{MethodDecl, SourceUnit};

/// Hash recorded for methods without a body.
pub const NO_BODY_HASH: &str = "0";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChangedMethod {
    pub signature: MethodSignature,
    pub hash: String,
}

impl ChangedMethod {
    pub fn new(signature: impl Into<MethodSignature>, hash: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            hash: hash.into(),
        }
    }

    fn from_decl(signature: &MethodSignature, method: &MethodDecl) -> Self {
        Self {
            signature: signature.clone(),
            hash: body_hash(method.body.as_deref()),
        }
    }
}

/// Class internal name to the methods that changed in it.
pub type ChangeMap = BTreeMap<String, Vec<ChangedMethod>>;

fn strip_whitespace(body: &str) -> String {
    body.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn body_hash(body: Option<&str>) -> String {
    match body {
        Some(body) => hex::encode(Sha256::digest(strip_whitespace(body).as_bytes())),
        None => NO_BODY_HASH.to_owned(),
    }
}

fn is_modified(old: &MethodDecl, new: &MethodDecl) -> bool {
    match (&old.body, &new.body) {
        (Some(old), Some(new)) => strip_whitespace(old) != strip_whitespace(new),
        (None, None) => false,
        _ => true,
    }
}

fn all_methods(table: &MethodTable) -> Vec<ChangedMethod> {
    table
        .iter()
        .map(|(signature, method)| ChangedMethod::from_decl(signature, method))
        .collect()
}

/// Methods of every class in a newly added unit.
pub fn collect_all(unit: &SourceUnit) -> ChangeMap {
    StructuralIndex::build(unit)
        .classes()
        .map(|(name, table)| (name.to_owned(), all_methods(table)))
        .collect()
}

/// Methods added or modified between two versions of one unit.
///
/// Classes that only exist in `old` contribute nothing. A new class is always
/// present, even with no methods. An existing class without added or modified
/// methods is left out, so a class that only lost methods or whose bodies only
/// changed in whitespace is not counted as changed and refactors as unchanged.
pub fn compare(old: &SourceUnit, new: &SourceUnit) -> ChangeMap {
    let old_index = StructuralIndex::build(old);
    let new_index = StructuralIndex::build(new);

    let mut changes = ChangeMap::new();

    for (name, new_table) in new_index.classes() {
        let old_table = match old_index.get(name) {
            Some(table) => table,
            None => {
                changes.insert(name.to_owned(), all_methods(new_table));
                continue;
            }
        };

        let changed: Vec<ChangedMethod> = new_table
            .iter()
            .filter(|(signature, new_method)| match old_table.get(*signature) {
                Some(old_method) => is_modified(old_method, new_method),
                None => true,
            })
            .map(|(signature, method)| ChangedMethod::from_decl(signature, method))
            .collect();

        if !changed.is_empty() {
            changes.insert(name.to_owned(), changed);
        }
    }

    changes
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        };

        f.write_str(kind)
    }
}

/// A source file that differs between two revisions.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChangedFile {
    pub path: String,
    pub kind: ChangeKind,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Reads the text of a file at a revision.
pub trait SourceProvider {
    fn read(&self, path: &str, revision: &str) -> Result<String>;
}

/// Turns source text into its structural form.
pub trait SourceParser {
    fn parse(&self, text: &str) -> Result<SourceUnit>;
}

/// Source text that is already a serialized [`SourceUnit`].
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonParser;

impl SourceParser for JsonParser {
    fn parse(&self, text: &str) -> Result<SourceUnit> {
        Ok(SourceUnit::from_json(text)?)
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("unable to read `{path}` at revision `{revision}`")]
    Read {
        path: String,
        revision: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to parse `{path}` at revision `{revision}`")]
    Parse {
        path: String,
        revision: String,
        #[source]
        source: BoxError,
    },
}

impl ChangeError {
    pub fn path(&self) -> &str {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

/// Changes found across a set of files, plus the files that could not be
/// compared.
#[derive(Debug, Default)]
pub struct ChangeDetection {
    pub changes: ChangeMap,
    pub failures: Vec<ChangeError>,
}

pub struct ChangeDetector<'a, S, P> {
    source: &'a S,
    parser: &'a P,
}

impl<'a, S, P> ChangeDetector<'a, S, P>
where
    S: SourceProvider,
    P: SourceParser,
{
    pub fn new(source: &'a S, parser: &'a P) -> Self {
        Self { source, parser }
    }

    fn load(&self, path: &str, revision: &str) -> Result<SourceUnit, ChangeError> {
        let text = self
            .source
            .read(path, revision)
            .map_err(|err| ChangeError::Read {
                path: path.to_owned(),
                revision: revision.to_owned(),
                source: err.into(),
            })?;

        self.parser.parse(&text).map_err(|err| ChangeError::Parse {
            path: path.to_owned(),
            revision: revision.to_owned(),
            source: err.into(),
        })
    }

    pub fn detect_file(
        &self,
        file: &ChangedFile,
        old_revision: &str,
        new_revision: &str,
    ) -> Result<ChangeMap, ChangeError> {
        match file.kind {
            ChangeKind::Modified => {
                let old = self.load(&file.path, old_revision)?;
                let new = self.load(&file.path, new_revision)?;
                Ok(compare(&old, &new))
            }
            ChangeKind::Added => {
                let new = self.load(&file.path, new_revision)?;
                Ok(collect_all(&new))
            }
            ChangeKind::Removed => Ok(ChangeMap::new()),
        }
    }

    /// Merge the changes of every file. A file that fails is recorded and
    /// skipped; when two files name the same class the later one wins.
    pub fn find_multi_file_changes(
        &self,
        files: &[ChangedFile],
        old_revision: &str,
        new_revision: &str,
    ) -> ChangeDetection {
        let mut detection = ChangeDetection::default();

        for file in files {
            match self.detect_file(file, old_revision, new_revision) {
                Ok(changes) => {
                    debug!(
                        "{} file {}: {} changed classes",
                        file.kind,
                        file.path,
                        changes.len()
                    );
                    detection.changes.extend(changes);
                }
                Err(err) => {
                    warn!("skipping change detection for {}: {:?}", file.path, err);
                    detection.failures.push(err);
                }
            }
        }

        detection
    }
}
