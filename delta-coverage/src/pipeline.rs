// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jacoco_report::{CounterKind, Report};

use crate::change::ChangeMap;
use crate::merge::merge;
use crate::transform::{refactor, MethodMatch};

/// Transform `report` by `changes`, then merge `previous` into it if given.
/// The aggregates of `report` are consistent on return.
pub fn apply(
    report: &mut Report,
    changes: &ChangeMap,
    previous: Option<&Report>,
    matching: MethodMatch,
) {
    refactor(report, changes, matching);

    if let Some(previous) = previous {
        merge(previous, report);
    }
}

/// File-level form of [`apply`]: the report at `report_path` is rewritten in
/// place, and `previous_path` is only read if it exists.
pub fn apply_files(
    report_path: &Path,
    previous_path: Option<&Path>,
    changes: &ChangeMap,
    matching: MethodMatch,
) -> Result<Report> {
    let mut report = Report::load(report_path)
        .with_context(|| format!("loading coverage report {}", report_path.display()))?;

    let previous = match previous_path {
        Some(path) if path.exists() => Some(
            Report::load(path)
                .with_context(|| format!("loading previous coverage report {}", path.display()))?,
        ),
        Some(path) => {
            debug!("no previous report at {}", path.display());
            None
        }
        None => None,
    };

    apply(&mut report, changes, previous.as_ref(), matching);

    report
        .save(report_path)
        .with_context(|| format!("saving coverage report {}", report_path.display()))?;

    log_summary(&report);

    Ok(report)
}

pub fn log_summary(report: &Report) {
    for kind in [CounterKind::Instruction, CounterKind::Branch, CounterKind::Line] {
        if let Some(counter) = report.counters.get(kind) {
            match counter.ratio() {
                Some(ratio) => info!(
                    "{}: {} {}/{} covered ({:.1}%)",
                    report.name,
                    kind,
                    counter.covered,
                    counter.total(),
                    ratio * 100.0
                ),
                None => info!("{}: no {} data", report.name, kind),
            }
        }
    }
}

/// Load a serialized change map.
pub fn load_changes(path: &Path) -> Result<ChangeMap> {
    let data = fs::read(path).with_context(|| format!("reading change map {}", path.display()))?;
    let changes = serde_json::from_slice(&data)
        .with_context(|| format!("parsing change map {}", path.display()))?;
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::change::ChangedMethod;

    const REPORT: &str = include_str!("transform/test-data/report.xml");

    #[test]
    fn test_apply_without_history() -> Result<()> {
        let mut report = Report::parse(REPORT)?;
        let mut changes = ChangeMap::new();
        changes.insert("a/C".into(), vec![ChangedMethod::new("foo()V", "h")]);

        apply(&mut report, &changes, None, MethodMatch::Prefix);

        assert_eq!(report.summary(CounterKind::Instruction), Some((3, 13)));

        Ok(())
    }

    #[test]
    fn test_apply_merges_previous_cycle() -> Result<()> {
        let mut changes = ChangeMap::new();
        changes.insert("a/C".into(), vec![ChangedMethod::new("foo()V", "h")]);

        // First cycle: nothing was run yet.
        let mut first = Report::parse(REPORT)?;
        apply(&mut first, &changes, None, MethodMatch::Prefix);

        // Second cycle: the new run covers nothing, the history carries over.
        let mut second = Report::parse(REPORT)?;
        for package in &mut second.packages {
            for file in &mut package.source_files {
                for line in &mut file.lines {
                    line.mi += line.ci;
                    line.ci = 0;
                }
            }
        }

        apply(&mut second, &changes, Some(&first), MethodMatch::Prefix);

        let file = second.packages[0].source_file("C.java").unwrap();
        let line = &file.lines[file.line_index(10).unwrap()];
        assert_eq!((line.mi, line.ci), (2, 1));

        Ok(())
    }

    #[test]
    fn test_load_changes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("changes.json");

        fs::write(
            &path,
            r#"{"a/C": [{"signature": "foo()", "hash": "0"}]}"#,
        )?;

        let changes = load_changes(&path)?;

        assert_eq!(changes["a/C"], vec![ChangedMethod::new("foo()", "0")]);

        Ok(())
    }
}
