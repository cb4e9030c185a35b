// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;

use jacoco_report::{Class, CounterKind, Mark, Method, Package, Report, SourceFile};
use serde::{Deserialize, Serialize};

use crate::change::{ChangeMap, ChangedMethod};

/// How a report method is matched against a changed-method signature.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodMatch {
    /// `name + desc` starts with the signature. Tolerates signatures built
    /// from partially resolved parameter types, at the cost of possibly
    /// claiming an overload that shares the prefix.
    #[default]
    Prefix,

    /// Name and parameter descriptor must be equal.
    Exact,
}

impl MethodMatch {
    pub fn find<'a>(&self, method: &Method, changed: &'a [ChangedMethod]) -> Option<&'a ChangedMethod> {
        changed.iter().find(|c| match self {
            Self::Prefix => c.signature.is_prefix_of(&method.name, &method.desc),
            Self::Exact => c.signature.matches_exactly(&method.name, &method.desc),
        })
    }
}

/// Last source line of a method, estimated from its start line and its
/// `LINE` counter.
pub fn end_line(method: &Method) -> Option<u32> {
    let line = method.line?;

    let end = match method.counters.get(CounterKind::Line) {
        Some(counter) => {
            let span = u32::try_from(counter.total()).unwrap_or(u32::MAX);
            line.saturating_add(span).saturating_add(1)
        }
        None => line,
    };

    Some(end)
}

/// Package names that own at least one class in `changes`.
fn changed_packages(changes: &ChangeMap) -> BTreeSet<&str> {
    changes
        .keys()
        .map(|class| match class.rfind('/') {
            Some(idx) => &class[..idx],
            None => "",
        })
        .collect()
}

fn mark_unchanged(method: &mut Method) {
    method.mark = Mark::Unchanged;
    method.counters.cover_all();
}

fn mark_class_unchanged(class: &mut Class) {
    class.mark = Mark::Unchanged;
    class.counters.cover_all();

    for method in &mut class.methods {
        mark_unchanged(method);
    }
}

fn refactor_class(class: &mut Class, changed: &[ChangedMethod], matching: MethodMatch) -> bool {
    let mut any_changed = false;

    for method in &mut class.methods {
        match matching.find(method, changed) {
            Some(change) => {
                method.hash = Some(change.hash.clone());
                method.mark = Mark::Changed;
                any_changed = true;
            }
            None => mark_unchanged(method),
        }
    }

    class.mark = if any_changed {
        Mark::Changed
    } else {
        class.counters.cover_all();
        Mark::Unchanged
    };

    any_changed
}

/// Credit the lines of an unchanged method in its source file.
fn cover_lines(file: &mut SourceFile, method: &Method) {
    let (Some(start), Some(end)) = (method.line, method.end_line) else {
        return;
    };

    let Some(mut idx) = file.line_index(start) else {
        debug!(
            "start line {} of {} not found in {}",
            start, method.name, file.name
        );
        return;
    };

    while idx < file.lines.len() && file.lines[idx].nr <= end {
        let line = &mut file.lines[idx];
        line.cover_all();
        line.mark = Mark::Unchanged;
        idx += 1;
    }
}

fn cover_unchanged_lines(package: &mut Package) {
    let Package {
        classes,
        source_files,
        ..
    } = package;

    for class in classes.iter() {
        let Some(file_name) = &class.source_file_name else {
            continue;
        };

        let Some(file) = source_files.iter_mut().find(|f| &f.name == file_name) else {
            continue;
        };

        for method in &class.methods {
            if method.mark == Mark::Unchanged {
                cover_lines(file, method);
            }
        }
    }
}

/// Mark every node of `report` changed or unchanged according to `changes`,
/// credit unchanged code as fully covered, and recount the aggregates.
///
/// A method is changed when it matches one of its class's entries in
/// `changes`; the entry's body hash is attached to it. A class is changed
/// when it has a changed method, and a package when it has a changed class.
pub fn refactor(report: &mut Report, changes: &ChangeMap, matching: MethodMatch) {
    for package in &mut report.packages {
        for class in &mut package.classes {
            for method in &mut class.methods {
                method.end_line = end_line(method);
            }
        }
    }

    let packages = changed_packages(changes);

    let mut changed_methods = 0;

    for package in &mut report.packages {
        if !packages.contains(package.name.as_str()) {
            package.mark = Mark::Unchanged;
            package.counters.cover_all();

            for class in &mut package.classes {
                mark_class_unchanged(class);
            }
        } else {
            let mut any_changed = false;

            for class in &mut package.classes {
                match changes.get(&class.name) {
                    Some(changed) => {
                        if refactor_class(class, changed, matching) {
                            any_changed = true;
                            changed_methods += class
                                .methods
                                .iter()
                                .filter(|m| m.mark == Mark::Changed)
                                .count();
                        }
                    }
                    None => mark_class_unchanged(class),
                }
            }

            package.mark = if any_changed {
                Mark::Changed
            } else {
                package.counters.cover_all();
                Mark::Unchanged
            };
        }

        cover_unchanged_lines(package);
    }

    info!(
        "marked {} methods changed across {} changed classes",
        changed_methods,
        changes.len()
    );

    report.recount();
}
