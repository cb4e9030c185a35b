// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use jacoco_report::{Class, CounterKind, Line, Mark, Method, Package, Report, SourceFile};

use crate::transform::end_line;

/// Running `(missed, covered)` sums of the lines walked in one method.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct LineTotals {
    instructions: (u64, u64),
    branches: (u64, u64),
}

impl LineTotals {
    fn add(&mut self, line: &Line) {
        self.instructions.0 += line.mi;
        self.instructions.1 += line.ci;
        self.branches.0 += line.mb;
        self.branches.1 += line.cb;
    }
}

/// Keep the best of both runs for one line: fewest missed, most covered.
fn merge_line(new: &mut Line, old: &Line) {
    new.mi = new.mi.min(old.mi);
    new.ci = new.ci.max(old.ci);
    new.mb = new.mb.min(old.mb);
    new.cb = new.cb.max(old.cb);
    new.mark = Mark::Changed;
}

fn find_method<'a>(class: &'a Class, method: &Method) -> Option<&'a Method> {
    class.methods.iter().find(|m| {
        m.name == method.name && m.desc == method.desc && m.hash == method.hash
    })
}

fn source_file<'a>(package: &'a Package, class: &Class) -> Option<&'a SourceFile> {
    let name = class.source_file_name.as_deref()?;
    package.source_file(name)
}

/// Walk the line ranges of `method` in `new` and its previous run `old` in
/// lockstep, merging each aligned pair into `new`.
///
/// Returns `None` when either start line cannot be found.
fn merge_lines(
    new: &mut SourceFile,
    method: &Method,
    old: &SourceFile,
    previous: &Method,
) -> Option<LineTotals> {
    let mut new_idx = new.line_index(method.line?)?;
    let mut old_idx = old.line_index(previous.line?)?;

    let new_end = method.end_line.or_else(|| end_line(method))?;
    let old_end = previous.end_line.or_else(|| end_line(previous))?;

    let mut totals = LineTotals::default();

    while new_idx < new.lines.len() && old_idx < old.lines.len() {
        let line = &mut new.lines[new_idx];
        let old_line = &old.lines[old_idx];

        if line.nr > new_end || old_line.nr > old_end {
            break;
        }

        merge_line(line, old_line);
        totals.add(line);

        new_idx += 1;
        old_idx += 1;
    }

    Some(totals)
}

/// Carry coverage forward from `old`, the previous transformed report, into
/// `new` for every changed method whose body hash is unchanged since then,
/// and recount the aggregates.
///
/// Returns the number of methods merged.
pub fn merge(old: &Report, new: &mut Report) -> usize {
    let mut merged = 0;

    for package in &mut new.packages {
        let Package {
            classes,
            source_files,
            ..
        } = package;

        for class in classes.iter_mut() {
            let Some((old_package, old_class)) = old.find_class(&class.name) else {
                continue;
            };

            let Some(old_file) = source_file(old_package, old_class) else {
                continue;
            };

            let Some(file) = class
                .source_file_name
                .as_deref()
                .and_then(|name| source_files.iter_mut().find(|f| f.name == name))
            else {
                continue;
            };

            for method in class.methods.iter_mut() {
                if method.mark != Mark::Changed || method.hash.is_none() {
                    continue;
                }

                let Some(previous) = find_method(old_class, method) else {
                    continue;
                };

                let Some(totals) = merge_lines(file, method, old_file, previous) else {
                    debug!(
                        "unable to align lines of {}.{}{}",
                        class.name, method.name, method.desc
                    );
                    continue;
                };

                let (missed, covered) = totals.instructions;
                method.counters.update(CounterKind::Instruction, missed, covered);

                let (missed, covered) = totals.branches;
                method.counters.update(CounterKind::Branch, missed, covered);

                merged += 1;
            }
        }
    }

    info!("merged coverage history into {} changed methods", merged);

    new.recount();

    merged
}

#[cfg(test)]
mod tests;
