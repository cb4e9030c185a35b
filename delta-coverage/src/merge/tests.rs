// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use jacoco_report::{Counter, Counters};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;

const OLD: &str = include_str!("test-data/old.xml");
const NEW: &str = include_str!("test-data/new.xml");

fn method<'a>(report: &'a Report, class: &str, name: &str) -> &'a Method {
    let (_, class) = report.find_class(class).unwrap();
    class.methods.iter().find(|m| m.name == name).unwrap()
}

fn counts(method: &Method, kind: CounterKind) -> Option<(u64, u64)> {
    method.counters.get(kind).map(|c| (c.missed, c.covered))
}

fn line(report: &Report, nr: u32) -> Line {
    let file = report.packages[0].source_file("C.java").unwrap();
    file.lines[file.line_index(nr).unwrap()].clone()
}

#[test]
fn test_merge_takes_best_of_both_runs() -> Result<()> {
    let old = Report::parse(OLD)?;
    let mut new = Report::parse(NEW)?;

    let merged = merge(&old, &mut new);
    assert_eq!(merged, 1);

    // Lines are aligned by position from each method's start line.
    let first = line(&new, 12);
    assert_eq!((first.mi, first.ci, first.mark), (0, 2, Mark::Changed));

    let second = line(&new, 13);
    assert_eq!(
        (second.mi, second.ci, second.mb, second.cb),
        (0, 3, 1, 1)
    );

    let third = line(&new, 14);
    assert_eq!((third.mi, third.ci), (1, 0));

    let foo = method(&new, "a/C", "foo");
    assert_eq!(counts(foo, CounterKind::Instruction), Some((1, 5)));
    assert_eq!(counts(foo, CounterKind::Branch), Some((1, 1)));
    assert_eq!(counts(foo, CounterKind::Line), Some((2, 1)));

    Ok(())
}

#[test]
fn test_changed_hash_is_not_merged() -> Result<()> {
    let old = Report::parse(OLD)?;
    let mut new = Report::parse(NEW)?;

    merge(&old, &mut new);

    let bar = method(&new, "a/C", "bar");
    assert_eq!(counts(bar, CounterKind::Instruction), Some((2, 0)));

    let untouched = line(&new, 22);
    assert_eq!((untouched.mi, untouched.ci, untouched.mark), (2, 0, Mark::Unset));

    Ok(())
}

#[test]
fn test_class_missing_from_old_report() -> Result<()> {
    let old = Report::parse(OLD)?;
    let mut new = Report::parse(NEW)?;

    merge(&old, &mut new);

    let go = method(&new, "a/Fresh", "go");
    assert_eq!(counts(go, CounterKind::Instruction), Some((2, 0)));

    Ok(())
}

#[test]
fn test_merge_recounts() -> Result<()> {
    let old = Report::parse(OLD)?;
    let mut new = Report::parse(NEW)?;

    merge(&old, &mut new);

    let (package, class) = new.find_class("a/C").unwrap();
    assert_eq!(
        class.counters.get(CounterKind::Instruction),
        Some(&Counter::new(CounterKind::Instruction, 3, 5))
    );
    assert_eq!(
        package.counters.get(CounterKind::Branch),
        Some(&Counter::new(CounterKind::Branch, 1, 1))
    );
    assert_eq!(new.summary(CounterKind::Instruction), Some((5, 5)));

    let file = package.source_file("C.java").unwrap();
    assert_eq!(
        file.counters.get(CounterKind::Line),
        Some(&Counter::new(CounterKind::Line, 2, 2))
    );

    Ok(())
}

#[test]
fn test_unchanged_methods_are_skipped() -> Result<()> {
    let old = Report::parse(OLD)?;
    let mut new = Report::parse(NEW)?;

    for package in &mut new.packages {
        for class in &mut package.classes {
            for method in &mut class.methods {
                method.mark = Mark::Unchanged;
            }
        }
    }

    assert_eq!(merge(&old, &mut new), 0);
    assert_eq!(line(&new, 12).mark, Mark::Unset);

    Ok(())
}

#[test]
fn test_missing_start_line_skips_method() -> Result<()> {
    let mut old = Report::parse(OLD)?;
    let mut new = Report::parse(NEW)?;

    old.packages[0].classes[0].methods[0].line = Some(99);

    assert_eq!(merge(&old, &mut new), 0);
    assert_eq!(counts(method(&new, "a/C", "foo"), CounterKind::Instruction), Some((4, 2)));

    Ok(())
}

fn single_method_report(hash: &str, start: u32, lines: &[(u64, u64, u64, u64)]) -> Report {
    let lines: Vec<Line> = lines
        .iter()
        .zip(start..)
        .map(|(&(mi, ci, mb, cb), nr)| Line {
            nr,
            mi,
            ci,
            mb,
            cb,
            mark: Mark::Unset,
        })
        .collect();

    let sum = |f: fn(&Line) -> u64| lines.iter().map(f).sum::<u64>();

    let counters: Counters = [
        Counter::new(CounterKind::Instruction, sum(|l| l.mi), sum(|l| l.ci)),
        Counter::new(CounterKind::Branch, sum(|l| l.mb), sum(|l| l.cb)),
        Counter::new(CounterKind::Line, lines.len() as u64, 0),
    ]
    .into_iter()
    .collect();

    Report {
        name: "prop".into(),
        packages: vec![Package {
            name: "p".into(),
            classes: vec![Class {
                name: "p/K".into(),
                source_file_name: Some("K.java".into()),
                methods: vec![Method {
                    name: "m".into(),
                    desc: "()V".into(),
                    line: Some(start),
                    end_line: Some(start + lines.len() as u32 - 1),
                    hash: Some(hash.into()),
                    counters: counters.clone(),
                    mark: Mark::Changed,
                }],
                counters: counters.clone(),
                mark: Mark::Changed,
            }],
            source_files: vec![SourceFile {
                name: "K.java".into(),
                lines,
                counters: counters.clone(),
            }],
            counters: counters.clone(),
            mark: Mark::Changed,
        }],
        counters,
        ..Report::default()
    }
}

prop_compose! {
    fn arb_lines(len: usize)(
        lines in prop::collection::vec((0u64..6, 0u64..6, 0u64..3, 0u64..3), len)
    ) -> Vec<(u64, u64, u64, u64)> {
        lines
    }
}

proptest! {
    #[test]
    fn test_merge_is_monotonic(
        (old_lines, new_lines) in (1usize..8).prop_flat_map(|len| (arb_lines(len), arb_lines(len))),
        old_start in 1u32..50,
        new_start in 1u32..50,
    ) {
        let old = single_method_report("h", old_start, &old_lines);
        let mut new = single_method_report("h", new_start, &new_lines);

        prop_assert_eq!(merge(&old, &mut new), 1);

        let merged = &new.packages[0].source_files[0].lines;
        for ((line, old), new) in merged.iter().zip(&old_lines).zip(&new_lines) {
            prop_assert_eq!(line.mi, old.0.min(new.0));
            prop_assert!(line.ci >= old.1.max(new.1));
            prop_assert_eq!(line.mb, old.2.min(new.2));
            prop_assert!(line.cb >= old.3.max(new.3));
            prop_assert_eq!(line.mark, Mark::Changed);
        }

        let (missed, covered) = merged
            .iter()
            .fold((0, 0), |acc, l| (acc.0 + l.mi, acc.1 + l.ci));
        prop_assert_eq!(new.summary(CounterKind::Instruction), Some((missed, covered)));
    }

    #[test]
    fn test_different_hash_never_merges(
        lines in arb_lines(4),
        other in arb_lines(4),
    ) {
        let old = single_method_report("before", 1, &other);
        let mut new = single_method_report("after", 1, &lines);
        let expected = new.packages[0].source_files[0].lines.clone();

        prop_assert_eq!(merge(&old, &mut new), 0);
        prop_assert_eq!(&new.packages[0].source_files[0].lines, &expected);
    }
}
