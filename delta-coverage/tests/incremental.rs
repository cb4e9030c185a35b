// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;

use anyhow::{bail, Result};
use delta_coverage::pipeline::apply;
use delta_coverage::{
    ChangeDetector, ChangeKind, ChangedFile, JsonParser, MethodMatch, SourceProvider,
};
use jacoco_report::{Counter, CounterKind, Mark, Report};
use pretty_assertions::assert_eq;

struct Checkout {
    files: HashMap<(String, String), &'static str>,
}

impl Checkout {
    fn new() -> Self {
        let files = [
            (
                "src/main/java/com/demo/Calculator.java",
                "master",
                include_str!("files/Calculator.old.json"),
            ),
            (
                "src/main/java/com/demo/Calculator.java",
                "pre",
                include_str!("files/Calculator.new.json"),
            ),
            (
                "src/main/java/com/demo/Logger.java",
                "pre",
                include_str!("files/Logger.json"),
            ),
        ];

        let files = files
            .into_iter()
            .map(|(path, revision, text)| ((path.to_owned(), revision.to_owned()), text))
            .collect();

        Self { files }
    }
}

impl SourceProvider for Checkout {
    fn read(&self, path: &str, revision: &str) -> Result<String> {
        match self.files.get(&(path.to_owned(), revision.to_owned())) {
            Some(text) => Ok(text.to_string()),
            None => bail!("{path} does not exist at {revision}"),
        }
    }
}

fn changed_files() -> Vec<ChangedFile> {
    vec![
        ChangedFile::new("src/main/java/com/demo/Calculator.java", ChangeKind::Modified),
        ChangedFile::new("src/main/java/com/demo/Logger.java", ChangeKind::Added),
        ChangedFile::new("src/main/java/com/demo/Legacy.java", ChangeKind::Removed),
    ]
}

fn mark_of(report: &Report, class: &str, method: &str) -> Mark {
    let (_, class) = report.find_class(class).unwrap();
    class
        .methods
        .iter()
        .find(|m| m.name == method)
        .map(|m| m.mark)
        .unwrap()
}

#[test]
fn test_detect_changes_across_files() -> Result<()> {
    let checkout = Checkout::new();
    let detector = ChangeDetector::new(&checkout, &JsonParser);

    let detection = detector.find_multi_file_changes(&changed_files(), "master", "pre");
    assert!(detection.failures.is_empty());

    let summary: Vec<(String, Vec<String>)> = detection
        .changes
        .iter()
        .map(|(class, methods)| {
            let signatures = methods.iter().map(|m| m.signature.to_string()).collect();
            (class.clone(), signatures)
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            (
                "com/demo/Calculator".to_owned(),
                vec!["mul(II)".to_owned(), "sub(II)".to_owned()]
            ),
            (
                "com/demo/Logger".to_owned(),
                vec!["log(Ljava/lang/String;)".to_owned()]
            ),
        ]
    );

    Ok(())
}

#[test]
fn test_incremental_report() -> Result<()> {
    let checkout = Checkout::new();
    let detection =
        ChangeDetector::new(&checkout, &JsonParser).find_multi_file_changes(&changed_files(), "master", "pre");

    let mut report = Report::parse(include_str!("files/report.xml"))?;
    apply(&mut report, &detection.changes, None, MethodMatch::Prefix);

    assert_eq!(mark_of(&report, "com/demo/Calculator", "<init>"), Mark::Unchanged);
    assert_eq!(mark_of(&report, "com/demo/Calculator", "add"), Mark::Unchanged);
    assert_eq!(mark_of(&report, "com/demo/Calculator", "sub"), Mark::Changed);
    assert_eq!(mark_of(&report, "com/demo/Calculator", "mul"), Mark::Changed);
    assert_eq!(mark_of(&report, "com/demo/Calculator$Memory", "store"), Mark::Unchanged);
    assert_eq!(mark_of(&report, "com/demo/Logger", "log"), Mark::Changed);
    assert_eq!(mark_of(&report, "com/other/Util", "m"), Mark::Unchanged);

    assert_eq!(report.packages[0].mark, Mark::Changed);
    assert_eq!(report.packages[1].mark, Mark::Unchanged);

    assert_eq!(report.summary(CounterKind::Instruction), Some((9, 11)));
    assert_eq!(report.summary(CounterKind::Class), Some((1, 3)));

    let calculator = report.packages[0].source_file("Calculator.java").unwrap();
    assert_eq!(
        calculator.counters.get(CounterKind::Instruction),
        Some(&Counter::new(CounterKind::Instruction, 7, 10))
    );
    assert_eq!(
        calculator.counters.get(CounterKind::Line),
        Some(&Counter::new(CounterKind::Line, 1, 4))
    );

    // The written report loads back unchanged.
    let reloaded = Report::parse(&report.to_string()?)?;
    assert_eq!(reloaded, report);

    Ok(())
}
