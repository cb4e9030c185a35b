// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use pretty_assertions::assert_eq;

use super::*;

const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<!DOCTYPE report PUBLIC "-//JACOCO//DTD Report 1.1//EN" "report.dtd">
<report name="demo">
  <sessioninfo id="host-1" start="1700000000000" dump="1700000005000"/>
  <package name="com/example">
    <class name="com/example/Foo" sourcefilename="Foo.java">
      <method name="&lt;init&gt;" desc="()V" line="3">
        <counter type="INSTRUCTION" missed="3" covered="0"/>
        <counter type="LINE" missed="1" covered="0"/>
      </method>
      <method name="bar" desc="(I)I" line="5" hash="abc" mark="changed">
        <counter type="INSTRUCTION" missed="2" covered="4"/>
      </method>
      <counter type="INSTRUCTION" missed="5" covered="4"/>
      <counter type="CLASS" missed="0" covered="1"/>
    </class>
    <sourcefile name="Foo.java">
      <line nr="3" mi="3" ci="0" mb="0" cb="0"/>
      <line nr="5" mi="2" ci="4" mb="1" cb="1" mark="unchanged"/>
      <counter type="INSTRUCTION" missed="5" covered="4"/>
    </sourcefile>
    <counter type="INSTRUCTION" missed="5" covered="4"/>
  </package>
  <counter type="INSTRUCTION" missed="5" covered="4"/>
</report>
"#;

#[test]
fn test_parse_sample() -> Result<()> {
    let report = Report::parse(SAMPLE)?;

    assert_eq!(report.name, "demo");
    assert_eq!(report.doctype.as_deref(), Some(DEFAULT_DOCTYPE));
    assert_eq!(
        report.session_infos,
        vec![SessionInfo {
            id: "host-1".into(),
            start: 1700000000000,
            dump: 1700000005000,
        }]
    );

    let package = &report.packages[0];
    assert_eq!(package.name, "com/example");
    assert_eq!(package.mark, Mark::Unset);

    let class = &package.classes[0];
    assert_eq!(class.source_file_name.as_deref(), Some("Foo.java"));
    assert_eq!(class.methods[0].name, "<init>");
    assert_eq!(class.methods[0].hash, None);
    assert_eq!(class.methods[1].qualified_desc(), "bar(I)I");
    assert_eq!(class.methods[1].hash.as_deref(), Some("abc"));
    assert_eq!(class.methods[1].mark, Mark::Changed);
    assert_eq!(
        class.counters.get(CounterKind::Class),
        Some(&Counter::new(CounterKind::Class, 0, 1))
    );

    let file = package.source_file("Foo.java").expect("source file");
    assert_eq!(file.line_index(5), Some(1));
    assert_eq!(file.line_index(4), None);
    assert_eq!(file.lines[1].mark, Mark::Unchanged);

    Ok(())
}

#[test]
fn test_write_then_parse_is_stable() -> Result<()> {
    let report = Report::parse(SAMPLE)?;
    let text = report.to_string()?;

    assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
    assert!(text.contains("<!DOCTYPE report PUBLIC"));
    assert!(text.contains(r#"name="&lt;init&gt;""#));
    assert!(text.contains(r#"mark="changed""#));

    let reparsed = Report::parse(&text)?;
    assert_eq!(reparsed, report);

    Ok(())
}

#[test]
fn test_unset_mark_is_not_written() -> Result<()> {
    let report = Report {
        name: "r".into(),
        packages: vec![Package {
            name: "p".into(),
            ..Package::default()
        }],
        ..Report::default()
    };

    let text = report.to_string()?;
    assert!(!text.contains("mark="));
    assert!(!text.contains("DOCTYPE"));

    Ok(())
}

#[test]
fn test_missing_line_counts_are_zero() -> Result<()> {
    let text = r#"<report name="r"><package name="p"><sourcefile name="A.java"><line nr="7"/></sourcefile></package></report>"#;
    let report = Report::parse(text)?;

    assert_eq!(
        report.packages[0].source_files[0].lines,
        vec![Line {
            nr: 7,
            ..Line::default()
        }]
    );

    Ok(())
}

#[test]
fn test_group_is_unsupported() {
    let text = r#"<report name="r"><group name="g"></group></report>"#;
    let err = Report::parse(text).unwrap_err();

    assert!(matches!(err, ReportError::Unsupported(name) if name == "group"));
}

#[test]
fn test_missing_required_attribute() {
    let text = r#"<report name="r"><package><class name="A"/></package></report>"#;
    let err = Report::parse(text).unwrap_err();

    assert!(matches!(
        err,
        ReportError::MissingAttribute {
            element: "package",
            attribute: "name",
        }
    ));
}

#[test]
fn test_invalid_number() {
    let text = r#"<report name="r"><package name="p"><sourcefile name="A.java"><line nr="x"/></sourcefile></package></report>"#;
    let err = Report::parse(text).unwrap_err();

    assert!(matches!(err, ReportError::InvalidValue { attribute: "nr", .. }));
}

#[test]
fn test_unknown_counter_type() {
    let text = r#"<report name="r"><counter type="BOGUS" missed="0" covered="0"/></report>"#;
    let err = Report::parse(text).unwrap_err();

    assert!(matches!(err, ReportError::UnknownCounter(kind) if kind == "BOGUS"));
}

#[test]
fn test_truncated_document() {
    let text = r#"<report name="r"><package name="p">"#;
    assert!(Report::parse(text).is_err());
}

#[test]
fn test_empty_document() {
    let err = Report::parse("").unwrap_err();
    assert!(matches!(err, ReportError::MissingReport));
}

#[test]
fn test_save_and_load() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("jacoco-report-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("report.xml");

    let report = Report::parse(SAMPLE)?;
    report.save(&path)?;
    let loaded = Report::load(&path)?;

    std::fs::remove_dir_all(&dir)?;

    assert_eq!(loaded, report);

    Ok(())
}

#[test]
fn test_load_missing_file() {
    let err = Report::load("/nonexistent/report.xml").unwrap_err();
    assert!(matches!(err, ReportError::Io { .. }));
}
