// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{
    Class, Counter, CounterKind, Counters, Line, Mark, Method, Package, Report, ReportError,
    SessionInfo, SourceFile,
};

type XmlReader<'a> = Reader<&'a [u8]>;

pub(crate) fn parse(text: &str) -> Result<Report, ReportError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut doctype = None;

    loop {
        match reader.read_event()? {
            Event::DocType(text) => {
                let text = String::from_utf8_lossy(&text).trim().to_owned();
                doctype = Some(text);
            }
            Event::Start(start) => {
                let mut report = read_report(&mut reader, &start, false)?;
                report.doctype = doctype;
                return Ok(report);
            }
            Event::Empty(start) => {
                let mut report = read_report(&mut reader, &start, true)?;
                report.doctype = doctype;
                return Ok(report);
            }
            Event::Eof => return Err(ReportError::MissingReport),
            _ => {}
        }
    }
}

/// Invoke `visit` on each child element of the current element, consuming
/// input up to and including its end tag.
///
/// The final argument to `visit` is `true` when the child is self-closing.
fn for_each_child<'a, F>(reader: &mut XmlReader<'a>, mut visit: F) -> Result<(), ReportError>
where
    F: FnMut(&mut XmlReader<'a>, &BytesStart<'a>, bool) -> Result<(), ReportError>,
{
    loop {
        match reader.read_event()? {
            Event::Start(start) => visit(reader, &start, false)?,
            Event::Empty(start) => visit(reader, &start, true)?,
            Event::End(_) => return Ok(()),
            Event::Eof => return Err(ReportError::UnexpectedEof),
            _ => {}
        }
    }
}

fn element_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

// Unknown children are skipped whole, so a newer report schema still loads.
fn skip_unknown(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
    parent: &str,
) -> Result<(), ReportError> {
    debug!("skipping <{}> inside <{}>", element_name(start), parent);

    if !empty {
        reader.read_to_end(start.name())?;
    }

    Ok(())
}

struct Attributes {
    element: &'static str,
    values: Vec<(String, String)>,
}

impl Attributes {
    fn parse(start: &BytesStart, element: &'static str) -> Result<Self, ReportError> {
        let mut values = vec![];

        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            values.push((key, value));
        }

        Ok(Self { element, values })
    }

    fn optional(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, name: &'static str) -> Result<&str, ReportError> {
        self.optional(name)
            .ok_or(ReportError::MissingAttribute {
                element: self.element,
                attribute: name,
            })
    }

    fn number<T: FromStr>(&self, name: &'static str) -> Result<T, ReportError> {
        let value = self.required(name)?;
        self.convert(name, value)
    }

    fn optional_number<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ReportError> {
        self.optional(name)
            .map(|value| self.convert(name, value))
            .transpose()
    }

    // Absent line counts are zero.
    fn number_or_zero(&self, name: &'static str) -> Result<u64, ReportError> {
        Ok(self.optional_number(name)?.unwrap_or(0))
    }

    fn mark(&self) -> Result<Mark, ReportError> {
        match self.optional("mark") {
            Some(value) => Mark::parse(value),
            None => Ok(Mark::Unset),
        }
    }

    fn convert<T: FromStr>(&self, name: &'static str, value: &str) -> Result<T, ReportError> {
        value.trim().parse().map_err(|_| ReportError::InvalidValue {
            element: self.element,
            attribute: name,
            value: value.to_owned(),
        })
    }
}

fn read_counter(start: &BytesStart) -> Result<Counter, ReportError> {
    let attrs = Attributes::parse(start, "counter")?;
    let kind = CounterKind::from_str(attrs.required("type")?)?;
    let missed = attrs.number("missed")?;
    let covered = attrs.number("covered")?;

    Ok(Counter::new(kind, missed, covered))
}

// Counters are always empty elements; a start tag still needs its end consumed.
fn read_counter_into(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
    counters: &mut Counters,
) -> Result<(), ReportError> {
    counters.push(read_counter(start)?);

    if !empty {
        reader.read_to_end(start.name())?;
    }

    Ok(())
}

fn read_report(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<Report, ReportError> {
    if start.name().as_ref() != b"report" {
        return Err(ReportError::Unsupported(element_name(start)));
    }

    let attrs = Attributes::parse(start, "report")?;

    let mut report = Report {
        name: attrs.required("name")?.to_owned(),
        ..Report::default()
    };

    if empty {
        return Ok(report);
    }

    for_each_child(reader, |reader, child, empty| {
        match child.name().as_ref() {
            b"sessioninfo" => {
                report.session_infos.push(read_session_info(child)?);

                if !empty {
                    reader.read_to_end(child.name())?;
                }
            }
            b"package" => report.packages.push(read_package(reader, child, empty)?),
            b"counter" => read_counter_into(reader, child, empty, &mut report.counters)?,
            b"group" => return Err(ReportError::Unsupported("group".into())),
            _ => skip_unknown(reader, child, empty, "report")?,
        }

        Ok(())
    })?;

    Ok(report)
}

fn read_session_info(start: &BytesStart) -> Result<SessionInfo, ReportError> {
    let attrs = Attributes::parse(start, "sessioninfo")?;

    Ok(SessionInfo {
        id: attrs.required("id")?.to_owned(),
        start: attrs.number("start")?,
        dump: attrs.number("dump")?,
    })
}

fn read_package(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<Package, ReportError> {
    let attrs = Attributes::parse(start, "package")?;

    let mut package = Package {
        name: attrs.required("name")?.to_owned(),
        mark: attrs.mark()?,
        ..Package::default()
    };

    if empty {
        return Ok(package);
    }

    for_each_child(reader, |reader, child, empty| {
        match child.name().as_ref() {
            b"class" => package.classes.push(read_class(reader, child, empty)?),
            b"sourcefile" => package
                .source_files
                .push(read_source_file(reader, child, empty)?),
            b"counter" => read_counter_into(reader, child, empty, &mut package.counters)?,
            _ => skip_unknown(reader, child, empty, "package")?,
        }

        Ok(())
    })?;

    Ok(package)
}

fn read_class(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<Class, ReportError> {
    let attrs = Attributes::parse(start, "class")?;

    let mut class = Class {
        name: attrs.required("name")?.to_owned(),
        source_file_name: attrs.optional("sourcefilename").map(str::to_owned),
        mark: attrs.mark()?,
        ..Class::default()
    };

    if empty {
        return Ok(class);
    }

    for_each_child(reader, |reader, child, empty| {
        match child.name().as_ref() {
            b"method" => class.methods.push(read_method(reader, child, empty)?),
            b"counter" => read_counter_into(reader, child, empty, &mut class.counters)?,
            _ => skip_unknown(reader, child, empty, "class")?,
        }

        Ok(())
    })?;

    Ok(class)
}

fn read_method(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<Method, ReportError> {
    let attrs = Attributes::parse(start, "method")?;

    let mut method = Method {
        name: attrs.required("name")?.to_owned(),
        desc: attrs.required("desc")?.to_owned(),
        line: attrs.optional_number("line")?,
        end_line: attrs.optional_number("endLine")?,
        hash: attrs.optional("hash").map(str::to_owned),
        mark: attrs.mark()?,
        ..Method::default()
    };

    if empty {
        return Ok(method);
    }

    for_each_child(reader, |reader, child, empty| {
        match child.name().as_ref() {
            b"counter" => read_counter_into(reader, child, empty, &mut method.counters)?,
            _ => skip_unknown(reader, child, empty, "method")?,
        }

        Ok(())
    })?;

    Ok(method)
}

fn read_source_file(
    reader: &mut XmlReader,
    start: &BytesStart,
    empty: bool,
) -> Result<SourceFile, ReportError> {
    let attrs = Attributes::parse(start, "sourcefile")?;

    let mut file = SourceFile {
        name: attrs.required("name")?.to_owned(),
        ..SourceFile::default()
    };

    if empty {
        return Ok(file);
    }

    for_each_child(reader, |reader, child, empty| {
        match child.name().as_ref() {
            b"line" => {
                file.lines.push(read_line(child)?);

                if !empty {
                    reader.read_to_end(child.name())?;
                }
            }
            b"counter" => read_counter_into(reader, child, empty, &mut file.counters)?,
            _ => skip_unknown(reader, child, empty, "sourcefile")?,
        }

        Ok(())
    })?;

    Ok(file)
}

fn read_line(start: &BytesStart) -> Result<Line, ReportError> {
    let attrs = Attributes::parse(start, "line")?;

    Ok(Line {
        nr: attrs.number("nr")?,
        mi: attrs.number_or_zero("mi")?,
        ci: attrs.number_or_zero("ci")?,
        mb: attrs.number_or_zero("mb")?,
        cb: attrs.number_or_zero("cb")?,
        mark: attrs.mark()?,
    })
}
