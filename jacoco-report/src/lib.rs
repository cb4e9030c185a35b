// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory model of a JaCoCo XML coverage report.
//!
//! The tree mirrors the report DTD: a report holds packages, a package holds
//! classes and source files, a class holds methods, and a source file holds
//! per-line records. Every node but the line carries a set of counters.
//! Packages, classes, methods and lines additionally carry a [`Mark`] used by
//! incremental coverage processing.

#[macro_use]
extern crate log;

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::{Result as XmlResult, Writer};
use thiserror::Error;

mod aggregate;
mod counter;
mod read;

pub use counter::{Counter, CounterKind, Counters};

pub const DEFAULT_DOCTYPE: &str = r#"report PUBLIC "-//JACOCO//DTD Report 1.1//EN" "report.dtd""#;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unable to access report file: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attribute(#[from] AttrError),

    #[error("report is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("<{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("invalid value `{value}` for attribute `{attribute}` of <{element}>")]
    InvalidValue {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("unknown counter type `{0}`")]
    UnknownCounter(String),

    #[error("unknown mark `{0}`")]
    UnknownMark(String),

    #[error("unsupported element <{0}>")]
    Unsupported(String),

    #[error("document has no <report> element")]
    MissingReport,

    #[error("unexpected end of document")]
    UnexpectedEof,
}

/// Incremental processing state of a node.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mark {
    #[default]
    Unset,
    Changed,
    Unchanged,
}

impl Mark {
    /// Attribute value, or `None` when the mark is not serialized.
    pub fn as_attr(&self) -> Option<&'static str> {
        match self {
            Self::Unset => None,
            Self::Changed => Some("changed"),
            Self::Unchanged => Some("unchanged"),
        }
    }

    pub fn parse(value: &str) -> Result<Self, ReportError> {
        match value {
            "changed" => Ok(Self::Changed),
            "unchanged" => Ok(Self::Unchanged),
            _ => Err(ReportError::UnknownMark(value.to_owned())),
        }
    }
}

impl Report {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_owned(),
            source,
        })?;

        debug!("loaded report text from {}", path.display());

        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ReportError> {
        read::parse(text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let text = self.to_string()?;

        fs::write(path, text).map_err(|source| ReportError::Io {
            path: path.to_owned(),
            source,
        })
    }

    #[allow(clippy::inherent_to_string_shadow_display)]
    pub fn to_string(&self) -> Result<String, ReportError> {
        let mut data = Vec::new();
        let cursor = Cursor::new(&mut data);

        let mut writer = Writer::new_with_indent(cursor, b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        if let Some(doctype) = &self.doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?;
        }

        self.write_xml(&mut writer)?;

        let text = String::from_utf8(data)?;
        Ok(text)
    }

    pub fn find_class(&self, name: &str) -> Option<(&Package, &Class)> {
        self.packages.iter().find_map(|package| {
            package
                .classes
                .iter()
                .find(|class| class.name == name)
                .map(|class| (package, class))
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = (&Package, &Class, &Method)> {
        self.packages.iter().flat_map(|package| {
            package.classes.iter().flat_map(move |class| {
                class
                    .methods
                    .iter()
                    .map(move |method| (package, class, method))
            })
        })
    }
}

pub trait WriteXml {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()>;
}

impl<T> WriteXml for Vec<T>
where
    T: WriteXml,
{
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        for value in self {
            value.write_xml(writer)?;
        }

        Ok(())
    }
}

impl WriteXml for Counters {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        for counter in self.iter() {
            counter.write_xml(writer)?;
        }

        Ok(())
    }
}

macro_rules! uint {
    ($val: expr) => {
        format!("{}", $val)
    };
}

// Borrow `(name, value)` pairs as the `(&str, &str)` tuples quick-xml expects.
fn borrowed<'a>(attrs: &'a [(&'a str, String)]) -> impl Iterator<Item = (&'a str, &'a str)> {
    attrs.iter().map(|(k, v)| (*k, v.as_str()))
}

fn push_mark(attrs: &mut Vec<(&'static str, String)>, mark: Mark) {
    if let Some(value) = mark.as_attr() {
        attrs.push(("mark", value.to_owned()));
    }
}

// <!ELEMENT report (sessioninfo*, (group* | package*), counter*)>
// <!ATTLIST report name CDATA #REQUIRED>
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    pub name: String,
    pub doctype: Option<String>,
    pub session_infos: Vec<SessionInfo>,
    pub packages: Vec<Package>,
    pub counters: Counters,
}

impl WriteXml for Report {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        writer
            .create_element("report")
            .with_attribute(("name", self.name.as_str()))
            .write_inner_content(|w| {
                self.session_infos.write_xml(w)?;
                self.packages.write_xml(w)?;
                self.counters.write_xml(w)?;

                Ok(())
            })?;

        Ok(())
    }
}

// <!ELEMENT sessioninfo EMPTY>
// <!ATTLIST sessioninfo id    CDATA #REQUIRED>
// <!ATTLIST sessioninfo start CDATA #REQUIRED>
// <!ATTLIST sessioninfo dump  CDATA #REQUIRED>
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionInfo {
    pub id: String,
    pub start: u64,
    pub dump: u64,
}

impl WriteXml for SessionInfo {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        writer
            .create_element("sessioninfo")
            .with_attributes([
                ("id", self.id.as_str()),
                ("start", uint!(self.start).as_str()),
                ("dump", uint!(self.dump).as_str()),
            ])
            .write_empty()?;

        Ok(())
    }
}

// <!ELEMENT package ((class | sourcefile)*, counter*)>
// <!ATTLIST package name CDATA #REQUIRED>
// <!ATTLIST package mark CDATA #IMPLIED>
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Package {
    pub name: String,
    pub classes: Vec<Class>,
    pub source_files: Vec<SourceFile>,
    pub counters: Counters,
    pub mark: Mark,
}

impl Package {
    pub fn source_file(&self, name: &str) -> Option<&SourceFile> {
        self.source_files.iter().find(|file| file.name == name)
    }

    pub fn source_file_mut(&mut self, name: &str) -> Option<&mut SourceFile> {
        self.source_files.iter_mut().find(|file| file.name == name)
    }
}

impl WriteXml for Package {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        let mut attrs = vec![("name", self.name.clone())];
        push_mark(&mut attrs, self.mark);

        writer
            .create_element("package")
            .with_attributes(borrowed(&attrs))
            .write_inner_content(|w| {
                self.classes.write_xml(w)?;
                self.source_files.write_xml(w)?;
                self.counters.write_xml(w)?;

                Ok(())
            })?;

        Ok(())
    }
}

// <!ELEMENT class (method*, counter*)>
// <!ATTLIST class name           CDATA #REQUIRED>
// <!ATTLIST class sourcefilename CDATA #IMPLIED>
// <!ATTLIST class mark           CDATA #IMPLIED>
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Class {
    pub name: String,
    pub source_file_name: Option<String>,
    pub methods: Vec<Method>,
    pub counters: Counters,
    pub mark: Mark,
}

impl WriteXml for Class {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        let mut attrs = vec![("name", self.name.clone())];

        if let Some(file) = &self.source_file_name {
            attrs.push(("sourcefilename", file.clone()));
        }

        push_mark(&mut attrs, self.mark);

        writer
            .create_element("class")
            .with_attributes(borrowed(&attrs))
            .write_inner_content(|w| {
                self.methods.write_xml(w)?;
                self.counters.write_xml(w)?;

                Ok(())
            })?;

        Ok(())
    }
}

// <!ELEMENT method (counter*)>
// <!ATTLIST method name    CDATA #REQUIRED>
// <!ATTLIST method desc    CDATA #REQUIRED>
// <!ATTLIST method line    CDATA #IMPLIED>
// <!ATTLIST method endLine CDATA #IMPLIED>
// <!ATTLIST method hash    CDATA #IMPLIED>
// <!ATTLIST method mark    CDATA #IMPLIED>
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Method {
    pub name: String,
    pub desc: String,
    pub line: Option<u32>,
    pub end_line: Option<u32>,
    pub hash: Option<String>,
    pub counters: Counters,
    pub mark: Mark,
}

impl Method {
    /// Method name immediately followed by its descriptor, e.g. `foo(I)V`.
    pub fn qualified_desc(&self) -> String {
        format!("{}{}", self.name, self.desc)
    }
}

impl WriteXml for Method {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        let mut attrs = vec![("name", self.name.clone()), ("desc", self.desc.clone())];

        if let Some(line) = self.line {
            attrs.push(("line", uint!(line)));
        }

        if let Some(end_line) = self.end_line {
            attrs.push(("endLine", uint!(end_line)));
        }

        if let Some(hash) = &self.hash {
            attrs.push(("hash", hash.clone()));
        }

        push_mark(&mut attrs, self.mark);

        writer
            .create_element("method")
            .with_attributes(borrowed(&attrs))
            .write_inner_content(|w| self.counters.write_xml(w))?;

        Ok(())
    }
}

// <!ELEMENT sourcefile (line*, counter*)>
// <!ATTLIST sourcefile name CDATA #REQUIRED>
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub lines: Vec<Line>,
    pub counters: Counters,
}

impl SourceFile {
    /// Index of the first line record numbered `nr`.
    pub fn line_index(&self, nr: u32) -> Option<usize> {
        self.lines.iter().position(|line| line.nr == nr)
    }
}

impl WriteXml for SourceFile {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        writer
            .create_element("sourcefile")
            .with_attribute(("name", self.name.as_str()))
            .write_inner_content(|w| {
                self.lines.write_xml(w)?;
                self.counters.write_xml(w)?;

                Ok(())
            })?;

        Ok(())
    }
}

// <!ELEMENT line EMPTY>
// <!ATTLIST line nr   CDATA #REQUIRED>
// <!ATTLIST line mi   CDATA #IMPLIED>
// <!ATTLIST line ci   CDATA #IMPLIED>
// <!ATTLIST line mb   CDATA #IMPLIED>
// <!ATTLIST line cb   CDATA #IMPLIED>
// <!ATTLIST line mark CDATA #IMPLIED>
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Line {
    pub nr: u32,
    pub mi: u64,
    pub ci: u64,
    pub mb: u64,
    pub cb: u64,
    pub mark: Mark,
}

impl Line {
    /// Credit every missed instruction and branch on this line as covered.
    pub fn cover_all(&mut self) {
        self.ci += self.mi;
        self.mi = 0;
        self.cb += self.mb;
        self.mb = 0;
    }

    pub fn is_covered(&self) -> bool {
        self.ci > 0
    }
}

impl WriteXml for Line {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        let mut attrs = vec![
            ("nr", uint!(self.nr)),
            ("mi", uint!(self.mi)),
            ("ci", uint!(self.ci)),
            ("mb", uint!(self.mb)),
            ("cb", uint!(self.cb)),
        ];
        push_mark(&mut attrs, self.mark);

        writer
            .create_element("line")
            .with_attributes(borrowed(&attrs))
            .write_empty()?;

        Ok(())
    }
}

impl WriteXml for Counter {
    fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult<()> {
        writer
            .create_element("counter")
            .with_attributes([
                ("type", self.kind.as_str()),
                ("missed", uint!(self.missed).as_str()),
                ("covered", uint!(self.covered).as_str()),
            ])
            .write_empty()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
