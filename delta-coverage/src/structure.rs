// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Parsed structure of one Java source file, as produced by an external parser.
//!
//! Only the shape needed for method-level change detection is kept: the
//! package, imports, and a tree of type declarations whose members are either
//! nested types, methods, or anything else.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SourceUnit {
    /// Dotted package name, absent for the default package.
    #[serde(default)]
    pub package: Option<String>,

    /// Single-type imports, e.g. `java.util.List`.
    #[serde(default)]
    pub imports: Vec<String>,

    #[serde(default)]
    pub types: Vec<Node>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    ClassLike(ClassLike),
    Method(MethodDecl),
    Other,
}

/// A class or interface declaration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClassLike {
    pub name: String,

    #[serde(default)]
    pub members: Vec<Node>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MethodDecl {
    pub name: String,

    #[serde(default)]
    pub params: Vec<Param>,

    /// Body text including braces. `None` for abstract and interface methods.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Param {
    /// Type as written in source, e.g. `List<String>`, `int[]`, `Map.Entry`.
    pub type_name: String,

    /// Fully qualified dotted name, when the parser could resolve it.
    #[serde(default)]
    pub resolved: Option<String>,

    #[serde(default)]
    pub varargs: bool,
}

impl SourceUnit {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl Param {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }
}
