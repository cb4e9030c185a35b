// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Incremental coverage for JaCoCo reports.
//!
//! Changed methods are found by comparing the parsed structure of each
//! modified source file at two revisions. The resulting [`ChangeMap`] drives
//! [`refactor`], which credits all unchanged code as covered, and [`merge`],
//! which carries coverage of still-changed methods forward from the previous
//! run.

#[macro_use]
extern crate log;

pub mod change;
pub mod index;
pub mod merge;
pub mod pipeline;
pub mod signature;
pub mod structure;
pub mod transform;

pub use change::{
    ChangeDetection, ChangeDetector, ChangeError, ChangeKind, ChangeMap, ChangedFile,
    ChangedMethod, JsonParser, SourceParser, SourceProvider,
};
pub use merge::merge;
pub use signature::MethodSignature;
pub use structure::SourceUnit;
pub use transform::{refactor, MethodMatch};
