// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

pub mod collaborators;
pub mod command;
pub mod config;
pub mod expand;
pub mod git;
pub mod parser;
pub mod process;
pub mod registry;
pub mod worker;
