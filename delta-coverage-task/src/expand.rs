// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::registry::Registration;

pub enum ExpandedValue<'a> {
    Scalar(String),
    List(&'a [String]),
}

#[derive(PartialEq, Eq, Hash, EnumIter)]
pub enum PlaceHolder {
    Application,
    Host,
    Port,
    RepoDir,
    OldBranch,
    NewBranch,
    ExecFile,
    ReportFile,
    SourceFile,
    ExtraOptions,
}

impl PlaceHolder {
    fn get_string(&self) -> String {
        match self {
            Self::Application => "{application}",
            Self::Host => "{host}",
            Self::Port => "{port}",
            Self::RepoDir => "{repo_dir}",
            Self::OldBranch => "{old_branch}",
            Self::NewBranch => "{new_branch}",
            Self::ExecFile => "{exec_file}",
            Self::ReportFile => "{report_file}",
            Self::SourceFile => "{source_file}",
            Self::ExtraOptions => "{extra_options}",
        }
        .to_string()
    }
}

#[derive(Default)]
pub struct Expand<'a> {
    values: HashMap<String, ExpandedValue<'a>>,
}

impl<'a> Expand<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, name: PlaceHolder, value: ExpandedValue<'a>) -> &mut Self {
        self.values.insert(name.get_string(), value);
        self
    }

    fn set_path(&mut self, name: PlaceHolder, arg: impl AsRef<Path>) -> &mut Self {
        let path = String::from(arg.as_ref().to_string_lossy());
        self.set_value(name, ExpandedValue::Scalar(path))
    }

    /// Set every value that comes from an application's registration.
    pub fn registration(&mut self, app: &Registration) -> &mut Self {
        self.set_value(
            PlaceHolder::Application,
            ExpandedValue::Scalar(app.application_name.clone()),
        )
        .set_value(PlaceHolder::Host, ExpandedValue::Scalar(app.host.clone()))
        .set_value(PlaceHolder::Port, ExpandedValue::Scalar(app.port.to_string()))
        .set_value(
            PlaceHolder::OldBranch,
            ExpandedValue::Scalar(app.old_branch.clone()),
        )
        .set_value(
            PlaceHolder::NewBranch,
            ExpandedValue::Scalar(app.new_branch.clone()),
        )
        .repo_dir(&app.checkout_dir)
    }

    pub fn repo_dir(&mut self, arg: impl AsRef<Path>) -> &mut Self {
        self.set_path(PlaceHolder::RepoDir, arg)
    }

    pub fn exec_file(&mut self, arg: impl AsRef<Path>) -> &mut Self {
        self.set_path(PlaceHolder::ExecFile, arg)
    }

    pub fn report_file(&mut self, arg: impl AsRef<Path>) -> &mut Self {
        self.set_path(PlaceHolder::ReportFile, arg)
    }

    pub fn source_file(&mut self, arg: impl AsRef<Path>) -> &mut Self {
        self.set_path(PlaceHolder::SourceFile, arg)
    }

    pub fn extra_options(&mut self, arg: &'a [String]) -> &mut Self {
        self.set_value(PlaceHolder::ExtraOptions, ExpandedValue::List(arg))
    }

    fn replace_value(&self, fmtstr: &str, arg: String, ev: &ExpandedValue<'a>) -> Result<String> {
        match ev {
            ExpandedValue::Scalar(v) => Ok(arg.replace(fmtstr, v)),
            ExpandedValue::List(value) => {
                let replaced = self.evaluate(value)?.join(" ");
                Ok(arg.replace(fmtstr, &replaced))
            }
        }
    }

    pub fn evaluate_value<T: AsRef<str>>(&self, arg: T) -> Result<String> {
        let mut arg = arg.as_ref().to_owned();

        for placeholder in PlaceHolder::iter() {
            let fmtstr = &placeholder.get_string();
            match (arg.contains(fmtstr), self.values.get(fmtstr)) {
                (true, Some(ev)) => arg = self.replace_value(fmtstr, arg, ev)?,
                (true, None) => bail!("missing argument {}", fmtstr),
                (false, _) => (),
            }
        }

        Ok(arg)
    }

    pub fn evaluate<T: AsRef<str>>(&self, args: &[T]) -> Result<Vec<String>> {
        let mut result = Vec::new();
        for arg in args {
            let arg = self.evaluate_value(arg)?;
            result.push(arg);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::Expand;
    use crate::registry::{RegisterRequest, Registration};

    #[test]
    fn test_expand() -> Result<()> {
        let extra: Vec<String> = vec!["-Dsonar.host={host}".into(), "-q".into()];

        let args = vec![
            "dump",
            "--address",
            "{host}",
            "--port",
            "{port}",
            "--destfile",
            "{exec_file}",
            "{extra_options}",
        ];

        let request = RegisterRequest::new("shop", "https://git.example.com/shop.git");
        let app = Registration::new(request, PathBuf::from("/data/git/shop"));

        let result = Expand::new()
            .registration(&app)
            .exec_file("/data/exec/shop.exec")
            .extra_options(&extra)
            .evaluate(&args)?;

        assert_eq!(
            result,
            vec![
                "dump",
                "--address",
                "localhost",
                "--port",
                "6300",
                "--destfile",
                "/data/exec/shop.exec",
                "-Dsonar.host=localhost -q",
            ]
        );

        assert_eq!(
            Expand::new()
                .registration(&app)
                .evaluate_value("{repo_dir}/{application}-{old_branch}..{new_branch}")?,
            "/data/git/shop/shop-master..pre"
        );

        assert!(Expand::new().evaluate(&args).is_err());

        Ok(())
    }
}
