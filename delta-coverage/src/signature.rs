// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::structure::{MethodDecl, Param, SourceUnit};

/// Method identity: name followed by the JVM parameter descriptor, e.g.
/// `greet(Ljava/lang/String;I)`.
///
/// The return type is not part of the signature, so a signature is a prefix
/// of the `name + desc` string found in a report.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct MethodSignature(String);

impl MethodSignature {
    pub fn new(name: &str, params: &str) -> Self {
        Self(format!("{name}({params})"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &str {
        match self.0.find('(') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// Loose match: `name + desc` starts with this signature.
    pub fn is_prefix_of(&self, name: &str, desc: &str) -> bool {
        let qualified = format!("{name}{desc}");
        qualified.starts_with(&self.0)
    }

    /// Strict match: name and parameter descriptor are equal. A signature that
    /// carries a return type must match the full descriptor.
    pub fn matches_exactly(&self, name: &str, desc: &str) -> bool {
        let params = match desc.find(')') {
            Some(idx) => &desc[..=idx],
            None => desc,
        };

        match self.0.strip_prefix(name) {
            Some(rest) => rest == params || rest == desc,
            None => false,
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MethodSignature {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

const JAVA_LANG: &[&str] = &[
    "AutoCloseable",
    "Boolean",
    "Byte",
    "CharSequence",
    "Character",
    "Class",
    "Cloneable",
    "Comparable",
    "Double",
    "Enum",
    "Error",
    "Exception",
    "Float",
    "Integer",
    "Iterable",
    "Long",
    "Number",
    "Object",
    "Runnable",
    "RuntimeException",
    "Short",
    "String",
    "StringBuffer",
    "StringBuilder",
    "Thread",
    "Throwable",
    "Void",
];

fn primitive(name: &str) -> Option<char> {
    let code = match name {
        "boolean" => 'Z',
        "byte" => 'B',
        "char" => 'C',
        "double" => 'D',
        "float" => 'F',
        "int" => 'I',
        "long" => 'J',
        "short" => 'S',
        "void" => 'V',
        _ => return None,
    };

    Some(code)
}

/// Remove type arguments, including nested ones: `Map<K, List<V>>` -> `Map`.
fn erase_generics(type_name: &str) -> String {
    let mut depth = 0usize;
    let mut erased = String::with_capacity(type_name.len());

    for c in type_name.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 && !c.is_whitespace() => erased.push(c),
            _ => {}
        }
    }

    erased
}

/// Builds JVM descriptors for the parameters of methods in one source unit,
/// resolving simple type names against the unit's imports and package.
pub struct DescriptorResolver<'a> {
    package: Option<&'a str>,
    imports: &'a [String],
}

impl<'a> DescriptorResolver<'a> {
    pub fn new(unit: &'a SourceUnit) -> Self {
        Self {
            package: unit.package.as_deref(),
            imports: &unit.imports,
        }
    }

    pub fn signature(&self, method: &MethodDecl) -> MethodSignature {
        let params: String = method.params.iter().map(|p| self.descriptor(p)).collect();
        MethodSignature::new(&method.name, &params)
    }

    pub fn descriptor(&self, param: &Param) -> String {
        let mut base = erase_generics(&param.type_name);
        let mut dims = usize::from(param.varargs);

        if let Some(stripped) = base.strip_suffix("...") {
            base = stripped.to_owned();
            if !param.varargs {
                dims += 1;
            }
        }

        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped.to_owned();
            dims += 1;
        }

        let mut descriptor = "[".repeat(dims);

        match primitive(&base) {
            Some(code) => descriptor.push(code),
            None => {
                let internal = match &param.resolved {
                    Some(resolved) => erase_generics(resolved).replace('.', "/"),
                    None => self.internal_name(&base),
                };

                descriptor.push('L');
                descriptor.push_str(&internal);
                descriptor.push(';');
            }
        }

        descriptor
    }

    /// Best-effort internal name for an unresolved, generics-free type name.
    fn internal_name(&self, name: &str) -> String {
        let mut segments = name.split('.');
        let first = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();

        // `java.util.List` style: already qualified.
        if !rest.is_empty() && first.starts_with(|c: char| c.is_ascii_lowercase()) {
            return name.replace('.', "/");
        }

        let mut internal = self.resolve_simple(first);

        for nested in rest {
            internal.push('$');
            internal.push_str(nested);
        }

        internal
    }

    fn resolve_simple(&self, name: &str) -> String {
        let suffix = format!(".{name}");

        if let Some(import) = self.imports.iter().find(|i| i.ends_with(&suffix)) {
            return import.replace('.', "/");
        }

        if JAVA_LANG.contains(&name) {
            return format!("java/lang/{name}");
        }

        // A lone capital letter is almost always a type variable.
        if name.len() == 1 && name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return "java/lang/Object".to_owned();
        }

        match self.package {
            Some(package) => format!("{}/{}", package.replace('.', "/"), name),
            None => name.to_owned(),
        }
    }
}
