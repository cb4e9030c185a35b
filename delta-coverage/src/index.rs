// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;

use crate::signature::{DescriptorResolver, MethodSignature};
use crate::structure::{ClassLike, MethodDecl, Node, SourceUnit};

pub type MethodTable<'a> = BTreeMap<MethodSignature, &'a MethodDecl>;

/// Class internal name (`com/example/Outer$Inner`) to method table, for one
/// source unit.
#[derive(Debug, Default)]
pub struct StructuralIndex<'a> {
    classes: BTreeMap<String, MethodTable<'a>>,
}

impl<'a> StructuralIndex<'a> {
    pub fn build(unit: &'a SourceUnit) -> Self {
        let resolver = DescriptorResolver::new(unit);
        let mut index = Self::default();

        let prefix = match &unit.package {
            Some(package) if !package.is_empty() => format!("{}/", package.replace('.', "/")),
            _ => String::new(),
        };

        for node in &unit.types {
            if let Node::ClassLike(class) = node {
                index.insert(&resolver, format!("{prefix}{}", class.name), class);
            }
        }

        index
    }

    fn insert(&mut self, resolver: &DescriptorResolver, name: String, class: &'a ClassLike) {
        let mut methods = MethodTable::new();

        for member in &class.members {
            match member {
                Node::ClassLike(nested) => {
                    self.insert(resolver, format!("{name}${}", nested.name), nested);
                }
                Node::Method(method) => {
                    // Later declarations with the same signature replace earlier ones.
                    methods.insert(resolver.signature(method), method);
                }
                Node::Other => {}
            }
        }

        self.classes.insert(name, methods);
    }

    pub fn get(&self, class: &str) -> Option<&MethodTable<'a>> {
        self.classes.get(class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &MethodTable<'a>)> {
        self.classes.iter().map(|(name, table)| (name.as_str(), table))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
