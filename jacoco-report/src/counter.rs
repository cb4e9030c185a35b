// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::str::FromStr;

use crate::ReportError;

/// Metric tracked by a `<counter>` element.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CounterKind {
    Instruction,
    Branch,
    Line,
    Complexity,
    Method,
    Class,
}

impl CounterKind {
    /// Every kind, in the order JaCoCo emits them.
    pub const ALL: [CounterKind; 6] = [
        CounterKind::Instruction,
        CounterKind::Branch,
        CounterKind::Line,
        CounterKind::Complexity,
        CounterKind::Method,
        CounterKind::Class,
    ];

    /// Kinds a method carries, and therefore the kinds a class derives from its methods.
    pub const METHOD_KINDS: [CounterKind; 5] = [
        CounterKind::Instruction,
        CounterKind::Branch,
        CounterKind::Line,
        CounterKind::Complexity,
        CounterKind::Method,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instruction => "INSTRUCTION",
            Self::Branch => "BRANCH",
            Self::Line => "LINE",
            Self::Complexity => "COMPLEXITY",
            Self::Method => "METHOD",
            Self::Class => "CLASS",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "INSTRUCTION" => Self::Instruction,
            "BRANCH" => Self::Branch,
            "LINE" => Self::Line,
            "COMPLEXITY" => Self::Complexity,
            "METHOD" => Self::Method,
            "CLASS" => Self::Class,
            _ => return Err(ReportError::UnknownCounter(s.to_owned())),
        };

        Ok(kind)
    }
}

// <!ELEMENT counter EMPTY>
// <!ATTLIST counter type    (INSTRUCTION|BRANCH|LINE|COMPLEXITY|METHOD|CLASS) #REQUIRED>
// <!ATTLIST counter missed  CDATA #REQUIRED>
// <!ATTLIST counter covered CDATA #REQUIRED>
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Counter {
    pub kind: CounterKind,
    pub missed: u64,
    pub covered: u64,
}

impl Counter {
    pub fn new(kind: CounterKind, missed: u64, covered: u64) -> Self {
        Self {
            kind,
            missed,
            covered,
        }
    }

    pub fn total(&self) -> u64 {
        self.missed + self.covered
    }

    /// Credit every missed unit as covered.
    pub fn cover_all(&mut self) {
        self.covered += self.missed;
        self.missed = 0;
    }

    pub fn reset(&mut self) {
        self.missed = 0;
        self.covered = 0;
    }

    /// Covered ratio in `[0, 1]`, or `None` if nothing is tracked.
    pub fn ratio(&self) -> Option<f64> {
        let total = self.total();

        if total == 0 {
            return None;
        }

        Some(self.covered as f64 / total as f64)
    }
}

/// The counters attached to a single report node.
///
/// A node only tracks the kinds it was loaded with. Operations on a kind the
/// node does not carry are no-ops, so a missing counter means "not tracked".
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    counters: Vec<Counter>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: CounterKind) -> Option<&Counter> {
        self.counters.iter().find(|c| c.kind == kind)
    }

    pub fn get_mut(&mut self, kind: CounterKind) -> Option<&mut Counter> {
        self.counters.iter_mut().find(|c| c.kind == kind)
    }

    /// Insert or overwrite the counter for `kind`.
    pub fn set(&mut self, kind: CounterKind, missed: u64, covered: u64) {
        match self.get_mut(kind) {
            Some(counter) => {
                counter.missed = missed;
                counter.covered = covered;
            }
            None => self.counters.push(Counter::new(kind, missed, covered)),
        }
    }

    /// Overwrite `kind` only if this node tracks it.
    pub fn update(&mut self, kind: CounterKind, missed: u64, covered: u64) {
        if let Some(counter) = self.get_mut(kind) {
            counter.missed = missed;
            counter.covered = covered;
        }
    }

    pub fn contains(&self, kind: CounterKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn cover_all(&mut self) {
        for counter in &mut self.counters {
            counter.cover_all();
        }
    }

    pub fn reset(&mut self, kinds: &[CounterKind]) {
        for counter in &mut self.counters {
            if kinds.contains(&counter.kind) {
                counter.reset();
            }
        }
    }

    /// Add `other` into `self` for each of `kinds` tracked by both nodes.
    pub fn accumulate(&mut self, other: &Counters, kinds: &[CounterKind]) {
        for counter in &mut self.counters {
            if !kinds.contains(&counter.kind) {
                continue;
            }

            if let Some(theirs) = other.get(counter.kind) {
                counter.missed += theirs.missed;
                counter.covered += theirs.covered;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Counter> {
        self.counters.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub(crate) fn push(&mut self, counter: Counter) {
        self.counters.push(counter);
    }
}

impl FromIterator<Counter> for Counters {
    fn from_iter<I: IntoIterator<Item = Counter>>(iter: I) -> Self {
        Self {
            counters: iter.into_iter().collect(),
        }
    }
}
