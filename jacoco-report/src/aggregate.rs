// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{Class, CounterKind, Package, Report, SourceFile};

impl Report {
    /// Rebuild the aggregate counters of every class, package and the report
    /// from the method counters, and every source file from its lines.
    ///
    /// Only counter kinds a node already tracks are rewritten. The `CLASS`
    /// counter of a class is kept as loaded, and flows upward from there.
    pub fn recount(&mut self) {
        self.counters.reset(&CounterKind::ALL);

        for package in &mut self.packages {
            package.recount();
            self.counters.accumulate(&package.counters, &CounterKind::ALL);
        }
    }

    /// Sum of one counter kind over the whole report, as `(missed, covered)`.
    pub fn summary(&self, kind: CounterKind) -> Option<(u64, u64)> {
        self.counters.get(kind).map(|c| (c.missed, c.covered))
    }
}

impl Package {
    fn recount(&mut self) {
        self.counters.reset(&CounterKind::ALL);

        for class in &mut self.classes {
            class.recount();
            self.counters.accumulate(&class.counters, &CounterKind::ALL);
        }

        for file in &mut self.source_files {
            file.recount();
        }
    }
}

impl Class {
    fn recount(&mut self) {
        self.counters.reset(&CounterKind::METHOD_KINDS);

        for method in &self.methods {
            self.counters
                .accumulate(&method.counters, &CounterKind::METHOD_KINDS);
        }
    }
}

impl SourceFile {
    fn recount(&mut self) {
        let mut instructions = (0, 0);
        let mut branches = (0, 0);
        let mut lines = (0, 0);

        for line in &self.lines {
            instructions.0 += line.mi;
            instructions.1 += line.ci;
            branches.0 += line.mb;
            branches.1 += line.cb;

            if line.is_covered() {
                lines.1 += 1;
            } else if line.mi > 0 {
                lines.0 += 1;
            }
        }

        self.counters
            .update(CounterKind::Instruction, instructions.0, instructions.1);
        self.counters
            .update(CounterKind::Branch, branches.0, branches.1);
        self.counters.update(CounterKind::Line, lines.0, lines.1);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use crate::{Counter, Counters, Line, Method};

    use super::*;

    fn counters(values: &[(CounterKind, u64, u64)]) -> Counters {
        values
            .iter()
            .map(|(kind, missed, covered)| Counter::new(*kind, *missed, *covered))
            .collect()
    }

    fn method(name: &str, instructions: (u64, u64), lines: (u64, u64)) -> Method {
        Method {
            name: name.into(),
            desc: "()V".into(),
            line: Some(1),
            counters: counters(&[
                (CounterKind::Instruction, instructions.0, instructions.1),
                (CounterKind::Line, lines.0, lines.1),
                (CounterKind::Method, u64::from(instructions.1 == 0), u64::from(instructions.1 > 0)),
            ]),
            ..Method::default()
        }
    }

    fn class(name: &str, methods: Vec<Method>) -> Class {
        Class {
            name: name.into(),
            methods,
            counters: counters(&[
                (CounterKind::Instruction, 99, 99),
                (CounterKind::Line, 99, 99),
                (CounterKind::Method, 99, 99),
                (CounterKind::Class, 0, 1),
            ]),
            ..Class::default()
        }
    }

    fn aggregate_counters() -> Counters {
        counters(&[
            (CounterKind::Instruction, 7, 7),
            (CounterKind::Line, 7, 7),
            (CounterKind::Method, 7, 7),
            (CounterKind::Class, 7, 7),
        ])
    }

    #[test]
    fn test_recount_sums_methods_upward() {
        let mut report = Report {
            name: "demo".into(),
            packages: vec![Package {
                name: "a/b".into(),
                classes: vec![
                    class("a/b/C", vec![method("x", (2, 3), (1, 1)), method("y", (4, 0), (2, 0))]),
                    class("a/b/D", vec![method("z", (0, 5), (0, 2))]),
                ],
                counters: aggregate_counters(),
                ..Package::default()
            }],
            counters: aggregate_counters(),
            ..Report::default()
        };

        report.recount();

        let c = &report.packages[0].classes[0];
        assert_eq!(
            c.counters,
            counters(&[
                (CounterKind::Instruction, 6, 3),
                (CounterKind::Line, 3, 1),
                (CounterKind::Method, 1, 1),
                (CounterKind::Class, 0, 1),
            ])
        );

        let expected = counters(&[
            (CounterKind::Instruction, 6, 8),
            (CounterKind::Line, 3, 3),
            (CounterKind::Method, 1, 2),
            (CounterKind::Class, 0, 2),
        ]);
        assert_eq!(report.packages[0].counters, expected);
        assert_eq!(report.counters, expected);
        assert_eq!(report.summary(CounterKind::Instruction), Some((6, 8)));
        assert_eq!(report.summary(CounterKind::Branch), None);
    }

    #[test]
    fn test_recount_does_not_add_untracked_kinds() {
        let mut report = Report {
            packages: vec![Package {
                classes: vec![class("C", vec![method("x", (1, 1), (1, 1))])],
                ..Package::default()
            }],
            ..Report::default()
        };

        report.recount();

        assert!(report.packages[0].counters.is_empty());
        assert!(report.counters.is_empty());
    }

    #[test]
    fn test_recount_source_file_from_lines() {
        let mut file = SourceFile {
            name: "C.java".into(),
            lines: vec![
                Line { nr: 1, mi: 0, ci: 3, mb: 1, cb: 1, ..Line::default() },
                Line { nr: 2, mi: 2, ci: 0, ..Line::default() },
                Line { nr: 3, mi: 1, ci: 1, ..Line::default() },
            ],
            counters: counters(&[
                (CounterKind::Instruction, 0, 0),
                (CounterKind::Branch, 0, 0),
                (CounterKind::Line, 0, 0),
                (CounterKind::Method, 4, 4),
            ]),
        };

        file.recount();

        assert_eq!(
            file.counters,
            counters(&[
                (CounterKind::Instruction, 3, 4),
                (CounterKind::Branch, 1, 1),
                (CounterKind::Line, 1, 2),
                (CounterKind::Method, 4, 4),
            ])
        );
    }

    prop_compose! {
        fn arb_method()(im in 0u64..50, ic in 0u64..50, lm in 0u64..10, lc in 0u64..10) -> Method {
            method("m", (im, ic), (lm, lc))
        }
    }

    prop_compose! {
        fn arb_class()(methods in prop::collection::vec(arb_method(), 0..6)) -> Class {
            class("C", methods)
        }
    }

    proptest! {
        #[test]
        fn test_recount_report_total_equals_method_total(
            classes in prop::collection::vec(arb_class(), 0..6)
        ) {
            let mut report = Report {
                packages: vec![Package {
                    classes,
                    counters: aggregate_counters(),
                    ..Package::default()
                }],
                counters: aggregate_counters(),
                ..Report::default()
            };

            report.recount();

            let (missed, covered) = report
                .methods()
                .filter_map(|(_, _, m)| m.counters.get(CounterKind::Instruction))
                .fold((0, 0), |acc, c| (acc.0 + c.missed, acc.1 + c.covered));

            prop_assert_eq!(report.summary(CounterKind::Instruction), Some((missed, covered)));
        }
    }
}
