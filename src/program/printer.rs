//! Java source printer for amplified tests.

use std::fmt::Write as _;

use crate::model::{Assertion, ClassContext, Expr, ObservedValue, StatementKind, TestMethod};

use super::SourcePrinter;

/// Delta used when asserting on doubles.
pub const DOUBLE_DELTA: &str = "1.0E-6";

const INDENT: &str = "    ";

/// Prints test methods as JUnit 4 source.
#[derive(Debug, Clone, Default)]
pub struct JavaPrinter {
    /// Per-test timeout written into `@Test(timeout = ...)`.
    timeout_ms: Option<u64>,
}

impl JavaPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a `timeout` attribute on every printed test.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl SourcePrinter for JavaPrinter {
    fn file_extension(&self) -> &'static str {
        "java"
    }

    fn print_class(&self, context: &ClassContext, class_name: &str, tests: &[TestMethod]) -> String {
        let mut out = String::new();
        if let Some(pkg) = context.package.as_deref().filter(|p| !p.is_empty()) {
            let _ = writeln!(out, "package {pkg};\n");
        }
        for import in &context.imports {
            let _ = writeln!(out, "import {import};");
        }
        if !context.imports.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "public class {class_name} {{");
        for member in &context.members {
            out.push('\n');
            for line in member.lines() {
                if line.trim().is_empty() {
                    out.push('\n');
                } else {
                    let _ = writeln!(out, "{INDENT}{line}");
                }
            }
        }
        for test in tests {
            out.push('\n');
            out.push_str(&self.print_method(test));
        }
        out.push_str("}\n");
        out
    }

    fn print_method(&self, test: &TestMethod) -> String {
        let mut out = String::new();
        match self.timeout_ms {
            Some(ms) => {
                let _ = writeln!(out, "{INDENT}@org.junit.Test(timeout = {ms})");
            }
            None => {
                let _ = writeln!(out, "{INDENT}@org.junit.Test");
            }
        }
        let _ = writeln!(
            out,
            "{INDENT}public void {}() throws Exception {{",
            test.name()
        );
        let body = INDENT.repeat(2);
        for statement in test.statements() {
            let _ = writeln!(out, "{body}{}", print_statement(&statement.kind));
            for assertion in test.assertions().iter().filter(|a| a.after == statement.id) {
                let _ = writeln!(out, "{body}{}", print_assertion(assertion));
            }
        }
        for assertion in test
            .assertions()
            .iter()
            .filter(|a| test.statement(a.after).is_none())
        {
            let _ = writeln!(out, "{body}{}", print_assertion(assertion));
        }
        let _ = writeln!(out, "{INDENT}}}");
        out
    }
}

/// Print a statement as a single line of Java.
pub fn print_statement(kind: &StatementKind) -> String {
    match kind {
        StatementKind::Local { ty, name, init } => {
            format!("{} {} = {};", ty, name, print_expr(init))
        }
        StatementKind::Expr { expr } => format!("{};", print_expr(expr)),
        StatementKind::Opaque { text } => text.clone(),
    }
}

/// Print an expression.
pub fn print_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal { value } => value.to_string(),
        Expr::Var { name } => name.clone(),
        Expr::Call {
            receiver,
            method,
            args,
        } => match receiver {
            Some(receiver) => format!("{}.{}({})", print_expr(receiver), method, print_args(args)),
            None => format!("{}({})", method, print_args(args)),
        },
        Expr::New { ty, args } => format!("new {}({})", ty, print_args(args)),
        Expr::Opaque { text } => text.clone(),
    }
}

fn print_args(args: &[Expr]) -> String {
    args.iter().map(print_expr).collect::<Vec<_>>().join(", ")
}

/// Print an assertion using the check appropriate to the expected value.
pub fn print_assertion(assertion: &Assertion) -> String {
    let subject = print_expr(&assertion.subject);
    match &assertion.expected {
        ObservedValue::Null => format!("org.junit.Assert.assertNull({subject});"),
        ObservedValue::Bool(true) => format!("org.junit.Assert.assertTrue({subject});"),
        ObservedValue::Bool(false) => format!("org.junit.Assert.assertFalse({subject});"),
        ObservedValue::Int(_) => cast_equals(assertion, "int", &subject),
        ObservedValue::Long(_) => cast_equals(assertion, "long", &subject),
        ObservedValue::Char(_) => cast_equals(assertion, "char", &subject),
        ObservedValue::Double(_) => format!(
            "org.junit.Assert.assertEquals({}, ((double) ({subject})), {DOUBLE_DELTA});",
            expected_literal(assertion)
        ),
        ObservedValue::Str(_) => format!(
            "org.junit.Assert.assertEquals({}, {subject});",
            expected_literal(assertion)
        ),
        ObservedValue::Object { .. } | ObservedValue::Unobservable => {
            format!("org.junit.Assert.assertNotNull({subject});")
        }
    }
}

fn cast_equals(assertion: &Assertion, ty: &str, subject: &str) -> String {
    format!(
        "org.junit.Assert.assertEquals({}, (({ty}) ({subject})));",
        expected_literal(assertion)
    )
}

fn expected_literal(assertion: &Assertion) -> String {
    assertion
        .expected
        .to_literal()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "null".to_string())
}
