//! Tree-sitter based reader for JUnit test classes.
//!
//! Only the shapes the amplifiers know how to edit are modelled: local
//! declarations, invocations, object creation and literals. Everything else
//! becomes an opaque statement that is printed back verbatim. Seed assertions
//! are removed on read; invocations nested inside them are kept as plain
//! statements so their side effects survive.

use std::path::Path;

use parking_lot::Mutex;
use tree_sitter::{Node, Parser as TsParser};

use crate::core::{Error, Result};
use crate::model::{ClassContext, Expr, Literal, Statement, TestClass, TestMethod};

use super::SeedReader;

const ASSERTION_PREFIXES: &[&str] = &["assert", "fail"];

/// Reads `*.java` test classes.
pub struct JavaSeedReader {
    parser: Mutex<TsParser>,
}

impl JavaSeedReader {
    pub fn new() -> Result<Self> {
        let mut parser = TsParser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| Error::config(format!("tree-sitter-java unavailable: {e}")))?;
        Ok(Self {
            parser: Mutex::new(parser),
        })
    }
}

impl SeedReader for JavaSeedReader {
    fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "java")
    }

    fn read(&self, path: &Path, source: &str) -> Result<Option<TestClass>> {
        let tree = self
            .parser
            .lock()
            .parse(source, None)
            .ok_or_else(|| Error::parse(path, "failed to parse file"))?;
        let src = source.as_bytes();
        let root = tree.root_node();

        let mut context = ClassContext::default();
        let mut class_node = None;
        for child in named_children(root) {
            match child.kind() {
                "package_declaration" => {
                    context.package = named_children(child)
                        .into_iter()
                        .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
                        .map(|n| text(n, src).to_string());
                }
                "import_declaration" => {
                    let raw = text(child, src)
                        .trim()
                        .trim_start_matches("import")
                        .trim_end_matches(';')
                        .trim();
                    context.imports.push(raw.to_string());
                }
                "class_declaration" if class_node.is_none() => class_node = Some(child),
                _ => {}
            }
        }

        let Some(class_node) = class_node else {
            return Ok(None);
        };
        context.name = class_node
            .child_by_field_name("name")
            .map(|n| text(n, src).to_string())
            .ok_or_else(|| Error::parse(path, "class without a name"))?;

        let Some(body) = class_node.child_by_field_name("body") else {
            return Ok(None);
        };

        let mut methods = Vec::new();
        for member in named_children(body) {
            if member.kind() == "method_declaration" && is_test_method(member, src) {
                methods.push(member);
            } else if member.kind() != "line_comment" && member.kind() != "block_comment" {
                context.members.push(text(member, src).to_string());
            }
        }

        if methods.is_empty() {
            return Ok(None);
        }

        let tests = methods
            .into_iter()
            .filter_map(|m| read_test_method(m, src, &context))
            .collect::<Vec<_>>();

        tracing::debug!(
            "Read {} seed tests from {}",
            tests.len(),
            path.display()
        );

        Ok(Some(TestClass::new(context, tests).with_path(path)))
    }
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn text<'a>(node: Node<'_>, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

fn is_test_method(method: Node<'_>, src: &[u8]) -> bool {
    named_children(method)
        .into_iter()
        .filter(|n| n.kind() == "modifiers")
        .flat_map(named_children)
        .filter(|n| matches!(n.kind(), "marker_annotation" | "annotation"))
        .filter_map(|n| n.child_by_field_name("name"))
        .any(|name| {
            let name = text(name, src);
            name == "Test" || name.ends_with(".Test")
        })
}

fn read_test_method(method: Node<'_>, src: &[u8], context: &ClassContext) -> Option<TestMethod> {
    let name = text(method.child_by_field_name("name")?, src).to_string();
    let body = method.child_by_field_name("body")?;

    let mut reader = BodyReader {
        src,
        next_id: 1,
        statements: Vec::new(),
    };
    for stmt in named_children(body) {
        reader.statement(stmt);
    }

    Some(TestMethod::seed(
        name.clone(),
        context.seed_name(&name),
        reader.statements,
        Vec::new(),
    ))
}

struct BodyReader<'s> {
    src: &'s [u8],
    next_id: u32,
    statements: Vec<Statement>,
}

impl BodyReader<'_> {
    fn push(&mut self, make: impl FnOnce(u32) -> Statement) {
        let id = self.next_id;
        self.next_id += 1;
        self.statements.push(make(id));
    }

    fn statement(&mut self, node: Node<'_>) {
        match node.kind() {
            "line_comment" | "block_comment" => {}
            "local_variable_declaration" => self.local(node),
            "expression_statement" => self.expression_statement(node),
            _ => {
                let raw = text(node, self.src).to_string();
                self.push(|id| Statement::opaque(id, raw));
            }
        }
    }

    fn local(&mut self, node: Node<'_>) {
        let declarators: Vec<_> = named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "variable_declarator")
            .collect();
        let ty = node.child_by_field_name("type").map(|n| text(n, self.src));
        match (ty, declarators.as_slice()) {
            (Some(ty), [declarator]) => {
                let name = declarator.child_by_field_name("name");
                let value = declarator.child_by_field_name("value");
                if let (Some(name), Some(value)) = (name, value) {
                    let ty = ty.to_string();
                    let name = text(name, self.src).to_string();
                    let init = self.expr(value);
                    self.push(|id| Statement::local(id, ty, name, init));
                    return;
                }
            }
            _ => {}
        }
        let raw = text(node, self.src).to_string();
        self.push(|id| Statement::opaque(id, raw));
    }

    fn expression_statement(&mut self, node: Node<'_>) {
        let Some(inner) = named_children(node).into_iter().next() else {
            return;
        };
        if inner.kind() == "method_invocation" && self.is_assertion(inner) {
            // keep side effects of invocations nested in the assertion
            if let Some(args) = inner.child_by_field_name("arguments") {
                for arg in named_children(args) {
                    if matches!(arg.kind(), "method_invocation" | "object_creation_expression") {
                        let expr = self.expr(arg);
                        self.push(|id| Statement::expr(id, expr));
                    }
                }
            }
            return;
        }
        match inner.kind() {
            "method_invocation" | "object_creation_expression" => {
                let expr = self.expr(inner);
                self.push(|id| Statement::expr(id, expr));
            }
            _ => {
                let raw = text(node, self.src).to_string();
                self.push(|id| Statement::opaque(id, raw));
            }
        }
    }

    fn is_assertion(&self, invocation: Node<'_>) -> bool {
        invocation
            .child_by_field_name("name")
            .map(|n| text(n, self.src))
            .is_some_and(|name| ASSERTION_PREFIXES.iter().any(|p| name.starts_with(p)))
    }

    fn expr(&self, node: Node<'_>) -> Expr {
        let raw = text(node, self.src);
        match node.kind() {
            "identifier" => Expr::var(raw),
            "method_invocation" => {
                let receiver = node.child_by_field_name("object").map(|n| self.expr(n));
                let method = node
                    .child_by_field_name("name")
                    .map(|n| text(n, self.src).to_string())
                    .unwrap_or_default();
                let args = self.args(node);
                Expr::call(receiver, method, args)
            }
            "object_creation_expression" if node.child_by_field_name("body").is_none() => {
                let ty = node
                    .child_by_field_name("type")
                    .map(|n| text(n, self.src).to_string())
                    .unwrap_or_default();
                Expr::new_object(ty, self.args(node))
            }
            _ => parse_literal(node.kind(), raw)
                .map(Expr::literal)
                .unwrap_or_else(|| Expr::opaque(raw)),
        }
    }

    fn args(&self, node: Node<'_>) -> Vec<Expr> {
        node.child_by_field_name("arguments")
            .map(|args| named_children(args).into_iter().map(|a| self.expr(a)).collect())
            .unwrap_or_default()
    }
}

/// Convert a literal node into a [`Literal`].
fn parse_literal(kind: &str, raw: &str) -> Option<Literal> {
    match kind {
        "decimal_integer_literal" => parse_integer(raw),
        "unary_expression" => {
            let operand = raw.strip_prefix('-')?.trim();
            match parse_integer(operand)? {
                Literal::Int(n) => Some(Literal::Int(-n)),
                Literal::Long(n) => Some(Literal::Long(-n)),
                _ => None,
            }
            .or_else(|| parse_double(operand).map(|d| Literal::Double(-d)))
        }
        "decimal_floating_point_literal" => parse_double(raw).map(Literal::Double),
        "true" => Some(Literal::Bool(true)),
        "false" => Some(Literal::Bool(false)),
        "null_literal" => Some(Literal::Null),
        "string_literal" => {
            let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
            Some(Literal::Str(unescape(inner)))
        }
        "character_literal" => {
            let inner = unescape(raw.strip_prefix('\'')?.strip_suffix('\'')?);
            let mut chars = inner.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Literal::Char(c)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn parse_integer(raw: &str) -> Option<Literal> {
    let cleaned = raw.replace('_', "");
    if let Some(long) = cleaned.strip_suffix(['l', 'L']) {
        long.parse().ok().map(Literal::Long)
    } else {
        cleaned.parse().ok().map(Literal::Int)
    }
}

fn parse_double(raw: &str) -> Option<f64> {
    raw.replace('_', "")
        .trim_end_matches(['d', 'D', 'f', 'F'])
        .parse()
        .ok()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatementKind;

    const SOURCE: &str = r#"
package org.example;

import java.util.ArrayList;
import java.util.List;
import org.junit.Test;
import static org.junit.Assert.assertEquals;

public class ListTest {
    private List<Integer> shared;

    @Test
    public void testAdd() {
        List<Integer> list = new ArrayList<>();
        list.add(-3);
        assertEquals(1, list.size());
    }

    @Test
    public void testLoop() {
        int sum = 0;
        for (int i = 0; i < 3; i++) { sum += i; }
    }

    public void helper() {}
}
"#;

    fn read() -> TestClass {
        JavaSeedReader::new()
            .unwrap()
            .read(Path::new("ListTest.java"), SOURCE)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_reads_class_context() {
        let class = read();
        assert_eq!(class.context.package.as_deref(), Some("org.example"));
        assert_eq!(class.context.name, "ListTest");
        assert!(class.context.imports.contains(&"java.util.List".to_string()));
        assert!(class
            .context
            .imports
            .contains(&"static org.junit.Assert.assertEquals".to_string()));
        // field and helper are kept as members
        assert_eq!(class.context.members.len(), 2);
    }

    #[test]
    fn test_reads_test_methods_only() {
        let class = read();
        let names: Vec<_> = class.tests.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["testAdd", "testLoop"]);
        assert_eq!(class.tests[0].seed_name(), "org.example.ListTest#testAdd");
    }

    #[test]
    fn test_assertions_become_invocations() {
        let class = read();
        let add = &class.tests[0];
        assert_eq!(add.statements().len(), 3);
        assert!(add.assertions().is_empty());
        match &add.statements()[2].kind {
            StatementKind::Expr { expr } => assert_eq!(expr.receiver_var(), Some("list")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_negative_literal() {
        let class = read();
        assert_eq!(class.tests[0].statements()[1].literal_at(0), Some(&Literal::Int(-3)));
    }

    #[test]
    fn test_unmodelled_statements_are_opaque() {
        let class = read();
        let looped = &class.tests[1];
        assert!(looped.statements()[1].is_opaque());
        assert_eq!(looped.statements()[0].literal_at(0), Some(&Literal::Int(0)));
    }

    #[test]
    fn test_file_without_tests() {
        let reader = JavaSeedReader::new().unwrap();
        let result = reader
            .read(Path::new("Util.java"), "class Util { void f() {} }")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("decimal_integer_literal", "1_000"), Some(Literal::Int(1000)));
        assert_eq!(parse_literal("decimal_integer_literal", "5L"), Some(Literal::Long(5)));
        assert_eq!(parse_literal("string_literal", "\"a\\nb\""), Some(Literal::Str("a\nb".into())));
        assert_eq!(parse_literal("character_literal", "'x'"), Some(Literal::Char('x')));
        assert_eq!(parse_literal("decimal_floating_point_literal", "2.5f"), Some(Literal::Double(2.5)));
        assert_eq!(parse_literal("identifier", "x"), None);
    }
}
