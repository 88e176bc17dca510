//! Statements and expressions of the editable test representation.

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::value::Literal;

/// Stable identifier of a statement within a lineage.
///
/// Copies of a statement made by amplifiers keep their id, so observations
/// at the same id can be compared between a parent and its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementId(pub u32);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: Literal,
    },
    Var {
        name: String,
    },
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver: Option<Box<Expr>>,
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    New {
        ty: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// Source text the engine does not model; printed verbatim.
    Opaque {
        text: String,
    },
}

impl Expr {
    pub fn literal(value: Literal) -> Self {
        Self::Literal { value }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Var { name: name.into() }
    }

    pub fn call(receiver: Option<Expr>, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            receiver: receiver.map(Box::new),
            method: method.into(),
            args,
        }
    }

    pub fn new_object(ty: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::New {
            ty: ty.into(),
            args,
        }
    }

    pub fn opaque(text: impl Into<String>) -> Self {
        Self::Opaque { text: text.into() }
    }

    /// Collect mutable references to every literal, in source order.
    pub fn literals_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Literal>) {
        match self {
            Self::Literal { value } => out.push(value),
            Self::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver.as_mut() {
                    receiver.literals_mut(out);
                }
                for arg in args.iter_mut() {
                    arg.literals_mut(out);
                }
            }
            Self::New { args, .. } => {
                for arg in args.iter_mut() {
                    arg.literals_mut(out);
                }
            }
            Self::Var { .. } | Self::Opaque { .. } => {}
        }
    }

    /// Collect every literal, in source order.
    pub fn literals<'a>(&'a self, out: &mut Vec<&'a Literal>) {
        match self {
            Self::Literal { value } => out.push(value),
            Self::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    receiver.literals(out);
                }
                for arg in args {
                    arg.literals(out);
                }
            }
            Self::New { args, .. } => {
                for arg in args {
                    arg.literals(out);
                }
            }
            Self::Var { .. } | Self::Opaque { .. } => {}
        }
    }

    /// Collect the names of variables this expression reads.
    ///
    /// Opaque text is scanned for identifiers, which over-approximates.
    pub fn referenced_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Var { name } => {
                out.insert(name.clone());
            }
            Self::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    receiver.referenced_vars(out);
                }
                for arg in args {
                    arg.referenced_vars(out);
                }
            }
            Self::New { args, .. } => {
                for arg in args {
                    arg.referenced_vars(out);
                }
            }
            Self::Opaque { text } => collect_identifiers(text, out),
            Self::Literal { .. } => {}
        }
    }

    /// The receiver variable name when this is a call on a local variable.
    pub fn receiver_var(&self) -> Option<&str> {
        match self {
            Self::Call {
                receiver: Some(receiver),
                ..
            } => match receiver.as_ref() {
                Self::Var { name } => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether this expression is an invocation or object creation.
    pub fn is_invocation(&self) -> bool {
        matches!(self, Self::Call { .. } | Self::New { .. })
    }
}

/// The kind of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum StatementKind {
    /// `Type name = init;`
    Local { ty: String, name: String, init: Expr },
    /// `expr;`
    Expr { expr: Expr },
    /// Statement text the engine does not model; never edited or removed.
    Opaque { text: String },
}

/// A statement of a test method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub id: StatementId,
    #[serde(flatten)]
    pub kind: StatementKind,
}

impl Statement {
    pub fn local(id: u32, ty: impl Into<String>, name: impl Into<String>, init: Expr) -> Self {
        Self {
            id: StatementId(id),
            kind: StatementKind::Local {
                ty: ty.into(),
                name: name.into(),
                init,
            },
        }
    }

    pub fn expr(id: u32, expr: Expr) -> Self {
        Self {
            id: StatementId(id),
            kind: StatementKind::Expr { expr },
        }
    }

    pub fn opaque(id: u32, text: impl Into<String>) -> Self {
        Self {
            id: StatementId(id),
            kind: StatementKind::Opaque { text: text.into() },
        }
    }

    /// Copy of this statement carrying a different id.
    pub fn with_id(&self, id: StatementId) -> Self {
        Self {
            id,
            kind: self.kind.clone(),
        }
    }

    /// The main expression of the statement, if it is modelled.
    pub fn expression(&self) -> Option<&Expr> {
        match &self.kind {
            StatementKind::Local { init, .. } => Some(init),
            StatementKind::Expr { expr } => Some(expr),
            StatementKind::Opaque { .. } => None,
        }
    }

    fn expression_mut(&mut self) -> Option<&mut Expr> {
        match &mut self.kind {
            StatementKind::Local { init, .. } => Some(init),
            StatementKind::Expr { expr } => Some(expr),
            StatementKind::Opaque { .. } => None,
        }
    }

    /// Name and type of the variable this statement declares.
    pub fn declared(&self) -> Option<(&str, &str)> {
        match &self.kind {
            StatementKind::Local { ty, name, .. } => Some((name, ty)),
            _ => None,
        }
    }

    /// Name of the variable this statement declares.
    pub fn declared_var(&self) -> Option<&str> {
        self.declared().map(|(name, _)| name)
    }

    /// Receiver variable of the statement's top-level call.
    pub fn receiver_var(&self) -> Option<&str> {
        self.expression().and_then(Expr::receiver_var)
    }

    /// Whether the statement's top-level expression is an invocation.
    pub fn is_invocation(&self) -> bool {
        self.expression().is_some_and(Expr::is_invocation)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.kind, StatementKind::Opaque { .. })
    }

    /// Number of literals in the statement.
    pub fn literal_count(&self) -> usize {
        let mut out = Vec::new();
        if let Some(expr) = self.expression() {
            expr.literals(&mut out);
        }
        out.len()
    }

    /// The literal at `index` in source order.
    pub fn literal_at(&self, index: usize) -> Option<&Literal> {
        let mut out = Vec::new();
        if let Some(expr) = self.expression() {
            expr.literals(&mut out);
        }
        out.get(index).copied()
    }

    /// Copy of this statement with the literal at `index` replaced.
    pub fn with_literal(&self, index: usize, value: Literal) -> Option<Self> {
        let mut copy = self.clone();
        let mut slots = Vec::new();
        copy.expression_mut()?.literals_mut(&mut slots);
        let slot = slots.into_iter().nth(index)?;
        *slot = value;
        Some(copy)
    }

    /// Variables read by this statement.
    pub fn referenced_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        match &self.kind {
            StatementKind::Local { init, .. } => init.referenced_vars(&mut out),
            StatementKind::Expr { expr } => expr.referenced_vars(&mut out),
            StatementKind::Opaque { text } => collect_identifiers(text, &mut out),
        }
        out
    }
}

fn collect_identifiers(text: &str, out: &mut BTreeSet<String>) {
    static WORDS: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let words = WORDS.get_or_init(|| Regex::new(r"[\w$]+").expect("valid regex"));
    out.extend(
        words
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|w| !w.starts_with(|c: char| c.is_ascii_digit()))
            .map(str::to_string),
    );
}
