//! Literal and runtime values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A literal value appearing in test source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Long(i64),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
}

impl Literal {
    /// Short name of the literal's kind, used in candidate names and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::Char(_) => "char",
            Self::Str(_) => "string",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Long(n) => write!(f, "{n}L"),
            Self::Double(d) => write!(f, "{}", format_double(*d)),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Char(c) => write!(f, "'{}'", escape_char(*c)),
            Self::Str(s) => write!(f, "\"{}\"", escape_str(s)),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A value captured by the test runner at an observation or probe point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ObservedValue {
    Null,
    Bool(bool),
    Int(i64),
    Long(i64),
    Double(f64),
    Char(char),
    Str(String),
    /// Object state as seen through its getters (getter name -> value).
    Object {
        class: String,
        #[serde(default)]
        fields: BTreeMap<String, ObservedValue>,
    },
    /// The runner could not capture a comparable value.
    Unobservable,
}

impl ObservedValue {
    /// Whether an assertion can be generated for this value.
    pub fn is_assertable(&self) -> bool {
        match self {
            Self::Unobservable => false,
            Self::Double(d) => d.is_finite(),
            Self::Object { fields, .. } => fields.values().any(ObservedValue::is_assertable),
            _ => true,
        }
    }

    /// Render the value as a Java literal for use as an expected value.
    ///
    /// Objects have no literal form and return `None`.
    pub fn to_literal(&self) -> Option<Literal> {
        match self {
            Self::Null => Some(Literal::Null),
            Self::Bool(b) => Some(Literal::Bool(*b)),
            Self::Int(n) => Some(Literal::Int(*n)),
            Self::Long(n) => Some(Literal::Long(*n)),
            Self::Double(d) => Some(Literal::Double(*d)),
            Self::Char(c) => Some(Literal::Char(*c)),
            Self::Str(s) => Some(Literal::Str(s.clone())),
            Self::Object { .. } | Self::Unobservable => None,
        }
    }
}

/// Format a double so that it reads back as a Java double literal.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "Double.NaN".to_string()
    } else if d == f64::INFINITY {
        "Double.POSITIVE_INFINITY".to_string()
    } else if d == f64::NEG_INFINITY {
        "Double.NEGATIVE_INFINITY".to_string()
    } else if d == f64::MAX {
        "Double.MAX_VALUE".to_string()
    } else {
        // shortest round-trip form; always has a '.' or an exponent
        format!("{d:?}")
    }
}

fn escape_char(c: char) -> String {
    match c {
        '\'' => "\\'".to_string(),
        '\\' => "\\\\".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}
