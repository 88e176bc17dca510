//! Editable representation of test classes and test methods.
//!
//! The engine never manipulates source text. Amplifiers, the assertion
//! synthesizer and the minimizer all work on these types; the
//! [`crate::program`] module converts them from and to Java source.

mod class;
mod statement;
mod test_method;
mod value;

pub use class::{ClassContext, TestClass};
pub use statement::{Expr, Statement, StatementId, StatementKind};
pub use test_method::{AmplificationStep, Assertion, ProbePoint, ProbeTarget, TestMethod};
pub use value::{format_double, Literal, ObservedValue};
