//! Built-in amplifiers.

mod call_add;
mod call_remove;
mod pool;
mod statement_add;
mod value;

pub use call_add::CallAdder;
pub use call_remove::CallRemover;
pub use pool::{same_type, ValuePool};
pub use statement_add::StatementAdder;
pub use value::ValueMutator;
