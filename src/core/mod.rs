//! Core types shared by the engine and its collaborators.

mod cancel;
mod error;
pub mod progress;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
