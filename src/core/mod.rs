//! Core traits and types for the handoff library.
//!
//! This module contains the fundamental traits and error types that the
//! buffer, the stages and the pipeline are built on.

pub mod error;
pub mod traits;

// Re-export core items
pub use error::{Error, Operation, Result};
pub use traits::{Message, Sink, Source};
