//! # Bounded handoff between producer and consumer threads
//!
//! This crate provides a fixed-capacity blocking buffer built from a mutex
//! and two condition variables, plus the producer and consumer stages that
//! move items through it and shut down cleanly with poison pills.
//!
//! ## Core Concepts
//!
//! - **BoundedBuffer**: FIFO with blocking `put`/`take` and optional timeouts
//! - **Source**: thread-safe supplier of items (`SourceContainer`)
//! - **Sink**: thread-safe append-only destination (`DestinationContainer`)
//! - **Producer / Consumer**: stages running on their own threads
//! - **ShutdownLatch**: releases one `Message::Shutdown` per consumer once
//!   the last producer stops
//! - **Pipeline**: spawns, joins and reports on a whole run
//!
//! ## Example
//!
//! ```rust
//! use handoff::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let source = SourceContainer::new((0..300).collect::<Vec<u32>>());
//!
//!     let report = Pipeline::new(source)
//!         .capacity(10)
//!         .producers(3)
//!         .consumers(4)
//!         .run()?;
//!
//!     let mut items = report.into_result()?;
//!     items.sort_unstable();
//!     assert_eq!(items, (0..300).collect::<Vec<_>>());
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod core;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod stages;
pub mod util;

#[cfg(feature = "async")]
pub mod bridge;

#[cfg(feature = "metrics")]
pub mod metrics;

// Re-export commonly used items
pub mod prelude {
    pub use crate::buffer::{BoundedBuffer, Rejected};
    pub use crate::core::{Error, Message, Operation, Result, Sink, Source};
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineReport, Role, UnitOutcome};
    pub use crate::sinks::{CountSink, DestinationContainer};
    pub use crate::sources::{IterSource, SourceContainer};
    pub use crate::stages::{Consumer, Producer, ShutdownLatch, StageState};
    pub use crate::util::RetryPolicy;

    #[cfg(feature = "async")]
    pub use crate::bridge::AsyncBuffer;
}

// Re-export main error type
pub use crate::core::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
