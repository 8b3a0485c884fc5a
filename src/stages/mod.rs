//! Producer and consumer stages.
//!
//! A stage is one concurrent unit of work bound to a shared buffer. Stages
//! can be run inline with `run()` or on a named OS thread with `spawn()`,
//! which returns a [`StageHandle`] to join.

pub mod consumer;
pub mod producer;
pub mod shutdown;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::core::{Error, Result};

pub use consumer::{Consumer, ConsumerReport};
pub use producer::{Producer, ProducerReport};
pub use shutdown::ShutdownLatch;

/// Where a stage is in its lifecycle.
///
/// For a producer `Pulling` means reading from its source and `Pushing`
/// means putting into the buffer. For a consumer `Pulling` means taking
/// from the buffer and `Pushing` means storing into its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StageState {
    Running = 0,
    Pulling = 1,
    Pushing = 2,
    Finished = 3,
    Failed = 4,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StageState::Running,
            1 => StageState::Pulling,
            2 => StageState::Pushing,
            3 => StageState::Finished,
            _ => StageState::Failed,
        }
    }

    /// Whether the stage has stopped, successfully or not
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Finished | StageState::Failed)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Running => "running",
            StageState::Pulling => "pulling",
            StageState::Pushing => "pushing",
            StageState::Finished => "finished",
            StageState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A cheap, cloneable view of a stage's current [`StageState`].
#[derive(Debug, Clone)]
pub struct StateWatch {
    state: Arc<AtomicU8>,
}

impl StateWatch {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(StageState::Running as u8)),
        }
    }

    pub(crate) fn set(&self, state: StageState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The state last published by the stage
    pub fn get(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// A stage running on its own thread.
pub struct StageHandle<R> {
    name: String,
    state: StateWatch,
    join: JoinHandle<Result<R>>,
}

impl<R> StageHandle<R> {
    /// The thread name of the stage
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stage's current state
    pub fn state(&self) -> StageState {
        self.state.get()
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the stage to stop. A panic is reported as `Error::Panicked`.
    pub fn join(self) -> Result<R> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => {
                self.state.set(StageState::Failed);
                tracing::error!(unit = %self.name, "stage panicked");
                Err(Error::Panicked { unit: self.name })
            }
        }
    }
}

impl<R> fmt::Debug for StageHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHandle")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .finish()
    }
}

pub(crate) fn spawn_stage<R, F>(name: String, state: StateWatch, work: F) -> Result<StageHandle<R>>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    let join = thread::Builder::new()
        .name(name.clone())
        .spawn(work)
        .map_err(|e| Error::Spawn {
            unit: name.clone(),
            message: e.to_string(),
        })?;

    Ok(StageHandle { name, state, join })
}
