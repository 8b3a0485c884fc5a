//! Per-unit outcomes of a pipeline run.

use std::fmt;
use std::time::Duration;

use crate::core::{Error, Result};

/// Which side of the buffer a unit ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// How a unit stopped
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    /// Ran to completion, moving `items` payloads
    Finished { items: usize },
    /// Gave up after a buffer timeout
    TimedOut(Error),
    /// Panicked, failed to start, or failed otherwise
    Failed(Error),
}

impl UnitOutcome {
    pub(crate) fn from_result(result: Result<usize>) -> Self {
        match result {
            Ok(items) => UnitOutcome::Finished { items },
            Err(e) if e.is_timeout() => UnitOutcome::TimedOut(e),
            Err(e) => UnitOutcome::Failed(e),
        }
    }

    /// Whether the unit finished normally
    pub fn is_finished(&self) -> bool {
        matches!(self, UnitOutcome::Finished { .. })
    }

    /// The error that stopped the unit, if any
    pub fn error(&self) -> Option<&Error> {
        match self {
            UnitOutcome::Finished { .. } => None,
            UnitOutcome::TimedOut(e) | UnitOutcome::Failed(e) => Some(e),
        }
    }
}

/// One line of a [`PipelineReport`]
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// Thread name of the unit
    pub name: String,
    pub role: Role,
    pub outcome: UnitOutcome,
}

impl fmt::Display for UnitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            UnitOutcome::Finished { items } => {
                write!(f, "{} {}: finished ({} items)", self.role, self.name, items)
            }
            UnitOutcome::TimedOut(e) => write!(f, "{} {}: timed out ({})", self.role, self.name, e),
            UnitOutcome::Failed(e) => write!(f, "{} {}: failed ({})", self.role, self.name, e),
        }
    }
}

/// The result of a pipeline run: its output plus how every unit stopped.
///
/// A run only counts as successful when every producer delivered its items
/// and every consumer received its sentinel.
#[derive(Debug, Clone)]
pub struct PipelineReport<O> {
    /// What the run produced (the collected items for `Pipeline::run`)
    pub output: O,
    /// One entry per producer and consumer, producers first
    pub units: Vec<UnitReport>,
    /// Wall time from the first spawn to the last join
    pub elapsed: Duration,
}

impl<O> PipelineReport<O> {
    /// Whether every unit finished normally
    pub fn is_success(&self) -> bool {
        self.units.iter().all(|u| u.outcome.is_finished())
    }

    /// Errors of the units that did not finish
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.units.iter().filter_map(|u| u.outcome.error())
    }

    /// Items moved by finished units of `role`
    pub fn items_for(&self, role: Role) -> usize {
        self.units
            .iter()
            .filter(|u| u.role == role)
            .map(|u| match u.outcome {
                UnitOutcome::Finished { items } => items,
                _ => 0,
            })
            .sum()
    }

    /// Items per second through the consumers
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.items_for(Role::Consumer) as f64 / secs
        } else {
            0.0
        }
    }

    /// The output if every unit finished, otherwise the unit errors
    pub fn into_result(self) -> Result<O> {
        let errors: Vec<Error> = self.errors().cloned().collect();
        match Error::from_many(errors) {
            None => Ok(self.output),
            Some(e) => Err(e),
        }
    }

    pub(crate) fn map_output<U>(self, f: impl FnOnce(O) -> U) -> PipelineReport<U> {
        PipelineReport {
            output: f(self.output),
            units: self.units,
            elapsed: self.elapsed,
        }
    }
}
