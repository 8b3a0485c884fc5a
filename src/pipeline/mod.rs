//! Pipeline orchestration and execution.
//!
//! A pipeline wires N producers and M consumers around one
//! [`BoundedBuffer`], runs each on its own named thread, joins them all and
//! reports how every unit stopped.

pub mod report;

use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::buffer::BoundedBuffer;
use crate::core::error::millis;
use crate::core::{Error, Message, Result, Sink, Source};
use crate::sinks::DestinationContainer;
use crate::stages::{Consumer, Producer, ShutdownLatch, StageHandle};
use crate::util::RetryPolicy;

pub use report::{PipelineReport, Role, UnitOutcome, UnitReport};

/// Configuration for pipeline execution.
///
/// If consumers can time out, give producers a put timeout as well:
/// otherwise a producer may wait forever for space that no consumer
/// will free.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Maximum number of items held in the buffer
    pub capacity: usize,
    /// Number of producer threads
    pub producers: usize,
    /// Number of consumer threads
    pub consumers: usize,
    /// Bound on each put; `None` waits indefinitely
    pub put_timeout: Option<Duration>,
    /// Bound on each take; `None` waits indefinitely
    pub take_timeout: Option<Duration>,
    /// How producers retry timed-out puts
    pub retry: RetryPolicy,
    /// Threads are named `{prefix}-producer-{i}` and `{prefix}-consumer-{i}`
    pub thread_name_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            producers: 1,
            consumers: 1,
            put_timeout: None,
            take_timeout: None,
            retry: RetryPolicy::none(),
            thread_name_prefix: "handoff".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that can never run
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::configuration("buffer capacity must be positive"));
        }
        if self.producers == 0 {
            return Err(Error::configuration("at least one producer is required"));
        }
        if self.consumers == 0 {
            return Err(Error::configuration("at least one consumer is required"));
        }
        Ok(())
    }
}

/// A pipeline draining one shared source through a bounded buffer into one
/// shared sink.
///
/// # Examples
///
/// ```rust
/// use handoff::prelude::*;
///
/// let report = Pipeline::new(SourceContainer::new(vec![1, 2, 3, 4, 5]))
///     .capacity(3)
///     .run()?;
///
/// assert!(report.is_success());
/// assert_eq!(report.output, vec![1, 2, 3, 4, 5]);
/// # Ok::<(), handoff::Error>(())
/// ```
pub struct Pipeline<S> {
    source: Arc<S>,
    config: PipelineConfig,
}

impl<S> Pipeline<S>
where
    S: Source + 'static,
{
    /// Create a new pipeline with the default configuration
    pub fn new(source: S) -> Self {
        Self::with_config(Arc::new(source), PipelineConfig::default())
    }

    /// Create a pipeline over a shared source with an explicit configuration
    pub fn with_config(source: Arc<S>, config: PipelineConfig) -> Self {
        Self { source, config }
    }

    /// Set the buffer capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the number of producer threads
    pub fn producers(mut self, producers: usize) -> Self {
        self.config.producers = producers;
        self
    }

    /// Set the number of consumer threads
    pub fn consumers(mut self, consumers: usize) -> Self {
        self.config.consumers = consumers;
        self
    }

    /// Bound every put to `timeout`
    pub fn put_timeout(mut self, timeout: Duration) -> Self {
        self.config.put_timeout = Some(timeout);
        self
    }

    /// Bound every take to `timeout`
    pub fn take_timeout(mut self, timeout: Duration) -> Self {
        self.config.take_timeout = Some(timeout);
        self
    }

    /// Retry timed-out puts according to `policy`
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set the thread name prefix
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// The configuration the pipeline will run with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline, collecting every consumed item.
    ///
    /// Returns `Err` only when the pipeline could not start. Unit failures
    /// are reported in the returned [`PipelineReport`].
    pub fn run(self) -> Result<PipelineReport<Vec<S::Item>>> {
        let destination = Arc::new(DestinationContainer::new());
        let report = self.sink(destination.clone())?;

        // every consumer has been joined, so we hold the only reference
        let items = Arc::try_unwrap(destination)
            .map(DestinationContainer::into_items)
            .map_err(|_| Error::custom("destination still shared after join"))?;
        Ok(report.map_output(|()| items))
    }

    /// Run the pipeline into a caller-owned sink.
    pub fn sink<D>(self, sink: Arc<D>) -> Result<PipelineReport<()>>
    where
        D: Sink<Item = S::Item> + 'static,
    {
        self.config.validate()?;
        let config = &self.config;
        let buffer = Arc::new(BoundedBuffer::<Message<S::Item>>::new(config.capacity)?);
        let started = Instant::now();

        tracing::info!(
            capacity = config.capacity,
            producers = config.producers,
            consumers = config.consumers,
            "pipeline starting"
        );

        let mut failed = Vec::new();
        let latch = Arc::new(ShutdownLatch::new(config.producers, config.consumers)?);

        // Consumers start first so the latch only counts consumers that
        // actually exist; otherwise surplus sentinels could fill the buffer.
        let mut consumers: Vec<StageHandle<_>> = Vec::with_capacity(config.consumers);
        for i in 0..config.consumers {
            let name = format!("{}-consumer-{}", config.thread_name_prefix, i);
            let consumer = Consumer::new(name.clone(), buffer.clone(), sink.clone())
                .take_timeout(config.take_timeout)
                .attach(latch.clone());
            match consumer.spawn() {
                Ok(handle) => consumers.push(handle),
                Err(e) => {
                    tracing::error!(unit = %name, error = %e, "failed to start consumer");
                    latch.retire_consumer();
                    failed.push(UnitReport {
                        name,
                        role: Role::Consumer,
                        outcome: UnitOutcome::Failed(e),
                    });
                }
            }
        }
        if consumers.is_empty() {
            let errors = failed.into_iter().filter_map(|u| u.outcome.error().cloned()).collect();
            return Err(Error::from_many(errors)
                .unwrap_or_else(|| Error::custom("no consumer could be started")));
        }

        let mut producers: Vec<StageHandle<_>> = Vec::with_capacity(config.producers);
        for i in 0..config.producers {
            let name = format!("{}-producer-{}", config.thread_name_prefix, i);
            let producer =
                Producer::new(name.clone(), self.source.clone(), buffer.clone(), latch.clone())
                    .put_timeout(config.put_timeout)
                    .retry(config.retry.clone());
            match producer.spawn() {
                Ok(handle) => producers.push(handle),
                Err(e) => {
                    tracing::error!(unit = %name, error = %e, "failed to start producer");
                    // sign off for the producer that never ran
                    let error = match latch.release(&buffer, config.put_timeout) {
                        Ok(_) => e,
                        Err(release_err) => Error::Multiple(vec![e, release_err]),
                    };
                    failed.push(UnitReport {
                        name,
                        role: Role::Producer,
                        outcome: UnitOutcome::Failed(error),
                    });
                }
            }
        }

        let mut units = Vec::with_capacity(config.producers + config.consumers);
        for handle in producers {
            let name = handle.name().to_string();
            let result = handle.join().map(|report| report.produced);
            units.push(UnitReport {
                name,
                role: Role::Producer,
                outcome: UnitOutcome::from_result(result),
            });
        }
        for handle in consumers {
            let name = handle.name().to_string();
            let result = handle.join().map(|report| report.consumed);
            units.push(UnitReport {
                name,
                role: Role::Consumer,
                outcome: UnitOutcome::from_result(result),
            });
        }
        units.extend(failed);

        let report = PipelineReport {
            output: (),
            units,
            elapsed: started.elapsed(),
        };

        if report.is_success() {
            tracing::info!(
                consumed = report.items_for(Role::Consumer),
                elapsed_ms = millis(report.elapsed),
                "pipeline finished"
            );
        } else {
            for unit in report.units.iter().filter(|u| !u.outcome.is_finished()) {
                tracing::warn!("{}", unit);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceContainer;

    #[test]
    fn validate_rejects_zero_counts() {
        let config = PipelineConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = PipelineConfig {
            consumers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn run_refuses_invalid_config() {
        let result = Pipeline::new(SourceContainer::new(vec![1]))
            .producers(0)
            .run();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn builder_sets_config() {
        let pipeline = Pipeline::new(SourceContainer::new(Vec::<u8>::new()))
            .capacity(4)
            .producers(2)
            .consumers(3)
            .put_timeout(Duration::from_secs(1))
            .thread_name_prefix("test");

        let config = pipeline.config();
        assert_eq!(config.capacity, 4);
        assert_eq!(config.producers, 2);
        assert_eq!(config.consumers, 3);
        assert_eq!(config.put_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.take_timeout, None);
        assert_eq!(config.thread_name_prefix, "test");
    }

    #[test]
    fn empty_source_still_shuts_down() {
        let report = Pipeline::new(SourceContainer::new(Vec::<u8>::new()))
            .consumers(3)
            .run()
            .unwrap();

        assert!(report.is_success());
        assert!(report.output.is_empty());
        assert_eq!(report.units.len(), 4);
    }

    #[test]
    fn units_are_named_after_prefix() {
        let report = Pipeline::new(SourceContainer::new(vec![1, 2]))
            .thread_name_prefix("job")
            .run()
            .unwrap();

        let names: Vec<_> = report.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["job-producer-0", "job-consumer-0"]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_round_trips_through_serde() {
        let config = PipelineConfig {
            capacity: 8,
            producers: 3,
            consumers: 4,
            put_timeout: Some(Duration::from_millis(250)),
            take_timeout: None,
            retry: RetryPolicy::new().with_max_attempts(5),
            thread_name_prefix: "ingest".to_string(),
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);

        // missing fields fall back to the defaults
        let partial: PipelineConfig = serde_json::from_str(r#"{"capacity": 2}"#).unwrap();
        assert_eq!(partial.capacity, 2);
        assert_eq!(partial.consumers, PipelineConfig::default().consumers);
        assert_eq!(partial.retry, RetryPolicy::none());
    }
}
