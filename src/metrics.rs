//! Metrics emitted through the `metrics` facade.
//!
//! Only compiled with the `metrics` feature. Install any `metrics` recorder
//! to collect them.

use crate::core::Operation;

/// Counter of successful puts
pub const PUT_TOTAL: &str = "handoff_buffer_put_total";
/// Counter of successful takes
pub const TAKE_TOTAL: &str = "handoff_buffer_take_total";
/// Counter of timed-out operations, labelled by `operation`
pub const TIMEOUT_TOTAL: &str = "handoff_buffer_timeout_total";
/// Gauge of the buffer length after the last successful operation
pub const OCCUPANCY: &str = "handoff_buffer_occupancy";

pub(crate) fn record_transfer(operation: Operation, occupancy: usize) {
    match operation {
        Operation::Put => ::metrics::counter!(PUT_TOTAL).increment(1),
        Operation::Take => ::metrics::counter!(TAKE_TOTAL).increment(1),
    }
    ::metrics::gauge!(OCCUPANCY).set(occupancy as f64);
}

pub(crate) fn record_timeout(operation: Operation) {
    let label = match operation {
        Operation::Put => "put",
        Operation::Take => "take",
    };
    ::metrics::counter!(TIMEOUT_TOTAL, "operation" => label).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BoundedBuffer;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use std::time::Duration;

    #[test]
    fn buffer_operations_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        ::metrics::with_local_recorder(&recorder, || {
            let buffer = BoundedBuffer::new(1).unwrap();
            buffer.put(1, None).unwrap();
            assert!(buffer.put(2, Some(Duration::from_millis(10))).is_err());
            assert_eq!(buffer.take(None).unwrap(), 1);
            assert!(buffer.take(Some(Duration::from_millis(10))).is_err());
        });

        let recorded: Vec<(String, Vec<String>, DebugValue)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(composite, _, _, value)| {
                let key = composite.key();
                let labels = key
                    .labels()
                    .map(|l| format!("{}={}", l.key(), l.value()))
                    .collect();
                (key.name().to_string(), labels, value)
            })
            .collect();
        let find = |name: &str, labels: &[&str]| {
            recorded
                .iter()
                .find(|(n, l, _)| n == name && l == labels)
                .map(|(_, _, v)| v.clone())
        };

        assert_eq!(find(PUT_TOTAL, &[]), Some(DebugValue::Counter(1)));
        assert_eq!(find(TAKE_TOTAL, &[]), Some(DebugValue::Counter(1)));
        assert_eq!(
            find(TIMEOUT_TOTAL, &["operation=put"]),
            Some(DebugValue::Counter(1))
        );
        assert_eq!(
            find(TIMEOUT_TOTAL, &["operation=take"]),
            Some(DebugValue::Counter(1))
        );
        match find(OCCUPANCY, &[]) {
            Some(DebugValue::Gauge(occupancy)) => assert_eq!(occupancy.into_inner(), 0.0),
            other => panic!("unexpected occupancy: {other:?}"),
        }
    }
}
