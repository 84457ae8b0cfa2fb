// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for group sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `group_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: sqlite, postgres
//! - `status`: success, error
//! - `operation`: sync, verify, resolve

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record a finished sync call
pub fn record_sync_call(backend: &str, status: &str) {
    counter!(
        "group_sync_calls_total",
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record sync call latency
pub fn record_sync_latency(backend: &str, duration: Duration) {
    histogram!(
        "group_sync_call_seconds",
        "backend" => backend.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the outcome of applying an incoming batch
pub fn record_messages_applied(inserted: usize, duplicates: usize) {
    counter!("group_sync_messages_inserted_total").increment(inserted as u64);
    counter!("group_sync_messages_duplicate_total").increment(duplicates as u64);
}

/// Record messages returned to the client
pub fn record_messages_sent(count: usize) {
    counter!("group_sync_messages_sent_total").increment(count as u64);
}

/// Record an error by operation and type
pub fn record_error(operation: &str, error_type: &str) {
    counter!(
        "group_sync_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a connection failure that survived startup retry
pub fn record_connection_error(backend: &str) {
    counter!(
        "group_sync_connection_errors_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// Record a group whose storage was created on first sync
pub fn record_group_created(backend: &str) {
    counter!(
        "group_sync_groups_created_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// A timing guard that records sync latency on drop
pub struct CallTimer {
    backend: &'static str,
    start: Instant,
}

impl CallTimer {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            start: Instant::now(),
        }
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        record_sync_latency(self.backend, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder is installed, so these only check the calls don't panic.

    #[test]
    fn test_record_sync_call() {
        record_sync_call("sqlite", "success");
        record_sync_call("postgres", "error");
        record_sync_latency("sqlite", Duration::from_millis(3));
    }

    #[test]
    fn test_message_counters() {
        record_messages_applied(3, 1);
        record_messages_applied(0, 0);
        record_messages_sent(10);
    }

    #[test]
    fn test_error_and_lifecycle_counters() {
        record_error("sync", "invalid_timestamp");
        record_connection_error("postgres");
        record_group_created("sqlite");
    }

    #[test]
    fn test_connection_error_counter_labels() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, || {
            record_connection_error("postgres");
            record_connection_error("postgres");
        });

        let recorded: Vec<_> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| (key.into_parts().1, value))
            .collect();
        assert_eq!(recorded.len(), 1);

        let (key, value) = &recorded[0];
        assert_eq!(key.name(), "group_sync_connection_errors_total");
        let labels: Vec<_> = key.labels().map(|l| (l.key().to_string(), l.value().to_string())).collect();
        assert_eq!(labels, vec![("backend".to_string(), "postgres".to_string())]);
        assert!(matches!(value, DebugValue::Counter(2)));
    }

    #[test]
    fn test_call_timer() {
        {
            let _timer = CallTimer::new("sqlite");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}
