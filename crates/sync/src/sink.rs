//! Non-fatal error sinks for remote listener failures.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::RemoteError;

/// Destination for errors that must not interrupt synchronization.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &RemoteError);
}

/// Logs at `warn` and captures to Sentry (a no-op when Sentry is not initialized).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &RemoteError) {
        let event_id = sentry::capture_error(error);
        tracing::warn!(
            error = %error,
            sentry_event_id = %event_id,
            "Remote listener error"
        );
    }
}

/// Keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorSink {
    reports: Arc<Mutex<Vec<RemoteError>>>,
}

impl RecordingErrorSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of reports so far, oldest first.
    #[must_use]
    pub fn reports(&self) -> Vec<RemoteError> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, error: &RemoteError) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingErrorSink::new();
        sink.report(&RemoteError::PermissionDenied("accounts".to_string()));
        sink.report(&RemoteError::PermissionDenied("orderManager".to_string()));

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports.first(),
            Some(&RemoteError::PermissionDenied("accounts".to_string()))
        );
    }

    #[test]
    fn test_tracing_sink_without_sentry_client() {
        TracingErrorSink.report(&RemoteError::PermissionDenied("accounts".to_string()));
    }
}
