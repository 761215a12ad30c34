//! Progress reporting. Long-running operations emit coarse named events
//! (`FETCH_EHR_STARTED`, `ROUTING_TO: CRITICAL`, ...) through an injected
//! sink so callers can surface them without the engine knowing how.

use std::sync::Mutex;

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &str);
}

/// Discards all events. The default when a caller passes no sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &str) {}
}

/// Records events in memory, for tests and audit.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("sink lock poisoned").clone()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: &str) {
        self.events
            .lock()
            .expect("sink lock poisoned")
            .push(event.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit("FETCH_EHR_STARTED");
        sink.emit("FETCH_EHR_COMPLETED");
        assert_eq!(
            sink.events(),
            vec!["FETCH_EHR_STARTED", "FETCH_EHR_COMPLETED"]
        );
    }
}
