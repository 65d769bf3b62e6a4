//! Deployment event stream
//!
//! Observable interface for deployment runs. Sinks receive every event;
//! `JsonEventSink` renders NDJSON for CI consumption, `NoopEventSink` keeps
//! library use silent. Human-facing rendering happens in the binary, off the
//! same stream.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::engine::Outcome;

/// Event emitted during a deployment run
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// A tenant's deployment pass started
    TenantStarted {
        tenant: String,
        modified: usize,
        deleted: usize,
    },

    /// An object was applied because something else referenced it
    DependencyApplied { of: String, dependency: String },

    /// One object finished its apply step
    ObjectApplied {
        tenant: String,
        name: String,
        outcome: Outcome,
        detail: Option<String>,
    },

    /// Non-fatal irregularity (unresolvable manifest row, missing columns,
    /// unreadable dependency branch)
    Warning { message: String },

    /// A deleted object is still present after the run
    ResidualDeletion { name: String },

    /// An object vanished without being in the deletion set
    CollateralDrop { name: String },

    /// A tenant's deployment pass finished
    TenantCompleted {
        tenant: String,
        applied: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Trait for receiving deployment events
pub trait EventSink: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: DeployEvent);
}

/// No-op event sink for silent operation
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_event(&self, _event: DeployEvent) {}
}

/// Event sink that outputs NDJSON events
pub struct JsonEventSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonEventSink {
    /// Create a new JSON event sink writing to stdout
    pub fn stdout() -> Self {
        Self {
            writer: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Create a JSON event sink writing to a custom writer (for testing)
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    fn write_event(&self, event: serde_json::Value) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", event);
            let _ = writer.flush();
        }
    }
}

impl EventSink for JsonEventSink {
    fn on_event(&self, event: DeployEvent) {
        let json = match event {
            DeployEvent::TenantStarted {
                tenant,
                modified,
                deleted,
            } => serde_json::json!({
                "event": "tenant_start",
                "tenant": tenant,
                "modified": modified,
                "deleted": deleted,
            }),

            DeployEvent::DependencyApplied { of, dependency } => serde_json::json!({
                "event": "dependency_applied",
                "of": of,
                "dependency": dependency,
            }),

            DeployEvent::ObjectApplied {
                tenant,
                name,
                outcome,
                detail,
            } => serde_json::json!({
                "event": "object_applied",
                "tenant": tenant,
                "name": name,
                "outcome": outcome.as_str(),
                "detail": detail,
            }),

            DeployEvent::Warning { message } => serde_json::json!({
                "event": "warning",
                "message": message,
            }),

            DeployEvent::ResidualDeletion { name } => serde_json::json!({
                "event": "residual_deletion",
                "name": name,
            }),

            DeployEvent::CollateralDrop { name } => serde_json::json!({
                "event": "collateral_drop",
                "name": name,
            }),

            DeployEvent::TenantCompleted {
                tenant,
                applied,
                skipped,
                failed,
            } => {
                let status = if failed == 0 { "success" } else { "partial" };
                serde_json::json!({
                    "event": "tenant_complete",
                    "tenant": tenant,
                    "status": status,
                    "applied": applied,
                    "skipped": skipped,
                    "failed": failed,
                })
            }
        };

        self.write_event(json);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Test event sink that records all events
    #[derive(Default)]
    pub struct RecordingEventSink {
        pub events: Mutex<Vec<DeployEvent>>,
    }

    impl RecordingEventSink {
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn warnings(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    DeployEvent::Warning { message } => Some(message.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventSink for RecordingEventSink {
        fn on_event(&self, event: DeployEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TestWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl TestWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    buffer: buffer.clone(),
                },
                buffer,
            )
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_sink_outputs_tenant_start() {
        let (writer, buffer) = TestWriter::new();
        let sink = JsonEventSink::with_writer(writer);

        sink.on_event(DeployEvent::TenantStarted {
            tenant: "acme".to_string(),
            modified: 3,
            deleted: 1,
        });

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(output.contains("\"event\":\"tenant_start\""));
        assert!(output.contains("\"modified\":3"));
    }

    #[test]
    fn json_sink_outputs_partial_on_failures() {
        let (writer, buffer) = TestWriter::new();
        let sink = JsonEventSink::with_writer(writer);

        sink.on_event(DeployEvent::TenantCompleted {
            tenant: "acme".to_string(),
            applied: 4,
            skipped: 1,
            failed: 2,
        });

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(output.contains("\"status\":\"partial\""));
        assert!(output.contains("\"applied\":4"));
    }

    #[test]
    fn recording_sink_captures_warnings() {
        let sink = test_support::RecordingEventSink::default();
        sink.on_event(DeployEvent::Warning {
            message: "skipped row".to_string(),
        });
        assert_eq!(sink.warnings(), vec!["skipped row"]);
    }
}
