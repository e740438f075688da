//! Fire-and-forget usage telemetry.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

/// Receives usage events. Implementations must never fail the caller.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &str, metadata: Value);
}

/// Writes telemetry events to the log under the `telemetry` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: &str, metadata: Value) {
        info!(target: "telemetry", event, %metadata, "usage event");
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: &str, _metadata: Value) {}
}

/// A recorded telemetry event
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub name: String,
    pub metadata: Value,
}

/// Forwards events to a channel, dropping them once the receiver is gone
#[derive(Debug, Clone)]
pub struct ChannelTelemetry {
    sender: mpsc::UnboundedSender<TelemetryEvent>,
}

impl ChannelTelemetry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn record(&self, event: &str, metadata: Value) {
        let _ = self.sender.send(TelemetryEvent {
            name: event.to_string(),
            metadata,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_telemetry_forwards_events() {
        let (sink, mut receiver) = ChannelTelemetry::new();
        sink.record("stream_start", json!({ "platforms": ["twitch"] }));

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.name, "stream_start");
        assert_eq!(event.metadata["platforms"][0], "twitch");
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (sink, receiver) = ChannelTelemetry::new();
        drop(receiver);
        sink.record("stream_end", Value::Null);
    }

    #[test]
    fn test_sinks_accept_events() {
        let sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(TracingTelemetry), Box::new(NoopTelemetry)];
        for sink in &sinks {
            sink.record("Recording", json!({ "status": "recording" }));
        }
    }
}
