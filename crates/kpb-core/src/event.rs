use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Default capacity of the event channel. A full channel blocks the engine
/// until the consumer catches up; events are never dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ComponentStarted,
    TestingApplyConditions,
    ApplyConditionsNotFulfilled,
    Applying,
    /// Attempt `attempt` (0-based) failed; the engine waits before retrying.
    ApplyRetry { attempt: u32, error: String },
    /// 0-based readiness poll.
    TestingReadiness { attempt: u32 },
    ComponentReady,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    pub component: String,
    #[serde(flatten)]
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(component: impl Into<String>, kind: EventKind) -> Self {
        Self {
            component: component.into(),
            kind,
            at: Utc::now(),
        }
    }
}

/// Producer side of the lifecycle event stream.
///
/// Sends wait for channel capacity. Once the receiver is gone, events are
/// discarded so the run continues without a presenter.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, component: &str, kind: EventKind) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(RunEvent::new(component, kind)).await.is_err() {
            tracing::trace!(component, "event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel(4);
        sink.emit("base", EventKind::ComponentStarted).await;
        sink.emit("base", EventKind::ComponentReady).await;
        drop(sink);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.component, "base");
        assert_eq!(first.kind, EventKind::ComponentStarted);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ComponentReady);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_block() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        for _ in 0..10 {
            sink.emit("base", EventKind::Applying).await;
        }
    }

    #[test]
    fn event_json_is_tagged() {
        let ev = RunEvent::new(
            "db",
            EventKind::ApplyRetry {
                attempt: 2,
                error: "boom".into(),
            },
        );
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"apply_retry\""));
        assert!(json.contains("\"component\":\"db\""));
    }
}
