//! Event bus: a single ordered broadcast channel carrying log, status,
//! phase, and progress events from the run routine to any number of live
//! stream subscribers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state::RunStatus;

/// Broadcast buffer depth. Publishing never blocks the run routine; a
/// subscriber that falls more than this far behind observes a lag and
/// resumes from the oldest retained event.
const BUS_CAPACITY: usize = 256;

/// Immutable tagged event. Every variant carries a `message` field so each
/// serialized frame satisfies the stream contract
/// (`data: {"type": ..., "message": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Log {
        message: String,
    },
    Status {
        message: String,
    },
    Phase {
        message: String,
        label: String,
    },
    Progress {
        message: String,
        percent: f32,
        status: RunStatus,
        step: String,
    },
}

impl Event {
    pub fn log(message: impl Into<String>) -> Self {
        Event::Log { message: message.into() }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Event::Status { message: message.into() }
    }

    pub fn phase(label: impl Into<String>) -> Self {
        let label = label.into();
        Event::Phase { message: label.clone(), label }
    }

    pub fn progress(percent: f32, status: RunStatus, step: impl Into<String>) -> Self {
        let step = step.into();
        Event::Progress {
            message: format!("{:.0}% — {}", percent, step),
            percent,
            status,
            step,
        }
    }
}

/// Single-producer broadcast bus. Cloning is cheap; all clones publish into
/// the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Non-blocking publish. Events published while no subscriber is
    /// connected are dropped, matching a live feed.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventTap {
        EventTap { rx: self.tx.subscribe() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's read cursor over the bus.
pub struct EventTap {
    rx: broadcast::Receiver<Event>,
}

impl EventTap {
    /// Wait for the next event, polling with `poll` as the timeout.
    ///
    /// Returns `None` only once a poll times out with nothing pending *and*
    /// `is_idle()` reports the run inactive at that moment. Checking idleness
    /// only after an empty poll closes the race where the run finishes
    /// between its last event and the idle check — pending events are always
    /// drained first.
    pub async fn next_before_idle(
        &mut self,
        poll: Duration,
        is_idle: impl Fn() -> bool,
    ) -> Option<Event> {
        loop {
            match tokio::time::timeout(poll, self.rx.recv()).await {
                Ok(Ok(event)) => return Some(event),
                // Fell behind the buffer; resume from the oldest retained
                // event rather than terminating the feed.
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_elapsed) => {
                    if is_idle() {
                        return None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn events_are_delivered_in_publish_order() {
        let bus = EventBus::new();
        let mut tap = bus.subscribe();

        bus.publish(Event::phase("Prepare nodes"));
        bus.publish(Event::log("line one"));
        bus.publish(Event::log("line two"));

        assert_eq!(
            tap.next_before_idle(POLL, || false).await,
            Some(Event::phase("Prepare nodes"))
        );
        assert_eq!(
            tap.next_before_idle(POLL, || false).await,
            Some(Event::log("line one"))
        );
        assert_eq!(
            tap.next_before_idle(POLL, || false).await,
            Some(Event::log("line two"))
        );
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_full_sequence() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(Event::log("shared"));
        bus.publish(Event::status("running Deploy NKP"));

        for tap in [&mut a, &mut b] {
            assert_eq!(
                tap.next_before_idle(POLL, || false).await,
                Some(Event::log("shared"))
            );
            assert_eq!(
                tap.next_before_idle(POLL, || false).await,
                Some(Event::status("running Deploy NKP"))
            );
        }
    }

    #[tokio::test]
    async fn idle_tap_terminates_after_empty_poll() {
        let bus = EventBus::new();
        let mut tap = bus.subscribe();
        assert_eq!(tap.next_before_idle(POLL, || true).await, None);
    }

    #[tokio::test]
    async fn pending_events_are_drained_before_the_idle_check() {
        let bus = EventBus::new();
        let mut tap = bus.subscribe();

        // The run is already "finished" but an event is still queued: the
        // subscriber must deliver it before terminating.
        bus.publish(Event::status("deployment complete"));

        assert_eq!(
            tap.next_before_idle(POLL, || true).await,
            Some(Event::status("deployment complete"))
        );
        assert_eq!(tap.next_before_idle(POLL, || true).await, None);
    }

    #[tokio::test]
    async fn active_tap_keeps_waiting_through_empty_polls() {
        let bus = EventBus::new();
        let mut tap = bus.subscribe();

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                // Longer than one poll interval so at least one poll times
                // out while the run is still active.
                tokio::time::sleep(Duration::from_millis(60)).await;
                bus.publish(Event::log("late line"));
            })
        };

        assert_eq!(
            tap.next_before_idle(POLL, || false).await,
            Some(Event::log("late line"))
        );
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn lagged_subscriber_resumes_without_terminating() {
        let bus = EventBus::new();
        let mut tap = bus.subscribe();

        for i in 0..(BUS_CAPACITY + 10) {
            bus.publish(Event::log(format!("line {i}")));
        }

        // The first events were overwritten; the tap must still produce the
        // retained tail in order.
        let first = tap.next_before_idle(POLL, || false).await.unwrap();
        match first {
            Event::Log { message } => assert!(message.starts_with("line ")),
            other => panic!("Expected Log, got {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_a_message_field() {
        let cases = vec![
            Event::log("hello"),
            Event::status("running Deploy NKP"),
            Event::phase("Verify deployment"),
            Event::progress(50.0, RunStatus::Running, "Deploy NKP"),
        ];
        for event in cases {
            let value: serde_json::Value =
                serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
            assert!(value.get("message").is_some(), "missing message in {value}");
            assert!(value.get("type").is_some(), "missing type in {value}");
        }
    }

    #[test]
    fn progress_event_carries_state_fields() {
        let event = Event::progress(75.0, RunStatus::Running, "Verify deployment");
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["percent"], 75.0);
        assert_eq!(value["status"], "running");
        assert_eq!(value["step"], "Verify deployment");
    }
}
