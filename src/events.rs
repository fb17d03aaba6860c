use crate::detector::MotionObserver;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A committed motion transition for one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub camera_id: String,
    pub detected: bool,
    pub timestamp: DateTime<Utc>,
}

impl MotionEvent {
    pub fn new<S: Into<String>>(camera_id: S, detected: bool) -> Self {
        Self {
            camera_id: camera_id.into(),
            detected,
            timestamp: Utc::now(),
        }
    }

    pub fn description(&self) -> String {
        format!(
            "Camera {}: motion {}",
            self.camera_id,
            if self.detected { "detected" } else { "cleared" }
        )
    }
}

/// Forwards transitions from the detector thread into a broadcast channel
/// for async consumers.
#[derive(Clone)]
pub struct BroadcastObserver {
    camera_id: String,
    sender: broadcast::Sender<MotionEvent>,
}

impl BroadcastObserver {
    /// Create an observer with its own channel of `capacity` events
    pub fn new<S: Into<String>>(camera_id: S, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            camera_id: camera_id.into(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MotionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl MotionObserver for BroadcastObserver {
    fn on_motion_changed(&self, detected: bool) {
        let event = MotionEvent::new(self.camera_id.as_str(), detected);
        debug!("Publishing event: {}", event.description());

        if self.sender.send(event).is_err() {
            warn!(
                "No subscribers for motion events from camera '{}'",
                self.camera_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_broadcast_observer_delivers_to_all_subscribers() {
        let observer = BroadcastObserver::new("porch", 8);
        let mut first = observer.subscribe();
        let mut second = observer.subscribe();
        assert_eq!(observer.subscriber_count(), 2);

        observer.on_motion_changed(true);

        let a = timeout(Duration::from_millis(100), first.recv())
            .await
            .unwrap()
            .unwrap();
        let b = timeout(Duration::from_millis(100), second.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.camera_id, "porch");
        assert!(a.detected);
    }

    #[tokio::test]
    async fn test_broadcast_observer_without_subscribers_does_not_panic() {
        let observer = BroadcastObserver::new("porch", 8);
        observer.on_motion_changed(false);

        let mut late = observer.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_as_json_line() {
        let event = MotionEvent::new("driveway", false);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"camera_id\":\"driveway\""));
        assert!(json.contains("\"detected\":false"));
        assert!(!json.contains('\n'));

        let parsed: MotionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.description(), "Camera driveway: motion cleared");
    }
}
