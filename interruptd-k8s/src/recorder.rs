//! Kubernetes Event publishing

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event as KubeEvent, EventType as KubeEventType, Recorder, Reporter};
use kube::Client;
use tracing::{debug, warn};

use interruptd_core::events::{Event, EventRecorder, EventType, InvolvedObject};

/// Identical events inside this window are published once
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_secs(120);

/// [`EventRecorder`] that writes core/v1 Events.
///
/// Each publish is spawned onto the runtime; delivery failures are logged
/// and otherwise ignored.
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
    dedupe_window: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl KubeEventRecorder {
    pub fn new(client: Client, reporter: impl Into<String>) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: reporter.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    /// Returns false if an identical event was published within the window
    fn should_publish(&self, event: &Event) -> bool {
        let key = dedupe_key(event);
        let now = Instant::now();
        let Ok(mut recent) = self.recent.lock() else {
            return true;
        };
        recent.retain(|_, seen| now.duration_since(*seen) < self.dedupe_window);
        if recent.contains_key(&key) {
            return false;
        }
        recent.insert(key, now);
        true
    }
}

fn dedupe_key(event: &Event) -> String {
    format!(
        "{}/{}/{}/{}",
        event.involved_object.kind,
        event.involved_object.name,
        event.reason,
        event.dedupe_values.join(",")
    )
}

fn object_reference(object: &InvolvedObject) -> ObjectReference {
    ObjectReference {
        api_version: Some(object.api_version.clone()),
        kind: Some(object.kind.clone()),
        name: Some(object.name.clone()),
        uid: Some(object.uid.clone()).filter(|uid| !uid.is_empty()),
        ..Default::default()
    }
}

fn to_kube_event(event: &Event) -> KubeEvent {
    KubeEvent {
        type_: match event.event_type {
            EventType::Normal => KubeEventType::Normal,
            EventType::Warning => KubeEventType::Warning,
        },
        reason: event.reason.clone(),
        note: Some(event.message.clone()),
        action: event.reason.clone(),
        secondary: None,
    }
}

impl EventRecorder for KubeEventRecorder {
    fn publish(&self, events: Vec<Event>) {
        for event in events {
            if !self.should_publish(&event) {
                debug!(reason = %event.reason, object = %event.involved_object.name, "Suppressing duplicate event");
                continue;
            }

            let recorder = Recorder::new(
                self.client.clone(),
                self.reporter.clone(),
                object_reference(&event.involved_object),
            );
            let kube_event = to_kube_event(&event);
            tokio::spawn(async move {
                if let Err(e) = recorder.publish(kube_event).await {
                    warn!(
                        reason = %event.reason,
                        object = %event.involved_object.name,
                        error = %e,
                        "Failed to publish event"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, reason: &str, uid: &str) -> Event {
        Event {
            involved_object: InvolvedObject {
                api_version: "karpenter.sh/v1beta1".to_string(),
                kind: "NodeClaim".to_string(),
                name: name.to_string(),
                uid: uid.to_string(),
            },
            event_type: EventType::Warning,
            reason: reason.to_string(),
            message: "Spot interruption warning was triggered".to_string(),
            dedupe_values: vec![uid.to_string()],
        }
    }

    #[test]
    fn test_object_reference() {
        let reference = object_reference(&event("nc-1", "SpotInterrupted", "uid-1").involved_object);
        assert_eq!(reference.kind.as_deref(), Some("NodeClaim"));
        assert_eq!(reference.name.as_deref(), Some("nc-1"));
        assert_eq!(reference.uid.as_deref(), Some("uid-1"));
        assert!(reference.namespace.is_none());

        let reference = object_reference(&event("nc-1", "SpotInterrupted", "").involved_object);
        assert!(reference.uid.is_none());
    }

    #[test]
    fn test_to_kube_event() {
        let kube_event = to_kube_event(&event("nc-1", "SpotInterrupted", "uid-1"));
        assert!(matches!(kube_event.type_, KubeEventType::Warning));
        assert_eq!(kube_event.reason, "SpotInterrupted");
        assert_eq!(
            kube_event.note.as_deref(),
            Some("Spot interruption warning was triggered")
        );
    }

    #[test]
    fn test_dedupe_key() {
        let a = event("nc-1", "SpotInterrupted", "uid-1");
        let b = event("nc-1", "Unhealthy", "uid-1");
        let c = event("nc-2", "SpotInterrupted", "uid-2");
        assert_eq!(dedupe_key(&a), dedupe_key(&a.clone()));
        assert_ne!(dedupe_key(&a), dedupe_key(&b));
        assert_ne!(dedupe_key(&a), dedupe_key(&c));
    }
}
