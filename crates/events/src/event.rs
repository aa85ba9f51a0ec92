//! Task event types pushed to streaming clients.

use meshgen_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// The fixed set of client-facing event names.
///
/// Wire names use the `stage:verb` convention the SSE protocol exposes as
/// the `event:` field of each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "image:generating")]
    ImageGenerating,
    #[serde(rename = "image:completed")]
    ImageCompleted,
    #[serde(rename = "image:failed")]
    ImageFailed,
    #[serde(rename = "model:generating")]
    ModelGenerating,
    #[serde(rename = "model:progress")]
    ModelProgress,
    #[serde(rename = "model:completed")]
    ModelCompleted,
    #[serde(rename = "model:failed")]
    ModelFailed,
    #[serde(rename = "task:init")]
    TaskInit,
    #[serde(rename = "task:updated")]
    TaskUpdated,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ImageGenerating => "image:generating",
            EventType::ImageCompleted => "image:completed",
            EventType::ImageFailed => "image:failed",
            EventType::ModelGenerating => "model:generating",
            EventType::ModelProgress => "model:progress",
            EventType::ModelCompleted => "model:completed",
            EventType::ModelFailed => "model:failed",
            EventType::TaskInit => "task:init",
            EventType::TaskUpdated => "task:updated",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ephemeral (taskId, eventType, payload) notification.
///
/// `task_id` correlates to a generation request; delivery is best-effort
/// at-most-once per connection and events carry no persistent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: DbId,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl TaskEvent {
    pub fn new(task_id: DbId, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            task_id,
            event_type,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_use_colon_wire_names() {
        let json = serde_json::to_string(&EventType::ImageCompleted).unwrap();
        assert_eq!(json, "\"image:completed\"");
        let back: EventType = serde_json::from_str("\"model:progress\"").unwrap();
        assert_eq!(back, EventType::ModelProgress);
    }

    #[test]
    fn as_str_matches_serde_names() {
        for event_type in [
            EventType::ImageGenerating,
            EventType::ImageCompleted,
            EventType::ImageFailed,
            EventType::ModelGenerating,
            EventType::ModelProgress,
            EventType::ModelCompleted,
            EventType::ModelFailed,
            EventType::TaskInit,
            EventType::TaskUpdated,
        ] {
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
        }
    }

    #[test]
    fn task_event_round_trips_across_processes() {
        let event = TaskEvent::new(
            42,
            EventType::ModelCompleted,
            serde_json::json!({"modelUrl": "/api/storage/model/models/42/model.obj"}),
        );
        let wire = serde_json::to_string(&event).unwrap();
        let back: TaskEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.task_id, 42);
        assert_eq!(back.event_type, EventType::ModelCompleted);
        assert_eq!(back.payload["modelUrl"], event.payload["modelUrl"]);
    }
}
