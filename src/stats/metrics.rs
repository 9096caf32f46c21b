//! Status documents for the pipeline and the hub

use serde::Serialize;

/// Pipeline queue depths and gate state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    /// Alerts waiting in the pipeline queue
    pub llm_channel: usize,
    /// Events waiting in the hub's input queue
    pub sse_channel: usize,
    /// Whether the pause gate is closed
    pub paused: bool,
}

/// Per-subscriber queue depth
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberStatus {
    /// Registry id
    pub id: u64,
    /// Remote address
    pub address: String,
    /// Frames waiting in the outbound queue
    pub queued: usize,
}

/// Hub-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStatus {
    /// Registered subscribers
    pub subscribers: usize,
    /// Events dropped on full subscriber queues since startup
    pub dropped_events: u64,
    /// Queue depth per subscriber, ordered by id
    pub client_channels: Vec<SubscriberStatus>,
}

/// Everything a viewer needs when it connects mid-stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentState {
    pub annotated_image: String,
    pub raw_image: String,
    pub timestamp: i64,
    /// Prompt event payload, as JSON text
    pub prompt: String,
    pub image_analysis: String,
    pub threat_analysis: String,
    pub events_paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_status_json() {
        let status = PipelineStatus {
            llm_channel: 2,
            sse_channel: 7,
            paused: true,
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"llm_channel": 2, "sse_channel": 7, "paused": true})
        );
    }

    #[test]
    fn test_hub_status_json() {
        let status = HubStatus {
            subscribers: 1,
            dropped_events: 3,
            client_channels: vec![SubscriberStatus {
                id: 4,
                address: "192.168.1.20:51234".into(),
                queued: 12,
            }],
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"subscribers\":1"));
        assert!(json.contains("\"dropped_events\":3"));
        assert!(json.contains("\"address\":\"192.168.1.20:51234\""));
        assert!(json.contains("\"queued\":12"));
    }

    #[test]
    fn test_current_state_json() {
        let state = CurrentState {
            raw_image: "efgh".into(),
            timestamp: 1234,
            prompt: r#"{"id":0,"prompt":"describe"}"#.into(),
            events_paused: true,
            ..Default::default()
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["raw_image"], "efgh");
        assert_eq!(json["annotated_image"], "");
        assert_eq!(json["timestamp"], 1234);
        assert_eq!(json["prompt"], r#"{"id":0,"prompt":"describe"}"#);
        assert_eq!(json["events_paused"], true);
    }

    #[test]
    fn test_default_status() {
        let status = HubStatus::default();
        assert_eq!(status.subscribers, 0);
        assert!(status.client_channels.is_empty());
    }
}
