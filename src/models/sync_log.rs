use serde::{Deserialize, Serialize};

use super::ReadStatus;

/// Wire record posted to the aggregator's `log_read` endpoint.
///
/// `session_id` is always serialized; `null` asks the server to mint one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub viewer_id: u64,
    #[serde(rename = "article_id")]
    pub content_id: u64,
    pub status: ReadStatus,
    #[serde(rename = "scroll_depth")]
    pub scroll_depth_pct: f64,
    pub active_time_seconds: u64,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadLogResponse {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_to_the_log_read_contract() {
        let entry = SyncLogEntry {
            viewer_id: 7,
            content_id: 42,
            status: ReadStatus::InProgress,
            scroll_depth_pct: 45.5,
            active_time_seconds: 12,
            session_id: None,
        };

        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "viewer_id": 7,
                "article_id": 42,
                "status": "in_progress",
                "scroll_depth": 45.5,
                "active_time_seconds": 12,
                "session_id": null,
            })
        );
    }

    #[test]
    fn response_tolerates_missing_session_id() {
        let response: ReadLogResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.session_id, None);

        let response: ReadLogResponse =
            serde_json::from_str(r#"{"session_id":"abc123","extra":1}"#).unwrap();
        assert_eq!(response.session_id.as_deref(), Some("abc123"));
    }
}
