//! Wire types for the Assistants REST/SSE surface.

use gateway_core::{Role, RunStatus};
use serde::{Deserialize, Serialize};

/// `POST /threads` response.
#[derive(Debug, Deserialize)]
pub struct ThreadObject {
    pub id: String,
}

/// `POST /threads/{id}/messages` request body.
#[derive(Debug, Serialize)]
pub struct CreateMessageRequest<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// `POST /threads/{id}/runs` request body.
#[derive(Debug, Serialize)]
pub struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// Run object, returned on create/retrieve and carried by run SSE events.
#[derive(Debug, Deserialize)]
pub struct RunObject {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

/// Failure detail attached to a terminal run.
#[derive(Debug, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// `GET /threads/{id}/messages` response.
#[derive(Debug, Deserialize)]
pub struct MessageList {
    pub data: Vec<MessageObject>,
}

/// One stored message.
#[derive(Debug, Deserialize)]
pub struct MessageObject {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl MessageObject {
    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.value.as_str()),
                ContentPart::Other => None,
            })
            .collect()
    }
}

/// One content part of a stored message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub value: String,
}

/// `thread.message.delta` SSE payload.
#[derive(Debug, Deserialize)]
pub struct MessageDeltaEvent {
    pub delta: MessageDelta,
}

#[derive(Debug, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub content: Vec<DeltaContentPart>,
}

/// One content part of a delta event. Anything that is not a text fragment
/// is out of contract for the gateway.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaContentPart {
    Text {
        #[serde(default)]
        text: Option<DeltaText>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct DeltaText {
    #[serde(default)]
    pub value: Option<String>,
}

/// Error envelope of a non-2xx API response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_delta() {
        let data = r#"{
            "id": "msg_1",
            "object": "thread.message.delta",
            "delta": {"content": [{"index": 0, "type": "text", "text": {"value": "Hi"}}]}
        }"#;
        let event: MessageDeltaEvent = serde_json::from_str(data).unwrap();
        match &event.delta.content[0] {
            DeltaContentPart::Text { text } => {
                assert_eq!(text.as_ref().unwrap().value.as_deref(), Some("Hi"));
            }
            DeltaContentPart::Other => panic!("expected text part"),
        }
    }

    #[test]
    fn unknown_delta_part_maps_to_other() {
        let data = r#"{"delta": {"content": [{"type": "image_file", "image_file": {}}]}}"#;
        let event: MessageDeltaEvent = serde_json::from_str(data).unwrap();
        assert!(matches!(event.delta.content[0], DeltaContentPart::Other));
    }

    #[test]
    fn parses_run_with_last_error() {
        let data = r#"{
            "id": "run_1",
            "status": "failed",
            "last_error": {"code": "rate_limit_exceeded", "message": "Too many requests"}
        }"#;
        let run: RunObject = serde_json::from_str(data).unwrap();
        assert_eq!(run.status, gateway_core::RunStatus::Failed);
        assert_eq!(run.last_error.unwrap().message, "Too many requests");
    }

    #[test]
    fn message_text_concatenates_text_parts() {
        let data = r#"{
            "role": "assistant",
            "content": [
                {"type": "text", "text": {"value": "part one"}},
                {"type": "image_file", "image_file": {}},
                {"type": "text", "text": {"value": " part two"}}
            ]
        }"#;
        let message: MessageObject = serde_json::from_str(data).unwrap();
        assert_eq!(message.text(), "part one part two");
    }

    #[test]
    fn create_run_omits_stream_when_false() {
        let body = CreateRunRequest {
            assistant_id: "asst_1",
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"assistant_id": "asst_1"}));

        let body = CreateRunRequest {
            assistant_id: "asst_1",
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"assistant_id": "asst_1", "stream": true})
        );
    }
}
