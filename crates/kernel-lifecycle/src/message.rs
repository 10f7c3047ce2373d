//! Protocol messages exchanged with a kernel over its channel.
//!
//! Only the header type, message id, parent id, and content are modeled.
//! Reply correlation relies solely on `parent_msg_id` matching the id of the
//! request that elicited the reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const KERNEL_INFO_REQUEST: &str = "kernel_info_request";
pub const KERNEL_INFO_REPLY: &str = "kernel_info_reply";
pub const STATUS: &str = "status";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub header_type: String,
    pub msg_id: String,
    #[serde(default)]
    pub parent_msg_id: Option<String>,
    #[serde(default)]
    pub content: Value,
}

impl ProtocolMessage {
    /// Create a new request with a fresh message id.
    pub fn request(header_type: impl Into<String>, content: Value) -> Self {
        Self {
            header_type: header_type.into(),
            msg_id: Uuid::new_v4().to_string(),
            parent_msg_id: None,
            content,
        }
    }

    pub fn kernel_info_request() -> Self {
        Self::request(KERNEL_INFO_REQUEST, Value::Object(Default::default()))
    }

    /// Create a message replying to (or caused by) `parent`.
    pub fn child_of(parent: &ProtocolMessage, header_type: impl Into<String>, content: Value) -> Self {
        Self {
            header_type: header_type.into(),
            msg_id: Uuid::new_v4().to_string(),
            parent_msg_id: Some(parent.msg_id.clone()),
            content,
        }
    }

    pub fn is_child_of(&self, parent: &ProtocolMessage) -> bool {
        self.parent_msg_id.as_deref() == Some(parent.msg_id.as_str())
    }

    pub fn is_type(&self, header_type: &str) -> bool {
        self.header_type == header_type
    }

    /// The `execution_state` of a status message.
    pub fn execution_state(&self) -> Option<&str> {
        if !self.is_type(STATUS) {
            return None;
        }
        self.content.get("execution_state").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requests_get_unique_ids() {
        let a = ProtocolMessage::kernel_info_request();
        let b = ProtocolMessage::kernel_info_request();
        assert_ne!(a.msg_id, b.msg_id);
        assert_eq!(a.header_type, KERNEL_INFO_REQUEST);
        assert!(a.parent_msg_id.is_none());
    }

    #[test]
    fn test_child_of_links_parent() {
        let request = ProtocolMessage::kernel_info_request();
        let reply = ProtocolMessage::child_of(&request, KERNEL_INFO_REPLY, json!({}));
        assert!(reply.is_child_of(&request));

        let other = ProtocolMessage::kernel_info_request();
        assert!(!reply.is_child_of(&other));
    }

    #[test]
    fn test_execution_state_only_for_status() {
        let status = ProtocolMessage::request(STATUS, json!({"execution_state": "busy"}));
        assert_eq!(status.execution_state(), Some("busy"));

        let stream = ProtocolMessage::request("stream", json!({"execution_state": "busy"}));
        assert_eq!(stream.execution_state(), None);
    }
}
