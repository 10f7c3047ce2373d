//! Conversion between wire Jupyter messages and channel messages.
//!
//! Content is carried as JSON in both directions; `jupyter-protocol` does the
//! typed parsing, keyed by the header's `msg_type`.

use jupyter_protocol::{JupyterMessage, JupyterMessageContent};
use kernel_lifecycle::ProtocolMessage;

/// Error type for message conversion failures.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Failed to parse message content: {0}")]
    ContentParseError(#[from] anyhow::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Project a message read off iopub or shell.
pub fn from_jupyter(message: &JupyterMessage) -> Result<ProtocolMessage, ConversionError> {
    Ok(ProtocolMessage {
        header_type: message.header.msg_type.clone(),
        msg_id: message.header.msg_id.clone(),
        parent_msg_id: message.parent_header.as_ref().map(|h| h.msg_id.clone()),
        content: serde_json::to_value(&message.content)?,
    })
}

/// Build a wire request from an outbound channel message.
///
/// The message id is kept so replies can be correlated by the sender.
pub fn to_jupyter(message: &ProtocolMessage) -> Result<JupyterMessage, ConversionError> {
    let content =
        JupyterMessageContent::from_type_and_content(&message.header_type, message.content.clone())?;
    let mut wire = JupyterMessage::new(content, None);
    wire.header.msg_id = message.msg_id.clone();
    Ok(wire)
}
