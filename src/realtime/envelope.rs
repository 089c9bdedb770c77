use crate::errors::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound realtime frame: `{"type": ..., "data": ..., "timestamp": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    /// ISO string on most streams, epoch millis on some
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        serde_json::from_str(text).map_err(|e| ClientError::Parse(format!("Invalid envelope: {}", e)))
    }
}
