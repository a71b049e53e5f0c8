//! Workflow-style (Dify) app API wire format types

use serde::{Deserialize, Serialize};

use crate::types::{Attachment, Usage};

// -- Request types --

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRequest {
    pub inputs: serde_json::Map<String, serde_json::Value>,
    pub query: String,
    /// "streaming" or "blocking"
    pub response_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub user: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
}

// -- Response types --

/// A stream event, or the whole answer in blocking mode
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// `message` and `agent_message`
    #[serde(default)]
    pub answer: Option<String>,
    /// `message_end`
    #[serde(default)]
    pub metadata: Option<WorkflowMetadata>,
    /// `error`
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// `GET /messages/{id}/suggested`
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestedQuestions {
    #[serde(default)]
    pub data: Vec<String>,
}

/// `POST /files/upload`
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowUpload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
}
