use serde::{Deserialize, Serialize};

use super::message::{Message, Role};

/// Vendor-neutral completion request
///
/// Built fresh for every dispatch and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Kept apart from `messages`; each adapter places it where its vendor expects
    pub system_prompt: Option<String>,
    pub params: CompletionParams,
    pub stream: bool,
    /// Ask the vendor to stream its reasoning
    pub enable_thinking: Option<bool>,
    pub files: Vec<Attachment>,
    /// Input variables for workflow-style apps
    pub workflow_inputs: serde_json::Map<String, serde_json::Value>,
    /// Conversation issued by a workflow-style vendor on an earlier turn
    pub conversation_id: Option<String>,
    /// End-user identifier for workflow-style vendors
    pub user: Option<String>,
}

impl CompletionRequest {
    /// A streaming request for `model` with the given messages
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            ..Self::default()
        }
    }

    pub fn thinking_enabled(&self) -> bool {
        self.enable_thinking.unwrap_or(false)
    }

    /// Text of the most recent user message
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Attachments that reference a publicly reachable URL
    pub fn remote_files(&self) -> impl Iterator<Item = &Attachment> {
        self.files
            .iter()
            .filter(|f| f.transfer_method == TransferMethod::RemoteUrl && f.url.is_some())
    }
}

/// Generation parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// File attached to a user turn
///
/// Serialized in the field layout workflow-style vendors accept directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub transfer_method: TransferMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Reference returned by a prior upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn remote(kind: AttachmentKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            transfer_method: TransferMethod::RemoteUrl,
            url: Some(url.into()),
            upload_file_id: None,
            mime_type: None,
        }
    }

    pub fn uploaded(kind: AttachmentKind, upload_file_id: impl Into<String>) -> Self {
        Self {
            kind,
            transfer_method: TransferMethod::LocalFile,
            url: None,
            upload_file_id: Some(upload_file_id.into()),
            mime_type: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
    Audio,
    Video,
    Custom,
}

/// How the vendor obtains the attachment's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    RemoteUrl,
    LocalFile,
}
