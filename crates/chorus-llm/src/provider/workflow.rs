//! Workflow-style (Dify) app adapter
//!
//! Besides completions, workflow apps offer suggested follow-up questions
//! for a finished answer and a file upload endpoint whose references can be
//! attached to later turns.

use async_trait::async_trait;
use bytes::Bytes;
use chorus_core::ProviderCredentials;
use reqwest::{Client, multipart};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Completion, VendorAdapter};
use crate::convert::workflow::{DEFAULT_USER, WorkflowTranslator, build_request};
use crate::error::LlmError;
use crate::protocol::workflow::{SuggestedQuestions, WorkflowEvent, WorkflowUpload};
use crate::registry::ProviderDefinition;
use crate::types::{CompletionRequest, CompletionResponse};

/// A file to hand to the vendor's upload endpoint
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
    pub user: Option<String>,
}

/// Reference returned by the vendor; `id` goes into an attachment's `upload_file_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

pub struct WorkflowAdapter {
    provider: &'static str,
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl WorkflowAdapter {
    pub fn new(
        definition: &'static ProviderDefinition,
        credentials: &ProviderCredentials,
        client: Client,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            provider: definition.id,
            client,
            base_url: super::resolve_base_url(definition, credentials)?,
            api_key: credentials.api_key.clone(),
        })
    }

    /// Suggested next questions for a finished answer
    pub async fn suggested_questions(&self, message_id: &str, user: Option<&str>) -> Result<Vec<String>, LlmError> {
        let url = suggested_url(&self.base_url, message_id)?;

        let builder = self
            .client
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .query(&[("user", user.unwrap_or(DEFAULT_USER))]);

        let response = super::send(self.provider, builder).await?;
        let suggested: SuggestedQuestions = super::read_json(self.provider, response).await?;

        Ok(suggested.data)
    }

    /// Upload a file for use as a `local_file` attachment
    pub async fn upload(&self, upload: FileUpload) -> Result<UploadedFile, LlmError> {
        let mut part = multipart::Part::bytes(upload.bytes.to_vec()).file_name(upload.file_name);
        if let Some(content_type) = &upload.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| LlmError::BadRequest(format!("invalid content type '{content_type}': {e}")))?;
        }

        let form = multipart::Form::new()
            .part("file", part)
            .text("user", upload.user.unwrap_or_else(|| DEFAULT_USER.to_owned()));

        let builder = self
            .client
            .post(super::endpoint(&self.base_url, "files/upload"))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form);

        let response = super::send(self.provider, builder).await?;
        let uploaded: WorkflowUpload = super::read_json(self.provider, response).await?;

        Ok(UploadedFile {
            id: uploaded.id,
            name: uploaded.name,
            size: uploaded.size,
            mime_type: uploaded.mime_type,
        })
    }
}

/// `messages/{id}/suggested` under the base URL, with the id as one encoded segment
fn suggested_url(base_url: &Url, message_id: &str) -> Result<Url, LlmError> {
    if matches!(message_id.trim(), "" | "." | "..") {
        return Err(LlmError::BadRequest(format!("invalid message id '{message_id}'")));
    }

    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|()| LlmError::Internal(anyhow::anyhow!("base URL '{base_url}' cannot carry a path")))?
        .pop_if_empty()
        .extend(["messages", message_id, "suggested"]);
    Ok(url)
}

#[async_trait]
impl VendorAdapter for WorkflowAdapter {
    fn provider_id(&self) -> &str {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let wire_request = build_request(request);

        let builder = self
            .client
            .post(super::endpoint(&self.base_url, "chat-messages"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&wire_request);

        let response = super::send(self.provider, builder).await?;

        if request.stream {
            return Ok(Completion::Stream(super::translate_stream(
                self.provider,
                response,
                WorkflowTranslator::new(),
            )));
        }

        let event: WorkflowEvent = super::read_json(self.provider, response).await?;
        Ok(Completion::Response(CompletionResponse::from(event)))
    }
}
