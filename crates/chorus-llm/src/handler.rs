//! Axum routes exposing the relay over HTTP
//!
//! Mounted under the configured relay path (default `/api`):
//! - `POST /chat` relays a completion, streaming `text/event-stream`
//! - `GET /providers` lists the registry catalog
//! - `GET /suggested` fetches workflow follow-up questions
//! - `POST /upload` uploads a file to a workflow provider

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use chorus_core::{HttpError, ProviderCredentials};
use futures_util::StreamExt;
use serde::Deserialize;
use url::Url;

use crate::error::LlmError;
use crate::protocol::normalized;
use crate::provider::workflow::FileUpload;
use crate::provider::{ByteStream, Completion};
use crate::relay::{Relay, RelayRequest};

/// Header carrying the API key on `GET /suggested`
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying an optional base URL override on `GET /suggested`
pub const BASE_URL_HEADER: &str = "x-base-url";

/// Build the relay router
pub fn relay_router(relay: Relay) -> Router {
    Router::new()
        .route("/chat", routing::post(chat))
        .route("/providers", routing::get(providers))
        .route("/suggested", routing::get(suggested))
        .route("/upload", routing::post(upload))
        .with_state(relay)
}

/// Handle `POST /chat`
async fn chat(State(relay): State<Relay>, body: Result<Json<RelayRequest>, JsonRejection>) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_body(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let (provider_id, credentials, request) = body.into_parts();

    match relay.relay(&provider_id, &credentials, request).await {
        Ok(Completion::Stream(stream)) => event_stream_response(stream),
        Ok(Completion::Response(response)) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `GET /providers`
async fn providers(State(relay): State<Relay>) -> Response {
    Json(relay.registry().definitions()).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestedQuery {
    provider_id: String,
    message_id: String,
    #[serde(default)]
    user: Option<String>,
}

/// Handle `GET /suggested`
async fn suggested(State(relay): State<Relay>, Query(query): Query<SuggestedQuery>, headers: HeaderMap) -> Response {
    let credentials = match credentials_from_headers(&headers) {
        Ok(credentials) => credentials,
        Err(e) => return error_response(&e),
    };

    match relay
        .suggested_questions(&query.provider_id, &credentials, &query.message_id, query.user.as_deref())
        .await
    {
        Ok(data) => Json(serde_json::json!({ "data": data })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `POST /upload`
async fn upload(State(relay): State<Relay>, multipart: Multipart) -> Response {
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match relay.upload(&form.provider_id, &form.credentials, form.file).await {
        Ok(uploaded) => Json(uploaded).into_response(),
        Err(e) => error_response(&e),
    }
}

struct UploadForm {
    provider_id: String,
    credentials: ProviderCredentials,
    file: FileUpload,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, LlmError> {
    let invalid = |e: axum::extract::multipart::MultipartError| LlmError::BadRequest(format!("invalid form: {e}"));

    let mut provider_id = None;
    let mut api_key = String::new();
    let mut base_url = None;
    let mut user = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "providerId" => provider_id = Some(field.text().await.map_err(invalid)?),
            "apiKey" => api_key = field.text().await.map_err(invalid)?,
            "baseUrl" => {
                let raw = field.text().await.map_err(invalid)?;
                if !raw.trim().is_empty() {
                    base_url = Some(parse_base_url(&raw)?);
                }
            }
            "user" => user = Some(field.text().await.map_err(invalid)?),
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let content_type = field.content_type().map(ToOwned::to_owned);
                let bytes = field.bytes().await.map_err(invalid)?;
                file = Some((file_name, content_type, bytes));
            }
            other => tracing::debug!(field = %other, "ignoring unknown upload field"),
        }
    }

    let provider_id = provider_id.ok_or_else(|| LlmError::BadRequest("providerId is required".to_owned()))?;
    let (file_name, content_type, bytes) = file.ok_or_else(|| LlmError::BadRequest("file is required".to_owned()))?;

    let mut credentials = ProviderCredentials::new(api_key);
    credentials.base_url = base_url;

    Ok(UploadForm {
        provider_id,
        credentials,
        file: FileUpload {
            file_name,
            content_type,
            bytes,
            user,
        },
    })
}

fn credentials_from_headers(headers: &HeaderMap) -> Result<ProviderCredentials, LlmError> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let mut credentials = ProviderCredentials::new(header_str(API_KEY_HEADER).unwrap_or_default());
    if let Some(raw) = header_str(BASE_URL_HEADER) {
        credentials.base_url = Some(parse_base_url(raw)?);
    }

    Ok(credentials)
}

fn parse_base_url(raw: &str) -> Result<Url, LlmError> {
    Url::parse(raw.trim()).map_err(|e| LlmError::BadRequest(format!("invalid base URL '{raw}': {e}")))
}

/// Pass the adapter's frames through as they arrive
///
/// A failure after the headers are sent is written as an in-band error
/// record, which ends the stream without a terminal marker.
fn event_stream_response(stream: ByteStream) -> Response {
    let body = stream.map(|chunk| {
        Ok::<_, Infallible>(match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "relayed stream failed");
                normalized::error_frame(&e.bare_message(), e.error_type())
            }
        })
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// Render an error as `{"error": "<message>"}`
fn error_response(error: &LlmError) -> Response {
    error_body(error.status_code(), error.client_message())
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
