//! Mock vendor backend for integration tests
//!
//! Serves canned responses in all four wire protocols from one listener:
//! `OpenAI` chat completions, Anthropic messages, Gemini
//! `generateContent`, and a Dify-style workflow app with follow-up
//! suggestions and file upload.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

/// Key the mock rejects with 401
pub const REJECTED_KEY: &str = "bad-key";

/// Model that streams one chunk and then stalls
pub const SLOW_MODEL: &str = "slow";

/// Model whose stream contains a truncated JSON line
pub const BROKEN_MODEL: &str = "broken";

/// Anthropic model that reports an error event after one text fragment
pub const OVERLOADED_MODEL: &str = "overloaded";

/// One request as the mock saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<Recorded>>,
}

impl MockState {
    fn record(&self, path: impl Into<String>, headers: &HeaderMap, body: serde_json::Value) {
        self.requests.lock().unwrap().push(Recorded {
            path: path.into(),
            headers: headers.clone(),
            body,
        });
    }
}

/// Mock vendor that returns predictable responses
pub struct MockVendor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockVendor {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(openai_chat))
            .route("/v1/messages", routing::post(anthropic_messages))
            .route("/v1beta/models/{action}", routing::post(gemini_generate))
            .route("/v1/chat-messages", routing::post(workflow_chat))
            .route("/v1/messages/{id}/suggested", routing::get(workflow_suggested))
            .route("/v1/files/upload", routing::post(workflow_upload))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for the `OpenAI`, Anthropic, and workflow protocols
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for the Gemini protocol
    pub fn gemini_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Requests received on paths starting with `prefix`
    pub fn requests_to(&self, prefix: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path.starts_with(prefix)).collect()
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn sse(body: impl Into<String>) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body.into()).into_response()
}

fn openai_chunk(content: &str) -> String {
    let chunk = serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": content}}],
    });
    format!("data: {chunk}\n\n")
}

async fn openai_chat(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.record("/v1/chat/completions", &headers, body.clone());

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if authorization == format!("Bearer {REJECTED_KEY}") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}})),
        )
            .into_response();
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();

    if body["stream"] != true {
        return Json(serde_json::json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello from openai"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 3, "total_tokens": 6}
        }))
        .into_response();
    }

    match model.as_str() {
        SLOW_MODEL => {
            let first = stream::iter([Ok::<_, Infallible>(Bytes::from(openai_chunk("partial")))]);
            let rest = stream::once(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Bytes::from(format!("{}data: [DONE]\n\n", openai_chunk(" never"))))
            });
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(first.chain(rest)),
            )
                .into_response()
        }
        BROKEN_MODEL => sse(format!(
            "{}data: {{\"choices\":[{{\n\n{}data: [DONE]\n\n",
            openai_chunk("Hi"),
            openai_chunk(" there")
        )),
        _ => {
            let usage = serde_json::json!({
                "id": "chatcmpl-mock",
                "choices": [],
                "usage": {"prompt_tokens": 3, "completion_tokens": 3, "total_tokens": 6}
            });
            sse(format!(
                "{}{}data: {usage}\n\ndata: [DONE]\n\n",
                openai_chunk("Hello"),
                openai_chunk(" from openai")
            ))
        }
    }
}

async fn anthropic_messages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.record("/v1/messages", &headers, body.clone());

    if body["stream"] != true {
        return Json(serde_json::json!({
            "id": "msg_mock",
            "model": body["model"],
            "content": [{"type": "text", "text": "Hello from anthropic"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 3}
        }))
        .into_response();
    }

    if body["model"] == OVERLOADED_MODEL {
        return sse(concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_mock\",\"usage\":{\"input_tokens\":5}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"partial\"}}\n\n",
            "event: error\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        ));
    }

    sse(concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_mock\",\"usage\":{\"input_tokens\":5}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"pondering\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello from anthropic\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":2}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    ))
}

async fn gemini_generate(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.record(format!("/v1beta/models/{action}"), &headers, body);

    if !action.ends_with(":streamGenerateContent") {
        return Json(serde_json::json!({
            "responseId": "gem-1",
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello from gemini"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        }))
        .into_response();
    }

    sse(concat!(
        "data: {\"responseId\":\"gem-1\",\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hello\"}]}}]}\n\n",
        "data: {\"responseId\":\"gem-1\",\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\" from gemini\"}]},\"finishReason\":\"STOP\"}],",
        "\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":2,\"totalTokenCount\":5}}\n\n",
    ))
}

async fn workflow_chat(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.record("/v1/chat-messages", &headers, body.clone());

    let conversation_id = body["conversation_id"].as_str().unwrap_or("conv-new").to_owned();

    if body["response_mode"] == "blocking" {
        return Json(serde_json::json!({
            "event": "message",
            "message_id": "msg-w",
            "conversation_id": conversation_id,
            "answer": "Hello from workflow"
        }))
        .into_response();
    }

    let message = serde_json::json!({
        "event": "message",
        "message_id": "msg-w",
        "conversation_id": conversation_id,
        "answer": "Hello from workflow"
    });
    let end = serde_json::json!({
        "event": "message_end",
        "message_id": "msg-w",
        "conversation_id": conversation_id,
        "metadata": {"usage": {"prompt_tokens": 4, "completion_tokens": 3, "total_tokens": 7}}
    });

    sse(format!("data: {message}\n\ndata: {end}\n\n"))
}

async fn workflow_suggested(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(format!("/v1/messages/{id}/suggested"), &headers, serde_json::Value::Null);

    Json(serde_json::json!({
        "result": "success",
        "data": ["What else?", "Tell me more"]
    }))
    .into_response()
}

async fn workflow_upload(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut file_name = String::new();
    let mut size = 0;
    let mut user = String::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().unwrap_or_default().to_owned();
                size = field.bytes().await.map(|b| b.len()).unwrap_or_default();
            }
            "user" => user = field.text().await.unwrap_or_default(),
            _ => {}
        }
    }

    state.record(
        "/v1/files/upload",
        &headers,
        serde_json::json!({"file_name": file_name, "size": size, "user": user}),
    );

    Json(serde_json::json!({
        "id": "file-1",
        "name": file_name,
        "size": size,
        "mime_type": "text/plain"
    }))
    .into_response()
}
