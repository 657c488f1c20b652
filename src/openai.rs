use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("OpenAI API error: status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no completion choices returned")]
    Empty,
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self { client: Client::new(), api_key, base_url }
    }

    /// Requests a chat completion and extracts the first choice's message
    /// content. Provider errors surface with their own status and message.
    pub async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        info!("requesting chat completion from '{}'", model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { model, messages })
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_default();
            error!("chat completion failed with status {}: {}", status, message);
            return Err(ChatError::Api { status: status.as_u16(), message });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ChatError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn hello() -> Vec<ChatMessage> {
        vec![ChatMessage { role: "user".into(), content: "Hello!".into() }]
    }

    #[tokio::test]
    async fn complete_extracts_first_choice_content() {
        let stub = Router::new().route(
            "/chat/completions",
            post(|| async {
                Json(json!({
                    "choices": [
                        {"message": {"role": "assistant", "content": "Hi there!"}},
                        {"message": {"role": "assistant", "content": "ignored"}},
                    ],
                }))
            }),
        );
        let base = spawn(stub).await;
        let client = OpenAiClient::with_base_url("key".into(), base);

        let content = client.complete("gpt-3.5-turbo", &hello()).await.unwrap();
        assert_eq!(content, "Hi there!");
    }

    #[tokio::test]
    async fn provider_error_passes_status_and_message_through() {
        let stub = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"code": "invalid_api_key", "message": "Incorrect API key"}})),
                )
            }),
        );
        let base = spawn(stub).await;
        let client = OpenAiClient::with_base_url("bad".into(), base);

        match client.complete("gpt-3.5-turbo", &hello()).await {
            Err(ChatError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_reported_not_panicked() {
        let stub = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = spawn(stub).await;
        let client = OpenAiClient::with_base_url("key".into(), base);

        assert!(matches!(client.complete("gpt-3.5-turbo", &hello()).await, Err(ChatError::Empty)));
    }
}
