//! Minimal OpenAI REST client covering embeddings and chat completions.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

const EMBEDDINGS_PATH: &str = "/v1/embeddings";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Requests wait this long before giving up; completions with reasoning
/// models can take well over a minute.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Convenient result alias returning [`OpenAiError`] failures.
pub type OpenAiResult<T> = Result<T, OpenAiError>;

/// Failures that can occur while talking to the OpenAI API.
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build OpenAI client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send OpenAI request to `{path}`")]
    RequestSend {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The API key was rejected.
    #[error("OpenAI rejected the configured API key")]
    Unauthorized,
    /// The account hit the provider-side rate limit or ran out of quota.
    #[error("OpenAI rate limit or quota exceeded")]
    RateLimited,
    /// Any other non-success status.
    #[error("unexpected OpenAI response status {status} for `{path}`: {detail}")]
    RequestStatus {
        path: &'static str,
        status: StatusCode,
        detail: String,
    },
    /// Response payload could not be parsed.
    #[error("failed to decode OpenAI response for `{path}`")]
    DecodeResponse {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The response parsed but carried no usable payload.
    #[error("OpenAI response for `{path}` was empty")]
    EmptyResponse { path: &'static str },
}

/// One message of a chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// `"system"` or `"user"`.
    pub role: &'static str,
    /// Message body.
    pub content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// HTTP client for the embeddings and chat completions endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
}

impl OpenAiClient {
    /// Build a client against `base_url` (usually `https://api.openai.com`).
    pub fn new(base_url: &str, api_key: &str) -> OpenAiResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| OpenAiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::<str>::from(base_url.trim_end_matches('/')),
            api_key: Arc::<str>::from(api_key),
        })
    }

    /// Embed `input` with `model`, returning the raw vector.
    pub async fn embed(&self, model: &str, input: &str) -> OpenAiResult<Vec<f32>> {
        let response = self
            .post(EMBEDDINGS_PATH, &EmbeddingRequest { model, input })
            .await?;
        let payload: EmbeddingResponse = decode(EMBEDDINGS_PATH, response).await?;
        payload
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or(OpenAiError::EmptyResponse {
                path: EMBEDDINGS_PATH,
            })
    }

    /// Run a chat completion and return the first choice's text.
    pub async fn complete(
        &self,
        model: &str,
        temperature: f32,
        messages: &[ChatMessage],
    ) -> OpenAiResult<String> {
        let response = self
            .post(
                CHAT_COMPLETIONS_PATH,
                &CompletionRequest {
                    model,
                    messages,
                    temperature,
                },
            )
            .await?;
        let payload: CompletionResponse = decode(CHAT_COMPLETIONS_PATH, response).await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(OpenAiError::EmptyResponse {
                path: CHAT_COMPLETIONS_PATH,
            })
    }

    async fn post<T>(&self, path: &'static str, body: &T) -> OpenAiResult<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.as_ref())
            .json(body)
            .send()
            .await
            .map_err(|source| OpenAiError::RequestSend { path, source })?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(OpenAiError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(OpenAiError::RateLimited),
            status if status.is_success() => Ok(response),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(OpenAiError::RequestStatus {
                    path,
                    status,
                    detail,
                })
            }
        }
    }
}

async fn decode<T>(path: &'static str, response: reqwest::Response) -> OpenAiResult<T>
where
    T: DeserializeOwned,
{
    response
        .json::<T>()
        .await
        .map_err(|source| OpenAiError::DecodeResponse { path, source })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn embedding_response_ignores_usage_and_model_fields() {
        let payload: EmbeddingResponse = serde_json::from_value(json!({
            "object": "list",
            "model": "text-embedding-3-small",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, -0.2, 0.3]}],
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        }))
        .unwrap();
        assert_eq!(payload.data.len(), 1);
        assert_eq!(payload.data[0].embedding, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn completion_response_yields_first_choice_text() {
        let payload: CompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "about 6 months"}},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
            ]
        }))
        .unwrap();
        let first = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        assert_eq!(first.as_deref(), Some("about 6 months"));
    }

    #[test]
    fn completion_response_tolerates_null_content() {
        let payload: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert!(payload.choices[0].message.content.is_none());
    }

    #[test]
    fn completion_request_serializes_roles_in_order() {
        let messages = vec![
            ChatMessage {
                role: "system",
                content: "You are a mission design assistant.".into(),
            },
            ChatMessage {
                role: "user",
                content: "How long to Mars?".into(),
            },
        ];
        let body = serde_json::to_value(CompletionRequest {
            model: "o3",
            messages: &messages,
            temperature: 0.1,
        })
        .unwrap();
        assert_eq!(body["model"], "o3");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "How long to Mars?");
    }
}
