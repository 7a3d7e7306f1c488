//! DeepSeek client: OpenAI-compatible /chat/completions with optional JSON output mode.

use crate::llm::{AnswerProducer, AskOptions, ConversationMode, RemoteServiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

const CHAT_PROMPT: &str = "You are Chimera, a helpful assistant talking to a user in a Telegram chat. Answer concisely in the language the user writes in.";
const REASONER_PROMPT: &str = "You are Chimera, an assistant talking to a user in a Telegram chat. Think the question through, then give a clear final answer in the language the user writes in.";
const JSON_INSTRUCTION: &str = "Respond with a JSON object of the form {\"answer\": \"<your reply to the user>\"} and nothing else.";

/// Client for the DeepSeek chat API.
#[derive(Clone)]
pub struct DeepSeekClient {
    base_url: String,
    api_key: Option<String>,
    /// Overrides the mode's default model when set.
    model: Option<String>,
    client: reqwest::Client,
}

impl DeepSeekClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>, model: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            model: model.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    fn model_for(&self, mode: ConversationMode) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| mode.default_model().to_string())
    }

    fn build_request(&self, text: &str, user_id: i64, options: &AskOptions) -> ChatCompletionRequest {
        let mut system = match options.mode {
            ConversationMode::Chat => CHAT_PROMPT.to_string(),
            ConversationMode::Reasoner => REASONER_PROMPT.to_string(),
        };
        if options.use_structured {
            system.push(' ');
            system.push_str(JSON_INSTRUCTION);
        }
        ChatCompletionRequest {
            model: self.model_for(options.mode),
            messages: vec![
                RequestMessage {
                    role: "system",
                    content: system,
                },
                RequestMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            stream: false,
            user: user_id.to_string(),
            response_format: options.use_structured.then(|| ResponseFormat {
                typ: "json_object",
            }),
        }
    }

    /// POST /chat/completions: returns the assistant message content.
    async fn chat_completion(&self, body: &ChatCompletionRequest) -> Result<String, RemoteServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(RemoteServiceError::NotConfigured("deepseek api key"))?;
        let url = format!("{}/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(RemoteServiceError::Api(format!("{} {}", status, body)));
        }
        let data: ChatCompletionResponse = res.json().await?;
        if let Some(err) = data.error {
            return Err(RemoteServiceError::Api(err.message));
        }
        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| RemoteServiceError::MalformedResponse("no choices in response".to_string()))
    }
}

/// Pull the user-facing answer out of the message content.
fn extract_answer(content: &str, use_structured: bool) -> Result<String, RemoteServiceError> {
    let answer = if use_structured {
        let parsed: StructuredAnswer = serde_json::from_str(content.trim())
            .map_err(|e| RemoteServiceError::MalformedResponse(format!("invalid json answer: {}", e)))?;
        parsed.answer
    } else {
        content.to_string()
    };
    if answer.trim().is_empty() {
        return Err(RemoteServiceError::MalformedResponse("empty answer".to_string()));
    }
    Ok(answer)
}

#[async_trait]
impl AnswerProducer for DeepSeekClient {
    async fn ask(
        &self,
        text: &str,
        user_id: i64,
        options: &AskOptions,
    ) -> Result<String, RemoteServiceError> {
        let body = self.build_request(text, user_id, options);
        log::debug!("deepseek: asking {} for user {}", body.model, user_id);
        let content = self.chat_completion(&body).await?;
        extract_answer(&content, options.use_structured)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<RequestMessage>,
    stream: bool,
    user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    typ: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StructuredAnswer {
    answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    /// Serve `router` on a free local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }

    fn client(base_url: Option<String>) -> DeepSeekClient {
        DeepSeekClient::new(base_url, Some("sk-test".to_string()), None)
    }

    #[test]
    fn request_uses_mode_model_and_json_format() {
        let options = AskOptions {
            use_structured: true,
            mode: ConversationMode::Reasoner,
        };
        let body = serde_json::to_value(client(None).build_request("hello", 7, &options)).unwrap();
        assert_eq!(body["model"], "deepseek-reasoner");
        assert_eq!(body["user"], "7");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("\"answer\""));
    }

    #[test]
    fn configured_model_overrides_mode_and_plain_mode_has_no_format() {
        let c = DeepSeekClient::new(None, None, Some("my-model".to_string()));
        let body = serde_json::to_value(c.build_request("hi", 1, &AskOptions::default())).unwrap();
        assert_eq!(body["model"], "my-model");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn extract_answer_handles_both_modes() {
        assert_eq!(extract_answer("plain text", false).unwrap(), "plain text");
        assert_eq!(
            extract_answer(" {\"answer\": \"hi there\"} ", true).unwrap(),
            "hi there"
        );
        assert!(matches!(
            extract_answer("not json", true),
            Err(RemoteServiceError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_answer("{\"answer\": \"  \"}", true),
            Err(RemoteServiceError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn ask_returns_structured_answer_from_server() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["messages"][1]["content"], "hello");
                Json(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "{\"answer\": \"hi there\"}" } }]
                }))
            }),
        );
        let base = serve(router).await;
        let options = AskOptions {
            use_structured: true,
            mode: ConversationMode::Chat,
        };
        let answer = client(Some(base)).ask("hello", 7, &options).await.unwrap();
        assert_eq!(answer, "hi there");
    }

    #[tokio::test]
    async fn ask_maps_http_errors_to_api_error() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let base = serve(router).await;
        let err = client(Some(base))
            .ask("hello", 7, &AskOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteServiceError::Api(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn ask_without_api_key_is_not_configured() {
        let c = DeepSeekClient::new(None, None, None);
        let err = c.ask("hello", 7, &AskOptions::default()).await.unwrap_err();
        assert!(matches!(err, RemoteServiceError::NotConfigured(_)));
    }
}
