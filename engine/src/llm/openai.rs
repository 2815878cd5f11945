use super::{ChatResponse, LLMError, LLMProvider, Message};
use crate::config::LlmConfig;
use async_trait::async_trait;
use sdk::{EngineError, ToolSchema};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Any endpoint speaking the OpenAI chat completions API
pub struct OpenAICompatibleProvider {
    base_url: String,
    api_key: Option<String>,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl OpenAICompatibleProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            headers: HashMap::new(),
            client,
        })
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Build from config. The key comes from `api_key`, else from the
    /// environment variable named by `api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, EngineError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.trim().is_empty());

        if api_key.is_none() {
            warn!(
                "No API key configured (set {} or llm.api_key); sending unauthenticated requests",
                config.api_key_env
            );
        }

        Ok(
            Self::new(&config.base_url, api_key, Duration::from_secs(config.timeout_secs))?
                .with_headers(config.headers.clone()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        tools: Option<&[ToolSchema]>,
    ) -> super::Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut payload = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let specs: Vec<_> = tools.iter().map(ToolSchema::to_function_tool).collect();
            payload["tools"] = json!(specs);
            payload["tool_choice"] = json!("auto");
        }

        debug!("POST {} ({} messages)", url, messages.len());

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else if e.is_connect() {
                LLMError::ProviderUnavailable(e.to_string())
            } else {
                LLMError::NetworkError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LLMError::AuthenticationFailed(text));
            } else if status.as_u16() == 429 {
                return Err(LLMError::RateLimitExceeded);
            } else {
                return Err(LLMError::InvalidRequest(format!("{}: {}", status, text)));
            }
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        debug!(
            "Received {} choice(s), usage {:?}",
            data.choices.len(),
            data.usage
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAICompatibleProvider {
        OpenAICompatibleProvider::new(
            format!("{}/v1/", server.uri()),
            Some("sk-test".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_chat_sends_tools_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "hi"},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tools = vec![ToolSchema::new(
            "read_file",
            "Read a file",
            json!({"type": "object", "properties": {}}),
        )];
        let response = provider(&server)
            .chat(&[Message::user("hello")], "gpt-test", Some(tools.as_slice()))
            .await
            .unwrap();
        assert_eq!(response.choices[0].message.content_str(), "hi");

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let p = provider(&server);
        let msgs = [Message::user("x")];
        assert!(matches!(
            p.chat(&msgs, "m", None).await,
            Err(LLMError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            p.chat(&msgs, "m", None).await,
            Err(LLMError::RateLimitExceeded)
        ));
        assert!(matches!(
            p.chat(&msgs, "m", None).await,
            Err(LLMError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_applies_timeout_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("x-org", "acme"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = LlmConfig {
            base_url: server.uri(),
            api_key: Some("sk-test".to_string()),
            timeout_secs: 1,
            headers: HashMap::from([("X-Org".to_string(), "acme".to_string())]),
            ..LlmConfig::default()
        };
        let p = OpenAICompatibleProvider::from_config(&config).unwrap();
        assert_eq!(p.base_url(), server.uri());

        let started = std::time::Instant::now();
        let err = p.chat(&[Message::user("x")], "m", None).await.unwrap_err();
        assert!(matches!(err, LLMError::Timeout), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let p =
            OpenAICompatibleProvider::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap();
        let err = p.chat(&[Message::user("x")], "m", None).await.unwrap_err();
        assert!(matches!(
            err,
            LLMError::ProviderUnavailable(_) | LLMError::NetworkError(_) | LLMError::Timeout
        ));
    }
}
