//! OpenAI-compatible chat completions client (also serves Azure deployments).

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use super::{LlmError, LlmResult, PromptRequest, TextGenerator};
use crate::config::GenerationConfig;

/// How the API key is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure OpenAI)
    ApiKey,
}

impl FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bearer" => Ok(AuthScheme::Bearer),
            "api-key" | "api_key" | "apikey" => Ok(AuthScheme::ApiKey),
            other => Err(format!("unknown auth scheme '{other}' (expected bearer or api-key)")),
        }
    }
}

pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    auth: AuthScheme,
    api_version: Option<String>,
    temperature_override: Option<f32>,
    max_tokens_cap: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        auth: AuthScheme,
        timeout: Duration,
    ) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Init(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            auth,
            api_version: None,
            temperature_override: None,
            max_tokens_cap: None,
        })
    }

    /// Build from settings; the API key comes from the environment.
    pub fn from_config(config: &GenerationConfig) -> LlmResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::MissingApiKey(config.api_key_env.clone()))?;
        let auth = config.auth.parse::<AuthScheme>().map_err(LlmError::Init)?;

        let mut client = Self::new(
            &config.endpoint,
            api_key,
            &config.model,
            auth,
            Duration::from_secs(config.timeout_secs),
        )?;
        client.api_version = config.api_version.clone();
        client.temperature_override = config.temperature;
        client.max_tokens_cap = config.max_tokens;
        Ok(client)
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }
}

impl TextGenerator for ChatClient {
    fn generate(&self, request: &PromptRequest) -> LlmResult<String> {
        let max_tokens = match self.max_tokens_cap {
            Some(cap) => request.max_tokens.min(cap),
            None => request.max_tokens,
        };
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.temperature_override.unwrap_or(request.temperature),
            max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        builder = match self.auth {
            AuthScheme::Bearer => builder.bearer_auth(&self.api_key),
            AuthScheme::ApiKey => builder.header("api-key", &self.api_key),
        };
        if let Some(version) = &self.api_version {
            builder = builder.query(&[("api-version", version)]);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Http(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: ChatResponse = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        tracing::debug!(
            target: "llm",
            "Model {} replied with {} chars",
            self.model,
            content.len()
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: &str, auth: AuthScheme) -> ChatClient {
        ChatClient::new(url, "secret", "gpt-test", auth, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_auth_scheme_parse() {
        assert_eq!("Bearer".parse::<AuthScheme>().unwrap(), AuthScheme::Bearer);
        assert_eq!("api-key".parse::<AuthScheme>().unwrap(), AuthScheme::ApiKey);
        assert!("basic".parse::<AuthScheme>().is_err());
    }

    #[test]
    fn test_generate_returns_first_choice() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJsonString(
                r#"{"model":"gpt-test","max_tokens":150}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  hello  "}}]}"#)
            .create();

        let request = PromptRequest::new("sys", "user").with_max_tokens(150);
        let reply = client(&server.url(), AuthScheme::Bearer).generate(&request).unwrap();
        mock.assert();
        assert_eq!(reply, "hello");
    }

    #[test]
    fn test_api_key_header_and_version_query() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("api-key", "secret")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2024-02-01".into()))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
            .create();

        let reply = client(&server.url(), AuthScheme::ApiKey)
            .with_api_version("2024-02-01")
            .generate(&PromptRequest::new("s", "u"))
            .unwrap();
        mock.assert();
        assert_eq!(reply, "ok");
    }

    #[test]
    fn test_error_statuses() {
        let mut server = mockito::Server::new();
        let _limited = server.mock("POST", "/chat/completions").with_status(429).create();
        let err = client(&server.url(), AuthScheme::Bearer)
            .generate(&PromptRequest::new("s", "u"))
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited));

        let mut server = mockito::Server::new();
        let _failing = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create();
        let err = client(&server.url(), AuthScheme::Bearer)
            .generate(&PromptRequest::new("s", "u"))
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 500, .. }));
    }

    #[test]
    fn test_empty_content_is_an_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":null}}]}"#)
            .create();
        let err = client(&server.url(), AuthScheme::Bearer)
            .generate(&PromptRequest::new("s", "u"))
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
