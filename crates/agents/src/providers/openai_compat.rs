//! Minimal Chat Completions client for OpenAI-compatible endpoints.
//!
//! Bound to one base URL and one bearer token; OAuth handling lives in
//! [`super::authenticated`].

use std::{collections::HashSet, time::Duration};

use {
    async_trait::async_trait,
    futures::StreamExt,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, trace, warn},
};

use {
    super::{
        DiscoveredModel,
        sse::{parse_tool_calls, parse_usage, response_events, to_openai_tools},
    },
    crate::model::{ChatMessage, CompletionResponse, EventStream, LlmProvider, StreamEvent},
};

const MODELS_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Clone)]
pub struct OpenAiCompatClient {
    provider: String,
    model: String,
    base_url: String,
    api_key: Secret<String>,
    headers: Vec<(String, String)>,
    http: reqwest::Client,
    vision: bool,
    context_window: u32,
}

impl OpenAiCompatClient {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Secret<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            headers: Vec::new(),
            http: reqwest::Client::new(),
            vision: false,
            context_window: 128_000,
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Extra header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    #[must_use]
    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = tokens;
        self
    }

    /// Same client pointed at another endpoint with another token.
    #[must_use]
    pub fn with_credentials(&self, base_url: impl Into<String>, api_key: Secret<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.headers.iter().fold(
            builder.bearer_auth(self.api_key.expose_secret()),
            |builder, (name, value)| builder.header(name.as_str(), value.as_str()),
        )
    }

    fn chat_body(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
        stream: bool,
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> =
            messages.iter().map(ChatMessage::to_openai_value).collect();
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(to_openai_tools(tools));
        }
        body
    }

    /// POST a chat request and reject non-2xx responses.
    ///
    /// 401 becomes [`credlink_oauth::Error::Unauthorized`] so callers can
    /// refresh the token and retry.
    async fn post_chat(&self, body: &serde_json::Value) -> anyhow::Result<reqwest::Response> {
        trace!(body = %body, provider = %self.provider, "chat request body");
        let resp = self
            .request(self.http.post(self.endpoint("chat/completions")))
            .json(body)
            .send()
            .await?;
        check_status(&self.provider, resp).await
    }

    /// Start a streaming completion.
    ///
    /// Status is checked before the first event, so authorization failures
    /// surface as errors here rather than as [`StreamEvent::Error`].
    pub async fn open_stream(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<serde_json::Value>,
    ) -> anyhow::Result<EventStream<'static>> {
        let body = self.chat_body(&messages, &tools, true);
        debug!(
            provider = %self.provider,
            model = %self.model,
            messages_count = messages.len(),
            tools_count = tools.len(),
            "opening chat stream"
        );
        let resp = self.post_chat(&body).await?;
        Ok(response_events(resp))
    }

    /// `GET {base}/models`.
    pub async fn list_models(&self) -> anyhow::Result<Vec<DiscoveredModel>> {
        let resp = self
            .request(self.http.get(self.endpoint("models")))
            .timeout(MODELS_TIMEOUT)
            .send()
            .await?;
        let resp = check_status(&self.provider, resp).await?;
        let payload: serde_json::Value = resp.json().await?;
        Ok(parse_models_payload(&payload))
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

async fn check_status(provider: &str, resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        debug!(provider, body = %body, "API rejected access token");
        return Err(credlink_oauth::Error::Unauthorized {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    warn!(provider, status = %status, body = %body, "API error");
    anyhow::bail!("{provider} API error HTTP {status}: {body}")
}

/// Model ids from a `/models` response (`data`, `models`, or a bare array).
pub(crate) fn parse_models_payload(payload: &serde_json::Value) -> Vec<DiscoveredModel> {
    let entries: Vec<&serde_json::Value> = match payload {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(map) => ["data", "models"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(serde_json::Value::as_array))
            .flatten()
            .collect(),
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(parse_model_entry)
        .filter(|model| seen.insert(model.id.clone()))
        .collect()
}

fn parse_model_entry(entry: &serde_json::Value) -> Option<DiscoveredModel> {
    let raw_id = entry
        .as_str()
        .or_else(|| entry.get("id").and_then(serde_json::Value::as_str))
        .or_else(|| entry.get("name").and_then(serde_json::Value::as_str))?;
    // Gemini prefixes ids with `models/`.
    let id = raw_id.strip_prefix("models/").unwrap_or(raw_id).trim();
    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return None;
    }

    let display_name = entry
        .get("display_name")
        .or_else(|| entry.get("displayName"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or(id);
    let created_at = entry.get("created").and_then(serde_json::Value::as_i64);

    Some(DiscoveredModel::new(id, display_name).with_created_at(created_at))
}

#[async_trait]
impl LlmProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.provider
    }

    fn id(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn context_window(&self) -> u32 {
        self.context_window
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<CompletionResponse> {
        debug!(
            provider = %self.provider,
            model = %self.model,
            messages_count = messages.len(),
            tools_count = tools.len(),
            "complete request"
        );
        let body = self.chat_body(messages, tools, false);
        let resp: serde_json::Value = self.post_chat(&body).await?.json().await?;
        trace!(response = %resp, "raw completion response");

        let message = &resp["choices"][0]["message"];
        Ok(CompletionResponse {
            text: message["content"].as_str().map(str::to_string),
            tool_calls: parse_tool_calls(message),
            usage: parse_usage(&resp["usage"]),
        })
    }

    fn stream(&self, messages: Vec<ChatMessage>) -> EventStream<'_> {
        self.stream_with_tools(messages, Vec::new())
    }

    fn stream_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<serde_json::Value>,
    ) -> EventStream<'_> {
        Box::pin(async_stream::stream! {
            match self.open_stream(messages, tools).await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        yield event;
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error(format!("{e:#}"));
                }
            }
        })
    }
}
