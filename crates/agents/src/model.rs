use std::pin::Pin;

use {async_trait::async_trait, tokio_stream::Stream};

/// A message in an OpenAI-style chat conversation.
#[derive(Debug, Clone)]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// User message content: plain text or text plus images.
#[derive(Debug, Clone)]
pub enum UserContent {
    Text(String),
    Multimodal(Vec<ContentPart>),
}

#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    /// Base64 image data with its MIME type.
    Image { media_type: String, data: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(content.into()),
        }
    }

    pub fn user_multimodal(parts: Vec<ContentPart>) -> Self {
        Self::User {
            content: UserContent::Multimodal(parts),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content,
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// Chat Completions wire format.
    pub fn to_openai_value(&self) -> serde_json::Value {
        match self {
            Self::System { content } => serde_json::json!({ "role": "system", "content": content }),
            Self::User {
                content: UserContent::Text(text),
            } => serde_json::json!({ "role": "user", "content": text }),
            Self::User {
                content: UserContent::Multimodal(parts),
            } => {
                let blocks: Vec<serde_json::Value> = parts.iter().map(content_part_value).collect();
                serde_json::json!({ "role": "user", "content": blocks })
            },
            Self::Assistant {
                content,
                tool_calls,
            } if tool_calls.is_empty() => serde_json::json!({
                "role": "assistant",
                "content": content.as_deref().unwrap_or(""),
            }),
            Self::Assistant {
                content,
                tool_calls,
            } => {
                let calls: Vec<serde_json::Value> = tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments.to_string() },
                        })
                    })
                    .collect();
                let mut msg = serde_json::json!({ "role": "assistant", "tool_calls": calls });
                if let Some(text) = content {
                    msg["content"] = serde_json::Value::String(text.clone());
                }
                msg
            },
            Self::Tool {
                tool_call_id,
                content,
            } => serde_json::json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        }
    }
}

fn content_part_value(part: &ContentPart) -> serde_json::Value {
    match part {
        ContentPart::Text(text) => serde_json::json!({ "type": "text", "text": text }),
        ContentPart::Image { media_type, data } => serde_json::json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{media_type};base64,{data}") },
        }),
    }
}

// ── Stream events ───────────────────────────────────────────────────────────

/// Events emitted during streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Text content delta.
    Delta(String),
    ToolCallStart {
        id: String,
        name: String,
        index: usize,
    },
    /// JSON fragment of a tool call's arguments.
    ToolCallArgumentsDelta {
        index: usize,
        delta: String,
    },
    ToolCallComplete {
        index: usize,
    },
    Done(Usage),
    Error(String),
}

/// Boxed event stream borrowing from its provider.
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>>;

/// A chat model reachable over some API.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider id, e.g. `qwen-code`.
    fn name(&self) -> &str;

    /// Model identifier, e.g. `qwen3-coder-plus`.
    fn id(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<CompletionResponse>;

    fn supports_tools(&self) -> bool {
        false
    }

    /// Context window size in tokens.
    fn context_window(&self) -> u32 {
        128_000
    }

    fn supports_vision(&self) -> bool {
        false
    }

    /// Stream a completion, yielding delta/done/error events.
    fn stream(&self, messages: Vec<ChatMessage>) -> EventStream<'_>;

    /// Stream with tool schemas. Falls back to [`LlmProvider::stream`].
    fn stream_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        _tools: Vec<serde_json::Value>,
    ) -> EventStream<'_> {
        self.stream(messages)
    }
}

/// Response from a non-streaming completion.
#[derive(Debug)]
pub struct CompletionResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
}
