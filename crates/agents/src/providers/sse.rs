//! Chat Completions streaming: SSE framing and chunk accumulation.

use std::collections::BTreeMap;

use {futures::StreamExt, tracing::trace};

use crate::model::{EventStream, StreamEvent, ToolCall, Usage};

/// Splits raw bytes into SSE `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim().strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

/// Outcome of feeding one `data:` payload to a [`ChunkAccumulator`].
#[derive(Debug, PartialEq)]
pub enum SseStep {
    Events(Vec<StreamEvent>),
    Done,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Tracks streamed tool calls and usage across chunks.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    tool_calls: BTreeMap<usize, PendingToolCall>,
    usage: Usage,
}

impl ChunkAccumulator {
    pub fn on_data(&mut self, data: &str) -> SseStep {
        if data == "[DONE]" {
            return SseStep::Done;
        }
        let Ok(chunk) = serde_json::from_str::<serde_json::Value>(data) else {
            trace!(data, "skipping non-JSON SSE payload");
            return SseStep::Events(Vec::new());
        };

        if let Some(err) = chunk.get("error").filter(|e| !e.is_null()) {
            let message = err["message"].as_str().map_or_else(|| err.to_string(), str::to_string);
            return SseStep::Events(vec![StreamEvent::Error(message)]);
        }

        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            self.usage = parse_usage(usage);
        }

        let mut events = Vec::new();
        let delta = &chunk["choices"][0]["delta"];

        if let Some(text) = delta["content"].as_str()
            && !text.is_empty()
        {
            events.push(StreamEvent::Delta(text.to_string()));
        }

        for tc in delta["tool_calls"].as_array().into_iter().flatten() {
            let index = tc["index"].as_u64().unwrap_or(0) as usize;
            if let (Some(id), Some(name)) = (tc["id"].as_str(), tc["function"]["name"].as_str()) {
                self.tool_calls.insert(index, PendingToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: String::new(),
                });
                events.push(StreamEvent::ToolCallStart {
                    id: id.to_string(),
                    name: name.to_string(),
                    index,
                });
            }
            if let Some(fragment) = tc["function"]["arguments"].as_str()
                && !fragment.is_empty()
            {
                if let Some(pending) = self.tool_calls.get_mut(&index) {
                    pending.arguments.push_str(fragment);
                }
                events.push(StreamEvent::ToolCallArgumentsDelta {
                    index,
                    delta: fragment.to_string(),
                });
            }
        }

        SseStep::Events(events)
    }

    /// Tool calls assembled so far, with arguments parsed as JSON.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .values()
            .map(|pending| ToolCall {
                id: pending.id.clone(),
                name: pending.name.clone(),
                arguments: parse_arguments(&pending.arguments),
            })
            .collect()
    }

    /// Closing events: one completion per tool call, then `Done`.
    pub fn finish(&self) -> Vec<StreamEvent> {
        self.tool_calls
            .keys()
            .map(|index| StreamEvent::ToolCallComplete { index: *index })
            .chain(std::iter::once(StreamEvent::Done(self.usage.clone())))
            .collect()
    }
}

/// Turn an accepted streaming response into events.
pub fn response_events(resp: reqwest::Response) -> EventStream<'static> {
    Box::pin(async_stream::stream! {
        let mut body = resp.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut acc = ChunkAccumulator::default();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield StreamEvent::Error(e.to_string());
                    return;
                }
            };
            for data in decoder.push(&chunk) {
                match acc.on_data(&data) {
                    SseStep::Done => {
                        for event in acc.finish() {
                            yield event;
                        }
                        return;
                    }
                    SseStep::Events(events) => {
                        for event in events {
                            yield event;
                        }
                    }
                }
            }
        }

        // Upstream closed without `[DONE]`.
        for event in acc.finish() {
            yield event;
        }
    })
}

pub fn parse_usage(usage: &serde_json::Value) -> Usage {
    Usage {
        input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        cache_read_tokens: usage["prompt_tokens_details"]["cached_tokens"]
            .as_u64()
            .unwrap_or(0) as u32,
    }
}

/// Tool calls from a non-streaming `choices[0].message`.
pub fn parse_tool_calls(message: &serde_json::Value) -> Vec<ToolCall> {
    message["tool_calls"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|tc| {
            Some(ToolCall {
                id: tc["id"].as_str()?.to_string(),
                name: tc["function"]["name"].as_str()?.to_string(),
                arguments: parse_arguments(tc["function"]["arguments"].as_str().unwrap_or("{}")),
            })
        })
        .collect()
}

/// Wrap `{name, description, parameters}` schemas as Chat Completions tools.
pub fn to_openai_tools(tools: &[serde_json::Value]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .filter_map(|tool| {
            let name = tool["name"].as_str()?;
            Some(serde_json::json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": tool["description"].as_str().unwrap_or(""),
                    "parameters": tool["parameters"].clone(),
                },
            }))
        })
        .collect()
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_split_lines_and_utf8() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: {\"x\":\"é\"}\n\ndata: [DONE]\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        let payloads = decoder.push(&bytes[split..]);
        assert_eq!(payloads, vec!["{\"x\":\"é\"}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn decoder_ignores_comments_and_event_lines() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.push(b": keep-alive\nevent: message\ndata:{\"a\":1}\r\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn accumulates_text_and_usage() {
        let mut acc = ChunkAccumulator::default();
        let step = acc.on_data(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#);
        assert_eq!(step, SseStep::Events(vec![StreamEvent::Delta("Hel".into())]));
        acc.on_data(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3,"prompt_tokens_details":{"cached_tokens":4}}}"#,
        );
        assert_eq!(acc.on_data("[DONE]"), SseStep::Done);
        assert_eq!(acc.finish(), vec![StreamEvent::Done(Usage {
            input_tokens: 12,
            output_tokens: 3,
            cache_read_tokens: 4,
        })]);
    }

    #[test]
    fn accumulates_streamed_tool_call() {
        let mut acc = ChunkAccumulator::default();
        acc.on_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"grep","arguments":""}}]}}]}"#,
        );
        acc.on_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"pattern\":"}}]}}]}"#,
        );
        acc.on_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"todo\"}"}}]}}]}"#,
        );

        let calls = acc.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "grep");
        assert_eq!(calls[0].arguments, serde_json::json!({ "pattern": "todo" }));
        assert_eq!(acc.finish()[0], StreamEvent::ToolCallComplete { index: 0 });
    }

    #[test]
    fn error_chunk_becomes_error_event() {
        let mut acc = ChunkAccumulator::default();
        let step = acc.on_data(r#"{"error":{"message":"quota exceeded","code":"Throttling"}}"#);
        assert_eq!(
            step,
            SseStep::Events(vec![StreamEvent::Error("quota exceeded".into())])
        );
    }

    #[test]
    fn parses_non_streaming_tool_calls() {
        let message = serde_json::json!({
            "tool_calls": [
                {"id": "c1", "function": {"name": "ls", "arguments": "{\"dir\":\".\"}"}},
                {"function": {"name": "missing_id"}}
            ]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["dir"], ".");
    }

    #[test]
    fn converts_tool_schemas() {
        let tools = to_openai_tools(&[serde_json::json!({
            "name": "read_file",
            "description": "Read a file",
            "parameters": {"type": "object", "properties": {"path": {"type": "string"}}}
        })]);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "read_file");
        assert_eq!(tools[0]["function"]["parameters"]["type"], "object");
    }
}
