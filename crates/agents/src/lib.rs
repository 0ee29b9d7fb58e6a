//! Chat model handles for OAuth-backed providers (Qwen Code, Gemini CLI).

pub mod model;
pub mod providers;

pub use {
    model::{ChatMessage, CompletionResponse, ContentPart, LlmProvider, StreamEvent, UserContent},
    providers::{DiscoveredModel, OAuthProviderKind, OAuthProviders},
};
