//! Qwen Code provider.
//!
//! Credentials come from `~/.qwen/oauth_creds.json`, written by the `qwen`
//! CLI after its device-flow sign-in. The API is OpenAI-compatible; the
//! endpoint is taken from the record's `resource_url` when present.

use {
    credlink_config::ProviderEntry,
    credlink_oauth::{BaseUrlRule, ClientSecretSource, OAuthProfile},
    secrecy::Secret,
};

use super::{authenticated::PLACEHOLDER_TOKEN, openai_compat::OpenAiCompatClient};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROVIDER_NAME: &str = "qwen-code";
const QWEN_TOKEN_URL: &str = "https://chat.qwen.ai/api/v1/oauth2/token";
const QWEN_CLIENT_ID: &str = "f0304373b74a44d2b584a3fb70ca9e56";
const QWEN_DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const QWEN_CREDS_PATH: &str = ".qwen/oauth_creds.json";
const QWEN_CREDS_ENV: &str = "QWEN_OAUTH_CREDS_PATH";
const QWEN_CONTEXT_WINDOW: u32 = 1_000_000;

pub const DEFAULT_MODEL: &str = "qwen3-coder-plus";

/// Built-in models, used when discovery is unavailable.
pub const QWEN_CODE_MODELS: &[(&str, &str)] = &[
    ("qwen3-coder-plus", "Qwen3 Coder Plus (Qwen OAuth)"),
    ("qwen3-coder-flash", "Qwen3 Coder Flash (Qwen OAuth)"),
    ("qwen3-vl-plus", "Qwen3 VL Plus (Qwen OAuth)"),
];

/// Discovered ids must contain one of these.
pub const MODEL_KEYWORDS: &[&str] = &["qwen", "coder"];

pub fn profile(entry: &ProviderEntry) -> OAuthProfile {
    let base_url = match &entry.base_url {
        Some(url) => BaseUrlRule::Fixed(url.clone()),
        None => BaseUrlRule::ResourceUrl {
            default: QWEN_DEFAULT_BASE_URL.to_string(),
        },
    };
    OAuthProfile {
        name: PROVIDER_NAME.to_string(),
        token_url: entry
            .token_url
            .clone()
            .unwrap_or_else(|| QWEN_TOKEN_URL.to_string()),
        client_id: QWEN_CLIENT_ID.to_string(),
        client_secret: ClientSecretSource::None,
        default_creds_path: QWEN_CREDS_PATH.to_string(),
        creds_path_env: QWEN_CREDS_ENV.to_string(),
        base_url,
    }
}

/// Client bound to the placeholder token, with the headers the Qwen OAuth
/// endpoints expect.
pub fn placeholder_client(model: &str, http: reqwest::Client) -> OpenAiCompatClient {
    OpenAiCompatClient::new(
        PROVIDER_NAME,
        model,
        QWEN_DEFAULT_BASE_URL,
        Secret::new(PLACEHOLDER_TOKEN.to_string()),
    )
    .with_http_client(http)
    .with_header("X-DashScope-AuthType", "qwen-oauth")
    .with_header("X-DashScope-CacheControl", "enable")
    .with_header(
        "User-Agent",
        concat!("credlink/", env!("CARGO_PKG_VERSION")),
    )
    .with_vision(model.contains("-vl"))
    .with_context_window(QWEN_CONTEXT_WINDOW)
}
