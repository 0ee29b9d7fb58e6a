//! Gemini provider backed by the Gemini CLI's Google OAuth credentials.
//!
//! Credentials come from `~/.gemini/oauth_creds.json`. Google's token
//! endpoint requires the client secret, which is read from a client
//! configuration document and cached for the life of the process.

use {
    credlink_config::ProviderEntry,
    credlink_oauth::{BaseUrlRule, ClientSecretSource, OAuthProfile},
    secrecy::Secret,
};

use super::{authenticated::PLACEHOLDER_TOKEN, openai_compat::OpenAiCompatClient};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROVIDER_NAME: &str = "gemini-cli";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GEMINI_CLI_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const GEMINI_CREDS_PATH: &str = ".gemini/oauth_creds.json";
const GEMINI_CREDS_ENV: &str = "GEMINI_OAUTH_CREDS_PATH";
/// Fallback for `providers.gemini-cli.client_config_url`.
pub const CLIENT_CONFIG_URL_ENV: &str = "GEMINI_OAUTH_CLIENT_CONFIG_URL";
const GEMINI_CONTEXT_WINDOW: u32 = 1_048_576;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Built-in models, used when discovery is unavailable.
pub const GEMINI_CLI_MODELS: &[(&str, &str)] = &[
    ("gemini-2.5-pro", "Gemini 2.5 Pro (Gemini CLI OAuth)"),
    ("gemini-2.5-flash", "Gemini 2.5 Flash (Gemini CLI OAuth)"),
    ("gemini-2.5-flash-lite", "Gemini 2.5 Flash Lite (Gemini CLI OAuth)"),
];

/// Discovered ids must contain one of these.
pub const MODEL_KEYWORDS: &[&str] = &["gemini"];

pub fn profile(entry: &ProviderEntry) -> OAuthProfile {
    let config_url = entry
        .client_config_url
        .clone()
        .or_else(|| std::env::var(CLIENT_CONFIG_URL_ENV).ok())
        .unwrap_or_default();
    OAuthProfile {
        name: PROVIDER_NAME.to_string(),
        token_url: entry
            .token_url
            .clone()
            .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
        client_id: GEMINI_CLI_CLIENT_ID.to_string(),
        client_secret: ClientSecretSource::Remote { config_url },
        default_creds_path: GEMINI_CREDS_PATH.to_string(),
        creds_path_env: GEMINI_CREDS_ENV.to_string(),
        base_url: BaseUrlRule::Fixed(
            entry
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_OPENAI_BASE_URL.to_string()),
        ),
    }
}

pub fn placeholder_client(model: &str, http: reqwest::Client) -> OpenAiCompatClient {
    OpenAiCompatClient::new(
        PROVIDER_NAME,
        model,
        GEMINI_OPENAI_BASE_URL,
        Secret::new(PLACEHOLDER_TOKEN.to_string()),
    )
    .with_http_client(http)
    .with_vision(true)
    .with_context_window(GEMINI_CONTEXT_WINDOW)
}
