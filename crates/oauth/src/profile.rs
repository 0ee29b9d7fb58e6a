use {tracing::warn, url::Url};

use crate::types::CredentialRecord;

/// Where the refresh request gets its `client_secret` from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSecretSource {
    /// Public client: no secret is sent.
    None,
    /// Fetched once per process from a JSON document
    /// `{ "oauthClientId": ..., "oauthClientSecret": ... }`.
    Remote { config_url: String },
}

/// How the API base URL is derived for a credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseUrlRule {
    Fixed(String),
    /// Use the record's `resource_url` when present, normalized to
    /// `https://<host>/v1`; otherwise `default`.
    ResourceUrl { default: String },
}

/// Everything that differs between OAuth-backed providers.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    /// Provider id used in logs and config, e.g. `qwen-code`.
    pub name: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: ClientSecretSource,
    /// Credential file path relative to the home directory.
    pub default_creds_path: String,
    /// Environment variable that overrides the credential file path.
    pub creds_path_env: String,
    pub base_url: BaseUrlRule,
}

impl OAuthProfile {
    /// Resolve the API base URL for `record`.
    pub fn base_url_for(&self, record: &CredentialRecord) -> String {
        match &self.base_url {
            BaseUrlRule::Fixed(url) => url.clone(),
            BaseUrlRule::ResourceUrl { default } => match record.resource_url.as_deref() {
                Some(raw) if !raw.trim().is_empty() => {
                    let normalized = normalize_resource_url(raw);
                    if Url::parse(&normalized).is_ok() {
                        normalized
                    } else {
                        warn!(
                            provider = %self.name,
                            resource_url = raw,
                            "ignoring unparseable resource_url"
                        );
                        default.clone()
                    }
                },
                _ => default.clone(),
            },
        }
    }
}

/// Ensure an `https://` scheme (unless one is present) and a `/v1` suffix.
pub fn normalize_resource_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    if with_scheme.ends_with("/v1") {
        with_scheme
    } else {
        format!("{with_scheme}/v1")
    }
}
