use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredlinkConfig {
    pub providers: ProvidersConfig,
}

/// OAuth-backed provider settings keyed by provider id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Known keys: "qwen-code", "gemini-cli". Unknown keys are kept.
    #[serde(flatten)]
    pub providers: HashMap<String, ProviderEntry>,
}

impl ProvidersConfig {
    /// Settings for `provider`, or defaults when the provider is not configured.
    pub fn entry(&self, provider: &str) -> ProviderEntry {
        self.providers.get(provider).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, provider: &str) -> bool {
        self.providers.get(provider).is_none_or(|entry| entry.enabled)
    }
}

/// Configuration for a single OAuth-backed provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderEntry {
    /// Whether this provider is enabled. Defaults to true.
    pub enabled: bool,

    /// Credential file location. `~` expands to the home directory.
    pub oauth_creds_path: Option<String>,

    /// Override the API base URL.
    pub base_url: Option<String>,

    /// Override the token refresh endpoint.
    pub token_url: Option<String>,

    /// Override the remote OAuth client configuration document.
    pub client_config_url: Option<String>,

    /// Default model ID for this provider.
    pub model: Option<String>,

    /// Extra model IDs offered in addition to the built-in list.
    pub models: Vec<String>,
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            oauth_creds_path: None,
            base_url: None,
            token_url: None,
            client_config_url: None,
            model: None,
            models: Vec::new(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_flatten_from_toml() {
        let cfg: CredlinkConfig = toml::from_str(
            r#"
            [providers.qwen-code]
            oauth_creds_path = "~/work/qwen.json"
            model = "qwen3-coder-flash"

            [providers.gemini-cli]
            enabled = false
            models = ["gemini-2.5-flash-lite"]
            "#,
        )
        .unwrap();

        let qwen = cfg.providers.entry("qwen-code");
        assert!(qwen.enabled);
        assert_eq!(qwen.oauth_creds_path.as_deref(), Some("~/work/qwen.json"));
        assert_eq!(qwen.model.as_deref(), Some("qwen3-coder-flash"));

        assert!(!cfg.providers.is_enabled("gemini-cli"));
        assert_eq!(cfg.providers.entry("gemini-cli").models, vec![
            "gemini-2.5-flash-lite".to_string()
        ]);
    }

    #[test]
    fn missing_provider_uses_defaults() {
        let cfg = CredlinkConfig::default();
        assert!(cfg.providers.is_enabled("qwen-code"));
        assert_eq!(cfg.providers.entry("qwen-code"), ProviderEntry::default());
    }
}
