//! OAuth-backed providers and the registry that owns their sessions.

pub mod authenticated;
pub mod gemini_cli;
pub mod openai_compat;
pub mod qwen_code;
pub mod sse;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
    sync::Arc,
};

use {
    credlink_config::{CredlinkConfig, ProviderEntry, ProvidersConfig},
    credlink_oauth::{OAuthProfile, OAuthSession, call_with_retry},
    tracing::{debug, info, warn},
};

use {
    self::{
        authenticated::{AuthenticatedProvider, RebindableProvider},
        openai_compat::OpenAiCompatClient,
    },
    crate::model::LlmProvider,
};

/// Shared HTTP client for the OAuth sessions and the model clients.
pub fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::LazyLock<reqwest::Client> =
        std::sync::LazyLock::new(reqwest::Client::new);
    &CLIENT
}

/// A model listed by a provider's `/models` endpoint or its built-in catalog.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveredModel {
    pub id: String,
    pub display_name: String,
    /// Unix timestamp from the API. `None` for built-in entries.
    pub created_at: Option<i64>,
}

impl DiscoveredModel {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: Option<i64>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProviderKind {
    QwenCode,
    GeminiCli,
}

impl OAuthProviderKind {
    pub const ALL: [Self; 2] = [Self::QwenCode, Self::GeminiCli];

    pub fn id(self) -> &'static str {
        match self {
            Self::QwenCode => qwen_code::PROVIDER_NAME,
            Self::GeminiCli => gemini_cli::PROVIDER_NAME,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::QwenCode => qwen_code::DEFAULT_MODEL,
            Self::GeminiCli => gemini_cli::DEFAULT_MODEL,
        }
    }

    pub fn static_models(self) -> Vec<DiscoveredModel> {
        let catalog = match self {
            Self::QwenCode => qwen_code::QWEN_CODE_MODELS,
            Self::GeminiCli => gemini_cli::GEMINI_CLI_MODELS,
        };
        catalog
            .iter()
            .map(|(id, name)| DiscoveredModel::new(*id, *name))
            .collect()
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::QwenCode => qwen_code::MODEL_KEYWORDS,
            Self::GeminiCli => gemini_cli::MODEL_KEYWORDS,
        }
    }

    fn profile(self, entry: &ProviderEntry) -> OAuthProfile {
        match self {
            Self::QwenCode => qwen_code::profile(entry),
            Self::GeminiCli => gemini_cli::profile(entry),
        }
    }

    fn placeholder_client(self, model: &str, http: reqwest::Client) -> OpenAiCompatClient {
        match self {
            Self::QwenCode => qwen_code::placeholder_client(model, http),
            Self::GeminiCli => gemini_cli::placeholder_client(model, http),
        }
    }

    /// Whether a discovered model id belongs to this provider's families.
    pub fn matches_model(self, model_id: &str) -> bool {
        let id = model_id.to_ascii_lowercase();
        self.keywords().iter().any(|kw| id.contains(kw))
    }
}

impl fmt::Display for OAuthProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for OAuthProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qwen-code" | "qwen" => Ok(Self::QwenCode),
            "gemini-cli" | "gemini" => Ok(Self::GeminiCli),
            other => anyhow::bail!("unknown OAuth provider '{other}' (expected qwen-code or gemini-cli)"),
        }
    }
}

/// Owns one [`OAuthSession`] per provider for the life of the process.
///
/// Model handles built here share their provider's session, so the
/// credential file is read once and refreshes are never duplicated.
pub struct OAuthProviders {
    config: ProvidersConfig,
    http: reqwest::Client,
    qwen_code: Arc<OAuthSession>,
    gemini_cli: Arc<OAuthSession>,
}

impl OAuthProviders {
    pub fn from_config(config: &CredlinkConfig) -> Self {
        Self::with_http_client(config.providers.clone(), shared_http_client().clone())
    }

    pub fn with_http_client(config: ProvidersConfig, http: reqwest::Client) -> Self {
        let session = |kind: OAuthProviderKind| {
            let profile = kind.profile(&config.entry(kind.id()));
            Arc::new(OAuthSession::with_http_client(profile, http.clone()))
        };
        let qwen_code = session(OAuthProviderKind::QwenCode);
        let gemini_cli = session(OAuthProviderKind::GeminiCli);
        Self {
            config,
            http,
            qwen_code,
            gemini_cli,
        }
    }

    pub fn session(&self, kind: OAuthProviderKind) -> Arc<OAuthSession> {
        match kind {
            OAuthProviderKind::QwenCode => Arc::clone(&self.qwen_code),
            OAuthProviderKind::GeminiCli => Arc::clone(&self.gemini_cli),
        }
    }

    pub fn entry(&self, kind: OAuthProviderKind) -> ProviderEntry {
        self.config.entry(kind.id())
    }

    pub fn is_enabled(&self, kind: OAuthProviderKind) -> bool {
        self.config.is_enabled(kind.id())
    }

    /// Configured credential path override, if any.
    pub fn creds_path(&self, kind: OAuthProviderKind) -> Option<String> {
        self.entry(kind).oauth_creds_path
    }

    /// Build a model handle. No I/O happens until the handle is first used.
    pub fn get_model_instance(
        &self,
        kind: OAuthProviderKind,
        model: Option<&str>,
    ) -> anyhow::Result<Arc<dyn LlmProvider>> {
        if !self.is_enabled(kind) {
            anyhow::bail!("provider {kind} is disabled in configuration");
        }
        let entry = self.entry(kind);
        let model = model
            .map(str::to_string)
            .or(entry.model)
            .unwrap_or_else(|| kind.default_model().to_string());
        debug!(provider = %kind, model = %model, "building OAuth model handle");

        let placeholder = kind.placeholder_client(&model, self.http.clone());
        Ok(Arc::new(AuthenticatedProvider::new(
            placeholder,
            self.session(kind),
            entry.oauth_creds_path,
        )))
    }

    /// Models reported by the provider's `/models` endpoint.
    ///
    /// Never fails: any credential, refresh, or network error is logged and
    /// yields an empty list so callers fall back to the built-in catalog.
    pub async fn get_dynamic_models(&self, kind: OAuthProviderKind) -> Vec<DiscoveredModel> {
        if !self.is_enabled(kind) {
            return Vec::new();
        }
        let session = self.session(kind);
        let creds_path = self.creds_path(kind);
        let placeholder = kind.placeholder_client(kind.default_model(), self.http.clone());

        let session_ref = session.as_ref();
        let creds = creds_path.as_deref();
        let client = &placeholder;
        let outcome = call_with_retry(session_ref, move || async move {
            let grant = session_ref.ensure_ready(creds).await?;
            client.rebind(&grant).list_models().await
        })
        .await;

        match outcome {
            Ok(models) => {
                let total = models.len();
                let filtered: Vec<DiscoveredModel> = models
                    .into_iter()
                    .filter(|m| kind.matches_model(&m.id))
                    .collect();
                debug!(
                    provider = %kind,
                    discovered = total,
                    kept = filtered.len(),
                    "discovered models"
                );
                filtered
            },
            Err(e) => {
                let signed_out = e
                    .downcast_ref::<credlink_oauth::Error>()
                    .is_some_and(|err| matches!(err, credlink_oauth::Error::CredentialLoad { .. }));
                if signed_out {
                    info!(provider = %kind, error = %e, "not signed in, using built-in model list");
                } else {
                    warn!(
                        provider = %kind,
                        error = %format!("{e:#}"),
                        "model discovery failed, using built-in model list"
                    );
                }
                Vec::new()
            },
        }
    }

    /// Discovered models merged with the built-in catalog and any extra
    /// model ids listed in configuration.
    pub async fn available_models(&self, kind: OAuthProviderKind) -> Vec<DiscoveredModel> {
        let discovered = self.get_dynamic_models(kind).await;
        merge_models(discovered, kind.static_models(), &self.entry(kind).models)
    }
}

impl fmt::Debug for OAuthProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthProviders")
            .field("qwen_code", &self.qwen_code)
            .field("gemini_cli", &self.gemini_cli)
            .finish_non_exhaustive()
    }
}

/// Discovered entries first, then built-in entries not already present,
/// then configured extras. Blank display names fall back to the catalog.
fn merge_models(
    discovered: Vec<DiscoveredModel>,
    fallback: Vec<DiscoveredModel>,
    extras: &[String],
) -> Vec<DiscoveredModel> {
    let fallback_names: HashMap<String, String> = fallback
        .iter()
        .map(|m| (m.id.clone(), m.display_name.clone()))
        .collect();
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for mut model in discovered {
        if model.display_name.trim().is_empty() {
            model.display_name = fallback_names
                .get(&model.id)
                .cloned()
                .unwrap_or_else(|| model.id.clone());
        }
        if seen.insert(model.id.clone()) {
            merged.push(model);
        }
    }
    for model in fallback {
        if seen.insert(model.id.clone()) {
            merged.push(model);
        }
    }
    for id in extras {
        let id = id.trim();
        if !id.is_empty() && seen.insert(id.to_string()) {
            merged.push(DiscoveredModel::new(id, id));
        }
    }
    merged
}
