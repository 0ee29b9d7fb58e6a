//! Remote OAuth client configuration, fetched once per process.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock, Mutex},
    time::Duration,
};

use {
    secrecy::Secret,
    serde::Deserialize,
    tokio::sync::OnceCell,
    tracing::{debug, warn},
};

use crate::error::RefreshError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Client identity published by the provider.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteClientConfig {
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Secret<String>,
}

impl std::fmt::Debug for RemoteClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClientConfig")
            .field("oauth_client_id", &self.oauth_client_id)
            .field("oauth_client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Caches one config document. Failed fetches are not cached.
#[derive(Debug)]
pub struct ClientConfigCache {
    url: String,
    cell: OnceCell<RemoteClientConfig>,
}

static CACHES: LazyLock<Mutex<HashMap<String, Arc<ClientConfigCache>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

impl ClientConfigCache {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cell: OnceCell::new(),
        }
    }

    /// Process-wide cache for `url`.
    pub fn shared(url: &str) -> Arc<Self> {
        let mut caches = CACHES.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            caches
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(Self::new(url))),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch on first use, then serve the cached document.
    pub async fn get(&self, http: &reqwest::Client) -> Result<&RemoteClientConfig, RefreshError> {
        self.cell
            .get_or_try_init(|| fetch_client_config(http, &self.url))
            .await
    }
}

async fn fetch_client_config(
    http: &reqwest::Client,
    url: &str,
) -> Result<RemoteClientConfig, RefreshError> {
    debug!(url, "fetching OAuth client configuration");
    let resp = http
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| RefreshError::ClientConfig(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!(url, status = %status, "OAuth client configuration fetch failed");
        return Err(RefreshError::ClientConfig(format!("HTTP {status}: {body}")));
    }

    resp.json::<RemoteClientConfig>()
        .await
        .map_err(|e| RefreshError::ClientConfig(format!("invalid document: {e}")))
}
