//! Per-provider credential lifecycle: lazy load, expiry check, single-flight refresh.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use {
    futures::future::{BoxFuture, FutureExt, Shared},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, RefreshError, Result},
    profile::{ClientSecretSource, OAuthProfile},
    refresh::{ClientCredentials, request_refresh},
    remote_config::ClientConfigCache,
    storage::CredentialStore,
    types::{AccessGrant, CredentialRecord},
    validity::{is_valid, now_ms},
};

type InFlightRefresh = Shared<BoxFuture<'static, std::result::Result<CredentialRecord, RefreshError>>>;

/// Initialization state of an [`OAuthSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Credential path not resolved yet.
    Unconfigured,
    /// Path resolved; credentials not cached yet or a refresh is running.
    Configuring,
    /// Credentials cached and no refresh outstanding.
    Ready,
}

#[derive(Default)]
struct SessionState {
    credentials: Option<CredentialRecord>,
    in_flight: Option<InFlightRefresh>,
}

/// Owns one provider's cached credentials for the life of the process.
pub struct OAuthSession {
    profile: Arc<OAuthProfile>,
    http: reqwest::Client,
    store: OnceLock<CredentialStore>,
    state: Arc<Mutex<SessionState>>,
}

impl OAuthSession {
    pub fn new(profile: OAuthProfile) -> Self {
        Self::with_http_client(profile, reqwest::Client::new())
    }

    pub fn with_http_client(profile: OAuthProfile, http: reqwest::Client) -> Self {
        Self {
            profile: Arc::new(profile),
            http,
            store: OnceLock::new(),
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &OAuthProfile {
        &self.profile
    }

    /// Resolve the credential path. The first resolution wins for the
    /// lifetime of the session; later `configured` values are ignored.
    pub fn configure(&self, configured: Option<&str>) -> &CredentialStore {
        self.store.get_or_init(|| {
            let store = CredentialStore::resolve(&self.profile, configured);
            debug!(
                provider = %self.profile.name,
                path = %store.path().display(),
                "resolved OAuth credential path"
            );
            store
        })
    }

    pub fn credential_path(&self) -> Option<&Path> {
        self.store.get().map(CredentialStore::path)
    }

    pub fn phase(&self) -> SessionPhase {
        if self.store.get().is_none() {
            return SessionPhase::Unconfigured;
        }
        let state = lock(&self.state);
        if state.credentials.is_some() && state.in_flight.is_none() {
            SessionPhase::Ready
        } else {
            SessionPhase::Configuring
        }
    }

    pub fn has_credentials(&self) -> bool {
        lock(&self.state).credentials.is_some()
    }

    pub fn cached_credentials(&self) -> Option<CredentialRecord> {
        lock(&self.state).credentials.clone()
    }

    /// Make sure a usable access token is cached and return it with the API base URL.
    ///
    /// Loads the credential file on first use and refreshes when the cached
    /// token is expired or within the expiry buffer.
    pub async fn ensure_ready(&self, configured: Option<&str>) -> Result<AccessGrant> {
        let store = self.configure(configured);
        let record = match self.cached_credentials() {
            Some(record) => record,
            None => self.load_into_cache(store)?,
        };

        let record = if is_valid(&record, now_ms()) {
            record
        } else {
            debug!(provider = %self.profile.name, "OAuth token expired or near expiry, refreshing");
            self.refresh_with(false).await?
        };

        Ok(AccessGrant {
            access_token: record.access_token.clone(),
            base_url: self.profile.base_url_for(&record),
        })
    }

    /// Refresh regardless of the cached expiry, joining any refresh already running.
    pub async fn refresh(&self) -> Result<CredentialRecord> {
        if !self.has_credentials() {
            let store = self.configure(None);
            self.load_into_cache(store)?;
        }
        self.refresh_with(true).await
    }

    fn load_into_cache(&self, store: &CredentialStore) -> Result<CredentialRecord> {
        let loaded = store.load().inspect_err(|e| {
            warn!(provider = %self.profile.name, error = %e, "OAuth credentials unavailable");
        })?;
        let mut state = lock(&self.state);
        Ok(state.credentials.get_or_insert(loaded).clone())
    }

    async fn refresh_with(&self, force: bool) -> Result<CredentialRecord> {
        let pending = {
            let mut state = lock(&self.state);
            match &state.in_flight {
                Some(pending) => pending.clone(),
                None => {
                    let current = state
                        .credentials
                        .clone()
                        .ok_or(Error::Refresh(RefreshError::MissingRefreshToken))?;
                    // Another caller may have refreshed since this one looked.
                    if !force && is_valid(&current, now_ms()) {
                        return Ok(current);
                    }
                    let pending = self.start_refresh(current);
                    state.in_flight = Some(pending.clone());
                    pending
                },
            }
        };
        Ok(pending.await?)
    }

    fn start_refresh(&self, prior: CredentialRecord) -> InFlightRefresh {
        let profile = Arc::clone(&self.profile);
        let http = self.http.clone();
        let state = Arc::clone(&self.state);
        let store = self.store.get().cloned();

        async move {
            let outcome = match client_credentials(&profile, &http).await {
                Ok(client) => request_refresh(&http, &profile.token_url, &client, &prior).await,
                Err(e) => Err(e),
            };

            {
                let mut state = lock(&state);
                state.in_flight = None;
                if let Ok(record) = &outcome {
                    state.credentials = Some(record.clone());
                }
            }

            match &outcome {
                Ok(record) => {
                    info!(
                        provider = %profile.name,
                        expiry_date = ?record.expiry_date,
                        "OAuth token refreshed"
                    );
                    if let Some(store) = &store
                        && let Err(e) = store.save(record)
                    {
                        warn!(
                            provider = %profile.name,
                            error = %e,
                            "could not persist refreshed credentials, keeping them in memory"
                        );
                    }
                },
                Err(e) => warn!(provider = %profile.name, error = %e, "OAuth token refresh failed"),
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for OAuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSession")
            .field("provider", &self.profile.name)
            .field("credential_path", &self.credential_path())
            .field("phase", &self.phase())
            .finish()
    }
}

async fn client_credentials(
    profile: &OAuthProfile,
    http: &reqwest::Client,
) -> std::result::Result<ClientCredentials, RefreshError> {
    match &profile.client_secret {
        ClientSecretSource::None => Ok(ClientCredentials {
            client_id: profile.client_id.clone(),
            client_secret: None,
        }),
        ClientSecretSource::Remote { config_url } if config_url.trim().is_empty() => {
            Err(RefreshError::ClientConfig(format!(
                "no client configuration URL set for {}",
                profile.name
            )))
        },
        ClientSecretSource::Remote { config_url } => {
            let cache = ClientConfigCache::shared(config_url);
            let remote = cache.get(http).await?;
            let client_id = remote
                .oauth_client_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| profile.client_id.clone());
            Ok(ClientCredentials {
                client_id,
                client_secret: Some(remote.oauth_client_secret.clone()),
            })
        },
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}
