//! OAuth credential lifecycle for CLI-issued provider tokens.
//!
//! A provider's own CLI writes `oauth_creds.json`; this crate loads it,
//! checks expiry, refreshes through the provider's token endpoint (one
//! request at a time per provider), writes the result back, and retries
//! API calls that were rejected with a 401.

pub mod error;
pub mod profile;
pub mod refresh;
pub mod remote_config;
pub mod retry;
pub mod session;
pub mod storage;
pub mod types;
pub mod validity;

pub use {
    error::{Error, RefreshError, Result},
    profile::{BaseUrlRule, ClientSecretSource, OAuthProfile, normalize_resource_url},
    refresh::{ClientCredentials, request_refresh},
    remote_config::{ClientConfigCache, RemoteClientConfig},
    retry::{AuthorizationFailure, call_with_retry},
    session::{OAuthSession, SessionPhase},
    storage::{CredentialStore, expand_path},
    types::{AccessGrant, CredentialRecord, DEFAULT_TOKEN_TYPE, serialize_secret},
    validity::{EXPIRY_BUFFER_MS, is_valid, now_ms},
};
