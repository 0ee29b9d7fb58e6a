use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer, Serialize},
};

/// Default `token_type` when neither the file nor the token endpoint names one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Persisted OAuth credentials, as written by the provider's own CLI.
///
/// Fields this crate does not interpret (`scope`, `id_token`, ...) are kept
/// in `extra` so a refresh-and-save cycle does not drop them.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    #[serde(serialize_with = "serialize_secret")]
    pub refresh_token: Secret<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Milliseconds since the Unix epoch. Absent or zero means expired.
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_date: Option<u64>,
    /// API endpoint override issued alongside the token (Qwen only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CredentialRecord {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
            token_type: default_token_type(),
            expiry_date: None,
            resource_url: None,
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry_date: u64) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    #[must_use]
    pub fn with_resource_url(mut self, resource_url: impl Into<String>) -> Self {
        self.resource_url = Some(resource_url.into());
        self
    }

    /// Reject records that cannot be used for API calls or refreshes.
    pub(crate) fn check_usable(&self) -> Result<(), String> {
        if self.access_token.expose_secret().trim().is_empty() {
            return Err("access_token is empty".into());
        }
        if self.refresh_token.expose_secret().trim().is_empty() {
            return Err("refresh_token is empty".into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expiry_date", &self.expiry_date)
            .field("resource_url", &self.resource_url)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a caller needs to talk to the provider API right now.
#[derive(Clone)]
pub struct AccessGrant {
    pub access_token: Secret<String>,
    pub base_url: String,
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant")
            .field("access_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// Accept integer or float millisecond timestamps; anything else reads as absent.
fn deserialize_expiry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        v.as_u64().or_else(|| {
            v.as_f64()
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| ms as u64)
        })
    }))
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

/// Serialize a `Secret<String>` by exposing its inner value.
/// Only for fields that must round-trip through the credential file.
pub fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}
