//! `grant_type=refresh_token` exchange.

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::{error::RefreshError, types::CredentialRecord, validity::now_ms};

/// Client identity sent with a refresh request.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    resource_url: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchange `prior`'s refresh token for a fresh credential record.
pub async fn request_refresh(
    http: &reqwest::Client,
    token_url: &str,
    client: &ClientCredentials,
    prior: &CredentialRecord,
) -> Result<CredentialRecord, RefreshError> {
    let refresh_token = prior.refresh_token.expose_secret();
    if refresh_token.trim().is_empty() {
        return Err(RefreshError::MissingRefreshToken);
    }

    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
        ("client_id", client.client_id.as_str()),
    ];
    if let Some(secret) = &client.client_secret {
        form.push(("client_secret", secret.expose_secret().as_str()));
    }

    debug!(token_url, client_id = %client.client_id, "requesting token refresh");
    let resp = http
        .post(token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    if !status.is_success() {
        warn!(token_url, status = %status, body = %body, "token refresh rejected");
        return Err(match parse_error_field(&body) {
            Some(endpoint_error) => endpoint_error,
            None => RefreshError::Status {
                status: status.as_u16(),
                body,
            },
        });
    }

    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| RefreshError::InvalidResponse(format!("{e}: {body}")))?;
    record_from_response(parsed, prior, now_ms())
}

fn parse_error_field(body: &str) -> Option<RefreshError> {
    let parsed: TokenResponse = serde_json::from_str(body).ok()?;
    endpoint_error(&parsed)
}

fn endpoint_error(resp: &TokenResponse) -> Option<RefreshError> {
    resp.error.as_ref().map(|error| RefreshError::Endpoint {
        error: error.clone(),
        description: resp.error_description.clone().unwrap_or_default(),
    })
}

fn record_from_response(
    resp: TokenResponse,
    prior: &CredentialRecord,
    now: u64,
) -> Result<CredentialRecord, RefreshError> {
    if let Some(err) = endpoint_error(&resp) {
        return Err(err);
    }

    let access_token = resp
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RefreshError::InvalidResponse("missing access_token".into()))?;
    let expires_in = resp
        .expires_in
        .ok_or_else(|| RefreshError::InvalidResponse("missing expires_in".into()))?;

    // Refresh tokens are not always rotated.
    let refresh_token = match resp.refresh_token.filter(|t| !t.is_empty()) {
        Some(rotated) => Secret::new(rotated),
        None => prior.refresh_token.clone(),
    };

    Ok(CredentialRecord {
        access_token: Secret::new(access_token),
        refresh_token,
        token_type: resp
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| crate::types::DEFAULT_TOKEN_TYPE.to_string()),
        expiry_date: Some(now.saturating_add(expires_in.saturating_mul(1000))),
        resource_url: resp.resource_url.or_else(|| prior.resource_url.clone()),
        extra: prior.extra.clone(),
    })
}
