use std::{error::Error as StdError, path::PathBuf};

use credlink_common::FromMessage;

/// Failures of a token refresh round-trip.
///
/// `Clone` so a single in-flight refresh can hand the same outcome to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("token endpoint returned {error}: {description}")]
    Endpoint { error: String, description: String },
    #[error("token refresh request failed: {0}")]
    Transport(String),
    #[error("malformed token response: {0}")]
    InvalidResponse(String),
    #[error("failed to fetch OAuth client configuration: {0}")]
    ClientConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "failed to load OAuth credentials from {}: {reason} (sign in with the provider's CLI to create this file)",
        .path.display()
    )]
    CredentialLoad { path: PathBuf, reason: String },
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("failed to persist OAuth credentials to {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },
    #[error("request unauthorized (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error("{message}")]
    Message { message: String },
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this is an HTTP 401 from an authenticated API.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Unauthorized { .. } => true,
            Self::Reqwest(e) => e.status() == Some(reqwest::StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

credlink_common::impl_context!();
