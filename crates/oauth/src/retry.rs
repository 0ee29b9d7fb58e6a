use std::future::Future;

use tracing::warn;

use crate::{error::Error, session::OAuthSession};

/// Errors that can tell whether the API rejected the presented token.
pub trait AuthorizationFailure {
    fn is_authorization_failure(&self) -> bool;
}

impl AuthorizationFailure for Error {
    fn is_authorization_failure(&self) -> bool {
        self.is_unauthorized()
    }
}

impl AuthorizationFailure for anyhow::Error {
    fn is_authorization_failure(&self) -> bool {
        self.chain().any(|cause| {
            cause.downcast_ref::<Error>().is_some_and(Error::is_unauthorized)
                || cause
                    .downcast_ref::<reqwest::Error>()
                    .and_then(reqwest::Error::status)
                    == Some(reqwest::StatusCode::UNAUTHORIZED)
        })
    }
}

/// Run `call`; on a 401 with cached credentials, force one refresh and run it once more.
///
/// Any other failure, and any failure of the second attempt, is returned as is.
pub async fn call_with_retry<T, E, F, Fut>(session: &OAuthSession, mut call: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: AuthorizationFailure + From<Error>,
{
    match call().await {
        Err(e) if e.is_authorization_failure() && session.has_credentials() => {
            warn!(
                provider = %session.name(),
                "API rejected OAuth token, refreshing and retrying once"
            );
            session.refresh().await.map_err(E::from)?;
            call().await
        },
        outcome => outcome,
    }
}
