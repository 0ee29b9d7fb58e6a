//! Model handle that authenticates lazily and retries once on 401.

use std::sync::Arc;

use {
    async_trait::async_trait,
    credlink_oauth::{AccessGrant, OAuthSession, call_with_retry},
    futures::StreamExt,
};

use {
    super::openai_compat::OpenAiCompatClient,
    crate::model::{ChatMessage, CompletionResponse, EventStream, LlmProvider, StreamEvent},
};

/// Token sent by a handle that has not authenticated yet. Never leaves the process.
pub const PLACEHOLDER_TOKEN: &str = "oauth-pending";

/// A provider that can be re-pointed at a live endpoint and token.
#[async_trait]
pub trait RebindableProvider: LlmProvider + Sized + 'static {
    fn rebind(&self, grant: &AccessGrant) -> Self;

    /// Open a stream whose HTTP status has already been checked.
    async fn open_stream(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<serde_json::Value>,
    ) -> anyhow::Result<EventStream<'static>>;
}

#[async_trait]
impl RebindableProvider for OpenAiCompatClient {
    fn rebind(&self, grant: &AccessGrant) -> Self {
        self.with_credentials(grant.base_url.clone(), grant.access_token.clone())
    }

    async fn open_stream(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<serde_json::Value>,
    ) -> anyhow::Result<EventStream<'static>> {
        OpenAiCompatClient::open_stream(self, messages, tools).await
    }
}

/// Wraps a placeholder-bound provider.
///
/// `complete`, `stream` and `stream_with_tools` first make sure the session
/// holds a valid token, then run against a client bound to it through
/// [`call_with_retry`]. Everything else answers from the placeholder.
pub struct AuthenticatedProvider<P> {
    placeholder: P,
    session: Arc<OAuthSession>,
    creds_path: Option<String>,
}

impl<P: RebindableProvider> AuthenticatedProvider<P> {
    pub fn new(placeholder: P, session: Arc<OAuthSession>, creds_path: Option<String>) -> Self {
        Self {
            placeholder,
            session,
            creds_path,
        }
    }

    pub fn session(&self) -> &OAuthSession {
        &self.session
    }

    pub fn placeholder(&self) -> &P {
        &self.placeholder
    }

    async fn live_client(&self) -> anyhow::Result<P> {
        let grant = self.session.ensure_ready(self.creds_path.as_deref()).await?;
        Ok(self.placeholder.rebind(&grant))
    }
}

#[async_trait]
impl<P: RebindableProvider> LlmProvider for AuthenticatedProvider<P> {
    fn name(&self) -> &str {
        self.placeholder.name()
    }

    fn id(&self) -> &str {
        self.placeholder.id()
    }

    fn supports_tools(&self) -> bool {
        self.placeholder.supports_tools()
    }

    fn context_window(&self) -> u32 {
        self.placeholder.context_window()
    }

    fn supports_vision(&self) -> bool {
        self.placeholder.supports_vision()
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> anyhow::Result<CompletionResponse> {
        call_with_retry(&self.session, move || async move {
            let client = self.live_client().await?;
            client.complete(messages, tools).await
        })
        .await
    }

    fn stream(&self, messages: Vec<ChatMessage>) -> EventStream<'_> {
        self.stream_with_tools(messages, Vec::new())
    }

    fn stream_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<serde_json::Value>,
    ) -> EventStream<'_> {
        Box::pin(async_stream::stream! {
            let (messages, tools) = (&messages, &tools);
            let opened = call_with_retry(&self.session, move || async move {
                let client = self.live_client().await?;
                client.open_stream(messages.clone(), tools.clone()).await
            })
            .await;

            match opened {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        yield event;
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error(format!("{e:#}"));
                }
            }
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {
        axum::{
            Router,
            extract::Request,
            http::{StatusCode, header},
            response::IntoResponse,
            routing::post,
        },
        credlink_oauth::{BaseUrlRule, ClientSecretSource, OAuthProfile, SessionPhase, now_ms},
        secrecy::Secret,
    };

    use {
        super::*,
        crate::providers::openai_compat::tests::{capture, serve, sse_body},
    };

    #[derive(Default)]
    struct Hits {
        token: AtomicUsize,
        chat: AtomicUsize,
        authorizations: Mutex<Vec<String>>,
    }

    /// Token endpoint mints `A2`; chat endpoint accepts only `accepted`.
    async fn upstream(accepted: &'static str) -> (String, Arc<Hits>) {
        let hits = Arc::new(Hits::default());
        let token_hits = Arc::clone(&hits);
        let chat_hits = Arc::clone(&hits);

        let app = Router::new()
            .route(
                "/token",
                post(move || {
                    let hits = Arc::clone(&token_hits);
                    async move {
                        hits.token.fetch_add(1, Ordering::SeqCst);
                        axum::Json(serde_json::json!({
                            "access_token": "A2",
                            "token_type": "Bearer",
                            "expires_in": 3600
                        }))
                    }
                }),
            )
            .route(
                "/v1/chat/completions",
                post(move |req: Request| {
                    let hits = Arc::clone(&chat_hits);
                    async move {
                        hits.chat.fetch_add(1, Ordering::SeqCst);
                        let request = capture(req).await;
                        let auth = request.authorization.unwrap_or_default();
                        hits.authorizations.lock().unwrap().push(auth.clone());
                        if auth != format!("Bearer {accepted}") {
                            return (StatusCode::UNAUTHORIZED, "invalid access token").into_response();
                        }
                        let streaming = request.body.as_ref().is_some_and(|b| b["stream"] == true);
                        if streaming {
                            let body = sse_body(&[
                                r#"{"choices":[{"delta":{"content":"streamed"}}]}"#,
                                "[DONE]",
                            ]);
                            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
                        } else {
                            axum::Json(serde_json::json!({
                                "choices": [{"message": {"content": "ok"}}],
                                "usage": {"prompt_tokens": 1, "completion_tokens": 1}
                            }))
                            .into_response()
                        }
                    }
                }),
            );
        (serve(app).await, hits)
    }

    fn write_creds(dir: &Path, access: &str, expiry_offset_ms: i64) -> PathBuf {
        let path = dir.join("oauth_creds.json");
        let expiry = now_ms() as i64 + expiry_offset_ms;
        std::fs::write(
            &path,
            serde_json::json!({
                "access_token": access,
                "refresh_token": "R1",
                "token_type": "Bearer",
                "expiry_date": expiry
            })
            .to_string(),
        )
        .unwrap();
        path
    }

    fn handle(server: &str, creds: &Path) -> AuthenticatedProvider<OpenAiCompatClient> {
        let profile = OAuthProfile {
            name: "qwen-code".into(),
            token_url: format!("{server}/token"),
            client_id: "client-1".into(),
            client_secret: ClientSecretSource::None,
            default_creds_path: ".credlink-test/oauth_creds.json".into(),
            creds_path_env: "CREDLINK_TEST_CREDS_PATH_UNSET".into(),
            base_url: BaseUrlRule::Fixed(format!("{server}/v1")),
        };
        let placeholder = OpenAiCompatClient::new(
            "qwen-code",
            "qwen3-coder-plus",
            "https://unused.invalid/v1",
            Secret::new(PLACEHOLDER_TOKEN.into()),
        )
        .with_vision(true);
        AuthenticatedProvider::new(
            placeholder,
            Arc::new(OAuthSession::new(profile)),
            Some(creds.display().to_string()),
        )
    }

    #[tokio::test]
    async fn pass_through_needs_no_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let provider = handle("http://127.0.0.1:9", &dir.path().join("absent.json"));
        assert_eq!(provider.name(), "qwen-code");
        assert_eq!(provider.id(), "qwen3-coder-plus");
        assert!(provider.supports_tools());
        assert!(provider.supports_vision());
        assert_eq!(provider.session().phase(), SessionPhase::Unconfigured);
    }

    #[tokio::test]
    async fn expired_token_refreshed_before_first_call() {
        let (server, hits) = upstream("A2").await;
        let dir = tempfile::tempdir().unwrap();
        let creds = write_creds(dir.path(), "A1", -1_000);
        let provider = handle(&server, &creds);

        let resp = provider.complete(&[ChatMessage::user("hi")], &[]).await.unwrap();
        assert_eq!(resp.text.as_deref(), Some("ok"));
        assert_eq!(hits.token.load(Ordering::SeqCst), 1);
        assert_eq!(hits.chat.load(Ordering::SeqCst), 1);
        assert_eq!(hits.authorizations.lock().unwrap()[0], "Bearer A2");
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_and_retried() {
        let (server, hits) = upstream("A2").await;
        let dir = tempfile::tempdir().unwrap();
        let creds = write_creds(dir.path(), "A1", 3_600_000);
        let provider = handle(&server, &creds);

        let resp = provider.complete(&[ChatMessage::user("hi")], &[]).await.unwrap();
        assert_eq!(resp.text.as_deref(), Some("ok"));
        assert_eq!(hits.token.load(Ordering::SeqCst), 1);
        assert_eq!(*hits.authorizations.lock().unwrap(), vec![
            "Bearer A1".to_string(),
            "Bearer A2".to_string()
        ]);
    }

    #[tokio::test]
    async fn second_rejection_propagates() {
        let (server, hits) = upstream("never-valid").await;
        let dir = tempfile::tempdir().unwrap();
        let creds = write_creds(dir.path(), "A1", 3_600_000);
        let provider = handle(&server, &creds);

        let err = provider
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid access token"));
        assert_eq!(hits.token.load(Ordering::SeqCst), 1);
        assert_eq!(hits.chat.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_retries_after_rejection() {
        let (server, hits) = upstream("A2").await;
        let dir = tempfile::tempdir().unwrap();
        let creds = write_creds(dir.path(), "A1", 3_600_000);
        let provider = handle(&server, &creds);

        let events: Vec<StreamEvent> = provider.stream(vec![ChatMessage::user("hi")]).collect().await;
        assert_eq!(events[0], StreamEvent::Delta("streamed".into()));
        assert!(matches!(events.last(), Some(StreamEvent::Done(_))));
        assert_eq!(hits.token.load(Ordering::SeqCst), 1);
        assert_eq!(hits.chat.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_api_call() {
        let (server, hits) = upstream("A2").await;
        let dir = tempfile::tempdir().unwrap();
        let provider = handle(&server, &dir.path().join("absent.json"));

        let err = provider
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<credlink_oauth::Error>(),
            Some(credlink_oauth::Error::CredentialLoad { .. })
        ));
        assert_eq!(hits.chat.load(Ordering::SeqCst), 0);

        let events: Vec<StreamEvent> = provider.stream(vec![ChatMessage::user("hi")]).collect().await;
        assert!(matches!(&events[..], [StreamEvent::Error(msg)] if msg.contains("absent.json")));
    }
}
