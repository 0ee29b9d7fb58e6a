use {
    anyhow::Result,
    clap::Subcommand,
    credlink_agents::{OAuthProviderKind, OAuthProviders},
    credlink_oauth::{CredentialRecord, is_valid, now_ms},
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Show credential file location and token expiry per provider.
    Status {
        /// Provider id (qwen-code or gemini-cli). All providers when omitted.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Refresh a provider's access token now and save it.
    Refresh {
        /// Provider id (qwen-code or gemini-cli).
        #[arg(long)]
        provider: String,
    },
}

pub async fn handle_auth(providers: &OAuthProviders, action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Status { provider } => status(providers, provider.as_deref()),
        AuthAction::Refresh { provider } => refresh(providers, provider.parse()?).await,
    }
}

pub(crate) fn selected_kinds(provider: Option<&str>) -> Result<Vec<OAuthProviderKind>> {
    match provider {
        Some(id) => Ok(vec![id.parse()?]),
        None => Ok(OAuthProviderKind::ALL.to_vec()),
    }
}

fn status(providers: &OAuthProviders, provider: Option<&str>) -> Result<()> {
    for kind in selected_kinds(provider)? {
        let session = providers.session(kind);
        let store = session.configure(providers.creds_path(kind).as_deref());
        let path = store.path().display();

        if !providers.is_enabled(kind) {
            println!("{kind} [disabled] {path}");
            continue;
        }
        if !store.exists() {
            println!("{kind} [not signed in] {path}");
            continue;
        }
        match store.load() {
            Ok(record) => println!("{kind} [{}] {path}", describe_expiry(&record, now_ms())),
            Err(e) => println!("{kind} [unreadable: {e}]"),
        }
    }
    Ok(())
}

async fn refresh(providers: &OAuthProviders, kind: OAuthProviderKind) -> Result<()> {
    let session = providers.session(kind);
    session.configure(providers.creds_path(kind).as_deref());
    let record = session.refresh().await?;
    println!("Refreshed {kind} [{}]", describe_expiry(&record, now_ms()));
    Ok(())
}

fn describe_expiry(record: &CredentialRecord, now: u64) -> String {
    match record.expiry_date {
        None | Some(0) => "no expiry recorded".to_string(),
        Some(expiry) if is_valid(record, now) => {
            let remaining = (expiry - now) / 1000;
            let hours = remaining / 3600;
            let mins = (remaining % 3600) / 60;
            format!("valid ({hours}h {mins}m remaining)")
        },
        Some(_) => "expired, refreshes on next use".to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_descriptions() {
        let now = 1_000_000_000;
        let record = CredentialRecord::new("at", "rt");
        assert_eq!(describe_expiry(&record, now), "no expiry recorded");

        let valid = record.clone().with_expiry(now + 2 * 3_600_000 + 5 * 60_000);
        assert_eq!(describe_expiry(&valid, now), "valid (2h 5m remaining)");

        // Inside the refresh buffer counts as expired.
        let near = record.with_expiry(now + 10_000);
        assert_eq!(describe_expiry(&near, now), "expired, refreshes on next use");
    }

    #[test]
    fn provider_selection() {
        assert_eq!(selected_kinds(None).unwrap(), OAuthProviderKind::ALL.to_vec());
        assert_eq!(selected_kinds(Some("gemini-cli")).unwrap(), vec![
            OAuthProviderKind::GeminiCli
        ]);
        assert!(selected_kinds(Some("nope")).is_err());
    }
}
