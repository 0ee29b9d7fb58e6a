use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    profile::OAuthProfile,
    types::CredentialRecord,
};

/// One provider's credential file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Use an explicit path (tests, CLI inspection).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Resolve the credential path for `profile`.
    ///
    /// Precedence: `configured`, then the profile's environment variable,
    /// then the default location under the home directory.
    pub fn resolve(profile: &OAuthProfile, configured: Option<&str>) -> Self {
        let from_env = std::env::var(&profile.creds_path_env)
            .ok()
            .filter(|v| !v.trim().is_empty());
        Self::resolve_with(profile, configured, from_env.as_deref(), home_dir().as_deref())
    }

    fn resolve_with(
        profile: &OAuthProfile,
        configured: Option<&str>,
        from_env: Option<&str>,
        home: Option<&Path>,
    ) -> Self {
        let explicit = configured
            .filter(|p| !p.trim().is_empty())
            .or(from_env)
            .map(|raw| expand_path(raw, home));

        let path = explicit.unwrap_or_else(|| match home {
            Some(home) => home.join(&profile.default_creds_path),
            None => {
                warn!(
                    provider = %profile.name,
                    "home directory unknown, using credential path relative to the working directory"
                );
                absolutize(PathBuf::from(&profile.default_creds_path))
            },
        });
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and validate the credential file.
    pub fn load(&self) -> Result<CredentialRecord> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            let reason = if e.kind() == std::io::ErrorKind::NotFound {
                "file not found".to_string()
            } else {
                e.to_string()
            };
            self.load_error(reason)
        })?;

        let record: CredentialRecord = serde_json::from_str(&data)
            .map_err(|e| self.load_error(format!("invalid credential JSON: {e}")))?;
        record.check_usable().map_err(|reason| self.load_error(reason))?;

        debug!(path = %self.path.display(), "OAuth credentials loaded");
        Ok(record)
    }

    /// Write `record` back, creating parent directories. Mode 0600 on Unix.
    pub fn save(&self, record: &CredentialRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.persist_error(e))?;
        }

        let data = serde_json::to_string_pretty(record).map_err(|e| self.persist_error(e))?;
        std::fs::write(&self.path, data).map_err(|e| self.persist_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.persist_error(e))?;
        }

        info!(path = %self.path.display(), "OAuth credentials saved");
        Ok(())
    }

    fn load_error(&self, reason: impl Into<String>) -> Error {
        Error::CredentialLoad {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn persist_error(&self, source: impl std::fmt::Display) -> Error {
        Error::Persistence {
            path: self.path.clone(),
            reason: source.to_string(),
        }
    }
}

/// Expand a leading `~` and anchor relative paths at the working directory.
pub fn expand_path(raw: &str, home: Option<&Path>) -> PathBuf {
    let raw = raw.trim();
    let expanded = match (raw, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (_, Some(home)) if raw.starts_with("~/") => home.join(&raw[2..]),
        _ => PathBuf::from(raw),
    };
    absolutize(expanded)
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::path::absolute(&path).unwrap_or(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::profile::{BaseUrlRule, ClientSecretSource}, secrecy::ExposeSecret};

    fn profile() -> OAuthProfile {
        OAuthProfile {
            name: "qwen-code".into(),
            token_url: "https://auth.example/token".into(),
            client_id: "client".into(),
            client_secret: ClientSecretSource::None,
            default_creds_path: ".qwen/oauth_creds.json".into(),
            creds_path_env: "CREDLINK_TEST_UNUSED_ENV".into(),
            base_url: BaseUrlRule::Fixed("https://api.example/v1".into()),
        }
    }

    fn write_creds(dir: &Path, body: &str) -> CredentialStore {
        let path = dir.join("oauth_creds.json");
        std::fs::write(&path, body).unwrap();
        CredentialStore::with_path(path)
    }

    #[test]
    fn default_path_under_home() {
        let home = Path::new("/home/dev");
        let store = CredentialStore::resolve_with(&profile(), None, None, Some(home));
        assert_eq!(store.path(), Path::new("/home/dev/.qwen/oauth_creds.json"));
    }

    #[test]
    fn configured_path_beats_env() {
        let home = Path::new("/home/dev");
        let store = CredentialStore::resolve_with(
            &profile(),
            Some("~/alt/creds.json"),
            Some("/env/creds.json"),
            Some(home),
        );
        assert_eq!(store.path(), Path::new("/home/dev/alt/creds.json"));
    }

    #[test]
    fn env_path_used_without_config() {
        let store = CredentialStore::resolve_with(
            &profile(),
            Some("  "),
            Some("/env/creds.json"),
            Some(Path::new("/home/dev")),
        );
        assert_eq!(store.path(), Path::new("/env/creds.json"));
    }

    #[test]
    fn relative_path_is_anchored() {
        let path = expand_path("creds/qwen.json", None);
        assert!(path.is_absolute());
        assert!(path.ends_with("creds/qwen.json"));
    }

    #[test]
    fn bare_tilde_is_home() {
        assert_eq!(
            expand_path("~", Some(Path::new("/home/dev"))),
            PathBuf::from("/home/dev")
        );
    }

    #[test]
    fn load_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_creds(
            dir.path(),
            r#"{"access_token":"at","refresh_token":"rt","token_type":"Bearer","expiry_date":1}"#,
        );
        let record = store.load().unwrap();
        assert_eq!(record.refresh_token.expose_secret(), "rt");
        assert_eq!(record.expiry_date, Some(1));
    }

    #[test]
    fn load_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::with_path(dir.path().join("absent.json"));
        let err = store.load().unwrap_err();
        match &err {
            Error::CredentialLoad { path, reason } => {
                assert_eq!(path, store.path());
                assert_eq!(reason, "file not found");
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn load_without_refresh_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_creds(dir.path(), r#"{"access_token":"at","expiry_date":1}"#);
        let err = store.load().unwrap_err();
        assert!(
            matches!(&err, Error::CredentialLoad { reason, .. } if reason.contains("refresh_token")),
            "{err}"
        );
    }

    #[test]
    fn load_empty_access_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_creds(dir.path(), r#"{"access_token":"","refresh_token":"rt"}"#);
        assert!(matches!(store.load(), Err(Error::CredentialLoad { .. })));
    }

    #[test]
    fn load_malformed_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_creds(dir.path(), "{not json");
        assert!(matches!(store.load(), Err(Error::CredentialLoad { .. })));
    }

    #[test]
    fn save_creates_parents_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::with_path(dir.path().join("nested/dir/oauth_creds.json"));
        let record = CredentialRecord::new("at", "rt")
            .with_expiry(42)
            .with_resource_url("portal.qwen.ai");
        store.save(&record).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token.expose_secret(), "at");
        assert_eq!(loaded.expiry_date, Some(42));
        assert_eq!(loaded.resource_url.as_deref(), Some("portal.qwen.ai"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn save_into_file_parent_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = CredentialStore::with_path(blocker.join("oauth_creds.json"));

        let err = store.save(&CredentialRecord::new("at", "rt")).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }
}
