use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Context, Error, Result},
    env_subst::substitute_env,
    schema::CredlinkConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "credlink.toml",
    "credlink.yaml",
    "credlink.yml",
    "credlink.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<CredlinkConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./credlink.{toml,yaml,yml,json}` (project-local)
/// 2. `<config dir>/credlink.{toml,yaml,yml,json}` (user-global)
///
/// Returns `CredlinkConfig::default()` if no config file is found or the
/// file fails to parse.
pub fn discover_and_load() -> CredlinkConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return CredlinkConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        CredlinkConfig::default()
    })
}

/// Returns the user-global config directory (`~/.config/credlink/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "credlink").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<CredlinkConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let shown = path.display();

    match ext {
        "toml" => toml::from_str(raw).with_context(|| format!("invalid TOML in {shown}")),
        "yaml" | "yml" => {
            serde_yaml::from_str(raw).with_context(|| format!("invalid YAML in {shown}"))
        },
        "json" => serde_json::from_str(raw).with_context(|| format!("invalid JSON in {shown}")),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
