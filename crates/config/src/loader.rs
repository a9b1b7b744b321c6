//! Config file loading.
//!
//! Gleaner reads a single `gleaner.{toml,yaml,yml,json}` file, taken from
//! the working directory first and the user config directory second. File
//! contents go through `${VAR}` expansion before parsing.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::expand_env, schema::GleanerConfig};

const STEM: &str = "gleaner";
const EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Load the config at `path`, picking the parser from its extension.
///
/// A missing extension is treated as TOML.
pub fn load_config(path: &Path) -> anyhow::Result<GleanerConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))?;
    let raw = expand_env(&raw);

    let cfg = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") | None => toml::from_str(&raw)?,
        Some("yaml" | "yml") => serde_yaml::from_str(&raw)?,
        Some("json") => serde_json::from_str(&raw)?,
        Some(other) => anyhow::bail!("unsupported config format: .{other}"),
    };
    Ok(cfg)
}

/// Load the first discovered config file, or defaults when there is none.
///
/// A file that exists but fails to load is reported and ignored rather than
/// aborting startup.
pub fn discover_and_load() -> GleanerConfig {
    let Some(path) = candidates().find(|p| p.exists()) else {
        debug!("no config file found, using defaults");
        return GleanerConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        GleanerConfig::default()
    })
}

/// The user-global config directory (`~/.config/gleaner`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", STEM).map(|d| d.config_dir().to_path_buf())
}

/// An existing config file, or the default TOML location for a new one.
pub fn find_or_default_config_path() -> PathBuf {
    candidates().find(|p| p.exists()).unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(format!("{STEM}.toml"))
    })
}

/// Write `config` as TOML to the discovered config path or the default one,
/// creating parent directories as needed. Returns the path written.
pub fn save_config(config: &GleanerConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(config)?)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

/// Candidate config paths in priority order: every supported extension in
/// the working directory, then in the user config directory.
fn candidates() -> impl Iterator<Item = PathBuf> {
    [Some(PathBuf::from(".")), config_dir()]
        .into_iter()
        .flatten()
        .flat_map(|dir| {
            EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{STEM}.{ext}")))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gleaner.toml");
        std::fs::write(
            &path,
            r#"
            [run]
            session_count = 4

            [[targets]]
            user = "alice"
            "#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.run.session_count, 4);
        assert_eq!(cfg.resolved_targets().len(), 1);
    }

    #[test]
    fn test_load_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gleaner.json");
        std::fs::write(&path, r#"{"run": {"session_count": 1}}"#).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.run.session_count, 1);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gleaner.ini");
        std::fs::write(&path, "run=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_candidate_order_prefers_working_directory() {
        let paths: Vec<PathBuf> = candidates().collect();
        assert_eq!(paths[0], Path::new("./gleaner.toml"));
        assert!(paths.len() >= EXTENSIONS.len());
    }
}
