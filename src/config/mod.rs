//! Project configuration (ambient stack, SPEC_FULL.md §10.3).
//!
//! `.tasks/config.toml` (or `.backlog/config.toml`, whichever
//! `paths::resolve_root` picked) is optional — its absence is not an error,
//! same as the teacher's `ProjectConfig::load`. Every field has a
//! `#[serde(default = "...")]` function and a hand-written `Default` impl,
//! the same shape as the teacher's `Defaults`/`SupervisorConfig`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILENAME: &str = "config.toml";

fn default_stale_session_secs() -> i64 {
    900
}

fn default_slug_max_len() -> usize {
    60
}

/// Reserved for future tie-break strategies; the only implemented rule
/// today is lexical Path ID order (see `resolver::sort_by_priority`).
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CriticalPathTieBreak {
    #[default]
    Lexical,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacklogConfig {
    #[serde(default = "default_stale_session_secs")]
    pub stale_session_secs: i64,
    #[serde(default)]
    pub critical_path_tie_break: CriticalPathTieBreak,
    #[serde(default = "default_slug_max_len")]
    pub slug_max_len: usize,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            stale_session_secs: default_stale_session_secs(),
            critical_path_tie_break: CriticalPathTieBreak::default(),
            slug_max_len: default_slug_max_len(),
        }
    }
}

impl BacklogConfig {
    /// Load `config.toml` from the already-resolved tasks root. Returns
    /// the default config (and `None`) when no file is present.
    pub fn load(root_dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        let candidate = root_dir.join(CONFIG_FILENAME);
        if !candidate.is_file() {
            return Ok((BacklogConfig::default(), None));
        }
        let contents = std::fs::read_to_string(&candidate)
            .with_context(|| format!("failed to read {}", candidate.display()))?;
        let config: BacklogConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", candidate.display()))?;
        Ok((config, Some(candidate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_values() {
        let config = BacklogConfig::default();
        assert_eq!(config.stale_session_secs, 900);
        assert_eq!(config.critical_path_tie_break, CriticalPathTieBreak::Lexical);
        assert_eq!(config.slug_max_len, 60);
    }

    #[test]
    fn parse_partial_config() {
        let toml = "stale_session_secs = 300\n";
        let config: BacklogConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.stale_session_secs, 300);
        assert_eq!(config.slug_max_len, 60);
    }

    #[test]
    fn load_returns_default_when_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, path) = BacklogConfig::load(tmp.path()).unwrap();
        assert!(path.is_none());
        assert_eq!(config.stale_session_secs, 900);
    }

    #[test]
    fn load_from_tasks_root() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.toml"), "slug_max_len = 40\n").unwrap();
        let (config, path) = BacklogConfig::load(tmp.path()).unwrap();
        assert!(path.is_some());
        assert_eq!(config.slug_max_len, 40);
        assert_eq!(config.stale_session_secs, 900);
    }
}
