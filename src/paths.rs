//! Resolution of the backlog root directory.
//!
//! Mirrors the teacher's `resolve_kanban_root`: `.tasks/` and `.backlog/`
//! are interchangeable, first found wins, and when neither exists the
//! caller gets back the preferred `.tasks/` path so `init` creates the
//! newer layout.

use std::path::{Path, PathBuf};

pub const PREFERRED_DIR: &str = ".tasks";
pub const LEGACY_DIR: &str = ".backlog";

/// Resolve the backlog root for a project, searching `base` and its
/// ancestors (so commands work from any subdirectory of the project, the
/// same way git locates `.git`).
pub fn resolve_root(base: &Path) -> Option<PathBuf> {
    let mut cursor = Some(base);
    while let Some(dir) = cursor {
        let preferred = dir.join(PREFERRED_DIR);
        if preferred.is_dir() {
            return Some(preferred);
        }
        let legacy = dir.join(LEGACY_DIR);
        if legacy.is_dir() {
            return Some(legacy);
        }
        cursor = dir.parent();
    }
    None
}

/// Where a fresh `init` should create the root: prefers the new `.tasks/`
/// layout at `base` itself (no ancestor search — `init` always targets the
/// current directory).
pub fn preferred_root(base: &Path) -> PathBuf {
    base.join(PREFERRED_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_tasks_dir_when_both_exist() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".tasks")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".backlog")).unwrap();
        assert_eq!(resolve_root(tmp.path()), Some(tmp.path().join(".tasks")));
    }

    #[test]
    fn falls_back_to_legacy_backlog_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".backlog")).unwrap();
        assert_eq!(resolve_root(tmp.path()), Some(tmp.path().join(".backlog")));
    }

    #[test]
    fn searches_ancestors_like_subdirectory_invocation() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".tasks")).unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(resolve_root(&nested), Some(tmp.path().join(".tasks")));
    }

    #[test]
    fn returns_none_when_not_initialised() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(resolve_root(tmp.path()), None);
    }

    #[test]
    fn preferred_root_is_always_tasks_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(preferred_root(tmp.path()), tmp.path().join(".tasks"));
    }
}
