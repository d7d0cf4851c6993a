//! Session & context store (component G).
//!
//! Two small structured files sit directly under the tasks root, sibling to
//! `index.yaml`: `.sessions.yaml` (one entry per active agent) and
//! `.context.yaml` (the current working-task pointer, independent of any
//! claim). Both are read/written through the same `frontmatter::read_index`/
//! `write_index` pair the tree loader uses for container indices — they are
//! just another structured YAML document, not part of the entity hierarchy.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frontmatter;
use crate::id::PathId;

const SESSIONS_FILE: &str = ".sessions.yaml";
const CONTEXT_FILE: &str = ".context.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<PathId>,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionStore {
    #[serde(default)]
    pub sessions: Vec<SessionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextPointer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<PathId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn sessions_path(root_dir: &Path) -> PathBuf {
    root_dir.join(SESSIONS_FILE)
}

fn context_path(root_dir: &Path) -> PathBuf {
    root_dir.join(CONTEXT_FILE)
}

fn load_store(root_dir: &Path) -> Result<SessionStore> {
    let path = sessions_path(root_dir);
    if !path.is_file() {
        return Ok(SessionStore::default());
    }
    frontmatter::read_index(&path)
}

fn save_store(root_dir: &Path, store: &SessionStore) -> Result<()> {
    frontmatter::write_index(&sessions_path(root_dir), store)
}

/// Start (or replace) a session for `agent`, optionally pinned to a task.
pub fn start(root_dir: &Path, agent: &str, task_id: Option<PathId>) -> Result<SessionEntry> {
    let mut store = load_store(root_dir)?;
    store.sessions.retain(|s| s.agent != agent);
    let now = Utc::now();
    let entry = SessionEntry {
        agent: agent.to_string(),
        task_id,
        started_at: now,
        last_heartbeat: now,
        progress: None,
    };
    store.sessions.push(entry.clone());
    save_store(root_dir, &store)?;
    Ok(entry)
}

/// Refresh `agent`'s heartbeat and optional progress note. A no-op start is
/// implied if the agent has no prior session.
pub fn heartbeat(root_dir: &Path, agent: &str, progress: Option<&str>) -> Result<SessionEntry> {
    let mut store = load_store(root_dir)?;
    let now = Utc::now();
    if let Some(entry) = store.sessions.iter_mut().find(|s| s.agent == agent) {
        entry.last_heartbeat = now;
        if let Some(p) = progress {
            entry.progress = Some(p.to_string());
        }
        let updated = entry.clone();
        save_store(root_dir, &store)?;
        return Ok(updated);
    }
    drop(store);
    start(root_dir, agent, None)
}

/// End `agent`'s session; a no-op if none is active.
pub fn end(root_dir: &Path, agent: &str) -> Result<()> {
    let mut store = load_store(root_dir)?;
    store.sessions.retain(|s| s.agent != agent);
    save_store(root_dir, &store)
}

/// All active sessions, in the order they were started.
pub fn list(root_dir: &Path) -> Result<Vec<SessionEntry>> {
    Ok(load_store(root_dir)?.sessions)
}

/// Sessions whose last heartbeat is older than `threshold_secs`.
pub fn stale_sessions(root_dir: &Path, threshold_secs: i64) -> Result<Vec<SessionEntry>> {
    let now = Utc::now();
    Ok(list(root_dir)?
        .into_iter()
        .filter(|s| (now - s.last_heartbeat).num_seconds() > threshold_secs)
        .collect())
}

pub fn load_context(root_dir: &Path) -> Result<ContextPointer> {
    let path = context_path(root_dir);
    if !path.is_file() {
        return Ok(ContextPointer::default());
    }
    frontmatter::read_index(&path)
}

pub fn set_context(root_dir: &Path, task_id: Option<PathId>, note: Option<String>) -> Result<()> {
    frontmatter::write_index(&context_path(root_dir), &ContextPointer { task_id, note })
}

pub fn clear_context(root_dir: &Path) -> Result<()> {
    frontmatter::write_index(&context_path(root_dir), &ContextPointer::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_list_shows_one_session() {
        let tmp = tempfile::tempdir().unwrap();
        start(tmp.path(), "agent-1", Some(PathId::parse("P1.M1.E1.T001").unwrap())).unwrap();
        let sessions = list(tmp.path()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].agent, "agent-1");
    }

    #[test]
    fn starting_twice_replaces_not_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        start(tmp.path(), "agent-1", None).unwrap();
        start(tmp.path(), "agent-1", Some(PathId::parse("P1").unwrap())).unwrap();
        let sessions = list(tmp.path()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].task_id, Some(PathId::parse("P1").unwrap()));
    }

    #[test]
    fn heartbeat_updates_progress() {
        let tmp = tempfile::tempdir().unwrap();
        start(tmp.path(), "agent-1", None).unwrap();
        heartbeat(tmp.path(), "agent-1", Some("halfway done")).unwrap();
        let sessions = list(tmp.path()).unwrap();
        assert_eq!(sessions[0].progress.as_deref(), Some("halfway done"));
    }

    #[test]
    fn end_removes_session() {
        let tmp = tempfile::tempdir().unwrap();
        start(tmp.path(), "agent-1", None).unwrap();
        end(tmp.path(), "agent-1").unwrap();
        assert!(list(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn context_round_trips_and_clears() {
        let tmp = tempfile::tempdir().unwrap();
        set_context(tmp.path(), Some(PathId::parse("P1.M1.E1.T001").unwrap()), Some("note".to_string())).unwrap();
        let ctx = load_context(tmp.path()).unwrap();
        assert_eq!(ctx.task_id, Some(PathId::parse("P1.M1.E1.T001").unwrap()));
        clear_context(tmp.path()).unwrap();
        assert!(load_context(tmp.path()).unwrap().task_id.is_none());
    }

    #[test]
    fn stale_sessions_reports_past_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = SessionStore::default();
        store.sessions.push(SessionEntry {
            agent: "agent-1".to_string(),
            task_id: None,
            started_at: Utc::now(),
            last_heartbeat: Utc::now() - chrono::Duration::seconds(2000),
            progress: None,
        });
        save_store(tmp.path(), &store).unwrap();
        let stale = stale_sessions(tmp.path(), 900).unwrap();
        assert_eq!(stale.len(), 1);
    }
}
