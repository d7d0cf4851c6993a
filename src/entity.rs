//! Entity data model: status/priority/complexity enums, task frontmatter,
//! and the structured index documents that describe containers and their
//! children.
//!
//! Unknown YAML keys on every struct are retained in `extra` so that
//! `load -> resolve -> save` round-trips bytes for untouched files even
//! when a future schema adds fields this crate doesn't know about yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::PathId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Blocked,
    Done,
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Default for Complexity {
    fn default() -> Self {
        Complexity::Medium
    }
}

/// Declaration order is significant: `Ord` ranks `Critical` highest, which
/// is what the resolver's priority-ordering rule (critical > high > medium >
/// low) needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// A reference to a child container (phase/milestone/epic) from its
/// parent's index: just enough to locate the child's own directory and
/// index file. Descriptive fields (name, status, locked) live in the
/// child's own index, not duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirRef {
    pub id: PathId,
    pub path: String,
}

/// A reference to a task-like file (task/bug/idea/fix) from its
/// container's index. `file` is the filename relative to the container
/// directory; invariant #2 requires the referenced file's frontmatter
/// `id` to match `id` here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    pub id: PathId,
    pub file: String,
}

/// Common descriptive fields shared by every container level.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContainerMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootIndex {
    pub project: String,
    #[serde(default)]
    pub phases: Vec<DirRef>,
    #[serde(default)]
    pub critical_path: Vec<PathId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_available: Option<PathId>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseIndex {
    #[serde(flatten)]
    pub meta: ContainerMeta,
    #[serde(default)]
    pub milestones: Vec<DirRef>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneIndex {
    #[serde(flatten)]
    pub meta: ContainerMeta,
    #[serde(default)]
    pub epics: Vec<DirRef>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicIndex {
    #[serde(flatten)]
    pub meta: ContainerMeta,
    #[serde(default)]
    pub tasks: Vec<FileRef>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// `bugs/index.yaml` / `ideas/index.yaml` — a flat auxiliary backlog index.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuxIndex {
    #[serde(default)]
    pub tasks: Vec<FileRef>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// `fixes/YYYY-MM/index.yaml` — one per month bucket.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FixIndex {
    #[serde(default)]
    pub tasks: Vec<FileRef>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// Parsed frontmatter of a task/bug/idea/fix `.todo` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFrontmatter {
    pub id: PathId,
    pub title: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub estimate_hours: f64,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub depends_on: Vec<PathId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl TaskFrontmatter {
    pub fn new(id: PathId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: Status::Pending,
            estimate_hours: 0.0,
            complexity: Complexity::default(),
            priority: Priority::default(),
            depends_on: Vec::new(),
            tags: Vec::new(),
            created_at: None,
            claimed_by: None,
            claimed_at: None,
            started_at: None,
            completed_at: None,
            blocked_reason: None,
            extra: serde_yaml::Mapping::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ranks_critical_above_low() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn task_frontmatter_round_trips_through_yaml() {
        let task = TaskFrontmatter::new(PathId::parse("P1.M1.E1.T001").unwrap(), "Do the thing");
        let yaml = serde_yaml::to_string(&task).unwrap();
        let back: TaskFrontmatter = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.title, task.title);
        assert_eq!(back.status, Status::Pending);
    }

    #[test]
    fn unknown_keys_round_trip_via_extra() {
        let yaml = "id: P1.M1.E1.T001\ntitle: X\nclass: standard\n";
        let task: TaskFrontmatter = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            task.extra.get("class").and_then(|v| v.as_str()),
            Some("standard")
        );
        let back = serde_yaml::to_string(&task).unwrap();
        assert!(back.contains("class: standard"));
    }
}
