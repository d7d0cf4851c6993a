//! Scheduler aggregations (component H).
//!
//! Read-only summaries derived from the loaded `Tree`: per-bucket progress
//! counts, a velocity histogram over a trailing window, estimate-accuracy
//! sampling, and a per-task activity log. None of this mutates anything;
//! it is the same "derive a report from what's already in memory" shape as
//! the teacher's `scheduler.rs` preview helpers, just over the task graph
//! instead of a kanban board.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::entity::Status;
use crate::id::PathId;
use crate::tree::Tree;

#[derive(Debug, Clone, Default)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.blocked + self.done
    }

    fn record(&mut self, status: Status) {
        match status {
            Status::Pending => self.pending += 1,
            Status::InProgress => self.in_progress += 1,
            Status::Blocked => self.blocked += 1,
            Status::Done => self.done += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressSummary {
    pub overall: StatusCounts,
    /// Keyed by container/bucket id: every phase/milestone/epic plus the
    /// three auxiliary buckets (`bugs`, `ideas`, `fixes`, addressed by their
    /// lowest-ranked member's kind since those buckets have no single id).
    pub by_container: BTreeMap<PathId, StatusCounts>,
    pub total_estimate_hours: f64,
}

/// Counts of tasks per status, overall and per container, plus total
/// estimate hours across every task.
pub fn progress_summary(tree: &Tree) -> ProgressSummary {
    let mut summary = ProgressSummary::default();

    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        summary.overall.record(node.frontmatter.status);
        summary.total_estimate_hours += node.frontmatter.estimate_hours;
    }

    for container_id in tree.containers.keys() {
        let mut counts = StatusCounts::default();
        for task_id in tree.descendant_tasks(container_id) {
            let node = tree.task(&task_id).expect("descendant_tasks only returns real tasks");
            counts.record(node.frontmatter.status);
        }
        summary.by_container.insert(container_id.clone(), counts);
    }

    summary
}

#[derive(Debug, Clone)]
pub struct VelocityBucket {
    pub date: NaiveDate,
    pub completed: usize,
}

/// Buckets tasks completed in the trailing `window_days` by the UTC date of
/// `completed_at`. Always returns `window_days + 1` buckets (inclusive
/// endpoints), oldest first.
pub fn velocity(tree: &Tree, window_days: i64, now: DateTime<Utc>) -> Vec<VelocityBucket> {
    let today = now.date_naive();
    let start = today - chrono::Duration::days(window_days);

    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut cursor = start;
    while cursor <= today {
        by_day.insert(cursor, 0);
        cursor += chrono::Duration::days(1);
    }

    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        if let Some(completed_at) = node.frontmatter.completed_at {
            let day = completed_at.date_naive();
            if let Some(count) = by_day.get_mut(&day) {
                *count += 1;
            }
        }
    }

    by_day
        .into_iter()
        .map(|(date, completed)| VelocityBucket { date, completed })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct EstimateAccuracy {
    pub sample_count: usize,
    /// `(actual_hours / estimate_hours)` for each sampled task, smaller is
    /// an overestimate, larger an underestimate.
    pub ratios: Vec<f64>,
}

impl EstimateAccuracy {
    pub fn mean_ratio(&self) -> Option<f64> {
        if self.ratios.is_empty() {
            return None;
        }
        Some(self.ratios.iter().sum::<f64>() / self.ratios.len() as f64)
    }
}

/// For every task with `estimate_hours > 0` and a measurable duration
/// (`completed_at - started_at`), collect the actual/estimate ratio; other
/// tasks are skipped silently.
pub fn estimate_accuracy(tree: &Tree) -> EstimateAccuracy {
    let mut acc = EstimateAccuracy::default();
    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        let fm = &node.frontmatter;
        if fm.estimate_hours <= 0.0 {
            continue;
        }
        let (Some(started), Some(completed)) = (fm.started_at, fm.completed_at) else {
            continue;
        };
        if completed <= started {
            continue;
        }
        let actual_hours = (completed - started).num_seconds() as f64 / 3600.0;
        acc.ratios.push(actual_hours / fm.estimate_hours);
        acc.sample_count += 1;
    }
    acc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Claimed,
    Started,
    Completed,
}

#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub task_id: PathId,
    pub kind: EventKind,
    pub actor: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-task event stream: `added` always present, then `claimed`/`started`/
/// `completed` whenever the corresponding timestamp is set. `added` events
/// (which have no timestamp) sort last among themselves by Path ID; events
/// with a timestamp sort chronologically.
pub fn activity_log(tree: &Tree) -> Vec<ActivityEvent> {
    let mut events = Vec::new();

    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        let fm = &node.frontmatter;

        events.push(ActivityEvent {
            task_id: id.clone(),
            kind: EventKind::Added,
            actor: None,
            timestamp: fm.created_at,
        });
        if let Some(ts) = fm.claimed_at {
            events.push(ActivityEvent {
                task_id: id.clone(),
                kind: EventKind::Claimed,
                actor: fm.claimed_by.clone(),
                timestamp: Some(ts),
            });
        }
        if let Some(ts) = fm.started_at {
            events.push(ActivityEvent {
                task_id: id.clone(),
                kind: EventKind::Started,
                actor: fm.claimed_by.clone(),
                timestamp: Some(ts),
            });
        }
        if let Some(ts) = fm.completed_at {
            events.push(ActivityEvent {
                task_id: id.clone(),
                kind: EventKind::Completed,
                actor: fm.claimed_by.clone(),
                timestamp: Some(ts),
            });
        }
    }

    events.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.task_id.cmp(&b.task_id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.task_id.cmp(&b.task_id),
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ContainerMeta, DirRef, EpicIndex, FileRef, MilestoneIndex, PhaseIndex, RootIndex, TaskFrontmatter};
    use crate::frontmatter;
    use std::path::Path;

    fn write_minimal_tree(root: &Path) {
        std::fs::create_dir_all(root.join("01-phase-one/01-milestone-one/01-epic-one")).unwrap();
        frontmatter::write_index(
            &root.join("index.yaml"),
            &RootIndex {
                project: "demo".to_string(),
                phases: vec![DirRef {
                    id: PathId::parse("P1").unwrap(),
                    path: "01-phase-one".to_string(),
                }],
                critical_path: vec![],
                next_available: None,
                extra: serde_yaml::Mapping::new(),
            },
        )
        .unwrap();
        frontmatter::write_index(
            &root.join("01-phase-one/index.yaml"),
            &PhaseIndex {
                meta: ContainerMeta::default(),
                milestones: vec![DirRef {
                    id: PathId::parse("P1.M1").unwrap(),
                    path: "01-milestone-one".to_string(),
                }],
                extra: serde_yaml::Mapping::new(),
            },
        )
        .unwrap();
        frontmatter::write_index(
            &root.join("01-phase-one/01-milestone-one/index.yaml"),
            &MilestoneIndex {
                meta: ContainerMeta::default(),
                epics: vec![DirRef {
                    id: PathId::parse("P1.M1.E1").unwrap(),
                    path: "01-epic-one".to_string(),
                }],
                extra: serde_yaml::Mapping::new(),
            },
        )
        .unwrap();
        frontmatter::write_index(
            &root.join("01-phase-one/01-milestone-one/01-epic-one/index.yaml"),
            &EpicIndex {
                meta: ContainerMeta::default(),
                tasks: vec![
                    FileRef {
                        id: PathId::parse("P1.M1.E1.T001").unwrap(),
                        file: "T001-title-a.todo".to_string(),
                    },
                    FileRef {
                        id: PathId::parse("P1.M1.E1.T002").unwrap(),
                        file: "T002-title-b.todo".to_string(),
                    },
                ],
                extra: serde_yaml::Mapping::new(),
            },
        )
        .unwrap();

        let mut t1 = TaskFrontmatter::new(PathId::parse("P1.M1.E1.T001").unwrap(), "Title A");
        t1.estimate_hours = 1.0;
        t1.status = Status::Done;
        t1.started_at = Some(Utc::now() - chrono::Duration::hours(2));
        t1.completed_at = Some(Utc::now());
        frontmatter::write_task(
            &root.join("01-phase-one/01-milestone-one/01-epic-one/T001-title-a.todo"),
            &t1,
            "Body.\n",
        )
        .unwrap();

        let mut t2 = TaskFrontmatter::new(PathId::parse("P1.M1.E1.T002").unwrap(), "Title B");
        t2.estimate_hours = 2.0;
        t2.depends_on = vec![PathId::parse("P1.M1.E1.T001").unwrap()];
        frontmatter::write_task(
            &root.join("01-phase-one/01-milestone-one/01-epic-one/T002-title-b.todo"),
            &t2,
            "Body.\n",
        )
        .unwrap();
    }

    #[test]
    fn progress_summary_counts_by_status() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();
        let summary = progress_summary(&tree);
        assert_eq!(summary.overall.done, 1);
        assert_eq!(summary.overall.pending, 1);
        assert_eq!(summary.total_estimate_hours, 3.0);
    }

    #[test]
    fn velocity_has_window_plus_one_buckets() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();
        let buckets = velocity(&tree, 7, Utc::now());
        assert_eq!(buckets.len(), 8);
        assert!(buckets.iter().map(|b| b.completed).sum::<usize>() >= 1);
    }

    #[test]
    fn estimate_accuracy_skips_tasks_without_duration() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();
        let acc = estimate_accuracy(&tree);
        assert_eq!(acc.sample_count, 1);
        assert!(acc.mean_ratio().unwrap() > 0.0);
    }

    #[test]
    fn activity_log_includes_added_and_completed_events() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();
        let events = activity_log(&tree);
        let t001 = PathId::parse("P1.M1.E1.T001").unwrap();
        assert!(events.iter().any(|e| e.task_id == t001 && e.kind == EventKind::Completed));
        assert!(events.iter().any(|e| e.kind == EventKind::Added));
    }
}
