//! Mutator (component E).
//!
//! Every operation here is staged as a transaction: the full set of files
//! to rewrite is computed and rendered in memory against a freshly loaded
//! `Tree`, then flushed atomically (temp+rename per file) only once every
//! precondition has passed. A parent index's content hash is snapshotted
//! when the transaction stages it and re-checked immediately before
//! commit; a mismatch means another process raced us, and the whole
//! operation is retried once from a fresh load before failing with
//! `CONCURRENT_MODIFICATION` — the same re-read-then-retry discipline the
//! teacher's scheduler uses around its claim/release calls, here applied
//! to file content hashes instead of an external CLI's exit code.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::entity::{Complexity, ContainerMeta, DirRef, EpicIndex, FileRef, FixIndex, MilestoneIndex, PhaseIndex, Priority, RootIndex, Status, TaskFrontmatter};
use crate::error::{BacklogError, Result};
use crate::frontmatter::{self, envelope};
use crate::id::{PathId, TASK_PAD_WIDTH};
use crate::resolver;
use crate::tree::{ContainerKind, ContainerNode, Tree};

/// Result of a successful mutation: the tree as it now stands, reloaded
/// fresh and re-mutated on the winning attempt, plus the ids it touched.
#[derive(Debug)]
pub struct MutationOutcome {
    pub tree: Tree,
    pub affected: Vec<PathId>,
}

struct Commit {
    writes: Vec<(PathBuf, String)>,
    guards: Vec<(PathBuf, String)>,
}

impl Commit {
    fn new() -> Self {
        Commit {
            writes: Vec::new(),
            guards: Vec::new(),
        }
    }

    fn stage(&mut self, path: PathBuf, contents: String) {
        self.writes.push((path, contents));
    }

    /// Snapshot `path`'s current content hash so `commit` can detect a
    /// concurrent writer.
    fn guard(&mut self, path: PathBuf) -> Result<()> {
        let hash = hash_file(&path)?;
        self.guards.push((path, hash));
        Ok(())
    }

    fn commit(self) -> Result<()> {
        for (path, expected) in &self.guards {
            let current = hash_file(path)?;
            if &current != expected {
                return Err(BacklogError::ConcurrentModification(path.display().to_string()));
            }
        }
        for (path, contents) in &self.writes {
            frontmatter::atomic_write(path, contents)?;
        }
        Ok(())
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let contents = fs::read(path).map_err(|e| BacklogError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

fn render_task(fm: &TaskFrontmatter, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(fm).map_err(|e| BacklogError::MalformedFrontmatter {
        path: PathBuf::new(),
        reason: e.to_string(),
    })?;
    Ok(envelope::join(&yaml, body))
}

fn render_index<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| BacklogError::MalformedFrontmatter {
        path: PathBuf::new(),
        reason: e.to_string(),
    })
}

fn render_container_index(container: &ContainerNode) -> Result<String> {
    let index_path = container.dir.join("index.yaml");
    match container.kind {
        ContainerKind::Phase => {
            let mut idx: PhaseIndex = frontmatter::read_index(&index_path)?;
            idx.meta = container.meta.clone();
            render_index(&idx)
        }
        ContainerKind::Milestone => {
            let mut idx: MilestoneIndex = frontmatter::read_index(&index_path)?;
            idx.meta = container.meta.clone();
            render_index(&idx)
        }
        ContainerKind::Epic => {
            let mut idx: EpicIndex = frontmatter::read_index(&index_path)?;
            idx.meta = container.meta.clone();
            render_index(&idx)
        }
    }
}

fn stage_container_meta(tree: &Tree, commit: &mut Commit, id: &PathId) -> Result<()> {
    let container = tree
        .container(id)
        .ok_or_else(|| BacklogError::not_found_container(id.to_string()))?;
    let path = container.dir.join("index.yaml");
    commit.guard(path.clone())?;
    commit.stage(path, render_container_index(container)?);
    Ok(())
}

/// Re-reads `index.yaml` for `id` and patches just its `meta` — the
/// generic helper every container-touching operation (lock, cascade,
/// undone) funnels through so the DirRef/FileRef lists and `extra` stay
/// byte-faithful to what was already on disk.
fn patch_container_meta(tree: &mut Tree, id: &PathId, f: impl FnOnce(&mut ContainerMeta)) -> Result<()> {
    let container = tree
        .containers
        .get_mut(id)
        .ok_or_else(|| BacklogError::not_found_container(id.to_string()))?;
    f(&mut container.meta);
    Ok(())
}

fn with_retry(
    base: &Path,
    mut op: impl FnMut(&mut Tree) -> Result<(Commit, Vec<PathId>)>,
) -> Result<MutationOutcome> {
    let mut last_conflict = None;
    for _ in 0..2 {
        let mut tree = Tree::load(base)?;
        let (commit, affected) = op(&mut tree)?;
        match commit.commit() {
            Ok(()) => return Ok(MutationOutcome { tree, affected }),
            Err(BacklogError::ConcurrentModification(p)) => {
                last_conflict = Some(BacklogError::ConcurrentModification(p));
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_conflict.expect("loop runs at least once"))
}

/// Walk upward from each changed task's parent, marking a container
/// `done` (and, for a phase, `locked`) once every descendant task is
/// done. Returns the ids whose `meta` changed so the caller can stage
/// them.
fn cascade_completion(tree: &mut Tree, changed: &[PathId]) -> Result<Vec<PathId>> {
    let mut queue: Vec<PathId> = changed.iter().filter_map(|id| id.parent()).collect();
    let mut seen = HashSet::new();
    let mut touched = Vec::new();

    while let Some(cid) = queue.pop() {
        if !seen.insert(cid.clone()) {
            continue;
        }
        let descendants = tree.descendant_tasks(&cid);
        let all_done = !descendants.is_empty()
            && descendants
                .iter()
                .all(|t| matches!(tree.task(t), Some(n) if n.frontmatter.status == Status::Done));
        if !all_done {
            continue;
        }
        let was_done = tree.container(&cid).map(|c| c.meta.status == Some(Status::Done)).unwrap_or(false);
        patch_container_meta(tree, &cid, |meta| {
            meta.status = Some(Status::Done);
            if matches!(cid, PathId::Phase(_)) {
                meta.locked = Some(true);
            }
        })?;
        touched.push(cid.clone());
        if !was_done {
            if let Some(p) = cid.parent() {
                queue.push(p);
            }
        }
    }
    Ok(touched)
}

fn next_task_number(children: &[PathId]) -> u32 {
    children
        .iter()
        .filter_map(|c| match c {
            PathId::Task(_, _, _, t) => Some(*t),
            _ => None,
        })
        .max()
        .unwrap_or(0)
        + 1
}

fn task_filename(n: u32, slug: &str) -> String {
    format!("T{n:0width$}-{slug}.todo", width = TASK_PAD_WIDTH)
}

// ---------------------------------------------------------------------
// add / add-epic / add-milestone / add-phase
// ---------------------------------------------------------------------

/// Append a new task under an existing epic.
pub fn add(base: &Path, epic_id: &PathId, title: &str) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let epic = tree
            .container(epic_id)
            .ok_or_else(|| BacklogError::not_found_container(epic_id.to_string()))?;
        if epic.meta.locked == Some(true) || tree.has_locked_ancestor(epic_id) {
            return Err(BacklogError::locked(epic_id.to_string(), "epic"));
        }
        let epic_dir = epic.dir.clone();
        let index_path = epic_dir.join("index.yaml");

        let mut commit = Commit::new();
        commit.guard(index_path.clone())?;

        let (p, m, e) = match epic_id {
            PathId::Epic(p, m, e) => (*p, *m, *e),
            _ => return Err(BacklogError::InvalidId(epic_id.to_string())),
        };
        let next_n = next_task_number(&epic.children);
        let new_id = PathId::Task(p, m, e, next_n);
        let slug = crate::slug::slugify_default(title);
        let filename = task_filename(next_n, &slug);
        let task_path = epic_dir.join(&filename);

        let mut fm = TaskFrontmatter::new(new_id.clone(), title);
        fm.created_at = Some(Utc::now());
        let body = "TODO: Add requirements/acceptance criteria\n".to_string();
        commit.stage(task_path.clone(), render_task(&fm, &body)?);

        let mut index: EpicIndex = frontmatter::read_index(&index_path)?;
        index.tasks.push(FileRef {
            id: new_id.clone(),
            file: filename,
        });
        commit.stage(index_path, render_index(&index)?);

        tree.tasks.insert(
            new_id.clone(),
            crate::tree::TaskNode {
                id: new_id.clone(),
                path: task_path,
                frontmatter: fm,
                body,
            },
        );
        tree.containers.get_mut(epic_id).unwrap().children.push(new_id.clone());

        Ok((commit, vec![new_id]))
    })
}

/// Append a new epic under an existing milestone.
pub fn add_epic(base: &Path, milestone_id: &PathId, title: &str) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let milestone = tree
            .container(milestone_id)
            .ok_or_else(|| BacklogError::not_found_container(milestone_id.to_string()))?;
        if milestone.meta.locked == Some(true) || tree.has_locked_ancestor(milestone_id) {
            return Err(BacklogError::locked(milestone_id.to_string(), "milestone"));
        }
        let milestone_dir = milestone.dir.clone();
        let index_path = milestone_dir.join("index.yaml");

        let mut commit = Commit::new();
        commit.guard(index_path.clone())?;

        let (p, m) = match milestone_id {
            PathId::Milestone(p, m) => (*p, *m),
            _ => return Err(BacklogError::InvalidId(milestone_id.to_string())),
        };
        let next_n = milestone
            .children
            .iter()
            .filter_map(|c| match c {
                PathId::Epic(_, _, e) => Some(*e),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        let new_id = PathId::Epic(p, m, next_n);
        let slug = crate::slug::slugify_default(title);
        let dirname = format!("{next_n:02}-{slug}");
        let epic_dir = milestone_dir.join(&dirname);

        let mut meta = ContainerMeta::default();
        meta.name = Some(title.to_string());
        let new_index = EpicIndex {
            meta,
            tasks: Vec::new(),
            extra: serde_yaml::Mapping::new(),
        };
        commit.stage(epic_dir.join("index.yaml"), render_index(&new_index)?);

        let mut index: MilestoneIndex = frontmatter::read_index(&index_path)?;
        index.epics.push(DirRef {
            id: new_id.clone(),
            path: dirname,
        });
        commit.stage(index_path, render_index(&index)?);

        tree.containers.insert(
            new_id.clone(),
            ContainerNode {
                id: new_id.clone(),
                kind: ContainerKind::Epic,
                dir: epic_dir,
                meta: new_index.meta,
                children: Vec::new(),
            },
        );
        tree.containers.get_mut(milestone_id).unwrap().children.push(new_id.clone());

        Ok((commit, vec![new_id]))
    })
}

/// Append a new milestone under an existing phase.
pub fn add_milestone(base: &Path, phase_id: &PathId, title: &str) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let phase = tree
            .container(phase_id)
            .ok_or_else(|| BacklogError::not_found_container(phase_id.to_string()))?;
        if phase.meta.locked == Some(true) {
            return Err(BacklogError::locked(phase_id.to_string(), "phase"));
        }
        let phase_dir = phase.dir.clone();
        let index_path = phase_dir.join("index.yaml");

        let mut commit = Commit::new();
        commit.guard(index_path.clone())?;

        let p = match phase_id {
            PathId::Phase(p) => *p,
            _ => return Err(BacklogError::InvalidId(phase_id.to_string())),
        };
        let next_n = phase
            .children
            .iter()
            .filter_map(|c| match c {
                PathId::Milestone(_, m) => Some(*m),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        let new_id = PathId::Milestone(p, next_n);
        let slug = crate::slug::slugify_default(title);
        let dirname = format!("{next_n:02}-{slug}");
        let milestone_dir = phase_dir.join(&dirname);

        let mut meta = ContainerMeta::default();
        meta.name = Some(title.to_string());
        let new_index = MilestoneIndex {
            meta,
            epics: Vec::new(),
            extra: serde_yaml::Mapping::new(),
        };
        commit.stage(milestone_dir.join("index.yaml"), render_index(&new_index)?);

        let mut index: PhaseIndex = frontmatter::read_index(&index_path)?;
        index.milestones.push(DirRef {
            id: new_id.clone(),
            path: dirname,
        });
        commit.stage(index_path, render_index(&index)?);

        tree.containers.insert(
            new_id.clone(),
            ContainerNode {
                id: new_id.clone(),
                kind: ContainerKind::Milestone,
                dir: milestone_dir,
                meta: new_index.meta,
                children: Vec::new(),
            },
        );
        tree.containers.get_mut(phase_id).unwrap().children.push(new_id.clone());

        Ok((commit, vec![new_id]))
    })
}

/// Append a new phase at the project root.
pub fn add_phase(base: &Path, title: &str) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let root_index_path = tree.root_dir.join("index.yaml");
        let mut commit = Commit::new();
        commit.guard(root_index_path.clone())?;

        let next_n = tree
            .phase_order
            .iter()
            .filter_map(|c| match c {
                PathId::Phase(p) => Some(*p),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        let new_id = PathId::Phase(next_n);
        let slug = crate::slug::slugify_default(title);
        let dirname = format!("{next_n:02}-{slug}");
        let phase_dir = tree.root_dir.join(&dirname);

        let mut meta = ContainerMeta::default();
        meta.name = Some(title.to_string());
        let new_index = PhaseIndex {
            meta,
            milestones: Vec::new(),
            extra: serde_yaml::Mapping::new(),
        };
        commit.stage(phase_dir.join("index.yaml"), render_index(&new_index)?);

        let mut root_index = RootIndex {
            project: tree.project.clone(),
            phases: tree
                .phase_order
                .iter()
                .map(|id| DirRef {
                    id: id.clone(),
                    path: tree.container(id).map(|c| dir_relative(&tree.root_dir, &c.dir)).unwrap_or_default(),
                })
                .collect(),
            critical_path: tree.critical_path.clone(),
            next_available: tree.next_available.clone(),
            extra: tree.root_extra.clone(),
        };
        root_index.phases.push(DirRef {
            id: new_id.clone(),
            path: dirname,
        });
        commit.stage(root_index_path, render_index(&root_index)?);

        tree.containers.insert(
            new_id.clone(),
            ContainerNode {
                id: new_id.clone(),
                kind: ContainerKind::Phase,
                dir: phase_dir,
                meta: new_index.meta,
                children: Vec::new(),
            },
        );
        tree.phase_order.push(new_id.clone());

        Ok((commit, vec![new_id]))
    })
}

fn dir_relative(root: &Path, dir: &Path) -> String {
    dir.strip_prefix(root)
        .unwrap_or(dir)
        .to_string_lossy()
        .to_string()
}

/// Create a fresh `.tasks/` (or `.backlog/`) root with an empty root index.
/// Refuses if a root already exists at `base` (no silent overwrite).
pub fn init(base: &Path, project: &str) -> Result<PathBuf> {
    let root_dir = crate::paths::preferred_root(base);
    if root_dir.is_dir() {
        return Err(BacklogError::io(
            root_dir.clone(),
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "backlog already initialised"),
        ));
    }
    let index = RootIndex {
        project: project.to_string(),
        phases: Vec::new(),
        critical_path: Vec::new(),
        next_available: None,
        extra: serde_yaml::Mapping::new(),
    };
    frontmatter::write_index(&root_dir.join("index.yaml"), &index)?;
    Ok(root_dir)
}

// ---------------------------------------------------------------------
// auxiliary backlogs (bug / idea)
// ---------------------------------------------------------------------

fn add_aux_entry(
    base: &Path,
    dirname: &'static str,
    build_id: fn(u32) -> PathId,
    title: &str,
) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let aux_dir = tree.root_dir.join(dirname);
        let index_path = aux_dir.join("index.yaml");

        let mut commit = Commit::new();
        let existing: crate::entity::AuxIndex = if index_path.is_file() {
            commit.guard(index_path.clone())?;
            frontmatter::read_index(&index_path)?
        } else {
            crate::entity::AuxIndex::default()
        };

        let order = match dirname {
            "bugs" => &tree.bug_order,
            "ideas" => &tree.idea_order,
            _ => unreachable!("only bugs/ideas are auxiliary-indexed entries"),
        };
        let next_n = order
            .iter()
            .filter_map(|id| match id {
                PathId::Bug(n) | PathId::Idea(n) => Some(*n),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        let new_id = build_id(next_n);
        let slug = crate::slug::slugify_default(title);
        let filename = format!(
            "{}{next_n:0width$}-{slug}.todo",
            &new_id.to_string()[..1],
            width = TASK_PAD_WIDTH
        );
        let task_path = aux_dir.join(&filename);

        let mut fm = TaskFrontmatter::new(new_id.clone(), title);
        fm.created_at = Some(Utc::now());
        let body = "TODO: Add requirements/acceptance criteria\n".to_string();
        commit.stage(task_path.clone(), render_task(&fm, &body)?);

        let mut index = existing;
        index.tasks.push(FileRef {
            id: new_id.clone(),
            file: filename,
        });
        commit.stage(index_path, render_index(&index)?);

        tree.tasks.insert(
            new_id.clone(),
            crate::tree::TaskNode {
                id: new_id.clone(),
                path: task_path,
                frontmatter: fm,
                body,
            },
        );
        match dirname {
            "bugs" => {
                tree.bug_order.push(new_id.clone());
                tree.bug_order.sort();
            }
            "ideas" => {
                tree.idea_order.push(new_id.clone());
                tree.idea_order.sort();
            }
            _ => unreachable!(),
        }

        Ok((commit, vec![new_id]))
    })
}

/// Append a new entry to the flat bug backlog.
pub fn add_bug(base: &Path, title: &str) -> Result<MutationOutcome> {
    add_aux_entry(base, "bugs", PathId::Bug, title)
}

/// Append a new entry to the flat idea backlog.
pub fn add_idea(base: &Path, title: &str) -> Result<MutationOutcome> {
    add_aux_entry(base, "ideas", PathId::Idea, title)
}

// ---------------------------------------------------------------------
// lifecycle
// ---------------------------------------------------------------------

/// Claim every id atomically: all must be pending or none are touched.
pub fn claim(base: &Path, ids: &[PathId], agent: &str) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        for id in ids {
            let node = tree
                .task(id)
                .ok_or_else(|| BacklogError::not_found_task(id.to_string()))?;
            if node.frontmatter.status != Status::Pending {
                return Err(BacklogError::InvalidStatus(format!("{id} is not pending")));
            }
        }
        let now = Utc::now();
        let mut commit = Commit::new();
        for id in ids {
            let node = tree.tasks.get_mut(id).unwrap();
            node.frontmatter.status = Status::InProgress;
            node.frontmatter.claimed_by = Some(agent.to_string());
            node.frontmatter.claimed_at = Some(now);
            node.frontmatter.started_at = Some(now);
            commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        }
        Ok((commit, ids.to_vec()))
    })
}

/// Complete every id, then cascade container completion upward.
pub fn done(base: &Path, ids: &[PathId], force: bool) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        for id in ids {
            let node = tree
                .task(id)
                .ok_or_else(|| BacklogError::not_found_task(id.to_string()))?;
            if node.frontmatter.status != Status::InProgress && !force {
                return Err(BacklogError::InvalidStatus(format!(
                    "{id} is not in_progress (use --force)"
                )));
            }
        }
        let now = Utc::now();
        let mut commit = Commit::new();
        for id in ids {
            let node = tree.tasks.get_mut(id).unwrap();
            node.frontmatter.status = Status::Done;
            node.frontmatter.completed_at = Some(now);
            commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        }
        let touched = cascade_completion(tree, ids)?;
        for cid in &touched {
            stage_container_meta(tree, &mut commit, cid)?;
        }
        let mut affected = ids.to_vec();
        affected.extend(touched);
        Ok((commit, affected))
    })
}

/// Reverse a task (or every descendant of a container) back to pending.
pub fn undone(base: &Path, id: &PathId) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let mut commit = Commit::new();
        let mut affected = vec![id.clone()];

        if tree.tasks.contains_key(id) {
            let node = tree.tasks.get_mut(id).unwrap();
            node.frontmatter.status = Status::Pending;
            node.frontmatter.completed_at = None;
            commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        } else if tree.containers.contains_key(id) {
            let descendants = tree.descendant_tasks(id);
            for t in &descendants {
                let node = tree.tasks.get_mut(t).unwrap();
                node.frontmatter.status = Status::Pending;
                node.frontmatter.completed_at = None;
                node.frontmatter.claimed_by = None;
                node.frontmatter.claimed_at = None;
                node.frontmatter.started_at = None;
                commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
            }
            affected.extend(descendants);

            let mut stack = vec![id.clone()];
            while let Some(cid) = stack.pop() {
                if let Some(c) = tree.containers.get(&cid) {
                    stack.extend(c.children.iter().filter(|ch| tree.containers.contains_key(ch)).cloned());
                }
                patch_container_meta(tree, &cid, |meta| {
                    meta.status = None;
                    meta.locked = None;
                })?;
                stage_container_meta(tree, &mut commit, &cid)?;
            }
        } else {
            return Err(BacklogError::not_found_task(id.to_string()));
        }

        // A container above `id` may have been marked done by the now-reversed
        // work; unwind that chain too, stopping at the first ancestor that
        // wasn't derived from it.
        let mut cursor = id.parent();
        while let Some(cid) = cursor {
            let was_done = tree.container(&cid).map(|c| c.meta.status == Some(Status::Done)).unwrap_or(false);
            if !was_done {
                break;
            }
            patch_container_meta(tree, &cid, |meta| {
                meta.status = None;
                meta.locked = None;
            })?;
            stage_container_meta(tree, &mut commit, &cid)?;
            affected.push(cid.clone());
            cursor = cid.parent();
        }

        Ok((commit, affected))
    })
}

/// Free-form status change with an optional recorded reason.
pub fn update(base: &Path, id: &PathId, status: Status, reason: Option<&str>) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let mut commit = Commit::new();
        let node = tree
            .tasks
            .get_mut(id)
            .ok_or_else(|| BacklogError::not_found_task(id.to_string()))?;
        node.frontmatter.status = status;
        if let Some(r) = reason {
            node.frontmatter.blocked_reason = Some(r.to_string());
        }
        commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        Ok((commit, vec![id.clone()]))
    })
}

/// Fields mergeable via `set`; at least one must be present.
#[derive(Debug, Default)]
pub struct SetFields {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub complexity: Option<Complexity>,
    pub estimate_hours: Option<f64>,
    pub depends_on: Option<Vec<PathId>>,
    pub tags: Option<Vec<String>>,
}

impl SetFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.complexity.is_none()
            && self.estimate_hours.is_none()
            && self.depends_on.is_none()
            && self.tags.is_none()
    }
}

pub fn set(base: &Path, id: &PathId, fields: SetFields) -> Result<MutationOutcome> {
    if fields.is_empty() {
        return Err(BacklogError::RequiresField);
    }
    with_retry(base, |tree| {
        let mut commit = Commit::new();
        let node = tree
            .tasks
            .get_mut(id)
            .ok_or_else(|| BacklogError::not_found_task(id.to_string()))?;
        if let Some(title) = &fields.title {
            node.frontmatter.title = title.clone();
        }
        if let Some(priority) = fields.priority {
            node.frontmatter.priority = priority;
        }
        if let Some(complexity) = fields.complexity {
            node.frontmatter.complexity = complexity;
        }
        if let Some(hours) = fields.estimate_hours {
            node.frontmatter.estimate_hours = hours;
        }
        if let Some(deps) = &fields.depends_on {
            node.frontmatter.depends_on = deps.clone();
        }
        if let Some(tags) = &fields.tags {
            node.frontmatter.tags = tags.clone();
        }
        commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        Ok((commit, vec![id.clone()]))
    })
}

/// Clear claim metadata; idempotent when already pending with stale
/// claim fields.
pub fn unclaim(base: &Path, id: &PathId) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let mut commit = Commit::new();
        let node = tree
            .tasks
            .get_mut(id)
            .ok_or_else(|| BacklogError::not_found_task(id.to_string()))?;
        node.frontmatter.claimed_by = None;
        node.frontmatter.claimed_at = None;
        if node.frontmatter.status == Status::InProgress {
            node.frontmatter.status = Status::Pending;
            node.frontmatter.started_at = None;
        }
        commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        Ok((commit, vec![id.clone()]))
    })
}

pub fn blocked(base: &Path, id: &PathId, reason: &str) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let mut commit = Commit::new();
        let node = tree
            .tasks
            .get_mut(id)
            .ok_or_else(|| BacklogError::not_found_task(id.to_string()))?;
        node.frontmatter.status = Status::Blocked;
        node.frontmatter.blocked_reason = Some(reason.to_string());
        commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        Ok((commit, vec![id.clone()]))
    })
}

/// Select the next-available id under `scope` (or the whole tree) and
/// claim it. A chosen bug also surfaces up to two parallel-safe fan-out
/// bugs alongside it: with `single` they are only *listed* (returned in
/// `affected`, for a caller to see what else is safe to pick up), without
/// it they are also claimed along with the chosen id.
pub fn grab(base: &Path, agent: &str, scopes: &[String], single: bool) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let scoped = if scopes.is_empty() {
            None
        } else {
            Some(resolver::scope_filter(tree, scopes)?)
        };
        let mut candidates = resolver::available_tasks(tree);
        if let Some(scoped) = &scoped {
            candidates.retain(|id| scoped.contains(id));
        }
        let critical_path = tree.critical_path.clone();
        resolver::sort_by_priority(tree, &mut candidates, &critical_path);
        let chosen = candidates
            .first()
            .cloned()
            .ok_or_else(|| BacklogError::NoMatchScope("no available task in scope".to_string()))?;

        let fan_out_ids = if matches!(chosen, PathId::Bug(_)) {
            resolver::fan_out(tree, &chosen, 2, &critical_path)
        } else {
            Vec::new()
        };

        let mut listed = vec![chosen.clone()];
        listed.extend(fan_out_ids.clone());

        let claimed = if single {
            vec![chosen.clone()]
        } else {
            listed.clone()
        };

        let now = Utc::now();
        let mut commit = Commit::new();
        for id in &claimed {
            let node = tree.tasks.get_mut(id).unwrap();
            node.frontmatter.status = Status::InProgress;
            node.frontmatter.claimed_by = Some(agent.to_string());
            node.frontmatter.claimed_at = Some(now);
            node.frontmatter.started_at = Some(now);
            commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
        }
        Ok((commit, listed))
    })
}

/// `done(id)` followed by `grab(agent, scope)`; skips the grab if
/// completing `id` closed its phase.
pub fn cycle(base: &Path, id: &PathId, agent: &str, scopes: &[String]) -> Result<MutationOutcome> {
    let after_done = done(base, std::slice::from_ref(id), false)?;
    let phase_closed = id
        .parent()
        .and_then(|epic| epic.parent())
        .and_then(|milestone| milestone.parent())
        .and_then(|phase| after_done.tree.container(&phase).map(|c| c.meta.locked == Some(true)))
        .unwrap_or(false);
    if phase_closed {
        return Ok(after_done);
    }
    grab(base, agent, scopes, false)
}

fn set_locked(base: &Path, id: &PathId, locked: bool) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let mut commit = Commit::new();
        patch_container_meta(tree, id, |meta| meta.locked = Some(locked))?;
        stage_container_meta(tree, &mut commit, id)?;
        Ok((commit, vec![id.clone()]))
    })
}

pub fn lock(base: &Path, id: &PathId) -> Result<MutationOutcome> {
    set_locked(base, id, true)
}

pub fn unlock(base: &Path, id: &PathId) -> Result<MutationOutcome> {
    set_locked(base, id, false)
}

// ---------------------------------------------------------------------
// move
// ---------------------------------------------------------------------

/// Reparent a task or epic under a new container, re-deriving its Path ID
/// and rewriting every `depends_on` reference across the tree that
/// pointed at the old id.
pub fn move_item(base: &Path, id: &PathId, to: &PathId) -> Result<MutationOutcome> {
    let mut cleanup_dir: Option<PathBuf> = None;
    let outcome = with_retry(base, |tree| {
        let (commit, affected, cleanup) = match id {
            PathId::Task(..) => move_task(tree, id, to)?,
            PathId::Epic(..) => move_epic(tree, id, to)?,
            _ => return Err(BacklogError::InvalidId(format!("{id} cannot be moved"))),
        };
        cleanup_dir = cleanup;
        Ok((commit, affected))
    })?;

    if let Some(dir) = cleanup_dir {
        if fs::read_dir(&dir).map(|mut it| it.next().is_none()).unwrap_or(false) {
            let _ = fs::remove_dir(&dir);
        }
    }
    Ok(outcome)
}

fn rewrite_dependents(tree: &mut Tree, old: &PathId, new: &PathId) -> Vec<PathId> {
    let mut rewritten = Vec::new();
    for (tid, node) in tree.tasks.iter_mut() {
        if tid == old {
            continue;
        }
        let mut changed = false;
        for dep in node.frontmatter.depends_on.iter_mut() {
            if dep == old {
                *dep = new.clone();
                changed = true;
            }
        }
        if changed {
            rewritten.push(tid.clone());
        }
    }
    rewritten
}

fn move_task(tree: &mut Tree, id: &PathId, to: &PathId) -> Result<(Commit, Vec<PathId>, Option<PathBuf>)> {
    let dest_epic = tree
        .container(to)
        .ok_or_else(|| BacklogError::not_found_container(to.to_string()))?;
    if dest_epic.meta.locked == Some(true) || tree.has_locked_ancestor(to) {
        return Err(BacklogError::locked(to.to_string(), "epic"));
    }
    let dest_dir = dest_epic.dir.clone();
    let dest_index_path = dest_dir.join("index.yaml");
    let (dp, dm, de) = match to {
        PathId::Epic(p, m, e) => (*p, *m, *e),
        _ => return Err(BacklogError::InvalidId(to.to_string())),
    };
    let next_n = next_task_number(&dest_epic.children);

    let src_epic_id = id.parent().ok_or_else(|| BacklogError::InvalidId(id.to_string()))?;
    let src_dir = tree
        .container(&src_epic_id)
        .ok_or_else(|| BacklogError::not_found_container(src_epic_id.to_string()))?
        .dir
        .clone();
    let src_index_path = src_dir.join("index.yaml");

    let mut commit = Commit::new();
    commit.guard(src_index_path.clone())?;
    commit.guard(dest_index_path.clone())?;

    let mut node = tree
        .tasks
        .remove(id)
        .ok_or_else(|| BacklogError::not_found_task(id.to_string()))?;
    let old_filename = node.path.file_name().unwrap().to_string_lossy().to_string();
    let slug = old_filename
        .split_once('-')
        .map(|(_, rest)| rest.trim_end_matches(".todo"))
        .unwrap_or("task");
    let new_id = PathId::Task(dp, dm, de, next_n);
    let new_filename = task_filename(next_n, slug);
    let new_path = dest_dir.join(&new_filename);

    node.id = new_id.clone();
    node.frontmatter.id = new_id.clone();
    node.path = new_path.clone();

    let rewritten = rewrite_dependents(tree, id, &new_id);

    commit.stage(new_path, render_task(&node.frontmatter, &node.body)?);
    for tid in &rewritten {
        let n = tree.tasks.get(tid).unwrap();
        commit.stage(n.path.clone(), render_task(&n.frontmatter, &n.body)?);
    }

    let mut src_index: EpicIndex = frontmatter::read_index(&src_index_path)?;
    src_index.tasks.retain(|f| &f.id != id);
    commit.stage(src_index_path, render_index(&src_index)?);

    let mut dest_index: EpicIndex = frontmatter::read_index(&dest_index_path)?;
    dest_index.tasks.push(FileRef {
        id: new_id.clone(),
        file: new_filename,
    });
    commit.stage(dest_index_path, render_index(&dest_index)?);

    tree.tasks.insert(new_id.clone(), node);
    tree.containers.get_mut(&src_epic_id).unwrap().children.retain(|c| c != id);
    tree.containers.get_mut(to).unwrap().children.push(new_id.clone());

    let touched = cascade_completion(tree, &[new_id.clone()])?;
    for cid in &touched {
        stage_container_meta(tree, &mut commit, cid)?;
    }

    let mut affected = vec![new_id];
    affected.extend(rewritten);
    affected.extend(touched);

    Ok((commit, affected, Some(src_dir)))
}

/// Reparent an epic (and every task beneath it) under a new milestone.
///
/// Unlike `move_task`, this physically relocates the epic's directory
/// tree with `fs::rename` before staging the renumbered task contents —
/// the rename is itself atomic on one filesystem, but it happens outside
/// the guarded commit, so a crash between the rename and the commit can
/// leave task files needing one more `move` retry to pick up their new
/// ids. Recorded as an accepted limitation rather than guessed away.
fn move_epic(tree: &mut Tree, id: &PathId, to: &PathId) -> Result<(Commit, Vec<PathId>, Option<PathBuf>)> {
    let dest_milestone = tree
        .container(to)
        .ok_or_else(|| BacklogError::not_found_container(to.to_string()))?;
    if dest_milestone.meta.locked == Some(true) || tree.has_locked_ancestor(to) {
        return Err(BacklogError::locked(to.to_string(), "milestone"));
    }
    let dest_dir = dest_milestone.dir.clone();
    let dest_index_path = dest_dir.join("index.yaml");
    let (dp, dm) = match to {
        PathId::Milestone(p, m) => (*p, *m),
        _ => return Err(BacklogError::InvalidId(to.to_string())),
    };
    let next_n = dest_milestone
        .children
        .iter()
        .filter_map(|c| match c {
            PathId::Epic(_, _, e) => Some(*e),
            _ => None,
        })
        .max()
        .unwrap_or(0)
        + 1;
    let new_epic_id = PathId::Epic(dp, dm, next_n);

    let src_milestone_id = id.parent().ok_or_else(|| BacklogError::InvalidId(id.to_string()))?;
    let src_milestone_dir = tree
        .container(&src_milestone_id)
        .ok_or_else(|| BacklogError::not_found_container(src_milestone_id.to_string()))?
        .dir
        .clone();
    let src_index_path = src_milestone_dir.join("index.yaml");

    let mut commit = Commit::new();
    commit.guard(src_index_path.clone())?;
    commit.guard(dest_index_path.clone())?;

    let old_epic = tree
        .containers
        .remove(id)
        .ok_or_else(|| BacklogError::not_found_container(id.to_string()))?;
    let epic_dirname = old_epic
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let new_epic_dir = dest_dir.join(&epic_dirname);
    fs::rename(&old_epic.dir, &new_epic_dir).map_err(|e| BacklogError::io(&old_epic.dir, e))?;

    let mut id_map: Vec<(PathId, PathId)> = vec![(id.clone(), new_epic_id.clone())];
    let mut renumbered_tasks = Vec::new();
    for old_task_id in &old_epic.children {
        let mut node = tree
            .tasks
            .remove(old_task_id)
            .ok_or_else(|| BacklogError::not_found_task(old_task_id.to_string()))?;
        let t = match old_task_id {
            PathId::Task(_, _, _, t) => *t,
            _ => continue,
        };
        let new_task_id = PathId::Task(dp, dm, next_n, t);
        let filename = node.path.file_name().unwrap().to_string_lossy().to_string();
        node.id = new_task_id.clone();
        node.frontmatter.id = new_task_id.clone();
        node.path = new_epic_dir.join(&filename);
        id_map.push((old_task_id.clone(), new_task_id.clone()));
        tree.tasks.insert(new_task_id.clone(), node);
        renumbered_tasks.push(new_task_id);
    }

    let mut rewritten = Vec::new();
    for (tid, node) in tree.tasks.iter_mut() {
        let mut changed = false;
        for dep in node.frontmatter.depends_on.iter_mut() {
            if let Some((_, new)) = id_map.iter().find(|(old, _)| old == dep) {
                *dep = new.clone();
                changed = true;
            }
        }
        if changed {
            rewritten.push(tid.clone());
        }
    }

    for new_task_id in &renumbered_tasks {
        let node = tree.tasks.get(new_task_id).unwrap();
        commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
    }
    for tid in &rewritten {
        let node = tree.tasks.get(tid).unwrap();
        commit.stage(node.path.clone(), render_task(&node.frontmatter, &node.body)?);
    }

    let epic_index_path = new_epic_dir.join("index.yaml");
    let mut epic_index: EpicIndex = frontmatter::read_index(&epic_index_path)?;
    epic_index.tasks = renumbered_tasks
        .iter()
        .map(|nid| FileRef {
            id: nid.clone(),
            file: tree.tasks.get(nid).unwrap().path.file_name().unwrap().to_string_lossy().to_string(),
        })
        .collect();
    commit.stage(epic_index_path, render_index(&epic_index)?);

    let mut src_index: MilestoneIndex = frontmatter::read_index(&src_index_path)?;
    src_index.epics.retain(|e| &e.id != id);
    commit.stage(src_index_path, render_index(&src_index)?);

    let mut dest_index: MilestoneIndex = frontmatter::read_index(&dest_index_path)?;
    dest_index.epics.push(DirRef {
        id: new_epic_id.clone(),
        path: epic_dirname,
    });
    commit.stage(dest_index_path, render_index(&dest_index)?);

    let mut new_container = old_epic;
    new_container.id = new_epic_id.clone();
    new_container.dir = new_epic_dir;
    new_container.children = renumbered_tasks.clone();
    tree.containers.insert(new_epic_id.clone(), new_container);
    tree.containers.get_mut(&src_milestone_id).unwrap().children.retain(|c| c != id);
    tree.containers.get_mut(to).unwrap().children.push(new_epic_id.clone());

    let mut affected = vec![new_epic_id];
    affected.extend(renumbered_tasks);
    affected.extend(rewritten);

    Ok((commit, affected, None))
}

// ---------------------------------------------------------------------
// fixes archive
// ---------------------------------------------------------------------

/// Append a new entry to the fixes archive, already `done`.
pub fn fixed(
    base: &Path,
    title: &str,
    at: Option<DateTime<Utc>>,
    tags: Vec<String>,
    body: Option<String>,
) -> Result<MutationOutcome> {
    with_retry(base, |tree| {
        let when = at.unwrap_or_else(Utc::now);
        let month_dirname = when.format("%Y-%m").to_string();
        let month_dir = tree.root_dir.join("fixes").join(&month_dirname);
        let month_index_path = month_dir.join("index.yaml");

        let mut commit = Commit::new();
        let existing: FixIndex = if month_index_path.is_file() {
            commit.guard(month_index_path.clone())?;
            frontmatter::read_index(&month_index_path)?
        } else {
            FixIndex::default()
        };

        let next_n = tree
            .fix_order
            .iter()
            .filter_map(|f| match f {
                PathId::Fix(n) => Some(*n),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        let new_id = PathId::Fix(next_n);
        let slug = crate::slug::slugify_default(title);
        let filename = format!("F{next_n:0width$}-{slug}.todo", width = TASK_PAD_WIDTH);
        let task_path = month_dir.join(&filename);

        let mut fm = TaskFrontmatter::new(new_id.clone(), title);
        fm.status = Status::Done;
        fm.tags = tags;
        fm.created_at = Some(when);
        fm.started_at = Some(when);
        fm.completed_at = Some(when);
        let body = body.unwrap_or_default();
        commit.stage(task_path.clone(), render_task(&fm, &body)?);

        let mut index = existing;
        index.tasks.push(FileRef {
            id: new_id.clone(),
            file: filename,
        });
        commit.stage(month_index_path, render_index(&index)?);

        tree.tasks.insert(
            new_id.clone(),
            crate::tree::TaskNode {
                id: new_id.clone(),
                path: task_path,
                frontmatter: fm,
                body,
            },
        );
        tree.fix_order.push(new_id.clone());
        tree.fix_order.sort();

        Ok((commit, vec![new_id]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AuxIndex, ContainerMeta};
    use std::fs;

    fn write_minimal_tree(root: &Path) {
        fs::create_dir_all(root.join("01-phase-one/01-milestone-one/01-epic-one")).unwrap();

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
    fn claim_then_done_cascades_to_locked_phase() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());

        let t001 = PathId::parse("P1.M1.E1.T001").unwrap();
        let t002 = PathId::parse("P1.M1.E1.T002").unwrap();

        claim(tmp.path(), &[t001.clone(), t002.clone()], "agent-1").unwrap();
        let outcome = done(tmp.path(), &[t001.clone(), t002.clone()], false).unwrap();

        assert_eq!(outcome.tree.task(&t001).unwrap().frontmatter.status, Status::Done);
        let phase = outcome.tree.container(&PathId::parse("P1").unwrap()).unwrap();
        assert_eq!(phase.meta.status, Some(Status::Done));
        assert_eq!(phase.meta.locked, Some(true));

        let err = add(tmp.path(), &PathId::parse("P1.M1.E1").unwrap(), "Too late").unwrap_err();
        assert_eq!(err.kind(), "LOCKED_CONTAINER");
    }

    #[test]
    fn done_without_force_on_pending_task_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let t001 = PathId::parse("P1.M1.E1.T001").unwrap();
        let err = done(tmp.path(), &[t001], false).unwrap_err();
        assert_eq!(err.kind(), "INVALID_STATUS");
    }

    #[test]
    fn force_done_succeeds_from_blocked() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let t001 = PathId::parse("P1.M1.E1.T001").unwrap();
        blocked(tmp.path(), &t001, "waiting on design review").unwrap();
        let outcome = done(tmp.path(), &[t001.clone()], true).unwrap();
        assert_eq!(outcome.tree.task(&t001).unwrap().frontmatter.status, Status::Done);
    }

    #[test]
    fn set_requires_at_least_one_field() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let err = set(tmp.path(), &PathId::parse("P1.M1.E1.T001").unwrap(), SetFields::default()).unwrap_err();
        assert_eq!(err.kind(), "REQUIRES_FIELD");
    }

    #[test]
    fn move_task_rewrites_dependents_and_reids() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());

        add_epic(tmp.path(), &PathId::parse("P1.M1").unwrap(), "Target Epic").unwrap();

        let outcome = move_item(
            tmp.path(),
            &PathId::parse("P1.M1.E1.T001").unwrap(),
            &PathId::parse("P1.M1.E2").unwrap(),
        )
        .unwrap();

        let new_id = PathId::parse("P1.M1.E2.T001").unwrap();
        assert!(outcome.tree.task(&new_id).is_some());
        assert!(outcome.tree.task(&PathId::parse("P1.M1.E1.T001").unwrap()).is_none());

        let t002 = outcome.tree.task(&PathId::parse("P1.M1.E1.T002").unwrap()).unwrap();
        assert_eq!(t002.frontmatter.depends_on, vec![new_id]);
    }

    #[test]
    fn undone_on_container_resets_descendants_and_clears_lock() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let t001 = PathId::parse("P1.M1.E1.T001").unwrap();
        let t002 = PathId::parse("P1.M1.E1.T002").unwrap();
        claim(tmp.path(), &[t001.clone(), t002.clone()], "agent-1").unwrap();
        done(tmp.path(), &[t001.clone(), t002.clone()], false).unwrap();

        let outcome = undone(tmp.path(), &PathId::parse("P1.M1.E1").unwrap()).unwrap();
        assert_eq!(outcome.tree.task(&t001).unwrap().frontmatter.status, Status::Pending);
        assert_eq!(outcome.tree.task(&t002).unwrap().frontmatter.status, Status::Pending);
        let phase = outcome.tree.container(&PathId::parse("P1").unwrap()).unwrap();
        assert_eq!(phase.meta.locked, None);
    }

    #[test]
    fn fixed_appends_to_month_bucket_as_done() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let outcome = fixed(tmp.path(), "Patched the race", None, vec!["hotfix".to_string()], None).unwrap();
        let f001 = PathId::parse("F001").unwrap();
        assert_eq!(outcome.tree.task(&f001).unwrap().frontmatter.status, Status::Done);
        assert_eq!(outcome.affected, vec![f001]);
    }

    #[test]
    fn bug_added_then_aux_index_has_entry() {
        // Smoke-test that AuxIndex is reachable from this module's imports
        // (bugs/ideas are created by the same `add` primitives the CLI
        // wires to `bug`/`idea` commands).
        let index = AuxIndex::default();
        assert!(index.tasks.is_empty());
    }
}
