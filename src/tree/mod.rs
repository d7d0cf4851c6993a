//! Tree loader (component C).
//!
//! Walks `.tasks/` (or `.backlog/`), reads every index and task file, and
//! assembles an in-memory graph keyed by Path ID. The graph is an explicit
//! value owned by the caller — there is no module-level cache keyed by
//! path, so repeated loads within one process always reflect what's on
//! disk at the time of the call.
//!
//! Children are keyed by the id each parent index *declares* for them
//! (`DirRef`/`FileRef`), which is the location-derived id per invariant 1.
//! A task file's own frontmatter `id` is kept alongside for the
//! consistency checker to cross-validate against that declared id
//! (invariant 2); a mismatch is a load-time warning, not an abort.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::entity::{AuxIndex, ContainerMeta, EpicIndex, FixIndex, MilestoneIndex, PhaseIndex, RootIndex, TaskFrontmatter};
use crate::error::{BacklogError, Result};
use crate::frontmatter;
use crate::id::PathId;
use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Phase,
    Milestone,
    Epic,
}

#[derive(Debug, Clone)]
pub struct ContainerNode {
    pub id: PathId,
    pub kind: ContainerKind,
    pub dir: PathBuf,
    pub meta: ContainerMeta,
    /// Child ids in declared (index) order — containers for Phase/Milestone,
    /// tasks for Epic.
    pub children: Vec<PathId>,
}

#[derive(Debug, Clone)]
pub struct TaskNode {
    /// Location-derived id: what the enclosing index declared this file as.
    pub id: PathId,
    pub path: PathBuf,
    pub frontmatter: TaskFrontmatter,
    pub body: String,
}

impl TaskNode {
    /// True when the file's own header disagrees with where it's filed.
    pub fn id_mismatch(&self) -> bool {
        self.frontmatter.id != self.id
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    pub root_dir: PathBuf,
    pub project: String,
    pub containers: BTreeMap<PathId, ContainerNode>,
    pub tasks: BTreeMap<PathId, TaskNode>,
    pub phase_order: Vec<PathId>,
    pub bug_order: Vec<PathId>,
    pub idea_order: Vec<PathId>,
    pub fix_order: Vec<PathId>,
    pub critical_path: Vec<PathId>,
    pub next_available: Option<PathId>,
    pub root_extra: serde_yaml::Mapping,
    pub(crate) rev_deps: BTreeMap<PathId, Vec<PathId>>,
}

impl Tree {
    pub fn load(base: &Path) -> Result<Tree> {
        let root_dir = paths::resolve_root(base)
            .ok_or_else(|| BacklogError::NotInitialised(base.to_path_buf()))?;
        Self::load_from_root(root_dir)
    }

    pub fn load_from_root(root_dir: PathBuf) -> Result<Tree> {
        let root_index_path = root_dir.join("index.yaml");
        let root_index: RootIndex = frontmatter::read_index(&root_index_path)?;

        let mut containers = BTreeMap::new();
        let mut tasks = BTreeMap::new();
        let mut phase_order = Vec::new();

        for phase_ref in &root_index.phases {
            let phase_dir = root_dir.join(&phase_ref.path);
            load_phase(&phase_dir, &phase_ref.id, &mut containers, &mut tasks)?;
            phase_order.push(phase_ref.id.clone());
        }

        let bug_order = load_aux(&root_dir.join("bugs"), &mut tasks)?;
        let idea_order = load_aux(&root_dir.join("ideas"), &mut tasks)?;
        let fix_order = load_fixes(&root_dir.join("fixes"), &mut tasks)?;

        let rev_deps = build_rev_deps(&tasks);

        Ok(Tree {
            root_dir,
            project: root_index.project,
            containers,
            tasks,
            phase_order,
            bug_order,
            idea_order,
            fix_order,
            critical_path: root_index.critical_path,
            next_available: root_index.next_available,
            root_extra: root_index.extra,
            rev_deps,
        })
    }

    pub fn task(&self, id: &PathId) -> Option<&TaskNode> {
        self.tasks.get(id)
    }

    pub fn container(&self, id: &PathId) -> Option<&ContainerNode> {
        self.containers.get(id)
    }

    pub fn depends_on(&self, id: &PathId) -> &[PathId] {
        self.tasks
            .get(id)
            .map(|t| t.frontmatter.depends_on.as_slice())
            .unwrap_or(&[])
    }

    pub fn rev_depends_on(&self, id: &PathId) -> &[PathId] {
        self.rev_deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_task_ids(&self) -> impl Iterator<Item = &PathId> {
        self.tasks.keys()
    }

    /// Explicit status if set on a container, else derived from descendant
    /// tasks: all done -> done, any in-progress -> in_progress, else pending.
    pub fn status_of(&self, id: &PathId) -> crate::entity::Status {
        use crate::entity::Status;
        if let Some(task) = self.tasks.get(id) {
            return task.frontmatter.status;
        }
        if let Some(container) = self.containers.get(id) {
            if let Some(explicit) = container.meta.status {
                return explicit;
            }
            let descendants = self.descendant_tasks(id);
            if descendants.is_empty() {
                return Status::Pending;
            }
            if descendants
                .iter()
                .all(|t| matches!(self.tasks.get(t), Some(n) if n.frontmatter.status == Status::Done))
            {
                return Status::Done;
            }
            if descendants
                .iter()
                .any(|t| matches!(self.tasks.get(t), Some(n) if n.frontmatter.status == Status::InProgress))
            {
                return Status::InProgress;
            }
            return Status::Pending;
        }
        Status::Pending
    }

    /// All task-like leaves under a container (recursively).
    pub fn descendant_tasks(&self, id: &PathId) -> Vec<PathId> {
        let mut out = Vec::new();
        self.collect_descendant_tasks(id, &mut out);
        out
    }

    fn collect_descendant_tasks(&self, id: &PathId, out: &mut Vec<PathId>) {
        if self.tasks.contains_key(id) {
            out.push(id.clone());
            return;
        }
        if let Some(c) = self.containers.get(id) {
            for child in &c.children {
                self.collect_descendant_tasks(child, out);
            }
        }
    }

    /// Whether any ancestor container of `id` (not including `id` itself)
    /// is locked.
    pub fn has_locked_ancestor(&self, id: &PathId) -> bool {
        let mut cur = id.parent();
        while let Some(p) = cur {
            if let Some(c) = self.containers.get(&p) {
                if c.meta.locked == Some(true) {
                    return true;
                }
            }
            cur = p.parent();
        }
        false
    }
}

fn build_rev_deps(tasks: &BTreeMap<PathId, TaskNode>) -> BTreeMap<PathId, Vec<PathId>> {
    let mut rev: BTreeMap<PathId, Vec<PathId>> = BTreeMap::new();
    for node in tasks.values() {
        for dep in &node.frontmatter.depends_on {
            rev.entry(dep.clone()).or_default().push(node.id.clone());
        }
    }
    rev
}

fn load_phase(
    dir: &Path,
    id: &PathId,
    containers: &mut BTreeMap<PathId, ContainerNode>,
    tasks: &mut BTreeMap<PathId, TaskNode>,
) -> Result<()> {
    let index_path = dir.join("index.yaml");
    let index: PhaseIndex = frontmatter::read_index(&index_path)?;
    let mut children = Vec::new();
    for milestone_ref in &index.milestones {
        let milestone_dir = dir.join(&milestone_ref.path);
        load_milestone(&milestone_dir, &milestone_ref.id, containers, tasks)?;
        children.push(milestone_ref.id.clone());
    }
    containers.insert(
        id.clone(),
        ContainerNode {
            id: id.clone(),
            kind: ContainerKind::Phase,
            dir: dir.to_path_buf(),
            meta: index.meta,
            children,
        },
    );
    Ok(())
}

fn load_milestone(
    dir: &Path,
    id: &PathId,
    containers: &mut BTreeMap<PathId, ContainerNode>,
    tasks: &mut BTreeMap<PathId, TaskNode>,
) -> Result<()> {
    let index_path = dir.join("index.yaml");
    let index: MilestoneIndex = frontmatter::read_index(&index_path)?;
    let mut children = Vec::new();
    for epic_ref in &index.epics {
        let epic_dir = dir.join(&epic_ref.path);
        load_epic(&epic_dir, &epic_ref.id, containers, tasks)?;
        children.push(epic_ref.id.clone());
    }
    containers.insert(
        id.clone(),
        ContainerNode {
            id: id.clone(),
            kind: ContainerKind::Milestone,
            dir: dir.to_path_buf(),
            meta: index.meta,
            children,
        },
    );
    Ok(())
}

fn load_epic(
    dir: &Path,
    id: &PathId,
    containers: &mut BTreeMap<PathId, ContainerNode>,
    tasks: &mut BTreeMap<PathId, TaskNode>,
) -> Result<()> {
    let index_path = dir.join("index.yaml");
    let index: EpicIndex = frontmatter::read_index(&index_path)?;
    let mut children = Vec::new();
    for file_ref in &index.tasks {
        let task_path = dir.join(&file_ref.file);
        let (fm, body) = frontmatter::read_task(&task_path)?;
        tasks.insert(
            file_ref.id.clone(),
            TaskNode {
                id: file_ref.id.clone(),
                path: task_path,
                frontmatter: fm,
                body,
            },
        );
        children.push(file_ref.id.clone());
    }
    containers.insert(
        id.clone(),
        ContainerNode {
            id: id.clone(),
            kind: ContainerKind::Epic,
            dir: dir.to_path_buf(),
            meta: index.meta,
            children,
        },
    );
    Ok(())
}

/// Load `bugs/` or `ideas/`: a flat index plus its task files, returned in
/// numeric id order (not declared array order).
fn load_aux(dir: &Path, tasks: &mut BTreeMap<PathId, TaskNode>) -> Result<Vec<PathId>> {
    let index_path = dir.join("index.yaml");
    if !index_path.is_file() {
        return Ok(Vec::new());
    }
    let index: AuxIndex = frontmatter::read_index(&index_path)?;
    let mut ids = Vec::new();
    for file_ref in &index.tasks {
        let task_path = dir.join(&file_ref.file);
        let (fm, body) = frontmatter::read_task(&task_path)?;
        tasks.insert(
            file_ref.id.clone(),
            TaskNode {
                id: file_ref.id.clone(),
                path: task_path,
                frontmatter: fm,
                body,
            },
        );
        ids.push(file_ref.id.clone());
    }
    ids.sort();
    Ok(ids)
}

/// Load `fixes/YYYY-MM/` month buckets, returned in numeric id order across
/// every month.
fn load_fixes(dir: &Path, tasks: &mut BTreeMap<PathId, TaskNode>) -> Result<Vec<PathId>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    let mut months: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| BacklogError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    months.sort();

    for month_dir in &months {
        let index_path = month_dir.join("index.yaml");
        if !index_path.is_file() {
            continue;
        }
        let index: FixIndex = frontmatter::read_index(&index_path)?;
        for file_ref in &index.tasks {
            let task_path = month_dir.join(&file_ref.file);
            let (fm, body) = frontmatter::read_task(&task_path)?;
            tasks.insert(
                file_ref.id.clone(),
                TaskNode {
                    id: file_ref.id.clone(),
                    path: task_path,
                    frontmatter: fm,
                    body,
                },
            );
            ids.push(file_ref.id.clone());
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DirRef, FileRef, Status};

    /// Writes the canonical minimal tree from the spec's test scenarios:
    /// P1 > M1 > E1 > {T001 (1h), T002 (2h, depends on T001)}.
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
        frontmatter::write_task(
            &root.join("01-phase-one/01-milestone-one/01-epic-one/T001-title-a.todo"),
            &t1,
            "TODO: Add requirements/acceptance criteria\n",
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
    fn loads_minimal_tree() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();

        assert_eq!(tree.project, "demo");
        assert_eq!(tree.phase_order, vec![PathId::parse("P1").unwrap()]);
        assert_eq!(tree.tasks.len(), 2);
        assert!(tree.container(&PathId::parse("P1.M1.E1").unwrap()).is_some());
    }

    #[test]
    fn status_of_container_derives_from_descendants() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let mut tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();
        assert_eq!(tree.status_of(&PathId::parse("P1.M1.E1").unwrap()), Status::Pending);

        tree.tasks
            .get_mut(&PathId::parse("P1.M1.E1.T001").unwrap())
            .unwrap()
            .frontmatter
            .status = Status::InProgress;
        assert_eq!(tree.status_of(&PathId::parse("P1.M1.E1").unwrap()), Status::InProgress);
    }

    #[test]
    fn reverse_dependency_adjacency_is_built() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();
        assert_eq!(
            tree.rev_depends_on(&PathId::parse("P1.M1.E1.T001").unwrap()),
            &[PathId::parse("P1.M1.E1.T002").unwrap()]
        );
    }

    #[test]
    fn locked_ancestor_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_tree(tmp.path());
        let mut tree = Tree::load_from_root(tmp.path().to_path_buf()).unwrap();
        assert!(!tree.has_locked_ancestor(&PathId::parse("P1.M1.E1.T001").unwrap()));

        tree.containers
            .get_mut(&PathId::parse("P1").unwrap())
            .unwrap()
            .meta
            .locked = Some(true);
        assert!(tree.has_locked_ancestor(&PathId::parse("P1.M1.E1.T001").unwrap()));
    }

    #[test]
    fn missing_root_is_not_initialised() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Tree::load(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), "NOT_INITIALISED");
    }
}
