//! Dependency resolver (component D).
//!
//! Availability, critical-path, next-available, scope filtering and grab
//! fan-out. The cycle-detection and topological-ordering logic is the
//! same two-pass DFS/Kahn's-algorithm approach the teacher's `dag.rs` uses
//! for its `u32` task ids, generalized here to the full `PathId` space and
//! to dependency edges that may target containers (epic-level deps).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::entity::{Priority, Status};
use crate::error::{BacklogError, Result};
use crate::id::PathId;
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Confirm the dependency DAG has no cycles, or return `DEPENDENCY_CYCLE`
/// naming the cycle (e.g. `P1.M1.E1.T001 -> P1.M1.E1.T002 -> P1.M1.E1.T001`).
pub fn ensure_acyclic(tree: &Tree) -> Result<()> {
    let mut states: HashMap<PathId, VisitState> = HashMap::new();
    let mut path: Vec<PathId> = Vec::new();
    let mut path_index: HashMap<PathId, usize> = HashMap::new();

    for id in tree.all_task_ids() {
        if states.contains_key(id) {
            continue;
        }
        if let Some(cycle) = find_cycle(tree, id, &mut states, &mut path, &mut path_index) {
            let rendered = cycle
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(BacklogError::DependencyCycle(rendered));
        }
    }
    Ok(())
}

fn find_cycle(
    tree: &Tree,
    id: &PathId,
    states: &mut HashMap<PathId, VisitState>,
    path: &mut Vec<PathId>,
    path_index: &mut HashMap<PathId, usize>,
) -> Option<Vec<PathId>> {
    states.insert(id.clone(), VisitState::Visiting);
    path_index.insert(id.clone(), path.len());
    path.push(id.clone());

    for dep in tree.depends_on(id) {
        match states.get(dep).copied() {
            None => {
                if tree.task(dep).is_some() {
                    if let Some(cycle) = find_cycle(tree, dep, states, path, path_index) {
                        return Some(cycle);
                    }
                }
            }
            Some(VisitState::Visiting) => {
                let start = *path_index.get(dep).expect("visiting node has a path index");
                let mut cycle = path[start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            Some(VisitState::Visited) => {}
        }
    }

    path.pop();
    path_index.remove(id);
    states.insert(id.clone(), VisitState::Visited);
    None
}

/// A task is available when pending, unlocked, and every dependency is
/// done (container dependencies count as done when every descendant task
/// of that container is done — `Tree::status_of` already derives that).
pub fn is_available(tree: &Tree, id: &PathId) -> bool {
    let Some(node) = tree.task(id) else {
        return false;
    };
    if node.frontmatter.status != Status::Pending {
        return false;
    }
    if tree.has_locked_ancestor(id) {
        return false;
    }
    node.frontmatter
        .depends_on
        .iter()
        .all(|dep| tree.status_of(dep) == Status::Done)
}

/// All currently available task ids, unsorted.
pub fn available_tasks(tree: &Tree) -> Vec<PathId> {
    tree.all_task_ids()
        .filter(|id| is_available(tree, id))
        .cloned()
        .collect()
}

/// 0 for bugs, 1 for primary tasks, 2 for ideas — the kind precedence the
/// spec's priority-ordering rule names first.
fn schedule_kind_rank(id: &PathId) -> u8 {
    match id {
        PathId::Bug(_) => 0,
        PathId::Task(..) => 1,
        PathId::Idea(_) => 2,
        _ => 3,
    }
}

fn priority_of(tree: &Tree, id: &PathId) -> Priority {
    tree.task(id).map(|n| n.frontmatter.priority).unwrap_or_default()
}

fn estimate_of(tree: &Tree, id: &PathId) -> f64 {
    tree.task(id).map(|n| n.frontmatter.estimate_hours).unwrap_or(0.0)
}

/// Length of the longest chain of dependencies (by edge count, not hours)
/// leading to `id`. Memoized; assumes the DAG is acyclic (call
/// `ensure_acyclic` first).
pub fn dependency_depth(tree: &Tree, id: &PathId) -> usize {
    let mut memo = HashMap::new();
    dependency_depth_memo(tree, id, &mut memo)
}

fn dependency_depth_memo(tree: &Tree, id: &PathId, memo: &mut HashMap<PathId, usize>) -> usize {
    if let Some(v) = memo.get(id) {
        return *v;
    }
    let deps = tree.depends_on(id);
    let depth = if deps.is_empty() {
        0
    } else {
        1 + deps
            .iter()
            .map(|d| dependency_depth_memo(tree, d, memo))
            .max()
            .unwrap_or(0)
    };
    memo.insert(id.clone(), depth);
    depth
}

/// Sort ids by the spec's priority-ordering rule: kind, then priority
/// (critical first), then critical-path membership, then dependency
/// depth (shallower first), then estimate hours (smaller first), then
/// lexical Path ID.
pub fn sort_by_priority(tree: &Tree, ids: &mut [PathId], critical_path: &[PathId]) {
    let on_path: HashSet<&PathId> = critical_path.iter().collect();
    ids.sort_by(|a, b| {
        schedule_kind_rank(a)
            .cmp(&schedule_kind_rank(b))
            .then_with(|| priority_of(tree, b).cmp(&priority_of(tree, a)))
            .then_with(|| on_path.contains(b).cmp(&on_path.contains(a)))
            .then_with(|| dependency_depth(tree, a).cmp(&dependency_depth(tree, b)))
            .then_with(|| {
                estimate_of(tree, a)
                    .partial_cmp(&estimate_of(tree, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.cmp(b))
    });
}

/// The longest-duration chain (by `estimate_hours`) of pending/in-progress
/// tasks in the dependency DAG, root-first.
pub fn critical_path(tree: &Tree) -> Vec<PathId> {
    let active: Vec<PathId> = tree
        .all_task_ids()
        .filter(|id| matches!(id, PathId::Task(..) | PathId::Bug(_) | PathId::Idea(_)))
        .filter(|id| matches!(tree.status_of(id), Status::Pending | Status::InProgress))
        .cloned()
        .collect();
    let active_set: HashSet<PathId> = active.iter().cloned().collect();

    let mut indegree: HashMap<PathId, usize> = active.iter().map(|id| (id.clone(), 0)).collect();
    for id in &active {
        for dep in tree.depends_on(id) {
            if active_set.contains(dep) {
                *indegree.get_mut(id).unwrap() += 1;
            }
        }
    }

    let mut sources: Vec<PathId> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(k, _)| k.clone())
        .collect();
    sources.sort();
    let mut queue: VecDeque<PathId> = sources.into();

    let mut best: HashMap<PathId, f64> = HashMap::new();
    let mut pred: HashMap<PathId, Option<PathId>> = HashMap::new();
    let mut remaining = indegree.clone();
    let mut order: Vec<PathId> = Vec::new();

    while let Some(id) = queue.pop_front() {
        order.push(id.clone());
        let own_hours = estimate_of(tree, &id);
        let mut best_here = own_hours;
        let mut pred_here = None;
        for dep in tree.depends_on(&id) {
            if active_set.contains(dep) {
                let candidate = best.get(dep).copied().unwrap_or(0.0) + own_hours;
                if candidate > best_here {
                    best_here = candidate;
                    pred_here = Some(dep.clone());
                }
            }
        }
        best.insert(id.clone(), best_here);
        pred.insert(id.clone(), pred_here);

        for dependent in tree.rev_depends_on(&id) {
            if let Some(d) = remaining.get_mut(dependent) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(dependent.clone());
                }
            }
        }
    }

    let Some(leaf) = order
        .iter()
        .max_by(|a, b| {
            best.get(*a)
                .unwrap_or(&0.0)
                .partial_cmp(best.get(*b).unwrap_or(&0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.cmp(a))
        })
        .cloned()
    else {
        return Vec::new();
    };

    let mut chain = Vec::new();
    let mut cursor = Some(leaf);
    while let Some(id) = cursor {
        cursor = pred.get(&id).cloned().flatten();
        chain.push(id);
    }
    chain.reverse();
    chain
}

/// First element of the priority-sorted available set, or `None`.
pub fn next_available(tree: &Tree, critical_path: &[PathId]) -> Option<PathId> {
    let mut ids = available_tasks(tree);
    sort_by_priority(tree, &mut ids, critical_path);
    ids.into_iter().next()
}

/// Up to `limit` other available ids of the same kind as `id`, all
/// automatically pairwise-independent: an available task's dependencies
/// are already satisfied, so no two available tasks can block each other.
pub fn fan_out(tree: &Tree, id: &PathId, limit: usize, critical_path: &[PathId]) -> Vec<PathId> {
    let mut same_kind: Vec<PathId> = available_tasks(tree)
        .into_iter()
        .filter(|other| other != id && schedule_kind_rank(other) == schedule_kind_rank(id))
        .collect();
    sort_by_priority(tree, &mut same_kind, critical_path);
    same_kind.truncate(limit);
    same_kind
}

#[derive(Debug, Clone, Default)]
pub struct PreviewRow {
    pub id: PathId,
    pub fan_out: Vec<PathId>,
}

#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub next_available: Option<PathId>,
    pub tasks: Vec<PreviewRow>,
    pub bugs: Vec<PreviewRow>,
    pub ideas: Vec<PreviewRow>,
}

/// A categorised snapshot: the next-available id, up to 5 of each kind,
/// and per-row parallel-safe fan-out candidates.
pub fn preview(tree: &Tree, critical_path: &[PathId]) -> Preview {
    let mut ids = available_tasks(tree);
    sort_by_priority(tree, &mut ids, critical_path);

    let row_for = |id: &PathId| PreviewRow {
        id: id.clone(),
        fan_out: fan_out(tree, id, 3, critical_path),
    };

    let tasks = ids
        .iter()
        .filter(|id| matches!(id, PathId::Task(..)))
        .take(5)
        .map(row_for)
        .collect();
    let bugs = ids
        .iter()
        .filter(|id| matches!(id, PathId::Bug(_)))
        .take(5)
        .map(row_for)
        .collect();
    let ideas = ids
        .iter()
        .filter(|id| matches!(id, PathId::Idea(_)))
        .take(5)
        .map(row_for)
        .collect();

    Preview {
        next_available: ids.first().cloned(),
        tasks,
        bugs,
        ideas,
    }
}

/// Resolve scope patterns to the union of matching ids across the whole
/// tree (containers and tasks). Every pattern must match at least one
/// node, or the whole call fails with `NO_MATCH_SCOPE`.
pub fn scope_filter(tree: &Tree, patterns: &[String]) -> Result<HashSet<PathId>> {
    let all_ids: Vec<PathId> = tree
        .containers
        .keys()
        .cloned()
        .chain(tree.tasks.keys().cloned())
        .collect();

    let mut matched = HashSet::new();
    for pattern in patterns {
        let mut hit = false;
        for id in &all_ids {
            if id.matches_pattern(pattern) {
                matched.insert(id.clone());
                hit = true;
            }
        }
        if !hit {
            return Err(BacklogError::NoMatchScope(pattern.clone()));
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ContainerMeta, TaskFrontmatter};
    use crate::tree::{ContainerKind, ContainerNode, TaskNode};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn id(s: &str) -> PathId {
        PathId::parse(s).unwrap()
    }

    fn task_node(id_str: &str, status: Status, estimate: f64, depends_on: Vec<PathId>) -> TaskNode {
        let mut fm = TaskFrontmatter::new(id(id_str), id_str);
        fm.status = status;
        fm.estimate_hours = estimate;
        fm.depends_on = depends_on;
        TaskNode {
            id: id(id_str),
            path: PathBuf::new(),
            frontmatter: fm,
            body: String::new(),
        }
    }

    /// P1 > M1 > E1 > {T001, T002 depends_on T001}, E2 > {T003}.
    fn sample_tree() -> Tree {
        let mut tasks = BTreeMap::new();
        tasks.insert(id("P1.M1.E1.T001"), task_node("P1.M1.E1.T001", Status::Pending, 1.0, vec![]));
        tasks.insert(
            id("P1.M1.E1.T002"),
            task_node("P1.M1.E1.T002", Status::Pending, 2.0, vec![id("P1.M1.E1.T001")]),
        );
        tasks.insert(id("P1.M1.E2.T003"), task_node("P1.M1.E2.T003", Status::Pending, 1.0, vec![]));

        let mut containers = BTreeMap::new();
        containers.insert(
            id("P1"),
            ContainerNode {
                id: id("P1"),
                kind: ContainerKind::Phase,
                dir: PathBuf::new(),
                meta: ContainerMeta::default(),
                children: vec![id("P1.M1")],
            },
        );
        containers.insert(
            id("P1.M1"),
            ContainerNode {
                id: id("P1.M1"),
                kind: ContainerKind::Milestone,
                dir: PathBuf::new(),
                meta: ContainerMeta::default(),
                children: vec![id("P1.M1.E1"), id("P1.M1.E2")],
            },
        );
        containers.insert(
            id("P1.M1.E1"),
            ContainerNode {
                id: id("P1.M1.E1"),
                kind: ContainerKind::Epic,
                dir: PathBuf::new(),
                meta: ContainerMeta::default(),
                children: vec![id("P1.M1.E1.T001"), id("P1.M1.E1.T002")],
            },
        );
        containers.insert(
            id("P1.M1.E2"),
            ContainerNode {
                id: id("P1.M1.E2"),
                kind: ContainerKind::Epic,
                dir: PathBuf::new(),
                meta: ContainerMeta::default(),
                children: vec![id("P1.M1.E2.T003")],
            },
        );

        let mut rev: BTreeMap<PathId, Vec<PathId>> = BTreeMap::new();
        for node in tasks.values() {
            for dep in &node.frontmatter.depends_on {
                rev.entry(dep.clone()).or_default().push(node.id.clone());
            }
        }

        Tree {
            root_dir: PathBuf::new(),
            project: "demo".to_string(),
            containers,
            tasks,
            phase_order: vec![id("P1")],
            bug_order: vec![],
            idea_order: vec![],
            fix_order: vec![],
            critical_path: vec![],
            next_available: None,
            root_extra: serde_yaml::Mapping::new(),
            rev_deps: rev,
        }
    }

    #[test]
    fn availability_requires_deps_done() {
        let tree = sample_tree();
        assert!(is_available(&tree, &id("P1.M1.E1.T001")));
        assert!(!is_available(&tree, &id("P1.M1.E1.T002")));
    }

    #[test]
    fn availability_is_monotonic_after_completion() {
        let mut tree = sample_tree();
        let before = available_tasks(&tree).len();
        tree.tasks.get_mut(&id("P1.M1.E1.T001")).unwrap().frontmatter.status = Status::Done;
        let after = available_tasks(&tree).len();
        assert!(after >= before);
        assert!(is_available(&tree, &id("P1.M1.E1.T002")));
    }

    #[test]
    fn next_available_picks_lowest_estimate_when_tied() {
        let tree = sample_tree();
        let next = next_available(&tree, &[]).unwrap();
        // T001 (1h) and T003 (1h) both available; T001 sorts first lexically.
        assert_eq!(next, id("P1.M1.E1.T001"));
    }

    #[test]
    fn ensure_acyclic_accepts_dag() {
        let tree = sample_tree();
        assert!(ensure_acyclic(&tree).is_ok());
    }

    #[test]
    fn ensure_acyclic_rejects_cycle() {
        let mut tree = sample_tree();
        tree.tasks
            .get_mut(&id("P1.M1.E1.T001"))
            .unwrap()
            .frontmatter
            .depends_on = vec![id("P1.M1.E1.T002")];
        let err = ensure_acyclic(&tree).unwrap_err();
        assert_eq!(err.kind(), "DEPENDENCY_CYCLE");
    }

    #[test]
    fn critical_path_is_simple_path_with_higher_total_hours_first() {
        let tree = sample_tree();
        let path = critical_path(&tree);
        assert!(path.contains(&id("P1.M1.E1.T001")));
        assert!(path.contains(&id("P1.M1.E1.T002")));
        // T001 -> T002 (1h + 2h = 3h) beats the standalone T003 (1h).
        assert_eq!(path, vec![id("P1.M1.E1.T001"), id("P1.M1.E1.T002")]);
    }

    #[test]
    fn scope_filter_errors_on_no_match() {
        let tree = sample_tree();
        let err = scope_filter(&tree, &["P9.*".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "No list nodes found for path query: P9.*");
    }

    #[test]
    fn scope_filter_unions_multiple_patterns() {
        let tree = sample_tree();
        let matched = scope_filter(&tree, &["P1.M1.E1.*".to_string(), "P1.M1.E2.*".to_string()]).unwrap();
        assert!(matched.contains(&id("P1.M1.E1.T001")));
        assert!(matched.contains(&id("P1.M1.E2.T003")));
    }

    #[test]
    fn fan_out_excludes_self_and_other_kinds() {
        let tree = sample_tree();
        let fan = fan_out(&tree, &id("P1.M1.E1.T001"), 3, &[]);
        assert!(!fan.contains(&id("P1.M1.E1.T001")));
        assert!(fan.contains(&id("P1.M1.E2.T003")));
    }
}
