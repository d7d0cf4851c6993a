//! Consistency checker (component F).
//!
//! A pure read-only pass over a loaded `Tree` plus the session store and
//! context pointer. Never raises: every finding becomes a `Finding` in the
//! returned `Report`, the way the teacher's `scheduler.rs` returns a
//! `Vec<Completion>` rather than failing the whole run when one task looks
//! odd. Each finding is also logged via `tracing::warn!`/`error!` at
//! construction time so a `-v` run surfaces problems as they're found, not
//! only in the final summary.

use std::collections::HashSet;

use tracing::{error, warn};

use crate::entity::Status;
use crate::error::Result;
use crate::id::PathId;
use crate::resolver;
use crate::session;
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: &'static str,
    pub severity: Severity,
    pub id: Option<PathId>,
    pub message: String,
}

impl Finding {
    fn new(kind: &'static str, severity: Severity, id: Option<PathId>, message: impl Into<String>) -> Self {
        let finding = Finding {
            kind,
            severity,
            id,
            message: message.into(),
        };
        match finding.severity {
            Severity::Error => error!(kind = finding.kind, id = ?finding.id, "{}", finding.message),
            Severity::Warning => warn!(kind = finding.kind, id = ?finding.id, "{}", finding.message),
        }
        finding
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn errors(&self) -> usize {
        self.findings.iter().filter(|f| f.severity == Severity::Error).count()
    }

    pub fn warnings(&self) -> usize {
        self.findings.iter().filter(|f| f.severity == Severity::Warning).count()
    }

    pub fn ok(&self) -> bool {
        self.errors() == 0
    }

    /// Whether the run should exit non-zero: any error always fails; in
    /// strict mode a warning fails too.
    pub fn passes(&self, strict: bool) -> bool {
        if strict {
            self.errors() == 0 && self.warnings() == 0
        } else {
            self.ok()
        }
    }
}

const TODO_PLACEHOLDER: &str = "TODO: Add requirements/acceptance criteria";

/// Run every diagnostic over `tree`. `stale_session_secs` comes from config
/// (`.tasks/config.toml`'s `stale_session_secs`, default 900).
pub fn check(tree: &Tree, stale_session_secs: i64) -> Result<Report> {
    let mut findings = Vec::new();

    check_dependencies(tree, &mut findings);
    check_cycles(tree, &mut findings);
    check_claims(tree, &mut findings);
    check_estimates_and_todos(tree, &mut findings);
    check_status_mismatch(tree, &mut findings);
    check_orphans(tree, &mut findings)?;
    check_context(tree, &mut findings)?;
    check_sessions(tree, &mut findings, stale_session_secs)?;

    Ok(Report { findings })
}

fn check_dependencies(tree: &Tree, findings: &mut Vec<Finding>) {
    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        for dep in &node.frontmatter.depends_on {
            let exists = tree.task(dep).is_some() || tree.container(dep).is_some();
            if !exists {
                findings.push(Finding::new(
                    "missing_task_dependency",
                    Severity::Error,
                    Some(id.clone()),
                    format!("{id} depends on {dep}, which does not exist"),
                ));
            }
        }
    }
}

fn check_cycles(tree: &Tree, findings: &mut Vec<Finding>) {
    if let Err(e) = resolver::ensure_acyclic(tree) {
        findings.push(Finding::new("cyclic_dependency", Severity::Error, None, e.to_string()));
    }
}

fn check_claims(tree: &Tree, findings: &mut Vec<Finding>) {
    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        let has_claim = node.frontmatter.claimed_by.is_some() || node.frontmatter.claimed_at.is_some();
        if node.frontmatter.status == Status::Pending && has_claim {
            findings.push(Finding::new(
                "pending_task_with_claim",
                Severity::Error,
                Some(id.clone()),
                format!("{id} is pending but still carries claim metadata"),
            ));
        }
    }
}

fn check_estimates_and_todos(tree: &Tree, findings: &mut Vec<Finding>) {
    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        let active = matches!(node.frontmatter.status, Status::Pending | Status::InProgress);
        if active && node.frontmatter.estimate_hours == 0.0 {
            findings.push(Finding::new(
                "zero_estimate_hours",
                Severity::Warning,
                Some(id.clone()),
                format!("{id} has no estimate_hours set"),
            ));
        }
        if node.body.contains(TODO_PLACEHOLDER) {
            findings.push(Finding::new(
                "uninitialized_todo",
                Severity::Warning,
                Some(id.clone()),
                format!("{id} still contains the template placeholder body"),
            ));
        }
    }
}

/// Cross-checks location-derived ids against each task's own frontmatter
/// `id` (invariant 2) — the closest existing diagnostic kind to "this file
/// is filed somewhere its own header disagrees with".
fn check_status_mismatch(tree: &Tree, findings: &mut Vec<Finding>) {
    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        if node.id_mismatch() {
            findings.push(Finding::new(
                "status_mismatch_with_index",
                Severity::Error,
                Some(id.clone()),
                format!(
                    "{id} is filed under that id but its own header declares {}",
                    node.frontmatter.id
                ),
            ));
        }
    }
}

fn check_orphans(tree: &Tree, findings: &mut Vec<Finding>) -> Result<()> {
    let indexed: HashSet<&PathId> = tree.all_task_ids().collect();
    for container in tree.containers.values() {
        if container.kind != crate::tree::ContainerKind::Epic {
            continue;
        }
        let dir = &container.dir;
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("todo") {
                continue;
            }
            let referenced = indexed.iter().any(|id| tree.task(id).map(|n| &n.path) == Some(&path));
            if !referenced {
                findings.push(Finding::new(
                    "orphan_file",
                    Severity::Error,
                    None,
                    format!("{} is not referenced by any index", path.display()),
                ));
            }
        }
    }
    Ok(())
}

fn check_context(tree: &Tree, findings: &mut Vec<Finding>) -> Result<()> {
    let ctx = session::load_context(&tree.root_dir)?;
    if let Some(id) = &ctx.task_id {
        if tree.task(id).is_none() && tree.container(id).is_none() {
            findings.push(Finding::new(
                "stale_context",
                Severity::Warning,
                Some(id.clone()),
                format!("context pointer references {id}, which does not exist"),
            ));
        }
    }
    Ok(())
}

fn check_sessions(tree: &Tree, findings: &mut Vec<Finding>, stale_session_secs: i64) -> Result<()> {
    for session in session::stale_sessions(&tree.root_dir, stale_session_secs)? {
        findings.push(Finding::new(
            "stale_session",
            Severity::Warning,
            session.task_id.clone(),
            format!(
                "agent {} has not sent a heartbeat in over {stale_session_secs}s",
                session.agent
            ),
        ));
    }
    Ok(())
}
