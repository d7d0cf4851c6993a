mod aggregate;
mod checker;
mod cli;
mod config;
mod entity;
mod error;
mod frontmatter;
mod id;
mod mutator;
mod paths;
mod resolver;
mod session;
mod slug;
mod tree;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use serde_json::json;
use tracing::info;

use cli::{Cli, Command, DataCommand, ReportCommand, SessionCommand, SkillsCommand};
use entity::{Complexity, Priority, Status};
use error::BacklogError;
use id::PathId;
use mutator::SetFields;
use resolver::critical_path;
use tree::Tree;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&cli, &err);
            1
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "backlog=info",
        1 => "backlog=debug",
        _ => "backlog=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Every command's `--json` flag, so a failure can be rendered the same
/// way the command's own success output would have been.
fn wants_json(command: &Command) -> bool {
    match command {
        Command::List { json, .. }
        | Command::Tree { json, .. }
        | Command::Show { json, .. }
        | Command::Next { json }
        | Command::Preview { json }
        | Command::Grab { json, .. }
        | Command::Work { json }
        | Command::Search { query: _, json }
        | Command::Check { json, .. }
        | Command::Timeline { json }
        | Command::Schema { json }
        | Command::Blockers { json }
        | Command::Agents { json }
        | Command::Log { json, .. } => *json,
        Command::Session(SessionCommand::List { json }) => *json,
        Command::Data(DataCommand::Summary { json }) | Command::Data(DataCommand::Export { json }) => *json,
        Command::Report(ReportCommand::Progress { json })
        | Command::Report(ReportCommand::Velocity { json, .. })
        | Command::Report(ReportCommand::EstimateAccuracy { json }) => *json,
        _ => false,
    }
}

fn report_error(cli: &Cli, err: &anyhow::Error) {
    if wants_json(&cli.command) {
        let (kind, hint) = match err.downcast_ref::<BacklogError>() {
            Some(e) => (e.kind(), e.hint().map(str::to_string)),
            None => ("IO_ERROR", None),
        };
        let payload = json!({
            "error": {
                "kind": kind,
                "message": err.to_string(),
                "hint": hint,
            }
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap());
    }
    eprintln!("Error: {err:#}");
}

fn base_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.dir {
        Some(d) => Ok(d.clone()),
        None => std::env::current_dir().context("failed to read current directory"),
    }
}

fn resolve_root_dir(base: &Path) -> Result<PathBuf> {
    paths::resolve_root(base)
        .ok_or_else(|| BacklogError::NotInitialised(base.to_path_buf()).into())
}

fn load_tree(base: &Path) -> Result<Tree> {
    Ok(Tree::load(base)?)
}

fn parse_id(s: &str) -> Result<PathId> {
    Ok(PathId::parse(s)?)
}

fn parse_ids(ids: &[String]) -> Result<Vec<PathId>> {
    ids.iter().map(|s| parse_id(s)).collect()
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pending => "pending",
        Status::InProgress => "in_progress",
        Status::Blocked => "blocked",
        Status::Done => "done",
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}

fn run(cli: &Cli) -> Result<()> {
    let base = base_dir(cli)?;

    match &cli.command {
        Command::Init { project } => cmd_init(&base, project.clone()),
        Command::Add { epic, title } => cmd_add(&base, epic, title),
        Command::AddEpic { milestone, title } => cmd_add_epic(&base, milestone, title),
        Command::AddMilestone { phase, title } => cmd_add_milestone(&base, phase, title),
        Command::AddPhase { title } => cmd_add_phase(&base, title),
        Command::List { scope, json } => cmd_list(&base, scope, *json),
        Command::Tree {
            root,
            max_depth,
            show_details,
            unfinished_only,
            json,
        } => cmd_tree(&base, root.as_deref(), *max_depth, *show_details, *unfinished_only, *json),
        Command::Show { id, json } => cmd_show(&base, id, *json),
        Command::Next { json } => cmd_next(&base, *json),
        Command::Preview { json } => cmd_preview(&base, *json),
        Command::Claim { ids, agent } => cmd_claim(&base, ids, agent),
        Command::Grab { agent, scope, single, no_content, json } => {
            cmd_grab(&base, agent, scope, *single, *no_content, *json)
        }
        Command::Done { ids, force } => cmd_done(&base, ids, *force),
        Command::Undone { id } => cmd_undone(&base, id),
        Command::Update { id, status, reason } => cmd_update(&base, id, *status, reason.as_deref()),
        Command::Set {
            id,
            title,
            priority,
            complexity,
            estimate_hours,
            depends_on,
            tags,
        } => cmd_set(&base, id, title.clone(), *priority, *complexity, *estimate_hours, depends_on.clone(), tags.clone()),
        Command::Work { json } => cmd_work(&base, *json),
        Command::Unclaim { id } => cmd_unclaim(&base, id),
        Command::Blocked { id, reason, grab, agent, scope } => cmd_blocked(&base, id, reason, *grab, agent.as_deref(), scope),
        Command::Bug { title } => cmd_bug(&base, title),
        Command::Idea { title } => cmd_idea(&base, title),
        Command::Fixed { title, tags, body } => cmd_fixed(&base, title, tags.clone(), body.clone()),
        Command::Cycle { id, agent, scope } => cmd_cycle(&base, id, agent, scope),
        Command::Search { query, json } => cmd_search(&base, query, *json),
        Command::Check { strict, json } => cmd_check(&base, *strict, *json),
        Command::Lock { id } => cmd_lock(&base, id),
        Command::Unlock { id } => cmd_unlock(&base, id),
        Command::Move { id, to } => cmd_move(&base, id, to),
        Command::Session(sub) => cmd_session(&base, sub),
        Command::Data(sub) => cmd_data(&base, sub),
        Command::Report(sub) => cmd_report(&base, sub),
        Command::Timeline { json } => cmd_timeline(&base, *json),
        Command::Schema { json } => cmd_schema(*json),
        Command::Blockers { json } => cmd_blockers(&base, *json),
        Command::Skills(SkillsCommand::Install { dir }) => cmd_skills_install(dir),
        Command::Agents { json } => cmd_agents(*json),
        Command::Log { scope, json } => cmd_log(&base, scope, *json),
        Command::Howto => cmd_howto(),
        Command::Migrate => cmd_migrate(&base),
        Command::Benchmark { iterations } => cmd_benchmark(&base, *iterations),
        Command::Completion { shell } => cmd_completion(*shell),
    }
}

// ---------------------------------------------------------------------
// init / add family
// ---------------------------------------------------------------------

fn cmd_init(base: &Path, project: Option<String>) -> Result<()> {
    let project = project.unwrap_or_else(|| {
        base.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    });
    let root_dir = mutator::init(base, &project)?;
    println!("Initialised {} for project '{project}'.", root_dir.display());
    Ok(())
}

fn cmd_add(base: &Path, epic: &str, title: &str) -> Result<()> {
    let epic_id = parse_id(epic)?;
    let outcome = mutator::add(base, &epic_id, title)?;
    println!("Added {} under {epic_id}.", outcome.affected[0]);
    Ok(())
}

fn cmd_add_epic(base: &Path, milestone: &str, title: &str) -> Result<()> {
    let milestone_id = parse_id(milestone)?;
    let outcome = mutator::add_epic(base, &milestone_id, title)?;
    println!("Added epic {} under {milestone_id}.", outcome.affected[0]);
    Ok(())
}

fn cmd_add_milestone(base: &Path, phase: &str, title: &str) -> Result<()> {
    let phase_id = parse_id(phase)?;
    let outcome = mutator::add_milestone(base, &phase_id, title)?;
    println!("Added milestone {} under {phase_id}.", outcome.affected[0]);
    Ok(())
}

fn cmd_add_phase(base: &Path, title: &str) -> Result<()> {
    let outcome = mutator::add_phase(base, title)?;
    println!("Added phase {}.", outcome.affected[0]);
    Ok(())
}

// ---------------------------------------------------------------------
// list / tree / show
// ---------------------------------------------------------------------

fn resolve_scope(tree: &Tree, scope: &[String]) -> Result<Option<std::collections::HashSet<PathId>>> {
    if scope.is_empty() {
        Ok(None)
    } else {
        Ok(Some(resolver::scope_filter(tree, scope)?))
    }
}

fn cmd_list(base: &Path, scope: &[String], json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let matched = resolve_scope(&tree, scope)?;
    let in_scope = |id: &PathId| matched.as_ref().map(|m| m.contains(id)).unwrap_or(true);

    let mut phases = Vec::new();
    for phase_id in &tree.phase_order {
        if !in_scope(phase_id) {
            continue;
        }
        let phase = tree.container(phase_id).expect("phase_order entries exist");
        let mut milestones = Vec::new();
        for milestone_id in &phase.children {
            if !in_scope(milestone_id) {
                continue;
            }
            let milestone = tree.container(milestone_id).expect("declared child exists");
            let descendants = tree.descendant_tasks(milestone_id);
            let done = descendants.iter().filter(|t| tree.status_of(t) == Status::Done).count();
            milestones.push(json!({
                "id": milestone_id.to_string(),
                "name": milestone.meta.name,
                "stats": { "total": descendants.len(), "done": done },
            }));
        }
        let descendants = tree.descendant_tasks(phase_id);
        let done = descendants.iter().filter(|t| tree.status_of(t) == Status::Done).count();
        phases.push(json!({
            "id": phase_id.to_string(),
            "name": phase.meta.name,
            "stats": { "total": descendants.len(), "done": done },
            "milestones": milestones,
        }));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "project": tree.project, "phases": phases }))?);
        return Ok(());
    }

    println!("{}", tree.project);
    for phase in &phases {
        let total = phase["stats"]["total"].as_u64().unwrap_or(0);
        let done = phase["stats"]["done"].as_u64().unwrap_or(0);
        println!(
            "{} {} ({done}/{total} tasks done)",
            phase["id"].as_str().unwrap_or_default(),
            phase["name"].as_str().unwrap_or("(unnamed)"),
        );
        for milestone in phase["milestones"].as_array().into_iter().flatten() {
            let total = milestone["stats"]["total"].as_u64().unwrap_or(0);
            let done = milestone["stats"]["done"].as_u64().unwrap_or(0);
            println!(
                "  {} {} ({done}/{total} tasks done)",
                milestone["id"].as_str().unwrap_or_default(),
                milestone["name"].as_str().unwrap_or("(unnamed)"),
            );
        }
    }

    for bug_id in &tree.bug_order {
        if !in_scope(bug_id) {
            continue;
        }
        let node = tree.task(bug_id).expect("bug_order entries exist");
        let marker = if node.frontmatter.priority == Priority::Critical { "\u{2605} " } else { "" };
        println!("{marker}{bug_id}: {}", node.frontmatter.title);
    }
    Ok(())
}

fn container_json(tree: &Tree, id: &PathId, max_depth: Option<usize>, depth: usize, show_details: bool, unfinished_only: bool) -> Option<serde_json::Value> {
    if let Some(limit) = max_depth {
        if depth > limit {
            return None;
        }
    }
    let status = tree.status_of(id);
    if unfinished_only && status == Status::Done {
        return None;
    }
    if let Some(node) = tree.task(id) {
        let fm = &node.frontmatter;
        let mut value = json!({
            "id": id.to_string(),
            "kind": "task",
            "title": fm.title,
            "status": status_label(fm.status),
        });
        if show_details {
            value["priority"] = json!(priority_label(fm.priority));
            value["estimate_hours"] = json!(fm.estimate_hours);
            value["depends_on"] = json!(fm.depends_on.iter().map(PathId::to_string).collect::<Vec<_>>());
            value["tags"] = json!(fm.tags);
        }
        return Some(value);
    }
    let container = tree.container(id)?;
    let children: Vec<serde_json::Value> = container
        .children
        .iter()
        .filter_map(|c| container_json(tree, c, max_depth, depth + 1, show_details, unfinished_only))
        .collect();
    let kind = match container.kind {
        tree::ContainerKind::Phase => "phase",
        tree::ContainerKind::Milestone => "milestone",
        tree::ContainerKind::Epic => "epic",
    };
    let key = match container.kind {
        tree::ContainerKind::Phase => "milestones",
        tree::ContainerKind::Milestone => "epics",
        tree::ContainerKind::Epic => "tasks",
    };
    let mut value = json!({
        "id": id.to_string(),
        "kind": kind,
        "name": container.meta.name,
        "status": status_label(status),
        key: children,
    });
    if show_details {
        value["locked"] = json!(container.meta.locked.unwrap_or(false));
        value["description"] = json!(container.meta.description);
    }
    Some(value)
}

fn print_tree_text(value: &serde_json::Value, indent: usize) {
    let label = value["kind"].as_str().unwrap_or("node");
    let name = value.get("title").or_else(|| value.get("name")).and_then(|v| v.as_str()).unwrap_or("(unnamed)");
    let status = value["status"].as_str().unwrap_or("pending");
    println!("{:indent$}{} {} [{status}] {name}", "", value["id"].as_str().unwrap_or_default(), label, indent = indent);
    for key in ["milestones", "epics", "tasks"] {
        if let Some(children) = value.get(key).and_then(|v| v.as_array()) {
            for child in children {
                print_tree_text(child, indent + 2);
            }
        }
    }
}

fn cmd_tree(base: &Path, root: Option<&str>, max_depth: Option<usize>, show_details: bool, unfinished_only: bool, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let mut nodes = Vec::new();
    let root_ids: Vec<PathId> = match root {
        Some(r) => vec![parse_id(r)?],
        None => tree.phase_order.clone(),
    };
    for id in &root_ids {
        if !tree.containers.contains_key(id) && !tree.tasks.contains_key(id) {
            return Err(BacklogError::not_found_container(id.to_string()).into());
        }
        if let Some(v) = container_json(&tree, id, max_depth, 0, show_details, unfinished_only) {
            nodes.push(v);
        }
    }

    if json {
        let payload = json!({
            "project": tree.project,
            "max_depth": max_depth,
            "show_details": show_details,
            "unfinished_only": unfinished_only,
            "phases": nodes,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", tree.project);
    for node in &nodes {
        print_tree_text(node, 0);
    }
    Ok(())
}

fn cmd_show(base: &Path, id: &str, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let id = parse_id(id)?;

    if let Some(node) = tree.task(&id) {
        let fm = &node.frontmatter;
        if json {
            let payload = json!({
                "id": id.to_string(),
                "title": fm.title,
                "status": status_label(fm.status),
                "priority": priority_label(fm.priority),
                "complexity": format!("{:?}", fm.complexity).to_lowercase(),
                "estimate_hours": fm.estimate_hours,
                "depends_on": fm.depends_on.iter().map(PathId::to_string).collect::<Vec<_>>(),
                "tags": fm.tags,
                "claimed_by": fm.claimed_by,
                "blocked_reason": fm.blocked_reason,
                "body": node.body,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else {
            println!("{id}: {} [{}]", fm.title, status_label(fm.status));
            println!("priority={} complexity={:?} estimate_hours={}", priority_label(fm.priority), fm.complexity, fm.estimate_hours);
            if !fm.depends_on.is_empty() {
                println!("depends_on: {}", fm.depends_on.iter().map(PathId::to_string).collect::<Vec<_>>().join(", "));
            }
            if !fm.tags.is_empty() {
                println!("tags: {}", fm.tags.join(", "));
            }
            println!();
            print!("{}", node.body);
        }
        return Ok(());
    }

    let container = tree
        .container(&id)
        .ok_or_else(|| BacklogError::not_found_container(id.to_string()))?;
    let status = tree.status_of(&id);
    if json {
        let payload = json!({
            "id": id.to_string(),
            "name": container.meta.name,
            "status": status_label(status),
            "locked": container.meta.locked.unwrap_or(false),
            "description": container.meta.description,
            "children": container.children.iter().map(PathId::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{id}: {} [{}]", container.meta.name.as_deref().unwrap_or("(unnamed)"), status_label(status));
        if container.meta.locked == Some(true) {
            println!("locked");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// next / preview / grab / cycle
// ---------------------------------------------------------------------

fn cmd_next(base: &Path, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let critical_path = critical_path(&tree);
    let next = resolver::next_available(&tree, &critical_path);
    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "id": next.as_ref().map(PathId::to_string) }))?);
    } else {
        match &next {
            Some(id) => println!("{id}"),
            None => println!("No task is currently available."),
        }
    }
    Ok(())
}

fn preview_row_json(row: &resolver::PreviewRow) -> serde_json::Value {
    json!({
        "id": row.id.to_string(),
        "fan_out": row.fan_out.iter().map(PathId::to_string).collect::<Vec<_>>(),
    })
}

fn cmd_preview(base: &Path, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let critical_path = critical_path(&tree);
    let preview = resolver::preview(&tree, &critical_path);

    if json {
        let payload = json!({
            "next_available": preview.next_available.as_ref().map(PathId::to_string),
            "tasks": preview.tasks.iter().map(preview_row_json).collect::<Vec<_>>(),
            "bugs": preview.bugs.iter().map(preview_row_json).collect::<Vec<_>>(),
            "ideas": preview.ideas.iter().map(preview_row_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match &preview.next_available {
        Some(id) => println!("next: {id}"),
        None => println!("next: (none available)"),
    }
    for (label, rows) in [("tasks", &preview.tasks), ("bugs", &preview.bugs), ("ideas", &preview.ideas)] {
        if rows.is_empty() {
            continue;
        }
        println!("{label}:");
        for row in rows {
            let fan = row.fan_out.iter().map(PathId::to_string).collect::<Vec<_>>().join(", ");
            if fan.is_empty() {
                println!("  {}", row.id);
            } else {
                println!("  {} (also: {fan})", row.id);
            }
        }
    }
    Ok(())
}

fn cmd_claim(base: &Path, ids: &[String], agent: &str) -> Result<()> {
    let ids = parse_ids(ids)?;
    let outcome = mutator::claim(base, &ids, agent)?;
    println!("Claimed: {}", outcome.affected.iter().map(PathId::to_string).collect::<Vec<_>>().join(", "));
    Ok(())
}

fn cmd_grab(base: &Path, agent: &str, scope: &[String], single: bool, no_content: bool, json: bool) -> Result<()> {
    let outcome = mutator::grab(base, agent, scope, single)?;
    let rows: Vec<_> = outcome
        .affected
        .iter()
        .map(|id| {
            let title = outcome.tree.task(id).map(|n| n.frontmatter.title.clone());
            (id.clone(), title)
        })
        .collect();

    if json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(id, title)| {
                if no_content {
                    json!({ "id": id.to_string() })
                } else {
                    json!({ "id": id.to_string(), "title": title })
                }
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "claimed": payload }))?);
        return Ok(());
    }

    print!("Grabbed: ");
    let lines: Vec<String> = rows
        .iter()
        .map(|(id, title)| match (no_content, title) {
            (false, Some(title)) => format!("{id} ({title})"),
            _ => id.to_string(),
        })
        .collect();
    println!("{}", lines.join(", "));
    Ok(())
}

fn cmd_cycle(base: &Path, id: &str, agent: &str, scope: &[String]) -> Result<()> {
    let id = parse_id(id)?;
    let outcome = mutator::cycle(base, &id, agent, scope)?;
    println!("Cycled from {id}; now: {}", outcome.affected.iter().map(PathId::to_string).collect::<Vec<_>>().join(", "));
    Ok(())
}

// ---------------------------------------------------------------------
// lifecycle
// ---------------------------------------------------------------------

fn cmd_done(base: &Path, ids: &[String], force: bool) -> Result<()> {
    let ids = parse_ids(ids)?;
    let outcome = mutator::done(base, &ids, force)?;
    println!("Done: {}", outcome.affected.iter().map(PathId::to_string).collect::<Vec<_>>().join(", "));
    Ok(())
}

fn cmd_undone(base: &Path, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let outcome = mutator::undone(base, &id)?;
    println!("Reverted: {}", outcome.affected.iter().map(PathId::to_string).collect::<Vec<_>>().join(", "));
    Ok(())
}

fn cmd_update(base: &Path, id: &str, status: cli::StatusArg, reason: Option<&str>) -> Result<()> {
    let id = parse_id(id)?;
    let status = match status {
        cli::StatusArg::Pending => Status::Pending,
        cli::StatusArg::InProgress => Status::InProgress,
        cli::StatusArg::Blocked => Status::Blocked,
        cli::StatusArg::Done => Status::Done,
    };
    let outcome = mutator::update(base, &id, status, reason)?;
    println!("Updated {}.", outcome.affected[0]);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_set(
    base: &Path,
    id: &str,
    title: Option<String>,
    priority: Option<cli::PriorityArg>,
    complexity: Option<cli::ComplexityArg>,
    estimate_hours: Option<f64>,
    depends_on: Option<Vec<String>>,
    tags: Option<Vec<String>>,
) -> Result<()> {
    let id = parse_id(id)?;
    let fields = SetFields {
        title,
        priority: priority.map(|p| match p {
            cli::PriorityArg::Low => Priority::Low,
            cli::PriorityArg::Medium => Priority::Medium,
            cli::PriorityArg::High => Priority::High,
            cli::PriorityArg::Critical => Priority::Critical,
        }),
        complexity: complexity.map(|c| match c {
            cli::ComplexityArg::Low => Complexity::Low,
            cli::ComplexityArg::Medium => Complexity::Medium,
            cli::ComplexityArg::High => Complexity::High,
        }),
        estimate_hours,
        depends_on: depends_on.map(|ds| ds.iter().map(|d| parse_id(d)).collect::<Result<Vec<_>>>()).transpose()?,
        tags,
    };
    let outcome = mutator::set(base, &id, fields)?;
    println!("Updated {}.", outcome.affected[0]);
    Ok(())
}

fn cmd_work(base: &Path, json: bool) -> Result<()> {
    let root_dir = resolve_root_dir(base)?;
    let context = session::load_context(&root_dir)?;
    if let Some(task_id) = context.task_id {
        if json {
            println!("{}", serde_json::to_string_pretty(&json!({ "id": task_id.to_string(), "source": "context", "note": context.note }))?);
        } else {
            println!("Current context: {task_id}");
            if let Some(note) = &context.note {
                println!("note: {note}");
            }
        }
        return Ok(());
    }
    let tree = load_tree(base)?;
    let cp = critical_path(&tree);
    let next = resolver::next_available(&tree, &cp);
    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "id": next.as_ref().map(PathId::to_string), "source": "next_available" }))?);
    } else {
        match next {
            Some(id) => println!("No working context set; next available is {id}."),
            None => println!("No working context set and nothing is available."),
        }
    }
    Ok(())
}

fn cmd_unclaim(base: &Path, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    mutator::unclaim(base, &id)?;
    println!("Unclaimed {id}.");
    Ok(())
}

fn cmd_blocked(base: &Path, id: &str, reason: &str, grab: bool, agent: Option<&str>, scope: &[String]) -> Result<()> {
    let parsed = parse_id(id)?;
    mutator::blocked(base, &parsed, reason)?;
    println!("Blocked {parsed}: {reason}");
    if grab {
        let agent = agent.ok_or_else(|| anyhow::anyhow!("--agent is required with --grab"))?;
        let outcome = mutator::grab(base, agent, scope, false)?;
        println!("Grabbed: {}", outcome.affected.iter().map(PathId::to_string).collect::<Vec<_>>().join(", "));
    }
    Ok(())
}

fn cmd_bug(base: &Path, title: &str) -> Result<()> {
    let outcome = mutator::add_bug(base, title)?;
    println!("Added {} to the bug backlog.", outcome.affected[0]);
    Ok(())
}

fn cmd_idea(base: &Path, title: &str) -> Result<()> {
    let outcome = mutator::add_idea(base, title)?;
    println!("Added {} to the idea backlog.", outcome.affected[0]);
    Ok(())
}

fn cmd_fixed(base: &Path, title: &str, tags: Vec<String>, body: Option<String>) -> Result<()> {
    let outcome = mutator::fixed(base, title, None, tags, body)?;
    println!("Archived {} to fixes.", outcome.affected[0]);
    Ok(())
}

fn cmd_lock(base: &Path, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    mutator::lock(base, &id)?;
    println!("Locked {id}.");
    Ok(())
}

fn cmd_unlock(base: &Path, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    mutator::unlock(base, &id)?;
    println!("Unlocked {id}.");
    Ok(())
}

fn cmd_move(base: &Path, id: &str, to: &str) -> Result<()> {
    let id = parse_id(id)?;
    let to = parse_id(to)?;
    let outcome = mutator::move_item(base, &id, &to)?;
    println!("Moved to {}.", outcome.affected[0]);
    Ok(())
}

// ---------------------------------------------------------------------
// search / check
// ---------------------------------------------------------------------

fn cmd_search(base: &Path, query: &str, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let needle = query.to_lowercase();
    let mut hits = Vec::new();
    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        let fm = &node.frontmatter;
        let matches = fm.title.to_lowercase().contains(&needle)
            || node.body.to_lowercase().contains(&needle)
            || fm.tags.iter().any(|t| t.to_lowercase().contains(&needle));
        if matches {
            hits.push((id.clone(), fm.title.clone(), fm.status));
        }
    }
    hits.sort_by(|a, b| a.0.cmp(&b.0));

    if json {
        let payload: Vec<_> = hits
            .iter()
            .map(|(id, title, status)| json!({ "id": id.to_string(), "title": title, "status": status_label(*status) }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No matches for '{query}'.");
    }
    for (id, title, status) in &hits {
        println!("{id} [{}] {title}", status_label(*status));
    }
    Ok(())
}

fn cmd_check(base: &Path, strict: bool, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let (config, _) = config::BacklogConfig::load(&tree.root_dir)?;
    let report = checker::check(&tree, config.stale_session_secs)?;

    let passes = report.passes(strict);
    if json {
        let findings: Vec<_> = report
            .findings
            .iter()
            .map(|f| {
                json!({
                    "kind": f.kind,
                    "severity": if f.severity == checker::Severity::Error { "error" } else { "warning" },
                    "id": f.id.as_ref().map(PathId::to_string),
                    "message": f.message,
                })
            })
            .collect();
        let payload = json!({
            "ok": report.ok(),
            "summary": { "errors": report.errors(), "warnings": report.warnings() },
            "findings": findings,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{} errors, {} warnings", report.errors(), report.warnings());
        for f in &report.findings {
            let sev = if f.severity == checker::Severity::Error { "ERROR" } else { "WARN" };
            match &f.id {
                Some(id) => println!("[{sev}] {} ({}): {}", f.kind, id, f.message),
                None => println!("[{sev}] {}: {}", f.kind, f.message),
            }
        }
    }

    if !passes {
        std::process::exit(1);
    }
    Ok(())
}

// ---------------------------------------------------------------------
// session / data / report
// ---------------------------------------------------------------------

fn cmd_session(base: &Path, sub: &SessionCommand) -> Result<()> {
    let root_dir = resolve_root_dir(base)?;
    match sub {
        SessionCommand::Start { agent, task } => {
            let task_id = task.as_deref().map(parse_id).transpose()?;
            let entry = session::start(&root_dir, agent, task_id)?;
            println!("Started session for {}.", entry.agent);
        }
        SessionCommand::Heartbeat { agent, progress } => {
            session::heartbeat(&root_dir, agent, progress.as_deref())?;
            println!("Heartbeat recorded for {agent}.");
        }
        SessionCommand::End { agent } => {
            session::end(&root_dir, agent)?;
            println!("Ended session for {agent}.");
        }
        SessionCommand::List { json } => {
            let sessions = session::list(&root_dir)?;
            if *json {
                let payload: Vec<_> = sessions
                    .iter()
                    .map(|s| {
                        json!({
                            "agent": s.agent,
                            "task_id": s.task_id.as_ref().map(PathId::to_string),
                            "started_at": s.started_at.to_rfc3339(),
                            "last_heartbeat": s.last_heartbeat.to_rfc3339(),
                            "progress": s.progress,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if sessions.is_empty() {
                println!("No active sessions.");
            } else {
                for s in &sessions {
                    println!("{} last_heartbeat={}", s.agent, s.last_heartbeat.to_rfc3339());
                }
            }
        }
    }
    Ok(())
}

fn cmd_data(base: &Path, sub: &DataCommand) -> Result<()> {
    let tree = load_tree(base)?;
    match sub {
        DataCommand::Summary { json } => print_progress_summary(&tree, *json),
        DataCommand::Export { json } => {
            let tasks: Vec<_> = tree
                .all_task_ids()
                .map(|id| {
                    let node = tree.task(id).expect("id came from all_task_ids");
                    json!({
                        "id": id.to_string(),
                        "title": node.frontmatter.title,
                        "status": status_label(node.frontmatter.status),
                        "priority": priority_label(node.frontmatter.priority),
                    })
                })
                .collect();
            let payload = json!({ "project": tree.project, "tasks": tasks });
            if *json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} tasks across project '{}'.", tasks.len(), tree.project);
            }
            Ok(())
        }
    }
}

fn print_progress_summary(tree: &Tree, json: bool) -> Result<()> {
    let summary = aggregate::progress_summary(tree);
    if json {
        let by_container: serde_json::Map<_, _> = summary
            .by_container
            .iter()
            .map(|(id, counts)| {
                (
                    id.to_string(),
                    json!({ "pending": counts.pending, "in_progress": counts.in_progress, "blocked": counts.blocked, "done": counts.done }),
                )
            })
            .collect();
        let payload = json!({
            "overall": {
                "pending": summary.overall.pending,
                "in_progress": summary.overall.in_progress,
                "blocked": summary.overall.blocked,
                "done": summary.overall.done,
                "total": summary.overall.total(),
            },
            "by_container": by_container,
            "total_estimate_hours": summary.total_estimate_hours,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "{}/{} done ({} pending, {} in_progress, {} blocked), {}h estimated",
            summary.overall.done,
            summary.overall.total(),
            summary.overall.pending,
            summary.overall.in_progress,
            summary.overall.blocked,
            summary.total_estimate_hours,
        );
    }
    Ok(())
}

fn cmd_report(base: &Path, sub: &ReportCommand) -> Result<()> {
    let tree = load_tree(base)?;
    match sub {
        ReportCommand::Progress { json } => print_progress_summary(&tree, *json),
        ReportCommand::Velocity { window_days, json } => {
            let buckets = aggregate::velocity(&tree, *window_days, chrono::Utc::now());
            if *json {
                let payload: Vec<_> = buckets.iter().map(|b| json!({ "date": b.date.to_string(), "completed": b.completed })).collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for b in &buckets {
                    println!("{}: {}", b.date, b.completed);
                }
            }
            Ok(())
        }
        ReportCommand::EstimateAccuracy { json } => {
            let acc = aggregate::estimate_accuracy(&tree);
            if *json {
                let payload = json!({ "sample_count": acc.sample_count, "mean_ratio": acc.mean_ratio() });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                match acc.mean_ratio() {
                    Some(mean) => println!("{} samples, mean actual/estimate ratio {mean:.2}", acc.sample_count),
                    None => println!("No completed tasks with both an estimate and a measured duration."),
                }
            }
            Ok(())
        }
    }
}

fn cmd_timeline(base: &Path, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let path = critical_path(&tree);
    let mut cumulative = 0.0;
    let mut rows = Vec::new();
    for id in &path {
        let hours = tree.task(id).map(|n| n.frontmatter.estimate_hours).unwrap_or(0.0);
        cumulative += hours;
        rows.push((id.clone(), hours, cumulative));
    }
    if json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(id, hours, cumulative)| json!({ "id": id.to_string(), "estimate_hours": hours, "cumulative_hours": cumulative }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if rows.is_empty() {
        println!("Critical path is empty.");
    } else {
        for (id, hours, cumulative) in &rows {
            println!("{id}\t+{hours}h\t={cumulative}h");
        }
    }
    Ok(())
}

fn cmd_schema(json: bool) -> Result<()> {
    let payload = json!({
        "root_index": "index.yaml: {project, phases: [{id, path}], critical_path: [id], next_available: id}",
        "container_index": "<NN-slug>/index.yaml: {name, status, locked, description, milestones|epics: [{id, path}]}",
        "task_file": "<Tnnn>-slug.todo: '---' YAML header (id, title, status, estimate_hours, complexity, priority, depends_on, tags, timestamps) '---' markdown body",
        "auxiliary": "bugs/, ideas/: index.yaml + B<nnn>/I<nnn>-slug.todo. fixes/YYYY-MM/: index.yaml + F<nnn>-slug.todo",
        "session_store": ".sessions.yaml",
        "context_pointer": ".context.yaml",
    });
    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (key, value) in payload.as_object().unwrap() {
            println!("{key}: {}", value.as_str().unwrap_or_default());
        }
    }
    Ok(())
}

fn cmd_blockers(base: &Path, json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let mut blocked = Vec::new();
    for id in tree.all_task_ids() {
        let node = tree.task(id).expect("id came from all_task_ids");
        if node.frontmatter.status == Status::Blocked {
            blocked.push((id.clone(), node.frontmatter.title.clone(), node.frontmatter.blocked_reason.clone()));
        }
    }
    blocked.sort_by(|a, b| a.0.cmp(&b.0));

    if json {
        let payload: Vec<_> = blocked
            .iter()
            .map(|(id, title, reason)| json!({ "id": id.to_string(), "title": title, "reason": reason }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if blocked.is_empty() {
        println!("No blocked tasks.");
    }
    for (id, title, reason) in &blocked {
        println!("{id}: {title} — {}", reason.as_deref().unwrap_or("(no reason given)"));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// ambient/non-core commands (templated, deliberately thin)
// ---------------------------------------------------------------------

const SKILL_TEMPLATE: &str = include_str!("skill_template.md");

fn cmd_skills_install(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let dest = dir.join("SKILL.md");
    std::fs::write(&dest, SKILL_TEMPLATE).with_context(|| format!("failed to write {}", dest.display()))?;
    println!("Wrote {}.", dest.display());
    Ok(())
}

fn cmd_agents(json: bool) -> Result<()> {
    let agents = [
        ("implementer", "Claims and completes available tasks in priority order."),
        ("reviewer", "Runs `check`/`check --strict` before and after a batch of work."),
        ("planner", "Uses `add`/`add-epic`/`add-milestone`/`add-phase` to shape new work."),
    ];
    if json {
        let payload: Vec<_> = agents.iter().map(|(name, role)| json!({ "role": name, "description": role })).collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (name, role) in &agents {
            println!("{name}: {role}");
        }
    }
    Ok(())
}

fn cmd_log(base: &Path, scope: &[String], json: bool) -> Result<()> {
    let tree = load_tree(base)?;
    let matched = resolve_scope(&tree, scope)?;
    let events: Vec<_> = aggregate::activity_log(&tree)
        .into_iter()
        .filter(|e| matched.as_ref().map(|m| m.contains(&e.task_id)).unwrap_or(true))
        .collect();

    if json {
        let payload: Vec<_> = events
            .iter()
            .map(|e| {
                json!({
                    "task_id": e.task_id.to_string(),
                    "event": event_label(e.kind),
                    "actor": e.actor,
                    "kind": event_label(e.kind),
                    "timestamp": e.timestamp.map(|t| t.to_rfc3339()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    for e in &events {
        match e.timestamp {
            Some(ts) => println!("{} {} {}", ts.to_rfc3339(), e.task_id, event_label(e.kind)),
            None => println!("(no timestamp) {} {}", e.task_id, event_label(e.kind)),
        }
    }
    Ok(())
}

fn event_label(kind: aggregate::EventKind) -> &'static str {
    match kind {
        aggregate::EventKind::Added => "added",
        aggregate::EventKind::Claimed => "claimed",
        aggregate::EventKind::Started => "started",
        aggregate::EventKind::Completed => "completed",
    }
}

fn cmd_howto() -> Result<()> {
    println!(
        "backlog orients agents around a task graph on disk.\n\
         \n\
         1. `backlog next` — find the single highest-priority available task.\n\
         2. `backlog claim <id> --agent <name>` — claim it.\n\
         3. Do the work, then `backlog done <id>`.\n\
         4. `backlog check` before handing off, `backlog check --strict` before merging.\n\
         \n\
         Use `backlog preview` to see more than one candidate at a time, and\n\
         `backlog grab --agent <name>` to claim the top candidate directly."
    );
    Ok(())
}

fn cmd_migrate(base: &Path) -> Result<()> {
    let legacy = base.join(paths::LEGACY_DIR);
    let preferred = base.join(paths::PREFERRED_DIR);
    if !legacy.is_dir() {
        anyhow::bail!("no {} directory found under {}", paths::LEGACY_DIR, base.display());
    }
    if preferred.is_dir() {
        anyhow::bail!("{} already exists; refusing to overwrite", preferred.display());
    }
    std::fs::rename(&legacy, &preferred).with_context(|| format!("failed to rename {} to {}", legacy.display(), preferred.display()))?;
    println!("Migrated {} to {}.", legacy.display(), preferred.display());
    Ok(())
}

fn cmd_benchmark(base: &Path, iterations: usize) -> Result<()> {
    let start = std::time::Instant::now();
    for _ in 0..iterations.max(1) {
        let tree = load_tree(base)?;
        let (config, _) = config::BacklogConfig::load(&tree.root_dir)?;
        let _ = checker::check(&tree, config.stale_session_secs)?;
    }
    let elapsed = start.elapsed();
    println!(
        "{iterations} iterations of load+check in {:.3}s ({:.3}ms/iteration)",
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / iterations.max(1) as f64,
    );
    info!(iterations, elapsed_ms = elapsed.as_millis() as u64, "benchmark complete");
    Ok(())
}

fn cmd_completion(shell: clap_complete::Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
