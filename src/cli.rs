//! Command-line surface (component I, argument definitions).
//!
//! Pure argument parsing: every variant here maps one-to-one onto a
//! resolver/mutator/checker/aggregate call, dispatched from `main.rs`. No
//! tree-loading or rendering logic lives in this module, same split as the
//! teacher's `cli.rs`/`main.rs` pair.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "backlog", version, about = "Filesystem-backed hierarchical task-graph engine for autonomous coding agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Force the `.tasks`/`.backlog` search to start here instead of the
    /// current directory.
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum StatusArg {
    Pending,
    InProgress,
    Blocked,
    Done,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum ComplexityArg {
    Low,
    Medium,
    High,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a fresh .tasks/ root in the current (or --dir) directory.
    Init {
        /// Project name; defaults to the directory's own name.
        #[arg(long)]
        project: Option<String>,
    },

    /// Append a new task under an existing epic.
    Add {
        /// Enclosing epic, e.g. P1.M1.E1.
        epic: String,
        /// Task title.
        title: String,
    },

    /// Append a new epic under an existing milestone.
    #[command(name = "add-epic")]
    AddEpic { milestone: String, title: String },

    /// Append a new milestone under an existing phase.
    #[command(name = "add-milestone")]
    AddMilestone { phase: String, title: String },

    /// Append a new phase at the project root.
    #[command(name = "add-phase")]
    AddPhase { title: String },

    /// List phases with nested milestones and completion stats.
    #[command(alias = "ls")]
    List {
        /// Restrict to one or more Path ID scopes (repeatable).
        #[arg(long = "scope")]
        scope: Vec<String>,
        #[arg(long)]
        json: bool,
    },

    /// Print the full nested phase/milestone/epic/task tree.
    Tree {
        /// Root the view at this Path ID instead of the project root.
        root: Option<String>,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        show_details: bool,
        #[arg(long)]
        unfinished_only: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show a single entity's full frontmatter and body.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// Print the single next-available id.
    Next {
        #[arg(long)]
        json: bool,
    },

    /// Categorised snapshot of next-available tasks/bugs/ideas.
    Preview {
        #[arg(long)]
        json: bool,
    },

    /// Claim one or more pending tasks atomically.
    Claim {
        ids: Vec<String>,
        #[arg(long)]
        agent: String,
    },

    /// Claim the highest-priority available id under an optional scope.
    Grab {
        #[arg(long)]
        agent: String,
        #[arg(long = "scope")]
        scope: Vec<String>,
        /// Claim only the chosen id; parallel-safe fan-out ids are still
        /// listed in the output, just not claimed.
        #[arg(long)]
        single: bool,
        /// List ids only, without each one's title.
        #[arg(long)]
        no_content: bool,
        #[arg(long)]
        json: bool,
    },

    /// Mark one or more in-progress tasks done, cascading completion upward.
    Done {
        ids: Vec<String>,
        /// Allow completing a task that isn't in_progress.
        #[arg(long)]
        force: bool,
    },

    /// Reverse a task (or every descendant of a container) back to pending.
    Undone { id: String },

    /// Free-form status change with an optional recorded reason.
    Update {
        id: String,
        #[arg(long, value_enum)]
        status: StatusArg,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Merge one or more descriptive fields onto a task.
    Set {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<PriorityArg>,
        #[arg(long, value_enum)]
        complexity: Option<ComplexityArg>,
        #[arg(long)]
        estimate_hours: Option<f64>,
        #[arg(long, value_delimiter = ',')]
        depends_on: Option<Vec<String>>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },

    /// Show the agent's current working-context pointer, or the
    /// next-available id if no context is set.
    Work {
        #[arg(long)]
        json: bool,
    },

    /// Clear claim metadata on a task, resetting in-progress work to pending.
    Unclaim { id: String },

    /// Mark a task blocked with a reason, optionally chaining to `grab`.
    Blocked {
        id: String,
        #[arg(long)]
        reason: String,
        /// Immediately grab the next available id after blocking.
        #[arg(long)]
        grab: bool,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long = "scope")]
        scope: Vec<String>,
    },

    /// Append a new entry to the flat bug backlog.
    Bug { title: String },

    /// Append a new entry to the flat idea backlog.
    Idea { title: String },

    /// Append an already-done entry to the fixes archive.
    Fixed {
        title: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long)]
        body: Option<String>,
    },

    /// `done` followed by `grab` under the same scope.
    Cycle {
        id: String,
        #[arg(long)]
        agent: String,
        #[arg(long = "scope")]
        scope: Vec<String>,
    },

    /// Search task titles, bodies, and tags for a substring.
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },

    /// Run every consistency diagnostic over the tree.
    Check {
        /// Fail (exit 1) on warnings too, not just errors.
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        json: bool,
    },

    /// Close a container: new children may not be added beneath it.
    Lock { id: String },

    /// Reopen a locked container.
    Unlock { id: String },

    /// Reparent a task or epic under a new container.
    Move {
        id: String,
        #[arg(long)]
        to: String,
    },

    /// Active-agent session tracking.
    #[command(subcommand)]
    Session(SessionCommand),

    /// Bulk data views.
    #[command(subcommand)]
    Data(DataCommand),

    /// Aggregate scheduling reports.
    #[command(subcommand)]
    Report(ReportCommand),

    /// Render the critical path as a cumulative-hours timeline.
    #[command(alias = "tl")]
    Timeline {
        #[arg(long)]
        json: bool,
    },

    /// Print the on-disk schema reference.
    Schema {
        #[arg(long)]
        json: bool,
    },

    /// List every currently blocked task and its reason.
    Blockers {
        #[arg(long)]
        json: bool,
    },

    /// Agent-integration installers (templated file emission).
    #[command(subcommand)]
    Skills(SkillsCommand),

    /// Print the agent roles this backlog expects to coordinate.
    Agents {
        #[arg(long)]
        json: bool,
    },

    /// Per-task activity log derived from frontmatter timestamps.
    Log {
        #[arg(long = "scope")]
        scope: Vec<String>,
        #[arg(long)]
        json: bool,
    },

    /// Print a short orientation guide for agents new to this backlog.
    Howto,

    /// Rename a legacy `.backlog/` root to `.tasks/`.
    Migrate,

    /// Time a full tree-load + consistency-check pass.
    Benchmark {
        #[arg(long, default_value_t = 10)]
        iterations: usize,
    },

    /// Emit a shell completion script.
    Completion { shell: clap_complete::Shell },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Start (or replace) a session for an agent.
    Start {
        agent: String,
        #[arg(long)]
        task: Option<String>,
    },
    /// Refresh an agent's heartbeat and optional progress note.
    Heartbeat {
        agent: String,
        #[arg(long)]
        progress: Option<String>,
    },
    /// End an agent's session.
    End { agent: String },
    /// List every active session.
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DataCommand {
    /// Per-bucket task counts and total estimate hours.
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// Dump the entire loaded tree as structured data.
    Export {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Progress summary (alias of `data summary`, kept for the reports group).
    Progress {
        #[arg(long)]
        json: bool,
    },
    /// Trailing-window completed-tasks-per-day histogram.
    Velocity {
        #[arg(long, default_value_t = 30)]
        window_days: i64,
        #[arg(long)]
        json: bool,
    },
    /// Actual-vs-estimate duration ratios across completed tasks.
    #[command(name = "estimate-accuracy")]
    EstimateAccuracy {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SkillsCommand {
    /// Write the agent skill/integration templates to a directory.
    Install {
        #[arg(long, default_value = ".claude/skills/backlog")]
        dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_subcommand_accepts_ls_alias() {
        let cli = Cli::parse_from(["backlog", "ls"]);
        assert!(matches!(cli.command, Command::List { .. }));
    }

    #[test]
    fn claim_subcommand_parses_multiple_ids_and_agent() {
        let cli = Cli::parse_from(["backlog", "claim", "P1.M1.E1.T001", "P1.M1.E1.T002", "--agent", "agent-1"]);
        match cli.command {
            Command::Claim { ids, agent } => {
                assert_eq!(ids, vec!["P1.M1.E1.T001", "P1.M1.E1.T002"]);
                assert_eq!(agent, "agent-1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn done_subcommand_parses_force_flag() {
        let cli = Cli::parse_from(["backlog", "done", "P1.M1.E1.T001", "--force"]);
        match cli.command {
            Command::Done { ids, force } => {
                assert_eq!(ids, vec!["P1.M1.E1.T001"]);
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn set_subcommand_parses_comma_separated_tags() {
        let cli = Cli::parse_from(["backlog", "set", "P1.M1.E1.T001", "--tags", "a,b,c"]);
        match cli.command {
            Command::Set { tags, .. } => assert_eq!(tags, Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn session_start_subcommand_parses() {
        let cli = Cli::parse_from(["backlog", "session", "start", "agent-1", "--task", "P1.M1.E1.T001"]);
        match cli.command {
            Command::Session(SessionCommand::Start { agent, task }) => {
                assert_eq!(agent, "agent-1");
                assert_eq!(task, Some("P1.M1.E1.T001".to_string()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn timeline_subcommand_accepts_tl_alias() {
        let cli = Cli::parse_from(["backlog", "tl"]);
        assert!(matches!(cli.command, Command::Timeline { .. }));
    }

    #[test]
    fn report_velocity_default_window() {
        let cli = Cli::parse_from(["backlog", "report", "velocity"]);
        match cli.command {
            Command::Report(ReportCommand::Velocity { window_days, .. }) => assert_eq!(window_days, 30),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verbose_flag_is_countable() {
        let cli = Cli::parse_from(["backlog", "-vv", "next"]);
        assert_eq!(cli.verbose, 2);
    }
}
