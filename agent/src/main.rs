//! Autonomous debugging agent CLI.
//!
//! Manages run state under `.agent/` in the current workspace: the task
//! description, tool notes, configuration, and per-round history artifacts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use agent::core::context_render::NullResolver;
use agent::exit_codes;
use agent::io::config::{AgentConfig, AgentPaths, load_config, write_config};
use agent::io::env::ShellEnvironment;
use agent::io::model::CommandModel;
use agent::io::source::FsSourceReader;
use agent::looping::{LoopStop, NoRecovery, run_loop};
use agent::step::AgentLoop;

#[derive(Parser)]
#[command(
    name = "agent",
    version,
    about = "Autonomous debugging agent with decayed code-context memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.agent/config.toml`, `.agent/task.md` and `.agent/tools.md` if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the agent loop until submission, the round limit, or a dead end.
    Run,
}

fn main() {
    agent::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Run => cmd_run(),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let paths = AgentPaths::new(Path::new("."));
    fs::create_dir_all(".agent").context("create .agent directory")?;

    if force || !paths.config_path.exists() {
        write_config(&paths.config_path, &AgentConfig::default())?;
    }
    write_if_missing_or_force(&paths.task_path, "", force)?;
    write_if_missing_or_force(&paths.tools_path, "", force)?;
    Ok(exit_codes::OK)
}

fn cmd_run() -> Result<i32> {
    let root = Path::new(".");
    let paths = AgentPaths::new(root);
    let config = load_config(&paths.config_path)?;

    let task = fs::read_to_string(&paths.task_path)
        .with_context(|| format!("read {}", paths.task_path.display()))?;
    if task.trim().is_empty() {
        return Err(anyhow!(
            "{} is empty (run `agent init` and describe the task)",
            paths.task_path.display()
        ));
    }
    let tools = read_optional(&paths.tools_path)?;
    let history_dir = root.join(&config.history_dir);

    let model = CommandModel::from_config(&config.model);
    let env = ShellEnvironment::new(root, &config.exec);
    let source = FsSourceReader::new(root);

    let mut agent = AgentLoop::new(config, task, tools);
    let outcome = run_loop(
        &mut agent,
        &model,
        &env,
        &NullResolver,
        &source,
        &mut NoRecovery,
        Some(&history_dir),
        |step| {
            println!(
                "round {}: {}",
                step.round,
                step.action.lines().next().unwrap_or("")
            );
        },
    )?;

    match outcome.stop {
        LoopStop::Submitted { output } => {
            println!("{output}");
            Ok(exit_codes::OK)
        }
        LoopStop::RoundLimit { rounds } => {
            eprintln!("stopped: round limit ({rounds}) reached without a submission");
            Ok(exit_codes::ROUND_LIMIT)
        }
        LoopStop::DeadEnd {
            consecutive_invalid,
        } => {
            eprintln!("stopped: dead end after {consecutive_invalid} consecutive rejections");
            Ok(exit_codes::DEAD_END)
        }
    }
}

fn read_optional(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn write_if_missing_or_force(path: &Path, contents: &str, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Ok(());
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
