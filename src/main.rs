//! taskloop command line
//!
//! Runs one task (or resumes a saved one) in the current terminal. Questions
//! from the loop are answered on stdin; Ctrl-C aborts the running task.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use taskloop::services::task::{Ask, AskResponse, SayKind, TaskHost};
use taskloop::services::{
    builtin_registry, TaskLoopController, TaskLoopDeps, TaskOutcome, TaskSession,
};
use taskloop::{logging, ConfigService, SettingsUpdate};
use taskloop_llm::{AnthropicProvider, StreamingRequestPipeline};
use taskloop_tools::ToolCallReliabilityEngine;

#[derive(Parser)]
#[command(name = "taskloop", about = "Run agentic coding tasks against a model")]
struct Cli {
    /// Config file (default ~/.taskloop/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Working directory the tools operate in.
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,
    /// Model id, overriding the config.
    #[arg(long, global = true)]
    model: Option<String>,
    /// Auto-approve tool use per the config's categories.
    #[arg(long, global = true)]
    auto_approve: bool,
    /// Where task histories are stored.
    #[arg(long, global = true)]
    tasks_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new task.
    Run {
        /// What the model should do.
        task: String,
    },
    /// Resume a saved task by id.
    Resume {
        task_id: String,
        /// New instructions to send along with the resumption.
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Save `--model`, `--auto-approve` and `--tasks-dir` to the config file.
    Config {
        /// Auto-approved requests allowed before asking to continue.
        #[arg(long)]
        max_requests: Option<u32>,
    },
}

/// Host that prints to stdout and reads answers from stdin.
struct TerminalHost;

async fn read_line() -> String {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line.trim().to_string()
    })
    .await
    .unwrap_or_default()
}

fn prompt(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "\n{} ", text);
    let _ = stdout.flush();
}

fn parse_answer(line: String) -> AskResponse {
    match line.to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => AskResponse::Yes,
        "n" | "no" => AskResponse::No,
        _ => AskResponse::Message(line),
    }
}

#[async_trait]
impl TaskHost for TerminalHost {
    async fn ask(&self, ask: Ask) -> AskResponse {
        match ask {
            Ask::Tool { name, params } => {
                println!("\n[tool] {}", name);
                for (key, value) in &params {
                    let preview: String = value.chars().take(200).collect();
                    println!("  {}: {}", key, preview);
                }
                prompt("Run it? [Y/n/feedback]");
            }
            Ask::Followup { question } => {
                prompt(&format!("[question] {}\n>", question));
                return AskResponse::Message(read_line().await);
            }
            Ask::CompletionResult { result } => {
                println!("\n[completed] {}", result);
                prompt("Accept? [Y/n/feedback]");
            }
            Ask::ApiRequestFailed { error, attempt } => {
                println!("\n[api error] {}", error);
                prompt(&format!("Retry (attempt {})? [Y/n]", attempt + 1));
            }
            Ask::MistakeLimitReached { count } => {
                prompt(&format!(
                    "The model made {} mistakes in a row. Keep going? [Y/n/guidance]",
                    count
                ));
            }
            Ask::AutoApprovalMaxReached { count } => {
                prompt(&format!(
                    "{} requests were auto-approved. Keep going? [Y/n]",
                    count
                ));
            }
        }
        parse_answer(read_line().await)
    }

    async fn say(&self, kind: SayKind, text: &str, partial: bool) {
        let mut stdout = std::io::stdout();
        let _ = match kind {
            SayKind::Text if partial => write!(stdout, "{}", text),
            SayKind::Text => writeln!(stdout, "{}", text),
            SayKind::ApiRequestStarted => writeln!(stdout, "\n--- request ---"),
            SayKind::ToolResult => writeln!(stdout, "[result] {}", text),
            SayKind::CompletionResult => writeln!(stdout, "[completed] {}", text),
            SayKind::Warning => writeln!(stdout, "[warning] {}", text),
            SayKind::Error => writeln!(stdout, "[error] {}", text),
        };
        let _ = stdout.flush();
    }
}

// Exits explicitly: a stdin read left blocked by an abort would otherwise keep
// the runtime alive on shutdown.
#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{:#}", err);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut service = match &cli.config {
        Some(path) => ConfigService::load(path),
        None => ConfigService::new(),
    }
    .context("load config")?;
    let mut update = SettingsUpdate {
        model: cli.model,
        auto_approve: cli.auto_approve.then_some(true),
        max_requests: None,
        tasks_dir: cli.tasks_dir,
    };

    if let Command::Config { max_requests } = cli.command {
        update.max_requests = max_requests;
        let saved = service.update_config(update).context("save config")?;
        println!("Saved {}", service.config_path().display());
        println!("  model: {}", saved.provider.model);
        println!(
            "  auto-approve: {} (max {} requests)",
            saved.auto_approval.enabled, saved.auto_approval.max_requests
        );
        return Ok(());
    }

    let service = service
        .with_overrides(update)
        .context("apply command line overrides")?;
    let config = service.get_config().clone();

    let cwd = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve working directory")?,
    };

    let provider = AnthropicProvider::new(config.provider.resolve()).context("configure provider")?;
    let reliability = ToolCallReliabilityEngine::with_builtin_strategies(config.retry.clone());
    let deps = TaskLoopDeps {
        config,
        cwd,
        pipeline: StreamingRequestPipeline::new(Arc::new(provider)),
        tools: Arc::new(builtin_registry()),
        reliability: Arc::new(reliability),
        host: Arc::new(TerminalHost),
        checkpoints: None,
    };

    let session = TaskSession::new();
    let scope = session.begin().await;
    let mut controller = TaskLoopController::new(deps, scope);

    let signal_session = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, aborting task");
            signal_session.abort_current().await;
        }
    });

    let outcome = match cli.command {
        Command::Run { task } => controller.start_task(&task, Vec::new()).await,
        Command::Resume { task_id, message } => {
            controller.resume_task(&task_id, message.as_deref()).await
        }
        Command::Config { .. } => return Ok(()),
    };
    let task_id = controller.state().map(|s| s.id.clone());
    let cost = controller.state().map(|s| s.metrics.total_cost).unwrap_or(0.0);
    controller.dispose().await;

    let outcome = outcome.context("task failed")?;
    let task_id = task_id.unwrap_or_default();
    match outcome {
        TaskOutcome::Completed { result } => println!("\nTask {} completed: {}", task_id, result),
        TaskOutcome::Interrupted { reason } => {
            println!("\nTask {} interrupted: {}", task_id, reason);
            println!("Resume with: taskloop resume {}", task_id);
        }
        TaskOutcome::Aborted => {
            println!("\nTask {} aborted.", task_id);
            println!("Resume with: taskloop resume {}", task_id);
        }
        TaskOutcome::Failed { reason } => println!("\nTask {} failed: {}", task_id, reason),
    }
    println!("Cost: ${:.4}", cost);
    Ok(())
}
