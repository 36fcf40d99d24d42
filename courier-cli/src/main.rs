//! Courier CLI
//!
//! Compile "send email" instructions into UI plans and run them against a recorded UI
//! tree.
//!
//! Usage:
//!   courier providers
//!   courier plan "send email to joe@example.com about Meeting saying 'Hi'" --provider outlook
//!   courier run "send email to joe@example.com about Meeting saying 'Hi'" -p gmail --tree inbox.json
//!
//! Exit codes: 0 when the run completed, 1 when it failed or was cancelled, 2 when the
//! instruction or provider was rejected before anything ran.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use courier::plan::check_snapshot;
use courier::{
    ActionState, Courier, CourierError, ExecutionOutcome, ExecutorConfig, Plan, RunFailure,
    RunStatus, SettlePolicy, TreeSession, VocabularyTable,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "✉️  Courier - compile mail instructions into UI actions and run them")]
struct Cli {
    /// Provider vocabulary file (YAML or JSON) merged over the built-in providers
    #[arg(long, global = true, env = "COURIER_VOCABULARY")]
    vocabulary: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct ProvidersArgs {
    /// Print the vocabularies as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// The instruction, e.g. "send email to joe@example.com about Meeting saying 'Hi'"
    instruction: String,

    /// Mail provider (gmail, outlook, or one from --vocabulary)
    #[arg(long, short = 'p', env = "COURIER_PROVIDER", default_value = "gmail")]
    provider: String,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,

    /// Page text or accessibility dump to check the plan's labels against
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// The instruction to carry out
    instruction: String,

    /// Mail provider (gmail, outlook, or one from --vocabulary)
    #[arg(long, short = 'p', env = "COURIER_PROVIDER", default_value = "gmail")]
    provider: String,

    /// JSON UI tree to run against
    #[arg(long, short = 't')]
    tree: PathBuf,

    /// Print the execution outcome as JSON
    #[arg(long)]
    json: bool,

    /// Per-action bound on finding the element and waiting for it to be visible
    #[arg(long, env = "COURIER_VISIBILITY_TIMEOUT_MS", default_value_t = 5000)]
    visibility_timeout_ms: u64,

    /// Pause after each action (upper bound when --quiet-ms is set)
    #[arg(long, env = "COURIER_SETTLE_MS", default_value_t = 2000)]
    settle_ms: u64,

    /// Settle once the UI has been unchanged this long instead of a fixed pause
    #[arg(long)]
    quiet_ms: Option<u64>,

    /// Abort the whole run after this long
    #[arg(long, env = "COURIER_RUN_TIMEOUT_MS")]
    run_timeout_ms: Option<u64>,

    /// Where failure dumps are written
    #[arg(long, env = "COURIER_DIAGNOSTICS_DIR", default_value = "diagnostics")]
    diagnostics_dir: PathBuf,

    /// Match labels exactly instead of by case-insensitive substring
    #[arg(long)]
    exact: bool,
}

impl RunArgs {
    fn executor_config(&self) -> ExecutorConfig {
        let settle = Duration::from_millis(self.settle_ms);
        let policy = match self.quiet_ms {
            Some(quiet) => SettlePolicy::Quiescent {
                quiet: Duration::from_millis(quiet),
                max: settle,
            },
            None => SettlePolicy::Fixed(settle),
        };
        ExecutorConfig::default()
            .with_visibility_timeout(Duration::from_millis(self.visibility_timeout_ms))
            .with_settle(policy)
            .with_fuzzy(!self.exact)
            .with_run_timeout(self.run_timeout_ms.map(Duration::from_millis))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List supported providers and their UI labels
    Providers(ProvidersArgs),
    /// Parse and compile an instruction without touching any UI
    Plan(PlanArgs),
    /// Compile an instruction and execute it against a UI tree
    Run(RunArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("❌ Failed to initialize logging: {e}");
    }
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "❌ Error:".red().bold());
            match e.downcast_ref::<CourierError>() {
                Some(err) if err.is_validation() => 2,
                _ => 1,
            }
        }
    };
    std::process::exit(code);
}

fn init_logging() -> Result<()> {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::WARN,
        })
        .unwrap_or(Level::WARN);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let vocabulary = load_vocabulary(cli.vocabulary.as_deref())?;
    match cli.command {
        Commands::Providers(args) => show_providers(&vocabulary, args.json).map(|_| 0),
        Commands::Plan(args) => show_plan(vocabulary, args).map(|_| 0),
        Commands::Run(args) => run(vocabulary, args).await,
    }
}

fn load_vocabulary(path: Option<&Path>) -> Result<VocabularyTable> {
    let builtin = VocabularyTable::builtin();
    match path {
        Some(path) => {
            let extra = VocabularyTable::from_path(path)?;
            info!("Loaded {} provider(s) from {}", extra.len(), path.display());
            Ok(builtin.merge(extra))
        }
        None => Ok(builtin),
    }
}

fn show_providers(vocabulary: &VocabularyTable, json: bool) -> Result<()> {
    if json {
        let entries: Vec<_> = vocabulary.iter().collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for vocab in vocabulary.iter() {
        println!("{}", vocab.provider.bold());
        if let Some(url) = &vocab.entry_url {
            println!("   • Entry URL: {url}");
        }
        println!("   • Compose: {} \"{}\"", vocab.control_role, vocab.compose_control);
        println!("   • To: \"{}\"", vocab.to_field);
        println!("   • Subject: \"{}\"", vocab.subject_field);
        println!("   • Body: \"{}\"", vocab.body_field);
        println!("   • Send: {} \"{}\"", vocab.control_role, vocab.send_control);
    }
    Ok(())
}

fn show_plan(vocabulary: VocabularyTable, args: PlanArgs) -> Result<()> {
    let entry_url = vocabulary.lookup(&args.provider)?.entry_url.clone();
    let courier = Courier::new().with_vocabulary(Arc::new(vocabulary));
    let plan = courier.compile(&args.instruction, &args.provider)?;

    let warnings = match &args.snapshot {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            check_snapshot(&plan, &text)
        }
        None => Vec::new(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    print_plan(&plan, entry_url.as_deref());
    for warning in &warnings {
        println!(
            "{} action #{} label \"{}\" not found in snapshot",
            "⚠️  Warning:".yellow(),
            warning.index,
            warning.label
        );
    }
    Ok(())
}

fn print_plan(plan: &Plan, entry_url: Option<&str>) {
    println!("📋 Plan for {} ({} actions)", plan.provider.bold(), plan.len());
    if let Some(url) = entry_url {
        println!("   Open {url}");
    }
    for (index, action) in plan.iter().enumerate() {
        println!("   {index}. {action}");
    }
}

async fn run(vocabulary: VocabularyTable, args: RunArgs) -> Result<i32> {
    let courier = Courier::new()
        .with_vocabulary(Arc::new(vocabulary))
        .with_executor_config(args.executor_config());

    // Validate before loading the page so bad input exits with 2 and no side effects
    let plan = courier.compile(&args.instruction, &args.provider)?;

    let mut session = TreeSession::from_path(&args.tree)
        .with_context(|| format!("Failed to load UI tree {}", args.tree.display()))?
        .with_diagnostics_dir(&args.diagnostics_dir);
    info!("Loaded UI tree from {}", args.tree.display());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("🛑 Ctrl-C received, stopping after the current action");
            on_signal.cancel();
        }
    });

    if !args.json {
        print_plan(&plan, None);
    }
    let outcome = courier
        .executor()
        .execute_with_cancel(plan, &mut session, cancel)
        .await;
    signal_task.abort();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(if outcome.is_completed() { 0 } else { 1 })
}

fn print_outcome(outcome: &ExecutionOutcome) {
    println!();
    println!("{}", "═".repeat(60));

    match &outcome.status {
        RunStatus::Completed => {
            println!(
                "{} sent via {}",
                "✅ SUCCESS:".green().bold(),
                outcome.provider
            );
        }
        RunStatus::Failed { index, failure } => {
            let detail = match failure {
                RunFailure::ResolutionTimeout {
                    selector,
                    timeout_ms,
                } => format!("{selector} did not appear within {timeout_ms}ms"),
                RunFailure::InteractionFailed { selector, cause } => {
                    format!("{selector} rejected the interaction: {cause}")
                }
                RunFailure::Session { selector, message } => format!("{selector}: {message}"),
            };
            println!(
                "{} action #{index} failed, {detail}",
                "❌ FAILURE:".red().bold()
            );
        }
        RunStatus::Cancelled { index, reason } => {
            println!(
                "{} at action #{index}, {reason}",
                "⏹️  CANCELLED:".yellow().bold()
            );
        }
    }

    println!("{}", "─".repeat(60));
    for report in &outcome.actions {
        let marker = match report.state {
            ActionState::Settled => "✔".green(),
            ActionState::Failed => "✘".red(),
            _ => "·".dimmed(),
        };
        println!(
            "   {marker} #{} {:<44} {:>6}ms",
            report.index,
            report.action.to_string(),
            report.elapsed_ms
        );
        if let Some(path) = &report.diagnostic {
            println!("       diagnostic: {}", path.display());
        }
    }
    println!("{}", "─".repeat(60));
    println!(
        "   • Duration: {:.2}s",
        outcome.duration_ms as f64 / 1000.0
    );
    println!("{}", "═".repeat(60));
}
