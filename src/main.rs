use clap::Parser;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error};

use sisyphus::checkpoint::{CheckpointStorage, FileCheckpointStorage};
use sisyphus::collaborator::create_collaborator;
use sisyphus::config::Settings;
use sisyphus::controller::{Outcome, RefinementController};
use sisyphus::error::Error;
use sisyphus::evaluator::Verdict;
use sisyphus::knowledge::{BagOfWordsScorer, KnowledgeStore};
use sisyphus::sandbox::ProcessSandbox;

/// Iteratively propose, execute, and refine LLM-generated solutions
#[derive(Parser)]
#[command(name = "sisyphus")]
#[command(about = "Solve a natural-language goal through iterative refinement", long_about = None)]
struct Cli {
    /// The goal to solve; prompted for interactively when omitted
    goal: Option<String>,

    /// Maximum number of refinement iterations
    #[arg(short = 'n', long, default_value = "5")]
    max_iterations: u32,

    /// Resume a previous run by its run id
    #[arg(long)]
    resume: Option<String>,

    /// Sandbox timeout in seconds for each candidate execution
    #[arg(long)]
    timeout: Option<u64>,

    /// Language-model provider (anthropic or openai)
    #[arg(long)]
    provider: Option<String>,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    if let Err(e) = run(cli).await {
        error!("fatal error: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(provider) = &cli.provider {
        settings.provider = provider.parse()?;
    }
    if let Some(timeout) = cli.timeout {
        settings.sandbox_timeout = std::time::Duration::from_secs(timeout);
    }

    let checkpoints: Arc<dyn CheckpointStorage> =
        Arc::new(FileCheckpointStorage::new(settings.checkpoint_dir()));

    // On explicit resume the checkpoint carries the goal, so resolve it
    // before deciding whether to prompt.
    let resume_checkpoint = match &cli.resume {
        Some(run_id) => Some(
            checkpoints
                .load(run_id)
                .await?
                .ok_or_else(|| Error::Checkpoint(format!("no checkpoint for run '{run_id}'")))?,
        ),
        None => None,
    };

    let goal = match (&resume_checkpoint, cli.goal) {
        (Some(checkpoint), _) => checkpoint.goal.clone(),
        (None, Some(goal)) => goal,
        (None, None) => prompt_for_goal()?,
    };
    Settings::validate_run(&goal, cli.max_iterations)?;

    let collaborator = create_collaborator(&settings)?;
    debug!("using provider '{}'", collaborator.name());

    let sandbox = Arc::new(ProcessSandbox::new(
        settings.interpreter.clone(),
        settings.sandbox_output_cap,
    ));
    let knowledge = KnowledgeStore::open(
        settings.knowledge_path(),
        Box::new(BagOfWordsScorer::new()),
    )?;

    let mut controller = RefinementController::new(
        collaborator,
        sandbox,
        knowledge,
        Arc::clone(&checkpoints),
        &settings,
    );

    let interrupt = controller.interrupt_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, stopping after in-flight work is abandoned...");
            interrupt.store(true, Ordering::Relaxed);
        }
    });

    let outcome = match resume_checkpoint {
        Some(checkpoint) => controller.resume(checkpoint, cli.max_iterations).await?,
        None => controller.run(&goal, cli.max_iterations).await?,
    };

    report(&outcome);
    if !outcome.is_success() {
        std::process::exit(2);
    }
    Ok(())
}

fn prompt_for_goal() -> anyhow::Result<String> {
    println!("What goal should I work on?");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Success { attempt, history } => {
            println!(
                "✅ Goal achieved at iteration {} of {} attempt(s)",
                attempt.iteration,
                history.len()
            );
            if let Verdict::Success { summary } = &attempt.verdict {
                println!("   {summary}");
            }
            if let Some(execution) = &attempt.execution {
                if !execution.stdout.trim().is_empty() {
                    println!("--- output ---\n{}", execution.stdout.trim());
                }
            }
        }
        Outcome::Exhausted { history } => {
            println!("❌ Iteration budget exhausted after {} attempt(s)", history.len());
            for attempt in history {
                if let Verdict::Failure { reason, .. } = &attempt.verdict {
                    println!("   attempt {}: {}", attempt.iteration, reason);
                }
            }
        }
        Outcome::Interrupted { history } => {
            println!(
                "⚠️ Run interrupted after {} completed attempt(s); resume with --resume",
                history.len()
            );
        }
    }
}
