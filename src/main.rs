//! # Agentic RAG CLI (`arag`)
//!
//! Plans a query into tasks, executes them against a local corpus, and
//! prints a cited answer.
//!
//! ## Usage
//!
//! ```bash
//! arag --config ./config/arag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arag ask "<query>"` | Run the full workflow and print the answer |
//! | `arag plan "<query>"` | Print the task plan without executing it |
//! | `arag sources` | List loaded corpus passages |
//! | `arag serve` | Start the HTTP server |
//! | `arag completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Ask with reflection enabled and at most two rounds
//! arag ask "What is the bridging loan process and current rates?" --reflect --max-iterations 2
//!
//! # Full result as JSON
//! arag ask "Compare fixed and variable rates" --json
//!
//! # Serve the HTTP API
//! arag serve --config ./config/arag.toml
//! ```

use std::path::PathBuf;

use agentic_rag::config::{resolve_config, Config};
use agentic_rag::context::WorkflowContext;
use agentic_rag::corpus::load_corpus;
use agentic_rag::server;
use agentic_rag::workflow::{RunOptions, WorkflowEngine};
use agentic_rag_core::state::WorkflowResult;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

/// Agentic RAG: plan, execute, and reflect over a local document corpus.
#[derive(Parser)]
#[command(name = "arag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/arag.toml` when present, built-in defaults
    /// otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query with the planning / execution / reflection workflow.
    Ask {
        query: String,

        /// Extra context about the user or situation.
        #[arg(long)]
        context: Option<String>,

        /// Enable reflection regardless of config.
        #[arg(long)]
        reflect: bool,

        /// Maximum number of orchestration rounds.
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the plan for a query without executing it.
    Plan {
        query: String,

        #[arg(long)]
        context: Option<String>,
    },

    /// List the passages loaded from `[corpus].root`.
    Sources,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "arag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask {
            query,
            context,
            reflect,
            max_iterations,
            json,
        } => {
            if max_iterations == Some(0) {
                anyhow::bail!("--max-iterations must be at least 1");
            }
            let ctx = WorkflowContext::from_config(&cfg)?;
            let options = RunOptions {
                enable_reflection: reflect.then_some(true),
                max_iterations,
            };
            let result = WorkflowEngine::default()
                .run(&ctx, &query, context, options)
                .await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Plan { query, context } => {
            let ctx = WorkflowContext::from_config(&cfg)?;
            let plan = WorkflowEngine::default()
                .plan(&ctx, &query, context.as_deref())
                .await;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Sources => list_sources(&cfg)?,
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn print_result(result: &WorkflowResult) {
    println!("{}\n", result.answer);
    println!("Confidence: {:.2}", result.confidence);
    if !result.citations.is_empty() {
        println!("\nCitations:");
        for (i, c) in result.citations.iter().enumerate() {
            println!("  [{}] {} ({})", i + 1, c.source, c.id);
        }
    }
    println!("\n{}", result.execution_summary);
}

fn list_sources(cfg: &Config) -> anyhow::Result<()> {
    let corpus = load_corpus(&cfg.corpus)?;
    if corpus.is_empty() {
        println!("No passages loaded. Set [corpus].root in the config.");
        return Ok(());
    }
    println!("{:<48} {:>8}  TITLE", "SOURCE", "CHARS");
    for p in corpus.passages() {
        println!(
            "{:<48} {:>8}  {}",
            p.source,
            p.content.chars().count(),
            p.display_title()
        );
    }
    println!("\n{} passage(s)", corpus.len());
    Ok(())
}
