use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;
mod patterns;

use commands::{evolve, policy, scan, status};
use guard_observability::config::TracingConfig;
use guard_observability::exporter::init_tracing;

/// llm-guard - runtime protection for LLM applications
///
/// **scan**   - check a single prompt for injection/jailbreak threats
/// **status** - inspect pattern store, cache, and guard health
/// **policy** - inspect or adjust per-scope budgets
/// **evolve** - run adversarial evolver rounds against a seeded simulation
#[derive(Parser)]
#[command(name = "llm-guard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runtime guard for LLM applications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Scan(scan::ScanArgs),
    Status(status::StatusArgs),
    Policy(policy::PolicyArgs),
    Evolve(evolve::EvolveArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = init_tracing(TracingConfig::new("llm-guard").with_filter("warn"));

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => scan::run(args).await,
        Commands::Status(args) => status::run(args).await,
        Commands::Policy(args) => policy::run(args).await,
        Commands::Evolve(args) => evolve::run(args).await,
    }
}
