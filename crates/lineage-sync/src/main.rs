//! CLI entry point for the lineage-sync credential maintenance tool.

use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use lineage_core::DistributorId;
use lineage_graph::{GraphClient, NodeStore, Person};

use lineage_sync::config::SyncConfig;
use lineage_sync::journal::{self, JobOutcome, Journal};
use lineage_sync::scheduler::MaintenanceScheduler;
use lineage_sync::{PropagationJob, RekeyJob};

#[derive(Parser)]
#[command(name = "lineage-sync")]
#[command(about = "Credential maintenance for the Lineage distributor tree")]
struct Cli {
    /// Config file prefix (default: lineage).
    #[arg(short, long, default_value = "lineage", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill empty nodes from their nearest full ancestor.
    Propagate,
    /// Re-key placeholder chains to the credentials above them.
    Rekey {
        /// Maximum discovery passes (default: jobs.max_passes).
        #[arg(long)]
        passes: Option<u32>,
    },
    /// Count empty, placeholder and full nodes.
    Census,
    /// Print one person's document.
    Show {
        #[arg(long)]
        id: String,
    },
    /// Run propagation and re-keying on the configured interval.
    Daemon,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::load(&cli.config)?;

    let graph = GraphClient::connect(&config.neo4j).await?;
    graph.ensure_schema().await?;
    tracing::info!(uri = %config.neo4j.uri, "Connected to Neo4j");
    let store: Arc<dyn NodeStore> = Arc::new(graph);

    let journal = config
        .jobs
        .journal_dir
        .as_deref()
        .map(Journal::open)
        .transpose()?;

    match cli.command {
        Command::Propagate => {
            let started = Utc::now();
            let outcome = PropagationJob::new(store, config.jobs)?.run().await?;
            let report = journal::record(
                journal.as_ref(),
                started,
                JobOutcome::Propagation(outcome),
            )?;
            print_json(&report)?;
        }
        Command::Rekey { passes } => {
            let passes = passes.unwrap_or(config.jobs.max_passes);
            let started = Utc::now();
            let outcome = RekeyJob::new(store, config.jobs)?
                .run_until_converged(passes)
                .await?;
            let report = journal::record(journal.as_ref(), started, JobOutcome::Rekey(outcome))?;
            print_json(&report)?;
        }
        Command::Census => {
            let census = store
                .credential_census(&config.jobs.placeholder_password)
                .await?;
            print_json(&census)?;
        }
        Command::Show { id } => {
            let id = DistributorId::new(id);
            let mut person = Person::load(store, &id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Person {id} not found"))?;
            print_json(&person.to_document().await?)?;
        }
        Command::Daemon => {
            let scheduler =
                MaintenanceScheduler::new(store, config.jobs, config.schedule, journal)?;
            scheduler.run().await?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
