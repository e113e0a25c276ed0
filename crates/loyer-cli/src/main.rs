//! `loyer`: builds contract ledgers from digitised contract documents.
//!
//! # Usage
//!
//! ```text
//! loyer import acme docs/acme/*.md
//! loyer run acme --reextract
//! loyer export acme --format markdown
//! loyer schema
//! ```
//!
//! Settings come from `loyer.toml` (or `--config`) and `LOYER_` environment
//! variables; see `loyer.example.toml`.

mod export;
mod import;
mod oracle;
mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use loyer_core::{
  document::AffairKey,
  ledger::Issue,
  schema::LedgerSchema,
  store::{DocumentStore, LedgerStore},
};
use loyer_reconcile::{AffairOutcome, Pipeline};
use loyer_store_sqlite::SqliteStore;
use oracle::AnyOracle;
use settings::Settings;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loyer", version, about = "Contract ledger reconciliation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "loyer.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load extracted text or markdown documents of an affair into the store.
  Import {
    affair: String,
    #[arg(required = true)]
    paths:  Vec<PathBuf>,
  },
  /// Reconcile affairs and store their ledgers. All affairs when none given.
  Run {
    affairs:   Vec<String>,
    /// Call the oracle again instead of using cached extractions.
    #[arg(long)]
    reextract: bool,
  },
  /// Print the stored ledger of an affair.
  Export {
    affair: String,
    #[arg(long, value_enum, default_value_t = export::Format::Markdown)]
    format: export::Format,
    /// Write to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Print the versioned ledger schema as JSON.
  Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  match cli.command {
    Command::Schema => {
      println!("{}", serde_json::to_string_pretty(&LedgerSchema::current())?);
      Ok(())
    }
    Command::Import { affair, paths } => import_documents(&settings, affair, paths).await,
    Command::Run { affairs, reextract } => run(settings, affairs, reextract).await,
    Command::Export { affair, format, output } => {
      let store = open_store(&settings).await?;
      let key = AffairKey::new(&affair);
      let stored = store
        .get(key.clone())
        .await?
        .with_context(|| format!("no ledger stored for affair {key}"))?;
      let rendered = export::render(format, &LedgerSchema::current(), &stored.ledger)?;
      match output {
        Some(path) => std::fs::write(&path, rendered)
          .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{rendered}"),
      }
      Ok(())
    }
  }
}

async fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {}", settings.store_path.display()))?;
  Ok(store.with_snapshot_retention(settings.snapshot_retention))
}

async fn import_documents(
  settings: &Settings,
  affair: String,
  paths: Vec<PathBuf>,
) -> anyhow::Result<()> {
  let store = open_store(settings).await?;
  let key = AffairKey::new(&affair);
  for path in paths {
    let doc = import::load(&key, &path)?;
    let reference = store.put(doc).await?;
    info!(affair = %key, document = %reference.document_id, "imported");
  }
  Ok(())
}

async fn run(mut settings: Settings, affairs: Vec<String>, reextract: bool) -> anyhow::Result<()> {
  settings.pipeline.reextract |= reextract;
  let store = open_store(&settings).await?;
  let oracle = AnyOracle::from_settings(&settings.oracle)?;
  info!(oracle = %oracle.describe(), "oracle selected");

  let pipeline = Pipeline::new(
    store.clone(),
    store.clone(),
    store,
    oracle,
    LedgerSchema::current(),
    &settings.reconcile(),
  );
  let keys = if affairs.is_empty() {
    pipeline.affairs().await?
  } else {
    affairs.iter().map(AffairKey::new).collect()
  };

  let outcomes = pipeline.run(keys).await;
  let mut failed = 0usize;
  for outcome in &outcomes {
    match outcome {
      AffairOutcome::Completed { ack, issues } => {
        println!("{}: {} rows, digest {}", ack.affair, ack.row_count, ack.digest);
        print_issues(issues);
      }
      AffairOutcome::Failed { affair, error } => {
        failed += 1;
        println!("{affair}: FAILED: {error}");
      }
    }
  }

  if failed > 0 {
    bail!("{failed} of {} affairs failed", outcomes.len());
  }
  Ok(())
}

fn print_issues(issues: &[Issue]) {
  for issue in issues {
    println!("  - {issue}");
  }
}
