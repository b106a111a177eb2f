//! # Invoice Ledger CLI (`invl`)
//!
//! The `invl` binary stores invoices, builds monthly archives, tracks which
//! months each chat has acknowledged, and runs the reminder scheduler and
//! mailbox sweep as a long-running service.
//!
//! ## Usage
//!
//! ```bash
//! invl --config ./config/invl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `invl init` | Create the SQLite database and run schema migrations |
//! | `invl ingest <file>` | Store a document |
//! | `invl periods` | List months with documents |
//! | `invl archive <YYYY-MM>` | Build the archive for a month |
//! | `invl archives <YYYY-MM>` | List archives built for a month |
//! | `invl pending <target>` | Months a target would be reminded about |
//! | `invl targets ...` | List, opt in, or opt out notification targets |
//! | `invl ack <target> <YYYY-MM>` | Mark a month as delivered for a target |
//! | `invl notify` | Run the reminder scheduler once |
//! | `invl sweep` | Run the mailbox sweep once |
//! | `invl serve` | Run scheduler and sweep until Ctrl-C |

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use invoice_ledger::config;
use invoice_ledger::migrate;
use invoice_ledger::period::format_periods;
use invoice_ledger::sweep::SweepOutcome;
use invoice_ledger::{Engine, LedgerError, Period};

/// Invoice Ledger CLI: content-addressed invoice storage with monthly
/// archives and acknowledgment tracking.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/invl.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "invl",
    about = "Invoice Ledger: invoice ingestion, monthly archives and acknowledgment tracking",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/invl.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it again is safe.
    Init,

    /// Store a document.
    ///
    /// Identical content is stored once; a second ingestion reports the
    /// existing document.
    Ingest {
        /// Path to the file.
        file: PathBuf,
    },

    /// List months holding documents, newest first.
    Periods,

    /// Build the archive for a month.
    Archive {
        /// Month as `YYYY-MM`.
        period: Period,

        /// Directory to write the zip into.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also deliver the zip to this target through the gateway.
        #[arg(long)]
        send: Option<String>,
    },

    /// List every archive built for a month, oldest first.
    Archives {
        /// Month as `YYYY-MM`.
        period: Period,
    },

    /// Show the months a target would currently be reminded about.
    Pending {
        /// Target id.
        target: String,
    },

    /// Manage notification targets.
    Targets {
        #[command(subcommand)]
        action: TargetAction,
    },

    /// Mark a month as delivered to accounting for a target.
    ///
    /// Acknowledging a month at or before the target's current watermark
    /// changes nothing.
    Ack {
        target: String,
        period: Period,
    },

    /// Run the reminder scheduler once.
    Notify,

    /// Run the mailbox sweep once.
    Sweep,

    /// Run the reminder scheduler and mailbox sweep until Ctrl-C.
    Serve,
}

#[derive(Subcommand)]
enum TargetAction {
    /// List all targets with their watermark.
    List,
    /// Subscribe a target to reminders and status messages.
    OptIn { id: String },
    /// Unsubscribe a target. Its watermark is kept.
    OptOut { id: String },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let engine = Engine::from_config(&cfg).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Ingest { file } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());

            match engine.ingest_document(&filename, payload).await {
                Ok(doc) => println!("Stored {} ({})", doc.filename, doc.content_hash),
                Err(LedgerError::DuplicateContent { existing, .. }) => println!(
                    "Already stored as {} ({})",
                    existing.filename, existing.content_hash
                ),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Periods => {
            let summaries = engine.period_summaries().await?;
            if summaries.is_empty() {
                println!("No documents.");
            }
            for (period, count) in summaries {
                println!("{}  {}", period, count);
            }
        }
        Commands::Archive { period, out, send } => {
            let built = match send {
                Some(target) => engine.send_archive(period, &target).await?,
                None => engine.build_archive(period).await?,
            };
            let dir = out.unwrap_or_else(|| PathBuf::from("."));
            let path = dir.join(&built.archive.filename);
            tokio::fs::write(&path, &built.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Wrote {} ({}{})",
                path.display(),
                built.archive.content_hash,
                if built.created { "" } else { ", unchanged" }
            );
        }
        Commands::Archives { period } => {
            for archive in engine.archive_history(period).await? {
                println!(
                    "{}  {}  {}",
                    archive.created_at.format("%Y-%m-%d %H:%M:%S"),
                    archive.filename,
                    archive.content_hash
                );
            }
        }
        Commands::Pending { target } => {
            let pending = engine.pending_for(&target).await?;
            if pending.is_empty() {
                println!("Nothing pending for {}.", target);
            } else {
                println!("{}", format_periods(&pending));
            }
        }
        Commands::Targets { action } => match action {
            TargetAction::List => {
                for t in engine.targets().await? {
                    println!(
                        "{}  {}  {}",
                        t.id,
                        if t.enabled { "enabled" } else { "disabled" },
                        t.last_acknowledged
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
            TargetAction::OptIn { id } => {
                engine.opt_in(&id).await?;
                println!("Subscribed {}.", id);
            }
            TargetAction::OptOut { id } => {
                if engine.opt_out(&id).await? {
                    println!("Unsubscribed {}.", id);
                } else {
                    println!("{} was not subscribed.", id);
                }
            }
        },
        Commands::Ack { target, period } => {
            let t = engine.acknowledge(&target, period).await?;
            let watermark = t.last_acknowledged.map(|p| p.to_string()).unwrap_or_default();
            println!("{} acknowledged through {}.", t.id, watermark);
        }
        Commands::Notify => {
            let report = engine.notify_once().await?;
            println!(
                "Reminded {} target(s), {} failed.",
                report.notified.len(),
                report.failed.len()
            );
        }
        Commands::Sweep => match engine.run_sweep().await {
            SweepOutcome::Completed(report) => println!(
                "Processed {} message(s): {} ingested, {} duplicate(s), {} acknowledgment(s).",
                report.messages_processed,
                report.documents_ingested,
                report.duplicates,
                report.acknowledged.len()
            ),
            SweepOutcome::AlreadyRunning => println!("Sweep already running."),
            SweepOutcome::Failed(e) => bail!("Sweep failed: {}", e),
        },
        Commands::Serve => {
            let sweeper = engine.start_sweeper(cfg.mailbox.check_interval()).await?;
            let scheduler = engine.start_scheduler(cfg.scheduler.nag_interval());
            if sweeper.is_none() {
                info!("no mailbox configured, sweep disabled");
            }

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("shutting down");

            scheduler.stop().await;
            if let Some(sweeper) = sweeper {
                sweeper.stop().await;
            }
        }
    }

    Ok(())
}
