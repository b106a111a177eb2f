//! # Invoice Ledger
//!
//! Content-addressed invoice ingestion with monthly archives and
//! per-target acknowledgment tracking.
//!
//! Invoices arrive as PDFs (uploaded directly or attached to e-mail) and are
//! stored once per distinct content. Each calendar month can be bundled into
//! a deterministic zip archive for accounting. When accounting mails an
//! archive back, the sweep recognises it by hash and marks the month as
//! delivered. Until then, every subscribed chat is periodically reminded of
//! the months still outstanding.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Mailbox    │──▶│   Sweep     │──▶│   SQLite     │
//! │ (.eml spool)│   │ PDF / ZIP   │   │ docs+archives│
//! └─────────────┘   └──────┬──────┘   └──────┬───────┘
//!                          │                 │
//!                          ▼                 ▼
//!                    ┌──────────┐      ┌────────────┐
//!                    │ Gateway  │◀─────│ Scheduler  │
//!                    │ log/hook │      │ reminders  │
//!                    └──────────┘      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! invl init                       # create database
//! invl ingest ./inv-001.pdf       # store an invoice
//! invl archive 2024-01 --out .    # bundle a month
//! invl targets opt-in team-chat   # subscribe to reminders
//! invl serve                      # run scheduler and mailbox sweep
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Domain error taxonomy |
//! | [`models`] | Core data types and content hashing |
//! | [`period`] | Calendar month value type |
//! | [`clock`] | Injectable wall clock |
//! | [`store`] | Persistence trait and in-memory store |
//! | [`sqlite_store`] | SQLite store |
//! | [`migrate`] | Schema migrations |
//! | [`documents`] | Content-addressed document store |
//! | [`archive`] | Deterministic period archives |
//! | [`ledger`] | Acknowledgment watermarks and opt-in |
//! | [`gateway`] | Notification delivery |
//! | [`scheduler`] | Periodic reminders |
//! | [`mailbox`] | Mail source abstraction and MIME parsing |
//! | [`sweep`] | Mailbox ingestion sweep |
//! | [`tasks`] | Cancellable periodic tasks |
//! | [`engine`] | Component wiring |

pub mod archive;
pub mod clock;
pub mod config;
pub mod documents;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod mailbox;
pub mod migrate;
pub mod models;
pub mod period;
pub mod scheduler;
pub mod sqlite_store;
pub mod store;
pub mod sweep;
pub mod tasks;

pub use engine::{Engine, EngineParts};
pub use error::{LedgerError, Result};
pub use period::Period;
