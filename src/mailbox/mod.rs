//! Mail source abstraction.
//!
//! The sweep talks to a mailbox through [`MailSource`] (open a session) and
//! [`MailSession`] (select, fetch, delete). A session is used by one sweep
//! at a time; it is never shared across tasks.
//!
//! Messages are addressed two ways: `fetch_range` takes 1-based sequence
//! numbers relative to the last `select_inbox`, while deletion takes the
//! stable [`RawMessage::id`] so that expunging one message cannot shift the
//! address of another.

pub mod mime;
pub mod spool;

use async_trait::async_trait;

use crate::error::{LedgerError, Result};

pub use mime::{leaf_parts, Attachment};
pub use spool::SpoolMailSource;

/// Envelope fields of a fetched message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub subject: String,
    pub from: Vec<String>,
    pub cc: Vec<String>,
    pub to: Vec<String>,
}

impl Envelope {
    /// First `From` address, or `"unknown"`.
    pub fn sender(&self) -> &str {
        self.from.first().map(String::as_str).unwrap_or("unknown")
    }

    /// Envelope parsed from the RFC 822 header block of `raw`.
    pub fn from_rfc822(raw: &[u8]) -> Result<Self> {
        mime::parse_envelope(raw)
    }
}

/// A message as fetched from the mailbox: envelope plus full RFC 822 bytes.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Stable identifier used for deletion.
    pub id: String,
    pub envelope: Envelope,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStatus {
    pub message_count: u32,
}

#[async_trait]
pub trait MailSource: Send + Sync {
    /// Open and authenticate a session.
    ///
    /// Fails with [`LedgerError::ConnectionFailure`] or
    /// [`LedgerError::AuthFailure`].
    async fn connect(&self) -> Result<Box<dyn MailSession>>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

#[async_trait]
pub trait MailSession: Send {
    async fn select_inbox(&mut self) -> Result<MailboxStatus>;

    /// Messages with sequence numbers `from..=to` (1-based), ascending.
    async fn fetch_range(&mut self, from: u32, to: u32) -> Result<Vec<RawMessage>>;

    /// Permanently remove the message with `id`.
    async fn delete_and_expunge(&mut self, id: &str) -> Result<()>;

    async fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sequence range of the newest `window` messages out of `total`, or `None`
/// for an empty mailbox.
pub fn fetch_window(total: u32, window: u32) -> Option<(u32, u32)> {
    if total == 0 || window == 0 {
        return None;
    }
    let count = total.min(window);
    Some((total - count + 1, total))
}

pub(crate) fn connection_failure(context: &str, err: impl std::fmt::Display) -> LedgerError {
    LedgerError::ConnectionFailure(format!("{}: {}", context, err))
}
