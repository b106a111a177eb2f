//! Fakes shared by the integration tests: a recording notification gateway,
//! an in-memory mailbox, and helpers to assemble RFC 822 messages.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use invoice_ledger::clock::FixedClock;
use invoice_ledger::gateway::NotificationGateway;
use invoice_ledger::mailbox::{Envelope, MailSession, MailSource, MailboxStatus, RawMessage};
use invoice_ledger::store::{InMemoryStore, Store};
use invoice_ledger::sweep::SweepSettings;
use invoice_ledger::{Engine, EngineParts, LedgerError, Period};
use tokio::sync::Semaphore;

// ─── Gateway ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { target: String, text: String },
    File { target: String, filename: String, size: usize },
}

/// Records every dispatch. Targets listed in `failing` always error.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, target: &str) {
        self.failing.lock().unwrap().insert(target.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, target: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { target: t, text } if t == target => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_text(&self, target_id: &str, text: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(target_id) {
            bail!("gateway unavailable for {}", target_id);
        }
        self.sent.lock().unwrap().push(Sent::Text {
            target: target_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_file(&self, target_id: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        if self.failing.lock().unwrap().contains(target_id) {
            bail!("gateway unavailable for {}", target_id);
        }
        self.sent.lock().unwrap().push(Sent::File {
            target: target_id.to_string(),
            filename: filename.to_string(),
            size: bytes.len(),
        });
        Ok(())
    }
}

// ─── Mailbox ────────────────────────────────────────────────────────

/// An in-memory inbox. Messages are ordered oldest first.
#[derive(Default)]
pub struct FakeMailbox {
    messages: Mutex<Vec<RawMessage>>,
    /// When set, `select_inbox` waits for a permit before returning.
    gate: Option<Arc<Semaphore>>,
    /// When set, `select_inbox` sleeps this long.
    delay: Option<Duration>,
    refuse: bool,
    pub connects: AtomicUsize,
    pub fetched_ids: Mutex<Vec<String>>,
    pub deleted_ids: Mutex<Vec<String>>,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<RawMessage>) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(messages),
            ..Default::default()
        })
    }

    pub fn gated(messages: Vec<RawMessage>, gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(messages),
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            ..Default::default()
        })
    }

    pub fn push(&self, message: RawMessage) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn remaining_ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

/// `MailSource` handle over a shared [`FakeMailbox`].
pub struct FakeSource(pub Arc<FakeMailbox>);

#[async_trait]
impl MailSource for FakeSource {
    async fn connect(&self) -> invoice_ledger::Result<Box<dyn MailSession>> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        if self.0.refuse {
            return Err(LedgerError::ConnectionFailure("connection refused".into()));
        }
        Ok(Box::new(FakeSession {
            mailbox: self.0.clone(),
            snapshot: Vec::new(),
        }))
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

struct FakeSession {
    mailbox: Arc<FakeMailbox>,
    snapshot: Vec<RawMessage>,
}

#[async_trait]
impl MailSession for FakeSession {
    async fn select_inbox(&mut self) -> invoice_ledger::Result<MailboxStatus> {
        if let Some(gate) = &self.mailbox.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| LedgerError::ConnectionFailure(e.to_string()))?;
            permit.forget();
        }
        if let Some(delay) = self.mailbox.delay {
            tokio::time::sleep(delay).await;
        }
        self.snapshot = self.mailbox.messages.lock().unwrap().clone();
        Ok(MailboxStatus {
            message_count: self.snapshot.len() as u32,
        })
    }

    async fn fetch_range(&mut self, from: u32, to: u32) -> invoice_ledger::Result<Vec<RawMessage>> {
        let slice = self.snapshot[(from - 1) as usize..to as usize].to_vec();
        self.mailbox
            .fetched_ids
            .lock()
            .unwrap()
            .extend(slice.iter().map(|m| m.id.clone()));
        Ok(slice)
    }

    async fn delete_and_expunge(&mut self, id: &str) -> invoice_ledger::Result<()> {
        self.mailbox.messages.lock().unwrap().retain(|m| m.id != id);
        self.mailbox.deleted_ids.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

// ─── Messages ───────────────────────────────────────────────────────

pub struct Part<'a> {
    pub mime_type: &'a str,
    pub filename: &'a str,
    pub content: &'a [u8],
}

pub fn pdf<'a>(filename: &'a str, content: &'a [u8]) -> Part<'a> {
    Part {
        mime_type: "application/pdf",
        filename,
        content,
    }
}

pub fn zip<'a>(filename: &'a str, content: &'a [u8]) -> Part<'a> {
    Part {
        mime_type: "application/zip",
        filename,
        content,
    }
}

/// Raw RFC 822 bytes: a `multipart/mixed` message with a plain-text body
/// wrapped in `multipart/alternative`, followed by `parts`.
pub fn rfc822(subject: &str, from: &str, cc: &str, to: &str, parts: &[Part<'_>]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("From: {}\r\n", from));
    out.push_str(&format!("To: {}\r\n", to));
    if !cc.is_empty() {
        out.push_str(&format!("Cc: {}\r\n", cc));
    }
    out.push_str(&format!("Subject: {}\r\n", subject));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: multipart/mixed; boundary=\"b-outer\"\r\n\r\n");
    out.push_str("--b-outer\r\n");
    out.push_str("Content-Type: multipart/alternative; boundary=\"b-alt\"\r\n\r\n");
    out.push_str("--b-alt\r\nContent-Type: text/plain\r\n\r\nsee attached\r\n");
    out.push_str("--b-alt\r\nContent-Type: text/html\r\n\r\n<p>see attached</p>\r\n");
    out.push_str("--b-alt--\r\n");
    for part in parts {
        out.push_str("--b-outer\r\n");
        out.push_str(&format!(
            "Content-Type: {}; name=\"{}\"\r\n",
            part.mime_type, part.filename
        ));
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        out.push_str(&STANDARD.encode(part.content));
        out.push_str("\r\n");
    }
    out.push_str("--b-outer--\r\n");
    out.into_bytes()
}

pub fn message(id: &str, subject: &str, parts: &[Part<'_>]) -> RawMessage {
    let body = rfc822(
        subject,
        "Vendor <billing@vendor.example>",
        "boss@example.com",
        "books@example.com",
        parts,
    );
    let envelope = Envelope::from_rfc822(&body).unwrap();
    RawMessage {
        id: id.to_string(),
        envelope,
        body,
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub gateway: Arc<RecordingGateway>,
}

pub fn period(s: &str) -> Period {
    s.parse().unwrap()
}

pub fn harness(current: &str, mailbox: Option<Arc<FakeMailbox>>) -> Harness {
    harness_with(current, mailbox, SweepSettings::default())
}

pub fn harness_with(
    current: &str,
    mailbox: Option<Arc<FakeMailbox>>,
    sweep: SweepSettings,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::at_period(period(current)));
    let gateway = RecordingGateway::new();
    let engine = Engine::new(EngineParts {
        store: store.clone() as Arc<dyn Store>,
        clock: clock.clone(),
        gateway: gateway.clone(),
        mail_source: mailbox.map(|m| Arc::new(FakeSource(m)) as Arc<dyn MailSource>),
        archive_prefix: "invoices".to_string(),
        sweep,
    });
    Harness {
        engine,
        store,
        clock,
        gateway,
    }
}
