//! MIME part extraction.
//!
//! Walks a parsed message and returns its leaf parts with decoded bodies.
//! `multipart/alternative` containers are skipped entirely, since they only
//! hold alternate renderings of the message text. Other multipart containers
//! (`mixed`, `related`, ...) are descended into.

use mailparse::{MailAddr, MailHeaderMap, ParsedMail};

use crate::error::{LedgerError, Result};

use super::Envelope;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_ZIP: &str = "application/zip";
const MIME_ALTERNATIVE: &str = "multipart/alternative";

/// A decoded leaf part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    /// Lowercased `type/subtype`.
    pub mime_type: String,
    pub content: Vec<u8>,
}

/// Leaf parts of `raw`, in document order.
pub fn leaf_parts(raw: &[u8]) -> Result<Vec<Attachment>> {
    let parsed = mailparse::parse_mail(raw).map_err(malformed)?;
    let mut out = Vec::new();
    collect(&parsed, &mut out)?;
    Ok(out)
}

fn collect(part: &ParsedMail<'_>, out: &mut Vec<Attachment>) -> Result<()> {
    let mime_type = part.ctype.mimetype.to_ascii_lowercase();
    if mime_type == MIME_ALTERNATIVE {
        return Ok(());
    }
    if mime_type.starts_with("multipart/") {
        for sub in &part.subparts {
            collect(sub, out)?;
        }
        return Ok(());
    }

    let content = part.get_body_raw().map_err(malformed)?;
    out.push(Attachment {
        filename: part_filename(part),
        mime_type,
        content,
    });
    Ok(())
}

/// `name` from Content-Type, else `filename` from Content-Disposition.
fn part_filename(part: &ParsedMail<'_>) -> String {
    if let Some(name) = part.ctype.params.get("name") {
        if !name.is_empty() {
            return name.clone();
        }
    }
    part.get_content_disposition()
        .params
        .get("filename")
        .cloned()
        .unwrap_or_default()
}

pub(crate) fn parse_envelope(raw: &[u8]) -> Result<Envelope> {
    let parsed = mailparse::parse_mail(raw).map_err(malformed)?;
    let headers = &parsed.headers;

    Ok(Envelope {
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        from: addresses(&parsed, "From")?,
        cc: addresses(&parsed, "Cc")?,
        to: addresses(&parsed, "To")?,
    })
}

fn addresses(parsed: &ParsedMail<'_>, header: &str) -> Result<Vec<String>> {
    let Some(header) = parsed.headers.get_first_header(header) else {
        return Ok(Vec::new());
    };
    let list = mailparse::addrparse_header(header).map_err(malformed)?;
    let mut out = Vec::new();
    for addr in list.iter() {
        match addr {
            MailAddr::Single(single) => out.push(single.addr.clone()),
            MailAddr::Group(group) => out.extend(group.addrs.iter().map(|s| s.addr.clone())),
        }
    }
    Ok(out)
}

fn malformed(err: mailparse::MailParseError) -> LedgerError {
    LedgerError::MalformedMessage(err.to_string())
}
