//! Notification gateway abstraction and implementations.
//!
//! Defines the [`NotificationGateway`] trait the scheduler and the mailbox
//! sweep dispatch through, plus two implementations:
//! - **[`LogGateway`]**: writes every notification to the tracing log.
//! - **[`WebhookGateway`]**: POSTs JSON to a configured URL, optionally
//!   signed with HMAC-SHA256.
//!
//! Dispatch failures are per target. [`broadcast`] sends to a list of
//! targets, logs each failure, and keeps going.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::models::NotificationTarget;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Invl-Signature";

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_text(&self, target_id: &str, text: &str) -> Result<()>;

    async fn send_file(&self, target_id: &str, filename: &str, bytes: &[u8]) -> Result<()>;
}

/// Outcome of a [`broadcast`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Target ids whose dispatch failed.
    pub failed: Vec<String>,
}

/// Send `text` to every target in `targets`. A failure for one target is
/// logged and recorded; the remaining targets are still attempted.
pub async fn broadcast(
    gateway: &dyn NotificationGateway,
    targets: &[NotificationTarget],
    text: &str,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for target in targets {
        match gateway.send_text(&target.id, text).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(target_id = %target.id, error = %e, "notification dispatch failed");
                report.failed.push(target.id.clone());
            }
        }
    }
    report
}

/// Build the gateway selected by `[gateway].kind`.
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn NotificationGateway>> {
    match config.kind.as_str() {
        "log" => Ok(Arc::new(LogGateway)),
        "webhook" => Ok(Arc::new(WebhookGateway::new(config)?)),
        other => bail!("Unknown gateway kind: {}", other),
    }
}

// ============ Log Gateway ============

/// Writes notifications to the log instead of delivering them.
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn send_text(&self, target_id: &str, text: &str) -> Result<()> {
        info!(target_id, text, "notification");
        Ok(())
    }

    async fn send_file(&self, target_id: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        info!(target_id, filename, size = bytes.len(), "file notification");
        Ok(())
    }
}

// ============ Webhook Gateway ============

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WebhookPayload<'a> {
    Text {
        target_id: &'a str,
        text: &'a str,
    },
    File {
        target_id: &'a str,
        filename: &'a str,
        content_base64: String,
    },
}

/// Delivers notifications as JSON POSTs.
///
/// Text: `{"kind":"text","target_id":…,"text":…}`.
/// Files: `{"kind":"file","target_id":…,"filename":…,"content_base64":…}`.
/// Any non-2xx response is an error for that target.
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("gateway.url required for webhook gateway"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url,
            secret: config.secret.clone(),
        })
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<()> {
        let body = serde_json::to_vec(payload)?;
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret.as_bytes(), &body)?);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("webhook returned {}: {}", status, body_text);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for WebhookGateway {
    async fn send_text(&self, target_id: &str, text: &str) -> Result<()> {
        self.post(&WebhookPayload::Text { target_id, text }).await
    }

    async fn send_file(&self, target_id: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        self.post(&WebhookPayload::File {
            target_id,
            filename,
            content_base64: STANDARD.encode(bytes),
        })
        .await
    }
}

/// Hex-encoded HMAC-SHA256 of `body` under `key`.
pub fn sign(key: &[u8], body: &[u8]) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| anyhow!("invalid webhook secret: {}", e))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyGateway {
        fail_for: String,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationGateway for FlakyGateway {
        async fn send_text(&self, target_id: &str, _text: &str) -> Result<()> {
            if target_id == self.fail_for {
                bail!("boom");
            }
            self.sent.lock().unwrap().push(target_id.to_string());
            Ok(())
        }

        async fn send_file(&self, _target_id: &str, _filename: &str, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    fn target(id: &str) -> NotificationTarget {
        NotificationTarget {
            id: id.to_string(),
            enabled: true,
            last_acknowledged: None,
        }
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failures() {
        let gateway = FlakyGateway {
            fail_for: "b".to_string(),
            sent: Mutex::new(Vec::new()),
        };
        let targets = vec![target("a"), target("b"), target("c")];
        let report = broadcast(&gateway, &targets, "hello").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["b".to_string()]);
        assert_eq!(*gateway.sent.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2.
        let sig = sign(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_webhook_payload_shape() {
        let json = serde_json::to_value(WebhookPayload::Text {
            target_id: "42",
            text: "hi",
        })
        .unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["target_id"], "42");
        assert_eq!(json["text"], "hi");
    }
}
