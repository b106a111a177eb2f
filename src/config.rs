use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
        }
    }
}

fn default_name_prefix() -> String {
    "invoices".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_nag_interval_secs")]
    pub nag_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            nag_interval_secs: default_nag_interval_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn nag_interval(&self) -> Duration {
        Duration::from_secs(self.nag_interval_secs)
    }
}

fn default_nag_interval_secs() -> u64 {
    15 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    /// Directory of `.eml` files acting as the inbox. The sweep is disabled
    /// when unset.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_fetch_window")]
    pub fetch_window: u32,
    #[serde(default = "default_sweep_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            spool_dir: None,
            check_interval_secs: default_check_interval_secs(),
            fetch_window: default_fetch_window(),
            timeout_secs: default_sweep_timeout_secs(),
        }
    }
}

impl MailboxConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_check_interval_secs() -> u64 {
    10 * 60
}
fn default_fetch_window() -> u32 {
    10
}
fn default_sweep_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_kind")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Shared secret for the `X-Invl-Signature` HMAC header.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: default_gateway_kind(),
            url: None,
            secret: None,
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

fn default_gateway_kind() -> String {
    "log".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.archive.name_prefix.trim().is_empty() {
        bail!("archive.name_prefix must not be empty");
    }
    if config.archive.name_prefix.contains('/') {
        bail!("archive.name_prefix must not contain '/'");
    }

    if config.scheduler.nag_interval_secs < 1 {
        bail!("scheduler.nag_interval_secs must be >= 1");
    }

    if config.mailbox.check_interval_secs < 1 {
        bail!("mailbox.check_interval_secs must be >= 1");
    }
    if config.mailbox.fetch_window < 1 {
        bail!("mailbox.fetch_window must be >= 1");
    }
    if config.mailbox.timeout_secs < 1 {
        bail!("mailbox.timeout_secs must be >= 1");
    }

    match config.gateway.kind.as_str() {
        "log" => {}
        "webhook" => {
            if config.gateway.url.as_deref().map_or(true, str::is_empty) {
                bail!("gateway.url must be set when gateway.kind is 'webhook'");
            }
        }
        other => bail!(
            "Unknown gateway kind: '{}'. Must be log or webhook.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults_apply() {
        let config = parse("[db]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert_eq!(config.archive.name_prefix, "invoices");
        assert_eq!(config.scheduler.nag_interval(), Duration::from_secs(900));
        assert_eq!(config.mailbox.check_interval(), Duration::from_secs(600));
        assert_eq!(config.mailbox.fetch_window, 10);
        assert!(config.mailbox.spool_dir.is_none());
        assert_eq!(config.gateway.kind, "log");
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse(include_str!("../config/invl.example.toml")).unwrap();
        assert_eq!(config.mailbox.spool_dir, Some(PathBuf::from("./data/inbox")));
        assert_eq!(config.gateway.timeout_secs, 10);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = parse("[db]\npath = \"x\"\n[scheduler]\nnag_interval_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("nag_interval_secs"));
    }

    #[test]
    fn test_webhook_requires_url() {
        let err = parse("[db]\npath = \"x\"\n[gateway]\nkind = \"webhook\"\n").unwrap_err();
        assert!(err.to_string().contains("gateway.url"));
    }

    #[test]
    fn test_unknown_gateway_kind() {
        let err = parse("[db]\npath = \"x\"\n[gateway]\nkind = \"pigeon\"\n").unwrap_err();
        assert!(err.to_string().contains("pigeon"));
    }
}
