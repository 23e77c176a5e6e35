//! Declarative cluster configuration for kafly.
//!
//! A single YAML file describes every cluster the dashboard manages:
//!
//! ```yaml
//! clusters:
//!   - name: dev
//!     brokers: ["localhost:9092"]
//!   - name: prod
//!     brokers: ["k1.example.com:9092", "k2.example.com:9092"]
//!     client_id: kafly-dashboard
//!     tls:
//!       enabled: true
//!       ca_file: /etc/kafly/ca.pem
//!     sasl:
//!       mechanism: SCRAM-SHA-512
//!       username_env: KAFKA_PROD_USER
//!       password_env: KAFKA_PROD_PASS
//! ```
//!
//! The file is the source of truth: the registry in `kafly-core` reloads it
//! on change and reconciles live clients against it. This crate owns the
//! value types, the read/write functions, and the connection-equality
//! helper the reconciler uses to decide whether a client must be recreated.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

// ── Cluster definition ──────────────────────────────────────────────

/// One managed cluster: identity, endpoints, and connection security.
///
/// Immutable once read — edits replace the whole value. The `name` is the
/// unique key everywhere else in the system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterDefinition {
    pub name: String,

    /// Seed broker addresses (`host:port`).
    pub brokers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsSettings>,

    /// Free-form client options, passed through to the client factory.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, String>,
}

/// TLS transport settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,

    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// SASL authentication settings. Credentials may be inline or named
/// environment variables (env takes precedence at connect time).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaslSettings {
    pub mechanism: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

/// AWS IAM authentication settings for managed clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsSettings {
    #[serde(default)]
    pub iam: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token_env: Option<String>,
}

impl ClusterDefinition {
    /// Connection-level equality — decides whether a live client built from
    /// `self` is still valid for `other`.
    ///
    /// Broker lists are compared as multisets (ordering in the file is
    /// cosmetic); the options map requires an exact key/value match; the
    /// security settings compare field-wise including presence.
    pub fn connection_eq(&self, other: &Self) -> bool {
        same_broker_set(&self.brokers, &other.brokers)
            && self.client_id == other.client_id
            && self.tls == other.tls
            && self.sasl == other.sasl
            && self.aws == other.aws
            && self.options == other.options
    }

    /// Human-readable authentication summary for listings.
    pub fn auth_type(&self) -> String {
        if self.aws.as_ref().is_some_and(|a| a.iam) {
            return "AWS IAM".into();
        }
        let tls_on = self.tls.as_ref().is_some_and(|t| t.enabled);
        if let Some(sasl) = &self.sasl {
            if !sasl.mechanism.is_empty() {
                return if tls_on {
                    format!("SASL/{} + TLS", sasl.mechanism)
                } else {
                    format!("SASL/{}", sasl.mechanism)
                };
            }
        }
        if tls_on {
            let mutual = self
                .tls
                .as_ref()
                .is_some_and(|t| t.cert_file.is_some() && t.key_file.is_some());
            return if mutual { "mTLS".into() } else { "TLS".into() };
        }
        "PLAINTEXT".into()
    }
}

/// Multiset comparison: same brokers regardless of listing order.
fn same_broker_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for broker in a {
        *counts.entry(broker.as_str()).or_default() += 1;
    }
    for broker in b {
        match counts.get_mut(broker.as_str()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => return false,
        }
    }
    true
}

// ── File config ─────────────────────────────────────────────────────

/// Root structure of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub clusters: Vec<ClusterDefinition>,
}

/// Load a [`FileConfig`] from `path`.
///
/// Malformed YAML is a hard error — a truncated or garbled file must never
/// be silently interpreted as an empty cluster list.
pub fn read_config(path: impl AsRef<Path>) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let cfg = serde_yaml::from_str(&raw)?;
    Ok(cfg)
}

/// Persist `cfg` to `path`, creating parent directories as needed.
///
/// Writes to a sibling temp file and renames it over the target so a
/// concurrent reader (or the directory watcher) never observes a
/// half-written file.
pub fn write_config(path: impl AsRef<Path>, cfg: &FileConfig) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let raw = serde_yaml::to_string(cfg)?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, raw)?;
    fs::rename(&tmp, path)?;

    tracing::debug!(path = %path.display(), clusters = cfg.clusters.len(), "config persisted");
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
