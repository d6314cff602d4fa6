//! Daemon configuration file
//!
//! Every key is optional; a missing file section falls back to the defaults
//! below. Command line flags override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use quire_core::{Anarchy, Authorizer, BinderConfig, CuratorConfig, PatternAcl};
use quire_transport::TransportConfig;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub store: StoreConfig,
    pub acl: AclConfig,
    pub binder: BinderSection,
    pub curator: CuratorSection,
    pub session: SessionSection,
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 7878,
            store: StoreConfig::default(),
            acl: AclConfig::default(),
            binder: BinderSection::default(),
            curator: CuratorSection::default(),
            session: SessionSection::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Where documents are persisted
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    File {
        path: PathBuf,
    },
    Sqlite {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AclConfig {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub allow_create: bool,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            allow_create: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinderSection {
    pub history_limit: usize,
    pub outbound_capacity: usize,
    pub mailbox_capacity: usize,
    /// Seconds between periodic flushes, 0 disables them
    pub flush_interval_secs: u64,
}

impl Default for BinderSection {
    fn default() -> Self {
        let defaults = BinderConfig::default();
        Self {
            history_limit: defaults.history_limit,
            outbound_capacity: defaults.outbound_capacity,
            mailbox_capacity: defaults.mailbox_capacity,
            flush_interval_secs: defaults.flush_interval.map_or(0, |d| d.as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CuratorSection {
    pub eviction_grace_secs: u64,
    pub flush_retries: u32,
    pub retry_interval_ms: u64,
}

impl Default for CuratorSection {
    fn default() -> Self {
        let defaults = CuratorConfig::default();
        Self {
            eviction_grace_secs: defaults.eviction_grace.as_secs(),
            flush_retries: defaults.flush_retries,
            retry_interval_ms: defaults.retry_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub timeout_secs: u64,
    pub handshake_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = TransportConfig::default();
        Self {
            timeout_secs: defaults.session_timeout.as_secs(),
            handshake_timeout_secs: defaults.handshake_timeout.as_secs(),
        }
    }
}

/// Audit sink for accepted operations
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuditConfig {
    #[default]
    None,
    Tracing,
    Json {
        path: PathBuf,
    },
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn binder_config(&self) -> BinderConfig {
        BinderConfig {
            history_limit: self.binder.history_limit,
            outbound_capacity: self.binder.outbound_capacity,
            mailbox_capacity: self.binder.mailbox_capacity,
            flush_interval: match self.binder.flush_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn curator_config(&self) -> CuratorConfig {
        CuratorConfig {
            eviction_grace: Duration::from_secs(self.curator.eviction_grace_secs),
            flush_retries: self.curator.flush_retries,
            retry_interval: Duration::from_millis(self.curator.retry_interval_ms),
            binder: self.binder_config(),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            session_timeout: Duration::from_secs(self.session.timeout_secs),
            handshake_timeout: Duration::from_secs(self.session.handshake_timeout_secs),
        }
    }

    /// Glob lists select [`PatternAcl`]; without any, everyone may join
    pub fn authorizer(&self) -> Arc<dyn Authorizer> {
        let acl = &self.acl;
        if acl.allow.is_empty() && acl.deny.is_empty() {
            Arc::new(Anarchy {
                allow_create: acl.allow_create,
            })
        } else {
            Arc::new(PatternAcl::new(acl.allow.clone(), acl.deny.clone(), acl.allow_create))
        }
    }
}
