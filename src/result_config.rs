//! Per-node results feeding the config snippets
//!
//! Entries are recorded while nodes are processed. The accumulator has no
//! read access: [`ResultConfigAccumulator::finish`] hands out the snapshot once
//! every entity of the run has been handled.

use std::fmt;

use log::debug;
use secrecy::{ExposeSecret, SecretString};

use crate::passwords::KeyPassword;

/// File references for one TLS layer. `None` marks a value that is only known
/// after an external CA signs the request.
#[derive(Debug)]
pub struct PemConfig {
    pub certificate: Option<String>,
    pub private_key: String,
    pub private_key_password: Option<SecretString>,
    pub trusted_cas: Option<String>,
}

impl PemConfig {
    pub fn new(
        certificate: Option<String>,
        private_key: impl Into<String>,
        password: Option<&KeyPassword>,
        trusted_cas: Option<String>,
    ) -> Self {
        Self {
            certificate,
            private_key: private_key.into(),
            private_key_password: password.map(|password| SecretString::from(password.expose().to_string())),
            trusted_cas,
        }
    }

    pub fn password(&self) -> Option<&str> {
        self.private_key_password
            .as_ref()
            .map(|password| password.expose_secret())
    }

    fn duplicate(&self) -> Self {
        Self {
            certificate: self.certificate.clone(),
            private_key: self.private_key.clone(),
            private_key_password: self
                .private_key_password
                .as_ref()
                .map(|password| SecretString::from(password.expose_secret().to_string())),
            trusted_cas: self.trusted_cas.clone(),
        }
    }
}

#[derive(Debug)]
pub enum HttpConfig {
    /// Separate HTTP key and certificate
    Issued(PemConfig),
    /// Transport material serves HTTP as well
    Reused(PemConfig),
    Disabled,
}

impl HttpConfig {
    /// HTTP entry that points at the transport files
    pub fn reusing(transport: &PemConfig) -> Self {
        HttpConfig::Reused(transport.duplicate())
    }

    pub fn pem(&self) -> Option<&PemConfig> {
        match self {
            HttpConfig::Issued(pem) | HttpConfig::Reused(pem) => Some(pem),
            HttpConfig::Disabled => None,
        }
    }
}

/// Progress of one node through generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    NotStarted,
    TransportIssued,
    HttpIssued,
    HttpReused,
    HttpSkippedDisabled,
    ConfigEmitted,
}

impl NodeState {
    /// State a node ends in after the HTTP step
    pub fn after_http(http: &HttpConfig) -> Self {
        match http {
            HttpConfig::Issued(_) => NodeState::HttpIssued,
            HttpConfig::Reused(_) => NodeState::HttpReused,
            HttpConfig::Disabled => NodeState::HttpSkippedDisabled,
        }
    }

    pub fn allows(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (NotStarted, TransportIssued)
                | (TransportIssued, HttpIssued | HttpReused | HttpSkippedDisabled)
                | (HttpIssued | HttpReused | HttpSkippedDisabled, ConfigEmitted)
        )
    }

    pub fn advance(self, node: &str, next: NodeState) -> NodeState {
        debug_assert!(self.allows(next), "{node}: {self} cannot move to {next}");
        debug!("{node}: {self} -> {next}");
        next
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::NotStarted => "not started",
            NodeState::TransportIssued => "transport issued",
            NodeState::HttpIssued => "HTTP issued",
            NodeState::HttpReused => "HTTP reused",
            NodeState::HttpSkippedDisabled => "HTTP disabled",
            NodeState::ConfigEmitted => "config emitted",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct NodeResultConfig {
    pub node: String,
    pub state: NodeState,
    /// Generated from certificate requests; certificate paths are placeholders
    pub pending_signature: bool,
    /// Request files the operator has to get signed
    pub request_files: Vec<String>,
    pub transport: PemConfig,
    pub http: HttpConfig,
}

impl NodeResultConfig {
    /// Marks the node done once its snippet is on disk
    pub fn config_emitted(&mut self) {
        self.state = self.state.advance(&self.node, NodeState::ConfigEmitted);
    }
}

#[derive(Debug, Default)]
pub struct ResultConfigAccumulator {
    entries: Vec<NodeResultConfig>,
}

impl ResultConfigAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: NodeResultConfig) {
        self.entries.push(entry);
    }

    pub fn finish(self) -> ResultConfigSnapshot {
        ResultConfigSnapshot {
            entries: self.entries,
        }
    }
}

/// Completed results of a run, in processing order
#[derive(Debug)]
pub struct ResultConfigSnapshot {
    entries: Vec<NodeResultConfig>,
}

impl ResultConfigSnapshot {
    pub fn entries(&self) -> &[NodeResultConfig] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [NodeResultConfig] {
        &mut self.entries
    }

    pub fn node(&self, name: &str) -> Option<&NodeResultConfig> {
        self.entries.iter().find(|entry| entry.node == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
