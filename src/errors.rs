//! Error taxonomy for certificate generation
//!
//! - [`ToolError::Configuration`]: missing or contradictory CA settings, bad DNs,
//!   invalid address patterns, unreadable key/certificate files
//! - [`ToolError::CertificateBuild`]: OpenSSL failures while generating keys,
//!   assembling extensions, signing or encoding
//! - [`ToolError::Output`]: filesystem failures while committing an artifact group
//!
//! Pre-existing output files are not an error: they surface as a skip decision.

use std::path::PathBuf;

use openssl::error::ErrorStack;
use thiserror::Error;

use crate::extension_policy::CertificateRole;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Configuration rejected before any cryptographic work started
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Key generation, extension assembly, signing or encoding failed
    #[error("failed to build {role} for {entity}: {message}: {source}")]
    CertificateBuild {
        entity: String,
        role: CertificateRole,
        message: String,
        #[source]
        source: ErrorStack,
    },

    /// Writing an output file failed
    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ToolError::Configuration(message.into())
    }

    pub fn output(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ToolError::Output { path, source }
    }
}

/// Names the entity and role an OpenSSL failure belongs to.
///
/// `scope.err("Failed to set version")` yields a closure for `map_err`, so build
/// steps stay one line each.
#[derive(Debug, Clone)]
pub struct BuildScope {
    entity: String,
    role: CertificateRole,
}

impl BuildScope {
    pub fn new(entity: impl Into<String>, role: CertificateRole) -> Self {
        Self {
            entity: entity.into(),
            role,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn role(&self) -> CertificateRole {
        self.role
    }

    pub fn err(&self, message: &str) -> impl FnOnce(ErrorStack) -> ToolError + '_ {
        let message = message.to_string();
        move |source| ToolError::CertificateBuild {
            entity: self.entity.clone(),
            role: self.role,
            message,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
