//! Signing authority for one run
//!
//! A [`SigningContext`] is built once, either by loading an existing CA from the
//! target directory or by [`crate::commands::create_ca`]. It owns the active signer, the
//! shared serial counter, the trusted root CA file recorded for leaves, and the
//! issuance defaults. Nothing else in it changes after construction.
//!
//! When an intermediate CA is configured it signs; the root CA certificate file
//! is only recorded as trust anchor. Without an intermediate the root signs and
//! is its own trust anchor.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::configs::{CaCertificateConfig, CaConfig, Defaults};
use crate::errors::{Result, ToolError};
use crate::output_writer::disclosed_password;
use crate::passwords::PasswordSpec;

pub const ROOT_CA_FILE_BASE: &str = "root-ca";
pub const SIGNING_CA_FILE_BASE: &str = "signing-ca";
/// Readme holding generated CA key passwords
pub const CA_README: &str = "root-ca.readme";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1WithRsa,
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
}

impl SignatureAlgorithm {
    pub fn digest(self) -> MessageDigest {
        match self {
            SignatureAlgorithm::Sha1WithRsa => MessageDigest::sha1(),
            SignatureAlgorithm::Sha256WithRsa => MessageDigest::sha256(),
            SignatureAlgorithm::Sha384WithRsa => MessageDigest::sha384(),
            SignatureAlgorithm::Sha512WithRsa => MessageDigest::sha512(),
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA1WITHRSA" => Ok(SignatureAlgorithm::Sha1WithRsa),
            "SHA256WITHRSA" => Ok(SignatureAlgorithm::Sha256WithRsa),
            "SHA384WITHRSA" => Ok(SignatureAlgorithm::Sha384WithRsa),
            "SHA512WITHRSA" => Ok(SignatureAlgorithm::Sha512WithRsa),
            _ => Err(ToolError::configuration(format!(
                "unsupported signature algorithm {s:?}"
            ))),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureAlgorithm::Sha1WithRsa => "SHA1withRSA",
            SignatureAlgorithm::Sha256WithRsa => "SHA256withRSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384withRSA",
            SignatureAlgorithm::Sha512WithRsa => "SHA512withRSA",
        };
        f.write_str(name)
    }
}

/// Run-wide settings that shape issuance and the config snippet
#[derive(Debug, Clone)]
pub struct IssuanceDefaults {
    pub signature_algorithm: SignatureAlgorithm,
    pub http_enabled: bool,
    pub reuse_transport_for_http: bool,
    pub http_include_internal_names: bool,
    pub node_oid: Option<String>,
    pub generated_password_length: usize,
    pub verify_hostnames: bool,
    pub resolve_hostnames: bool,
}

impl IssuanceDefaults {
    pub fn from_config(defaults: &Defaults) -> Result<Self> {
        Ok(Self {
            signature_algorithm: defaults.signature_algorithm.parse()?,
            http_enabled: defaults.http_enabled,
            reuse_transport_for_http: defaults.reuse_transport_certificates_for_http,
            http_include_internal_names: defaults.http_include_internal_names,
            node_oid: defaults
                .node_oid
                .as_deref()
                .map(str::trim)
                .filter(|oid| !oid.is_empty())
                .map(str::to_string),
            generated_password_length: defaults.generated_password_length,
            verify_hostnames: defaults.verify_hostnames,
            resolve_hostnames: defaults.resolve_hostnames,
        })
    }
}

impl Default for IssuanceDefaults {
    fn default() -> Self {
        Self {
            signature_algorithm: SignatureAlgorithm::Sha256WithRsa,
            http_enabled: true,
            reuse_transport_for_http: false,
            http_include_internal_names: false,
            node_oid: None,
            generated_password_length: crate::passwords::MIN_GENERATED_PASSWORD_LENGTH,
            verify_hostnames: false,
            resolve_hostnames: false,
        }
    }
}

/// Strictly increasing serial numbers, seeded from the clock so separate runs
/// against the same CA do not collide.
#[derive(Debug)]
pub struct SerialSource {
    next: u64,
}

impl SerialSource {
    pub fn from_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(1);
        Self::starting_at(millis.max(1))
    }

    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> u64 {
        let serial = self.next;
        self.next += 1;
        serial
    }
}

/// CA certificate and key used to sign leaves
pub struct Signer {
    certificate: X509,
    private_key: PKey<Private>,
}

impl Signer {
    /// Pairs a certificate with its key, rejecting keys that do not match
    pub fn new(certificate: X509, private_key: PKey<Private>) -> Result<Self> {
        let public_key = certificate.public_key().map_err(|e| {
            ToolError::configuration(format!("Failed to read CA public key: {e}"))
        })?;
        if !public_key.public_eq(&private_key) {
            return Err(ToolError::configuration(
                "CA private key does not match the CA certificate",
            ));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct SigningContext {
    signer: Option<Signer>,
    serials: SerialSource,
    root_ca_file: Option<PathBuf>,
    target_directory: PathBuf,
    defaults: IssuanceDefaults,
}

impl SigningContext {
    pub fn new(
        signer: Option<Signer>,
        root_ca_file: Option<PathBuf>,
        target_directory: impl Into<PathBuf>,
        defaults: IssuanceDefaults,
    ) -> Self {
        Self {
            signer,
            serials: SerialSource::from_clock(),
            root_ca_file,
            target_directory: target_directory.into(),
            defaults,
        }
    }

    /// Context for CSR mode: no signer, no trust anchor
    pub fn for_requests(target_directory: impl Into<PathBuf>, defaults: IssuanceDefaults) -> Self {
        Self::new(None, None, target_directory, defaults)
    }

    /// Loads the active signer from the configured CA files.
    ///
    /// The intermediate signs when configured, otherwise the root does. Either way
    /// the recorded trust anchor is the root CA certificate file. A key created
    /// with an `auto` password is opened with the password disclosed for it in
    /// `root-ca.readme`.
    pub fn load(ca: &CaConfig, defaults: IssuanceDefaults, target_directory: &Path) -> Result<Self> {
        let (signer_config, signer_base) = match (&ca.intermediate, &ca.root) {
            (Some(intermediate), _) => (intermediate, SIGNING_CA_FILE_BASE),
            (None, Some(root)) => (root, ROOT_CA_FILE_BASE),
            (None, None) => {
                return Err(ToolError::configuration(
                    "neither a root nor an intermediate CA is configured",
                ))
            }
        };

        let key_file = signer_config.configured_file(target_directory, signer_base, "key");
        let cert_file = signer_config.configured_file(target_directory, signer_base, "pem");
        let readme = target_directory.join(CA_README);
        let signer = load_signer(signer_config, &key_file, &cert_file, &readme)?;

        let root_ca_file = match &ca.root {
            Some(root) => root.configured_file(target_directory, ROOT_CA_FILE_BASE, "pem"),
            None => target_directory.join(format!("{ROOT_CA_FILE_BASE}.pem")),
        };

        info!(
            "Loaded signing CA from {} (trust anchor {})",
            cert_file.display(),
            root_ca_file.display()
        );

        Ok(Self::new(
            Some(signer),
            Some(root_ca_file),
            target_directory,
            defaults,
        ))
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn replace_signer(&mut self, signer: Signer) {
        self.signer = Some(signer);
    }

    /// Drops the signing key once nothing is left to sign
    pub fn release_signer(&mut self) {
        if self.signer.take().is_some() {
            debug!("Signing key released");
        }
    }

    pub fn next_serial(&mut self) -> u64 {
        self.serials.allocate()
    }

    pub fn root_ca_file(&self) -> Option<&Path> {
        self.root_ca_file.as_deref()
    }

    pub fn target_directory(&self) -> &Path {
        &self.target_directory
    }

    pub fn defaults(&self) -> &IssuanceDefaults {
        &self.defaults
    }
}

fn load_signer(
    config: &CaCertificateConfig,
    key_file: &Path,
    cert_file: &Path,
    readme: &Path,
) -> Result<Signer> {
    let key_pem = fs::read(key_file).map_err(|e| {
        ToolError::configuration(format!(
            "Failed to read CA private key {}: {e}",
            key_file.display()
        ))
    })?;
    let passphrase = match PasswordSpec::resolve(config.pk_password.as_deref(), None) {
        PasswordSpec::Explicit(password) => password,
        PasswordSpec::None => String::new(),
        PasswordSpec::AutoGenerate => {
            let notes = fs::read_to_string(readme).unwrap_or_default();
            match disclosed_password(&notes, key_file) {
                Some(password) => {
                    debug!("Using the password disclosed in {}", readme.display());
                    password.to_string()
                }
                None => {
                    return Err(ToolError::configuration(format!(
                        "no generated password for {} found in {}; configure pk_password instead",
                        key_file.display(),
                        readme.display()
                    )))
                }
            }
        }
    };
    let private_key = PKey::private_key_from_pem_passphrase(&key_pem, passphrase.as_bytes())
        .map_err(|e| {
            ToolError::configuration(format!(
                "Failed to parse CA private key {}: {e}",
                key_file.display()
            ))
        })?;

    let cert_pem = fs::read(cert_file).map_err(|e| {
        ToolError::configuration(format!(
            "Failed to read CA certificate {}: {e}",
            cert_file.display()
        ))
    })?;
    let certificate = X509::stack_from_pem(&cert_pem)
        .map_err(|e| {
            ToolError::configuration(format!(
                "Failed to parse CA certificate {}: {e}",
                cert_file.display()
            ))
        })?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ToolError::configuration(format!(
                "{} contains no certificate",
                cert_file.display()
            ))
        })?;

    Signer::new(certificate, private_key)
}
