//! Per-entity generation steps
//!
//! Each handler builds the artifacts of one entity and commits them, together
//! with the disclosure of any generated password, as one
//! [`OutputGroup`]. The run loop in [`crate::tasks`] calls them in order.

pub mod create_ca;
pub mod create_client;
pub mod create_node;

use std::path::{Path, PathBuf};

use crate::certificate_builder::{BuildMode, SubjectSpec};
use crate::errors::{BuildScope, Result};
use crate::extension_policy::CertificateRole;
use crate::output_writer::{disclosure_line, OutputGroup};
use crate::passwords::KeyPassword;

pub const NODE_README: &str = "node-certificates.readme";
pub const CLIENT_README: &str = "client-certificates.readme";
pub use crate::signing_context::CA_README;

/// What one committed entity adds to the run report
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Issuance {
    pub certificates: usize,
    pub requests: usize,
    pub password_generated: bool,
}

impl Issuance {
    fn count(&mut self, mode: BuildMode) {
        match mode {
            BuildMode::SignedCertificate => self.certificates += 1,
            BuildMode::SigningRequest => self.requests += 1,
        }
    }
}

#[derive(Debug)]
pub enum EntityOutcome<T> {
    Written(Issuance, T),
    /// An output file already existed, nothing was written
    Skipped(PathBuf),
}

/// Extension of the issued object's file
pub(crate) fn issued_extension(mode: BuildMode) -> &'static str {
    match mode {
        BuildMode::SignedCertificate => "pem",
        BuildMode::SigningRequest => "csr",
    }
}

pub(crate) fn entity_file(target: &Path, base: &str, extension: &str) -> PathBuf {
    target.join(format!("{base}.{extension}"))
}

/// File name as referenced from config snippets
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn materialize_password(
    subject: &SubjectSpec,
    role: CertificateRole,
    generated_length: usize,
) -> Result<Option<KeyPassword>> {
    let scope = BuildScope::new(subject.entity.as_str(), role);
    subject
        .password
        .materialize(generated_length)
        .map_err(scope.err("Failed to generate private key password"))
}

/// Adds a readme line for each key file a generated password protects, so the
/// disclosure is committed with the keys or not at all
pub(crate) fn disclose_password(
    group: &mut OutputGroup,
    readme: PathBuf,
    key_files: &[&Path],
    password: &KeyPassword,
) {
    if !password.was_generated() {
        return;
    }
    let text: String = key_files
        .iter()
        .map(|key_file| disclosure_line(key_file, password))
        .collect();
    group.add_note(readme, README_HEADER, text);
}

const README_HEADER: &str = "Passwords generated for private key files.\n\
Keep this file safe or delete it once the passwords are stored elsewhere.\n\n";

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use crate::certificate_builder::{issue_root, SubjectSpec};
    use crate::passwords::PasswordSpec;
    use crate::signing_context::{IssuanceDefaults, SigningContext};

    /// Context signed by a fresh root CA whose file would be `dir/root-ca.pem`
    pub fn signed_context(dir: &Path, defaults: IssuanceDefaults) -> SigningContext {
        let mut context = SigningContext::new(None, Some(dir.join("root-ca.pem")), dir, defaults);
        let root = issue_root(
            &mut context,
            &SubjectSpec {
                entity: "root-ca".into(),
                distinguished_name: "CN=root.ca.example.com,O=Example Com".into(),
                addresses: Vec::new(),
                key_size_bits: 2048,
                validity_days: 365,
                password: PasswordSpec::None,
            },
        )
        .unwrap();
        context.replace_signer(root.into_signer().unwrap());
        context
    }

    pub fn node_subject(name: &str, password: PasswordSpec) -> SubjectSpec {
        SubjectSpec {
            entity: name.into(),
            distinguished_name: format!("CN={name}.example.com,OU=Ops,O=Example Com"),
            addresses: vec![format!("{name}.example.com"), "10.0.0.5".into()],
            key_size_bits: 2048,
            validity_days: 30,
            password,
        }
    }
}
