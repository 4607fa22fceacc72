use std::path::Path;

use log::info;

use super::{disclose_password, materialize_password, EntityOutcome, Issuance, CA_README};
use crate::certificate_builder::{issue, issue_root, BuildMode};
use crate::configs::{CaConfig, Defaults};
use crate::errors::{Result, ToolError};
use crate::extension_policy::{CertificateRole, ExtensionPolicy};
use crate::output_writer::{OutputGroup, OutputWriter};
use crate::signing_context::{IssuanceDefaults, SigningContext, ROOT_CA_FILE_BASE, SIGNING_CA_FILE_BASE};
use crate::subject_alt_names::SubjectAltNames;

/// Handle the --create-ca action
///
/// This command:
/// 1. Creates a self-signed root CA from `[ca.root]`
/// 2. Creates an intermediate CA signed by the root when `[ca.intermediate]` is set
/// 3. Writes all CA files and the disclosure of generated passwords in
///    `root-ca.readme` as one group
///
/// When any CA file already exists and overwriting is off, nothing is created and
/// the existing CA is loaded instead.
///
/// # Returns
///
/// The signing context for the leaves (intermediate signs when present, the root
/// otherwise) and whether CA files were written.
pub fn handle_create_ca(
    ca: &CaConfig,
    defaults: &Defaults,
    issuance: IssuanceDefaults,
    target: &Path,
    writer: &OutputWriter,
) -> Result<(SigningContext, EntityOutcome<()>)> {
    let root = ca.root.as_ref().ok_or_else(|| {
        ToolError::configuration("creating a CA requires a [ca.root] section")
    })?;

    let root_key_file = root.configured_file(target, ROOT_CA_FILE_BASE, "key");
    let root_cert_file = root.configured_file(target, ROOT_CA_FILE_BASE, "pem");
    let intermediate_files = ca.intermediate.as_ref().map(|intermediate| {
        (
            intermediate.configured_file(target, SIGNING_CA_FILE_BASE, "key"),
            intermediate.configured_file(target, SIGNING_CA_FILE_BASE, "pem"),
        )
    });

    let mut paths: Vec<&Path> = vec![root_key_file.as_path(), root_cert_file.as_path()];
    if let Some((key_file, cert_file)) = &intermediate_files {
        paths.extend([key_file.as_path(), cert_file.as_path()]);
    }
    if let Some(existing) = writer.would_overwrite(paths) {
        info!(
            "CA file {} already exists, loading the existing CA",
            existing.display()
        );
        let existing = existing.to_path_buf();
        let context = SigningContext::load(ca, issuance, target)?;
        return Ok((context, EntityOutcome::Skipped(existing)));
    }

    let mut context = SigningContext::new(None, Some(root_cert_file.clone()), target, issuance);
    let password_length = context.defaults().generated_password_length;
    let mut outcome = Issuance::default();
    let mut group = OutputGroup::new("CA");
    let readme = target.join(CA_README);

    // Step 1: Root CA
    let root_subject = root.subject(defaults, ROOT_CA_FILE_BASE);
    let root_password = materialize_password(&root_subject, CertificateRole::RootCa, password_length)?;
    let root_artifact = issue_root(&mut context, &root_subject)?;
    group.add_private_key(&root_key_file, &root_artifact, root_password.as_ref())?;
    group.add_issued(&root_cert_file, &root_artifact)?;
    outcome.count(BuildMode::SignedCertificate);
    if let Some(password) = &root_password {
        outcome.password_generated |= password.was_generated();
        disclose_password(&mut group, readme.clone(), &[root_key_file.as_path()], password);
    }
    context.replace_signer(root_artifact.into_signer()?);

    // Step 2: Intermediate CA signed by the root
    if let (Some(intermediate), Some((key_file, cert_file))) = (&ca.intermediate, &intermediate_files) {
        let subject = intermediate.subject(defaults, SIGNING_CA_FILE_BASE);
        let password =
            materialize_password(&subject, CertificateRole::IntermediateCa, password_length)?;
        let artifact = issue(
            &mut context,
            &subject,
            &ExtensionPolicy::for_role(CertificateRole::IntermediateCa),
            &SubjectAltNames::empty(),
            BuildMode::SignedCertificate,
        )?;
        group.add_private_key(key_file, &artifact, password.as_ref())?;
        group.add_issued(cert_file, &artifact)?;
        outcome.count(BuildMode::SignedCertificate);
        if let Some(password) = &password {
            outcome.password_generated |= password.was_generated();
            disclose_password(&mut group, readme.clone(), &[key_file.as_path()], password);
        }
        context.replace_signer(artifact.into_signer()?);
    }

    if !writer.try_write_group(group)? {
        let context = SigningContext::load(ca, context.defaults().clone(), target)?;
        return Ok((context, EntityOutcome::Skipped(root_cert_file)));
    }

    info!(
        "Created CA, certificates are signed by {}",
        if ca.intermediate.is_some() { "the intermediate CA" } else { "the root CA" }
    );
    Ok((context, EntityOutcome::Written(outcome, ())))
}
