use std::path::Path;

use super::{
    disclose_password, entity_file, file_name, issued_extension, materialize_password,
    EntityOutcome, Issuance, NODE_README,
};
use crate::certificate_builder::{issue, BuildMode, SubjectSpec};
use crate::errors::Result;
use crate::extension_policy::{CertificateRole, ExtensionPolicy};
use crate::output_writer::{OutputGroup, OutputWriter};
use crate::result_config::{HttpConfig, NodeResultConfig, NodeState, PemConfig};
use crate::signing_context::SigningContext;
use crate::subject_alt_names::{expand, SanRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpMode {
    Issue,
    Reuse,
    Disabled,
}

/// Handle one `[[nodes]]` entry
///
/// This command:
/// 1. Issues the transport certificate (or CSR) with the node OID and all addresses
/// 2. Issues a separate HTTP certificate, reuses the transport one, or skips HTTP
/// 3. Writes `<node>.key`, `<node>.pem|csr`, the `_http` variants and the
///    disclosure of a generated password in `node-certificates.readme` as one group
///
/// Both keys of a node share its password.
pub fn handle_create_node(
    context: &mut SigningContext,
    writer: &OutputWriter,
    node: &SubjectSpec,
    mode: BuildMode,
) -> Result<EntityOutcome<NodeResultConfig>> {
    let defaults = context.defaults().clone();
    let target = context.target_directory().to_path_buf();
    let name = node.entity.as_str();
    let extension = issued_extension(mode);

    let http_mode = if !defaults.http_enabled {
        HttpMode::Disabled
    } else if defaults.reuse_transport_for_http {
        HttpMode::Reuse
    } else {
        HttpMode::Issue
    };

    let key_file = entity_file(&target, name, "key");
    let issued_file = entity_file(&target, name, extension);
    let http_base = format!("{name}_http");
    let http_key_file = entity_file(&target, &http_base, "key");
    let http_issued_file = entity_file(&target, &http_base, extension);

    let mut paths: Vec<&Path> = vec![key_file.as_path(), issued_file.as_path()];
    if http_mode == HttpMode::Issue {
        paths.extend([http_key_file.as_path(), http_issued_file.as_path()]);
    }
    if let Some(existing) = writer.would_overwrite(paths) {
        return Ok(EntityOutcome::Skipped(existing.to_path_buf()));
    }

    let mut state = NodeState::NotStarted;
    let mut issuance = Issuance::default();
    let mut group = OutputGroup::new(name);
    let password = materialize_password(
        node,
        CertificateRole::NodeTransport,
        defaults.generated_password_length,
    )?;

    // Transport layer
    let transport_sans = expand(SanRequest {
        node: name,
        addresses: &node.addresses,
        node_oid: defaults.node_oid.as_deref(),
        include_internal: true,
    })?;
    let transport = issue(
        context,
        node,
        &ExtensionPolicy::for_role(CertificateRole::NodeTransport),
        &transport_sans,
        mode,
    )?;
    group.add_private_key(&key_file, &transport, password.as_ref())?;
    group.add_issued(&issued_file, &transport)?;
    issuance.count(mode);
    state = state.advance(name, NodeState::TransportIssued);

    // HTTP layer
    if http_mode == HttpMode::Issue {
        let http_sans = expand(SanRequest {
            node: name,
            addresses: &node.addresses,
            node_oid: defaults.node_oid.as_deref(),
            include_internal: defaults.http_include_internal_names,
        })?;
        let http = issue(
            context,
            node,
            &ExtensionPolicy::for_role(CertificateRole::NodeHttp),
            &http_sans,
            mode,
        )?;
        group.add_private_key(&http_key_file, &http, password.as_ref())?;
        group.add_issued(&http_issued_file, &http)?;
        issuance.count(mode);
    }

    if let Some(password) = &password {
        issuance.password_generated = password.was_generated();
        let mut key_files: Vec<&Path> = vec![key_file.as_path()];
        if http_mode == HttpMode::Issue {
            key_files.push(http_key_file.as_path());
        }
        disclose_password(&mut group, target.join(NODE_README), &key_files, password);
    }

    if !writer.try_write_group(group)? {
        return Ok(EntityOutcome::Skipped(key_file));
    }

    let signed = mode == BuildMode::SignedCertificate;
    let trusted_cas = if signed {
        context.root_ca_file().map(file_name)
    } else {
        None
    };
    let certificate_of = |path: &Path| signed.then(|| file_name(path));

    let transport_pem = PemConfig::new(
        certificate_of(issued_file.as_path()),
        file_name(&key_file),
        password.as_ref(),
        trusted_cas.clone(),
    );
    let http = match http_mode {
        HttpMode::Issue => HttpConfig::Issued(PemConfig::new(
            certificate_of(http_issued_file.as_path()),
            file_name(&http_key_file),
            password.as_ref(),
            trusted_cas,
        )),
        HttpMode::Reuse => HttpConfig::reusing(&transport_pem),
        HttpMode::Disabled => HttpConfig::Disabled,
    };
    let state = state.advance(name, NodeState::after_http(&http));

    let request_files = if signed {
        Vec::new()
    } else {
        let mut files = vec![file_name(&issued_file)];
        if http_mode == HttpMode::Issue {
            files.push(file_name(&http_issued_file));
        }
        files
    };

    Ok(EntityOutcome::Written(
        issuance,
        NodeResultConfig {
            node: name.to_string(),
            state,
            pending_signature: !signed,
            request_files,
            transport: transport_pem,
            http,
        },
    ))
}
