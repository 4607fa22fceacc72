//! Cluster TLS Tool - certificates for a Search Guard secured cluster
//!
//! Generates the TLS material a cluster needs in one batch run: a CA (or a
//! signer loaded from existing CA files), transport and HTTP certificates for
//! every node, client certificates, password protected private keys and a
//! ready-to-paste configuration snippet per node. Instead of signed
//! certificates it can produce certificate signing requests for an external PKI.
//!
//! # Features
//!
//! - **CA Creation or Loading**: Root CA with optional intermediate; existing CA files are loaded
//! - **Node Certificates**: Transport (serverAuth + clientAuth) and HTTP (serverAuth) per node
//! - **Client Certificates**: clientAuth certificates, optionally marked as admin
//! - **CSR Mode**: The same subjects and extensions as PKCS#10 requests
//! - **Overwrite Protection**: Files of one entity are written all together or not at all
//! - **Key Encryption**: PKCS#8 with AES-256-CBC, explicit or generated passwords
//!
//! # Quick Start
//!
//! ```bash
//! cluster-tlstool -c tlsconfig.toml --create-ca --create-cert
//! cluster-tlstool -c tlsconfig.toml --create-csr -t csr
//! ```
//!
//! # Architecture
//!
//! - [`configs`]: TOML configuration with defaults
//! - [`signing_context`]: Active signer, serial numbers, trust anchor and run-wide settings
//! - [`extension_policy`]: Extension set per certificate role
//! - [`subject_alt_names`]: SAN derivation from node addresses
//! - [`certificate_builder`]: One builder for certificates and requests of every role
//! - [`output_writer`]: Grouped, overwrite-protected file emission
//! - [`result_config`] / [`config_snippet`]: Per-node results and the snippet rendered from them
//! - [`commands`]: CA, node and client handlers
//! - [`tasks`]: The run loop and its report
//!
//! # Example Usage
//!
//! ```no_run
//! use std::path::Path;
//! use cluster_tlstool::configs::ToolConfig;
//! use cluster_tlstool::tasks::{run, RunOptions};
//!
//! let config = ToolConfig::from_file(Path::new("tlsconfig.toml"))?;
//! let report = run(
//!     &config,
//!     &RunOptions {
//!         target_directory: "out".into(),
//!         create_ca: true,
//!         create_cert: true,
//!         ..RunOptions::default()
//!     },
//! )?;
//! report.log_summary(Path::new("out"));
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Certificate Hierarchy
//!
//! 1. **Root CA**: Self-signed, `CA:TRUE` without path length
//! 2. **Intermediate CA**: Signed by the root, `pathlen=0`, signs all leaves when configured
//! 3. **Leaves**: `CA:FALSE`, critical key usage and extended key usage
//!
//! Leaf `.pem` files hold the leaf followed by its signer; the snippet points
//! `pemtrustedcas_filepath` at the root CA certificate.
//!
//! # Error Handling
//!
//! Library functions return [`errors::Result`]. A failing node or client is
//! recorded in the [`tasks::RunReport`] and the run continues with the next one.

pub mod certificate_builder;
pub mod cli;
pub mod commands;
pub mod config_snippet;
pub mod configs;
pub mod distinguished_name;
pub mod dn_patterns;
pub mod errors;
pub mod extension_policy;
pub mod output_writer;
pub mod passwords;
pub mod result_config;
pub mod signing_context;
pub mod subject_alt_names;
pub mod tasks;
