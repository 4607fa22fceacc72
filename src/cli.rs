use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::tasks::RunOptions;

#[derive(Parser, Debug)]
#[command(version, about = "Generates TLS certificates, keys and config snippets for a cluster")]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["create_ca", "create_cert", "create_csr"])
))]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Directory the generated files are written to
    #[arg(long, short = 't', default_value = "out")]
    pub target: PathBuf,

    /// Create a root CA (and intermediate CA when configured)
    #[arg(long)]
    pub create_ca: bool,

    /// Create node and client certificates signed by the CA
    #[arg(long)]
    pub create_cert: bool,

    /// Create certificate signing requests instead of certificates
    #[arg(long, conflicts_with_all = ["create_ca", "create_cert"])]
    pub create_csr: bool,

    /// Replace existing files instead of skipping them
    #[arg(long, short = 'o')]
    pub overwrite: bool,

    /// Log each step
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Args {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            target_directory: self.target.clone(),
            create_ca: self.create_ca,
            create_cert: self.create_cert,
            create_csr: self.create_csr,
            overwrite: self.overwrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_actions_and_defaults() {
        let args = Args::try_parse_from(["cluster-tlstool", "-c", "tlsconfig.toml", "--create-ca", "--create-cert"])
            .unwrap();
        let options = args.run_options();
        assert_eq!(options.target_directory, PathBuf::from("out"));
        assert!(options.create_ca && options.create_cert);
        assert!(!options.create_csr && !options.overwrite);
    }

    #[test]
    fn an_action_is_required() {
        assert!(Args::try_parse_from(["cluster-tlstool", "-c", "tlsconfig.toml"]).is_err());
    }

    #[test]
    fn csr_excludes_signing_actions() {
        assert!(Args::try_parse_from(["cluster-tlstool", "-c", "x.toml", "--create-csr", "--create-cert"]).is_err());
        assert!(Args::try_parse_from(["cluster-tlstool", "-c", "x.toml", "--create-csr", "-o", "-t", "csr"]).is_ok());
    }
}
