use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use cluster_tlstool::cli::Args;
use cluster_tlstool::configs::ToolConfig;
use cluster_tlstool::tasks;

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    match real_main(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every entity succeeded or was skipped
fn real_main(args: &Args) -> Result<bool> {
    let config = ToolConfig::from_file(&args.config)?;
    info!("Loaded configuration from {}", args.config.display());

    let options = args.run_options();
    let report = tasks::run(&config, &options).context("TLS generation aborted")?;
    report.log_summary(&options.target_directory);
    Ok(report.succeeded())
}
