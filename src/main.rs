//! Main entry point for the relunzip CLI application.
//!
//! Looks up a release asset, then extracts it to the install path using
//! HTTP Range requests.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use relunzip::pipeline::{self, Progress};
use relunzip::{Cli, Config, Platform};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match run(&cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<relunzip::Error>())
                .map_or(1, |err| err.kind().exit_code());
            ExitCode::from(code as u8)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("relunzip={}", cli.log_level())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve configuration, run the pipeline and print progress.
async fn run(cli: &Cli, cancel: CancellationToken) -> Result<()> {
    let home = dirs::home_dir();
    let config = Config::from_cli(cli, &Platform::current(), home.as_deref())
        .context("Invalid arguments")?;
    let quiet = cli.is_quiet();

    let summary = pipeline::run(&config, cancel, |event| {
        if quiet {
            return;
        }
        match event {
            Progress::AssetResolved(asset) => println!("grabbing: {}", asset.download_url),
            Progress::Entry(entry) => println!("  extracting: {}", entry.name),
            Progress::Phase(_) => {}
        }
    })
    .await
    .with_context(|| {
        format!(
            "Failed to install {} from {}/{}@{} into {}",
            config.asset_name,
            config.owner,
            config.repo,
            config.tag,
            config.install_path.display()
        )
    })?;

    // Display network transfer statistics
    if !quiet {
        println!(
            "\nExtracted {} files, {} directories ({})",
            summary.report.files,
            summary.report.directories,
            format_size(summary.report.bytes_written)
        );
        println!(
            "Total bytes transferred: {} in {} requests",
            format_size(summary.transferred_bytes),
            summary.requests
        );
    }

    Ok(())
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(1048576), "1.00 MB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
