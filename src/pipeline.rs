//! One fetch-and-extract run: resolve the asset, open the remote archive
//! through the block cache, and install its entries.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::install::install;
use crate::io::{BlockCache, HttpOptions, HttpRangeReader};
use crate::release::{ReleaseClient, RemoteAsset};
use crate::zip::{ArchiveEntry, ArchiveReader, ExtractReport};

/// Stages of a run. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Fetching,
    Extracting,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Resolving => "resolving",
            Phase::Fetching => "fetching",
            Phase::Extracting => "extracting",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events reported to the caller while a run progresses
#[derive(Debug)]
pub enum Progress<'a> {
    Phase(Phase),
    AssetResolved(&'a RemoteAsset),
    Entry(&'a ArchiveEntry),
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct Summary {
    pub asset: RemoteAsset,
    pub report: ExtractReport,
    /// HTTP requests made against the asset, including the size probe
    pub requests: u64,
    pub transferred_bytes: u64,
    pub blocks_fetched: u64,
}

/// Run the whole pipeline described by `config`.
pub async fn run<F>(config: &Config, cancel: CancellationToken, mut progress: F) -> Result<Summary>
where
    F: FnMut(Progress<'_>),
{
    let mut phase = Phase::Resolving;
    let result = run_phases(config, &cancel, &mut phase, &mut progress).await;

    match &result {
        Ok(_) => enter(&mut phase, Phase::Done, &mut progress),
        Err(e) => {
            error!(phase = %phase, error = %e, "run failed");
            enter(&mut phase, Phase::Failed, &mut progress);
        }
    }
    result
}

async fn run_phases<F>(
    config: &Config,
    cancel: &CancellationToken,
    phase: &mut Phase,
    progress: &mut F,
) -> Result<Summary>
where
    F: FnMut(Progress<'_>),
{
    enter(phase, Phase::Resolving, progress);
    let client = ReleaseClient::new(&config.api_url, config.token.clone(), config.timeout)?;
    let asset = cancellable(
        cancel,
        client.resolve(&config.owner, &config.repo, &config.tag, &config.asset_name),
    )
    .await?;
    progress(Progress::AssetResolved(&asset));

    enter(phase, Phase::Fetching, progress);
    let options = HttpOptions {
        timeout: config.timeout,
        ..HttpOptions::default()
    };
    let source = HttpRangeReader::connect(asset.download_url.clone(), &options, cancel.clone()).await?;
    let reader = Arc::new(BlockCache::with_block_size(source, config.block_size));
    let archive = ArchiveReader::open(reader.clone()).await?;
    info!(entries = archive.entries().len(), "archive index read");

    enter(phase, Phase::Extracting, progress);
    let report = install(
        &archive,
        &config.install_path,
        config.mode,
        cancel.clone(),
        |entry| progress(Progress::Entry(entry)),
    )
    .await?;

    Ok(Summary {
        asset,
        report,
        requests: reader.inner().requests(),
        transferred_bytes: reader.inner().transferred_bytes(),
        blocks_fetched: reader.fetches(),
    })
}

fn enter<F>(phase: &mut Phase, next: Phase, progress: &mut F)
where
    F: FnMut(Progress<'_>),
{
    info!(phase = %next, "entered phase");
    *phase = next;
    progress(Progress::Phase(next));
}

async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = fut => out,
    }
}
