//! Placing an archive's contents at the install path.
//!
//! [`InstallMode::InPlace`] extracts straight into the target and leaves
//! whatever was written before a failure on disk. [`InstallMode::Staged`]
//! extracts into a hidden sibling directory and only swaps it into place
//! once every entry has been written, so the target is either the old
//! tree or the complete new one.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::io::ReadAt;
use crate::zip::{ArchiveEntry, ArchiveReader, ExtractReport, ZipExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    #[default]
    InPlace,
    Staged,
}

/// Extract `archive` to `target` using `mode`.
pub async fn install<R, F>(
    archive: &ArchiveReader<R>,
    target: &Path,
    mode: InstallMode,
    cancel: CancellationToken,
    on_entry: F,
) -> Result<ExtractReport>
where
    R: ReadAt,
    F: FnMut(&ArchiveEntry),
{
    match mode {
        InstallMode::InPlace => {
            ZipExtractor::new(target)?
                .with_cancellation(cancel)
                .extract(archive, on_entry)
                .await
        }
        InstallMode::Staged => install_staged(archive, target, cancel, on_entry).await,
    }
}

async fn install_staged<R, F>(
    archive: &ArchiveReader<R>,
    target: &Path,
    cancel: CancellationToken,
    on_entry: F,
) -> Result<ExtractReport>
where
    R: ReadAt,
    F: FnMut(&ArchiveEntry),
{
    let target = std::path::absolute(target)?;
    let (parent, name) = match (target.parent(), target.file_name()) {
        (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_string_lossy().into_owned()),
        _ => {
            return Err(Error::Config(format!(
                "cannot stage next to {}",
                target.display()
            )));
        }
    };
    if fs::try_exists(&target).await? && !fs::metadata(&target).await?.is_dir() {
        return Err(Error::Config(format!(
            "{} exists and is not a directory",
            target.display()
        )));
    }

    fs::create_dir_all(&parent).await?;
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}.staging-"))
        .tempdir_in(&parent)?;
    info!(staging = %staging.path().display(), "extracting into staging directory");

    let extracted = match ZipExtractor::new(staging.path()) {
        Ok(extractor) => {
            extractor
                .with_cancellation(cancel)
                .extract(archive, on_entry)
                .await
        }
        Err(e) => Err(e),
    };
    let report = match extracted {
        Ok(report) => report,
        Err(e) => {
            if let Err(cleanup) = staging.close() {
                warn!(error = %cleanup, "failed to remove staging directory");
            }
            return Err(e);
        }
    };

    promote(staging.keep(), &target, &parent.join(format!(".{name}.old-{}", std::process::id())))
        .await?;
    info!(target = %target.display(), "staged tree promoted");
    Ok(report)
}

/// Swap `staged` into `target`, moving an existing target to `backup`
/// first and deleting it afterwards.
async fn promote(staged: PathBuf, target: &Path, backup: &Path) -> Result<()> {
    let had_target = fs::try_exists(target).await?;
    // Temporary directories are created owner-only
    let permissions = if had_target {
        fs::metadata(target).await.map(|m| m.permissions())
    } else {
        default_dir_permissions(&staged).await
    };
    let applied = match permissions {
        Ok(permissions) => fs::set_permissions(&staged, permissions).await,
        Err(e) => Err(e),
    };
    if let Err(e) = applied {
        discard(&staged).await;
        return Err(e.into());
    }

    if had_target {
        if fs::try_exists(backup).await? {
            fs::remove_dir_all(backup).await?;
        }
        if let Err(e) = fs::rename(target, backup).await {
            discard(&staged).await;
            return Err(e.into());
        }
    }

    if let Err(e) = fs::rename(&staged, target).await {
        if had_target {
            if let Err(restore) = fs::rename(backup, target).await {
                warn!(error = %restore, backup = %backup.display(), "failed to restore previous install");
            }
        }
        discard(&staged).await;
        return Err(e.into());
    }

    if had_target {
        if let Err(e) = fs::remove_dir_all(backup).await {
            warn!(error = %e, backup = %backup.display(), "failed to remove previous install");
        }
    }
    Ok(())
}

async fn discard(staged: &Path) {
    if let Err(e) = fs::remove_dir_all(staged).await {
        warn!(error = %e, staging = %staged.display(), "failed to remove staging directory");
    }
}

#[cfg(unix)]
async fn default_dir_permissions(_: &Path) -> std::io::Result<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
async fn default_dir_permissions(path: &Path) -> std::io::Result<std::fs::Permissions> {
    Ok(fs::metadata(path).await?.permissions())
}
