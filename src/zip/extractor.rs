use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::parser::ArchiveReader;
use super::structures::ArchiveEntry;

/// Copy buffer for entry payloads
const COPY_BUF_SIZE: usize = 64 * 1024;

#[cfg(windows)]
const ENTRY_SEPARATORS: &[char] = &['/', '\\'];
#[cfg(not(windows))]
const ENTRY_SEPARATORS: &[char] = &['/'];

/// Totals for one extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files: usize,
    pub directories: usize,
    pub bytes_written: u64,
}

/// Writes archive entries below a target root, refusing any entry whose
/// path would resolve outside of it.
///
/// Entries are processed in central directory order and the first
/// failure aborts the run. Entries written before the failure stay on
/// disk; use [`crate::install`] with staging for all-or-nothing results.
pub struct ZipExtractor {
    root: PathBuf,
    cancel: CancellationToken,
}

impl ZipExtractor {
    /// `root` is made absolute against the current directory and
    /// lexically normalised.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self {
            root: normalize(&root),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an entry name against the root.
    ///
    /// The candidate path is `root` joined with the entry name and
    /// normalised. It must lie strictly below `root`, compared component
    /// by component, otherwise [`Error::PathTraversal`] is returned with
    /// the offending path.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut candidate = self.root.clone();
        for segment in name.split(ENTRY_SEPARATORS) {
            match segment {
                "" | "." => {}
                ".." => {
                    candidate.pop();
                }
                _ => candidate.push(segment),
            }
        }
        let candidate = normalize(&candidate);

        if candidate == self.root || !candidate.starts_with(&self.root) {
            return Err(Error::PathTraversal(candidate));
        }
        Ok(candidate)
    }

    /// Extract every entry of `archive`, calling `on_entry` before each one.
    pub async fn extract<R, F>(&self, archive: &ArchiveReader<R>, mut on_entry: F) -> Result<ExtractReport>
    where
        R: ReadAt,
        F: FnMut(&ArchiveEntry),
    {
        fs::create_dir_all(&self.root).await?;

        let mut report = ExtractReport::default();
        let mut directories = Vec::new();

        for entry in archive.entries() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            on_entry(entry);
            let path = self.resolve(&entry.name)?;

            if entry.is_directory {
                fs::create_dir_all(&path).await?;
                directories.push((path, entry.mode));
                report.directories += 1;
            } else {
                report.bytes_written += self.write_file(archive, entry, &path).await?;
                report.files += 1;
            }
        }

        // Applied last so a read-only directory does not block its children
        for (path, mode) in directories.iter().rev() {
            set_mode(path, *mode).await?;
        }

        info!(
            files = report.files,
            directories = report.directories,
            bytes = report.bytes_written,
            root = %self.root.display(),
            "extraction finished"
        );
        Ok(report)
    }

    async fn write_file<R: ReadAt>(
        &self,
        archive: &ArchiveReader<R>,
        entry: &ArchiveEntry,
        path: &Path,
    ) -> Result<u64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut stream = archive.open_entry(entry).await?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(entry.mode);
        let mut file = options.open(path).await?;

        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut written = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            written += n as u64;
        }
        file.flush().await?;
        drop(file);

        // `mode` above only applies to newly created files and is masked by umask
        set_mode(path, entry.mode).await?;
        debug!(path = %path.display(), bytes = written, "wrote entry");
        Ok(written)
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path).await?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Lexically normalise a path: drop `.` and fold `..` into its parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn resolve_keeps_names_below_root() {
        let extractor = ZipExtractor::new("/srv/target").unwrap();
        assert_eq!(
            extractor.resolve("dir/b.txt").unwrap(),
            PathBuf::from("/srv/target/dir/b.txt")
        );
        assert_eq!(
            extractor.resolve("dir/").unwrap(),
            PathBuf::from("/srv/target/dir")
        );
        assert_eq!(
            extractor.resolve("a/../b").unwrap(),
            PathBuf::from("/srv/target/b")
        );
        // Leading separators are joined, not treated as absolute
        assert_eq!(
            extractor.resolve("/etc/passwd").unwrap(),
            PathBuf::from("/srv/target/etc/passwd")
        );
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_escapes() {
        let extractor = ZipExtractor::new("/srv/target").unwrap();
        for name in ["../../etc/passwd", "..", "a/../../x", "./", "dir/../"] {
            assert!(
                matches!(extractor.resolve(name), Err(Error::PathTraversal(_))),
                "{name} should be rejected"
            );
        }
        // A sibling sharing the root as a string prefix is still outside
        match extractor.resolve("../target-evil/x") {
            Err(Error::PathTraversal(path)) => {
                assert_eq!(path, PathBuf::from("/srv/target-evil/x"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn root_is_normalised() {
        let extractor = ZipExtractor::new("/srv/./x/../target/").unwrap();
        assert_eq!(extractor.root(), Path::new("/srv/target"));
    }
}
