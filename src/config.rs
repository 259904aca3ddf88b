//! Run configuration, resolved once at startup.
//!
//! Everything that depends on the host (default asset name, home
//! directory) is injected here so the rest of the crate never consults
//! environment globals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::install::InstallMode;

/// Host operating systems with a published archive variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Windows,
    MacOs,
    Linux,
    Other,
}

/// Description of the host the archive is installed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value onto a platform.
    pub fn from_os_name(name: &str) -> Self {
        let os = match name {
            "windows" => Os::Windows,
            "macos" => Os::MacOs,
            "linux" => Os::Linux,
            _ => Os::Other,
        };
        Self { os }
    }

    /// Asset picked when `--release` is not given.
    pub fn default_asset_name(&self) -> Option<&'static str> {
        match self.os {
            Os::Windows => Some("nvim-win64.zip"),
            Os::MacOs => Some("nvim-macos.zip"),
            Os::Linux => Some("nvim-linux64.zip"),
            Os::Other => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub asset_name: String,
    pub install_path: PathBuf,
    pub api_url: String,
    pub token: Option<String>,
    pub block_size: usize,
    pub timeout: Duration,
    pub mode: InstallMode,
}

impl Config {
    pub fn from_cli(cli: &Cli, platform: &Platform, home: Option<&Path>) -> Result<Self> {
        let asset_name = match &cli.release {
            Some(name) => name.clone(),
            None => platform
                .default_asset_name()
                .map(str::to_owned)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "no default release asset for {:?}, pass --release",
                        platform.os
                    ))
                })?,
        };

        if cli.block_size == 0 {
            return Err(Error::Config("--block-size must be positive".into()));
        }
        if cli.timeout == 0 {
            return Err(Error::Config("--timeout must be positive".into()));
        }

        Ok(Self {
            owner: cli.owner.clone(),
            repo: cli.repo.clone(),
            tag: cli.tag.clone(),
            asset_name,
            install_path: expand_tilde(&cli.path, home)?,
            api_url: cli.api_url.clone(),
            token: cli.token.clone().filter(|t| !t.is_empty()),
            block_size: cli.block_size,
            timeout: Duration::from_secs(cli.timeout),
            mode: if cli.staged {
                InstallMode::Staged
            } else {
                InstallMode::InPlace
            },
        })
    }
}

/// Expand a leading `~` (alone or followed by a separator) to `home`.
///
/// `~user` forms are left untouched.
pub fn expand_tilde(path: &str, home: Option<&Path>) -> Result<PathBuf> {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(std::path::is_separator) => rest,
        _ => return Ok(PathBuf::from(path)),
    };

    let home = home.ok_or_else(|| Error::Config(format!("cannot expand {path:?}: no home directory")))?;
    Ok(home.join(rest.trim_start_matches(std::path::is_separator)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn expands_leading_tilde_only() {
        let home = Path::new("/home/user");
        assert_eq!(expand_tilde("~", Some(home)).unwrap(), PathBuf::from("/home/user"));
        assert_eq!(
            expand_tilde("~/path", Some(home)).unwrap(),
            PathBuf::from("/home/user/path")
        );
        assert_eq!(expand_tilde("~other/x", Some(home)).unwrap(), PathBuf::from("~other/x"));
        assert_eq!(expand_tilde("/opt/~/x", Some(home)).unwrap(), PathBuf::from("/opt/~/x"));
        assert!(matches!(expand_tilde("~/x", None), Err(Error::Config(_))));
    }

    #[test]
    fn default_asset_follows_platform() {
        assert_eq!(
            Platform::from_os_name("windows").default_asset_name(),
            Some("nvim-win64.zip")
        );
        assert_eq!(
            Platform::from_os_name("linux").default_asset_name(),
            Some("nvim-linux64.zip")
        );
        assert_eq!(Platform::from_os_name("freebsd").default_asset_name(), None);
    }

    #[test]
    fn config_is_built_from_cli_and_injected_platform() {
        let cli = Cli::parse_from(["relunzip", "--staged"]);
        let config = Config::from_cli(
            &cli,
            &Platform::from_os_name("macos"),
            Some(Path::new("/Users/me")),
        )
        .unwrap();
        assert_eq!(config.asset_name, "nvim-macos.zip");
        assert_eq!(config.install_path, PathBuf::from("/Users/me/path"));
        assert_eq!(config.mode, InstallMode::Staged);

        let err = Config::from_cli(&cli, &Platform::from_os_name("plan9"), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
