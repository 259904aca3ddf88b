//! Release lookup against the GitHub REST API.

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Release metadata from the API
#[derive(Deserialize, Debug)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Release asset metadata from the API
#[derive(Deserialize, Debug)]
pub struct ReleaseAsset {
    pub name: Option<String>,
    pub browser_download_url: Option<String>,
}

/// The asset picked for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAsset {
    pub name: String,
    pub download_url: String,
}

impl Release {
    /// Select the asset whose name is exactly `name`.
    pub fn find_asset(&self, name: &str) -> Result<RemoteAsset> {
        let asset = self
            .assets
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .ok_or_else(|| Error::AssetNotFound {
                name: name.to_string(),
                available: self.assets.iter().filter_map(|a| a.name.clone()).collect(),
            })?;

        let download_url = asset
            .browser_download_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::AssetUrlMissing(name.to_string()))?;

        Ok(RemoteAsset {
            name: name.to_string(),
            download_url,
        })
    }
}

/// Minimal client for `GET /repos/{owner}/{repo}/releases/tags/{tag}`
pub struct ReleaseClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl ReleaseClient {
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Fetch the release published under `tag`.
    pub async fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_url, owner, repo, tag
        );
        debug!(%url, "looking up release");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Api(format!("{owner}/{repo}@{tag}: {e}")))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::ReleaseNotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
                tag: tag.to_string(),
            }),
            status if !status.is_success() => Err(Error::Api(format!(
                "{owner}/{repo}@{tag}: HTTP {status}"
            ))),
            _ => response
                .json::<Release>()
                .await
                .map_err(|e| Error::Api(format!("malformed release response: {e}"))),
        }
    }

    /// Look up `tag` and select the asset named `asset_name`.
    pub async fn resolve(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        asset_name: &str,
    ) -> Result<RemoteAsset> {
        let release = self.release_by_tag(owner, repo, tag).await?;
        debug!(tag = %release.tag_name, assets = release.assets.len(), "release found");
        release.find_asset(asset_name)
    }
}
