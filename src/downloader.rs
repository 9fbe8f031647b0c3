// 上游 Release 下载与校验
use crate::config::{split_repository, GithubConfig};
use crate::error::{Result, RuleError};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// A published release and its downloadable assets.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// Human readable name, falling back to the tag.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.tag_name)
    }
}

/// Where upstream releases come from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Latest release of `owner/name`.
    async fn latest_release(&self, repository: &str) -> Result<Release>;

    /// Raw body of an asset download URL.
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// GitHub REST API backed source.
pub struct GithubReleaseSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubReleaseSource {
    /// Build the HTTP client. The token, when present, is sent as the
    /// basic-auth user name.
    pub fn new(config: &GithubConfig, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Read the token from the configured environment variable.
    pub fn from_env(config: &GithubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|token| !token.is_empty());
        if token.is_some() {
            debug!("using access token from ${}", config.token_env);
        }
        Self::new(config, token)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.basic_auth(token, None::<&str>),
            None => request,
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn latest_release(&self, repository: &str) -> Result<Release> {
        let (owner, name) = split_repository(repository)?;
        let url = format!("{}/repos/{}/{}/releases/latest", self.api_url, owner, name);
        let response = self
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RuleError::UpstreamUnavailable(format!(
                "latest release of {}: HTTP {}",
                repository,
                response.status()
            )));
        }

        Ok(response.json::<Release>().await?)
    }

    async fn fetch(&self, url: &str) -> Result<Bytes> {
        info!("download {}", url);
        let response = self.get(url).send().await?;

        if !response.status().is_success() {
            return Err(RuleError::UpstreamUnavailable(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        Ok(response.bytes().await?)
    }
}

/// Download a release asset, verifying it against `<name>.sha256sum` when
/// the release publishes one.
pub async fn download_asset(
    source: &dyn ReleaseSource,
    release: &Release,
    name: &str,
) -> Result<Bytes> {
    let asset = release.asset(name).ok_or_else(|| RuleError::AssetNotFound {
        asset: name.to_string(),
        release: release.display_name().to_string(),
    })?;
    let data = source.fetch(&asset.browser_download_url).await?;

    let checksum_name = format!("{}.sha256sum", name);
    if let Some(checksum_asset) = release.asset(&checksum_name) {
        let remote = source.fetch(&checksum_asset.browser_download_url).await?;
        verify_checksum(name, &data, &remote)?;
        debug!("{} checksum ok", name);
    }
    Ok(data)
}

/// The checksum file starts with the 64 hex digit SHA-256 of the asset.
fn verify_checksum(name: &str, data: &[u8], remote: &[u8]) -> Result<()> {
    let local = hex::encode(Sha256::digest(data));
    match remote.get(..64) {
        Some(expected) if expected == local.as_bytes() => Ok(()),
        _ => Err(RuleError::ChecksumMismatch(name.to_string())),
    }
}
