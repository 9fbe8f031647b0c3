use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, RuleError};
use log::info;

/// Configuration for the rule-set generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving the generated rule-sets
    pub output_dir: PathBuf,
    /// Remove the files listed in the previous run's index before a run
    pub clean_output: bool,
    /// Maximum concurrent downloads / emissions
    pub concurrency: usize,
    /// Print the CI release tag line after a run
    pub action_output: bool,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Upstream release API
    pub github: GithubConfig,
    /// Clash rule list source
    pub clash: ClashConfig,
    /// GeoSite source
    pub geosite: GeositeConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

/// GitHub release API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    /// Environment variable holding the access token (optional)
    pub token_env: String,
    pub user_agent: String,
    /// Request timeout
    pub timeout_secs: u64,
}

/// Clash rule-provider lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClashConfig {
    /// `owner/name`
    pub repository: String,
    /// Release assets, each becomes one rule-set named without `.txt`
    pub assets: Vec<String>,
}

/// v2ray geosite.dat conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeositeConfig {
    /// `owner/name`
    pub repository: String,
    pub asset: String,
    /// sing-box geosite database with every tag
    pub output: PathBuf,
    /// sing-box geosite database with `cn_codes` only
    pub cn_output: PathBuf,
    pub cn_codes: Vec<String>,
    /// Prefix of the per-tag rule-set names
    pub tag_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("rule-set"),
            clean_output: true,
            concurrency: 16,
            action_output: true,
            logging: LoggingConfig::default(),
            github: GithubConfig::default(),
            clash: ClashConfig::default(),
            geosite: GeositeConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token_env: "ACCESS_TOKEN".to_string(),
            user_agent: concat!("anyrules/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for ClashConfig {
    fn default() -> Self {
        Self {
            repository: "Loyalsoldier/clash-rules".to_string(),
            assets: [
                "apple.txt",
                "cncidr.txt",
                "gfw.txt",
                "greatfire.txt",
                "lancidr.txt",
                "proxy.txt",
                "telegramcidr.txt",
                "applications.txt",
                "direct.txt",
                "google.txt",
                "icloud.txt",
                "private.txt",
                "reject.txt",
                "tld-not-cn.txt",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for GeositeConfig {
    fn default() -> Self {
        Self {
            repository: "Loyalsoldier/v2ray-rules-dat".to_string(),
            asset: "geosite.dat".to_string(),
            output: PathBuf::from("geosite.db"),
            cn_output: PathBuf::from("geosite-cn.db"),
            cn_codes: vec!["geolocation-cn".to_string()],
            tag_prefix: "geosite-".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;

        info!("Configuration loaded from file");
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RuleError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;

        info!("Configuration saved to file");
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RuleError::Config("concurrency must be > 0".to_string()));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(RuleError::Config("output_dir must not be empty".to_string()));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {},
            _ => return Err(RuleError::Config("Invalid log level".to_string())),
        }

        for repository in [&self.clash.repository, &self.geosite.repository] {
            split_repository(repository)?;
        }

        if let Some(asset) = self.clash.assets.iter().find(|a| a.is_empty()) {
            return Err(RuleError::Config(format!("Invalid clash asset name: {:?}", asset)));
        }

        if self.geosite.asset.is_empty() {
            return Err(RuleError::Config("geosite asset must not be empty".to_string()));
        }

        Ok(())
    }
}

impl GithubConfig {
    /// Get HTTP request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Split `owner/name`.
pub fn split_repository(repository: &str) -> Result<(&str, &str)> {
    match repository.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(RuleError::Config(format!(
            "Invalid repository {:?}, expected owner/name",
            repository
        ))),
    }
}
