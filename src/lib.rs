pub mod config;
pub mod downloader;
pub mod emit;
pub mod error;
pub mod generate;
pub mod geosite_db;
pub mod rules;
pub mod srs;

pub use config::Config;
pub use downloader::{download_asset, GithubReleaseSource, Release, ReleaseAsset, ReleaseSource};
pub use error::{Result, RuleError};
pub use rules::{EntrySet, PlainRuleSet, RuleItem, TagMap};
