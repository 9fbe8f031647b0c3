// 规则集生成流程: 下载 -> 解析 -> 过滤合并 -> 输出
use crate::config::Config;
use crate::downloader::{download_asset, Release, ReleaseSource};
use crate::emit;
use crate::error::{Result, RuleError};
use crate::geosite_db::{write_geosite_db, write_geosite_subset};
use crate::rules::clash::classify_payload;
use crate::rules::geosite::decode_geosite;
use crate::rules::rule_set::{DefaultRule, PlainRuleSet};
use crate::rules::tags::{filter_tags, merge_category_tags};
use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Index of generated files inside the output directory.
pub const INDEX_FILE: &str = ".rule_set.txt";

/// Run both pipelines and write the index. Returns the sorted file names.
pub async fn run(config: &Config, source: &dyn ReleaseSource) -> Result<Vec<String>> {
    prepare_output_dir(&config.output_dir, config.clean_output).await?;

    let (clash, geosite) = tokio::try_join!(
        generate_clash_rules(config, source),
        generate_geosite(config, source)
    )?;

    let mut generated = clash;
    generated.extend(geosite);
    generated.sort();
    write_index(&config.output_dir, &generated).await?;
    info!("generated {} rule-set files", generated.len());
    Ok(generated)
}

/// CI step output carrying a timestamp release tag.
pub fn action_output(now: DateTime<Local>) -> String {
    format!("::set-output name=tag::{}", now.format("%Y%m%d%H%M%S"))
}

async fn prepare_output_dir(dir: &Path, clean: bool) -> Result<()> {
    fs::create_dir_all(dir).await?;
    if clean {
        remove_previous_outputs(dir).await?;
    }
    Ok(())
}

/// Delete the files listed in the index of the previous run, then the index.
/// Anything else in the directory is left alone.
async fn remove_previous_outputs(dir: &Path) -> Result<()> {
    let index = match fs::read_to_string(dir.join(INDEX_FILE)).await {
        Ok(index) => index,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for name in index.lines().map(str::trim).filter(|name| is_generated_name(name)) {
        match fs::remove_file(dir.join(name)).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    fs::remove_file(dir.join(INDEX_FILE)).await?;
    debug!("removed {} files of the previous run", removed);
    Ok(())
}

// 只接受本目录下的 .json / .srs 文件名
fn is_generated_name(name: &str) -> bool {
    !name.contains('/')
        && !name.contains('\\')
        && (name.ends_with(".json") || name.ends_with(".srs"))
}

async fn write_index(dir: &Path, generated: &[String]) -> Result<()> {
    fs::write(dir.join(INDEX_FILE), generated.join("\n")).await?;
    Ok(())
}

/// One rule-set per configured Clash list, named after the asset.
pub async fn generate_clash_rules(config: &Config, source: &dyn ReleaseSource) -> Result<Vec<String>> {
    let release = source.latest_release(&config.clash.repository).await?;
    info!("clash-rules from {}", release.tag_name);

    let generated: Vec<[String; 2]> = stream::iter(&config.clash.assets)
        .map(|asset| generate_clash_asset(config, source, &release, asset))
        .buffer_unordered(config.concurrency)
        .try_collect()
        .await?;
    Ok(generated.into_iter().flatten().collect())
}

async fn generate_clash_asset(
    config: &Config,
    source: &dyn ReleaseSource,
    release: &Release,
    asset: &str,
) -> Result<[String; 2]> {
    let data = download_asset(source, release, asset).await?;
    let classified = classify_payload(&data);
    if !classified.diagnostics.is_empty() {
        warn!("{}: dropped {} lines", asset, classified.diagnostics.len());
    }

    let name = asset.strip_suffix(".txt").unwrap_or(asset);
    let rule_set = PlainRuleSet::from_entries(&classified.items);
    if rule_set.rules.iter().all(DefaultRule::is_empty) {
        warn!("{}: no usable rules", asset);
    }
    emit::write_rule_set(&rule_set, &config.output_dir, name).await
}

/// Convert geosite.dat: sing-box databases plus one rule-set per tag.
pub async fn generate_geosite(config: &Config, source: &dyn ReleaseSource) -> Result<Vec<String>> {
    let geosite = &config.geosite;
    let release = source.latest_release(&geosite.repository).await?;
    info!("v2ray-rules-dat from {}", release.tag_name);

    let data = download_asset(source, &release, &geosite.asset).await?;
    let mut tags = decode_geosite(&data)?;
    filter_tags(&mut tags)?;
    merge_category_tags(&mut tags);

    info!("write {}", geosite.output.display());
    fs::write(&geosite.output, write_geosite_db(&tags)).await?;
    info!("write {}", geosite.cn_output.display());
    fs::write(&geosite.cn_output, write_geosite_subset(&tags, &geosite.cn_codes)).await?;

    let generated: Vec<[String; 2]> = stream::iter(&tags)
        .map(|(tag, entries)| {
            let rule_set = PlainRuleSet::from_entries(entries);
            let dir = config.output_dir.clone();
            let name = format!("{}{}", geosite.tag_prefix, tag);
            tokio::spawn(async move { emit::write_rule_set(&rule_set, &dir, &name).await })
        })
        .buffer_unordered(config.concurrency)
        .map(|joined| joined.map_err(RuleError::from).and_then(|written| written))
        .try_collect()
        .await?;
    Ok(generated.into_iter().flatten().collect())
}
