// 规则集文件输出 (.json / .srs)
use crate::error::Result;
use crate::rules::rule_set::PlainRuleSet;
use crate::srs;
use log::debug;
use std::path::Path;
use tokio::fs;

/// Write `<dir>/<name>.json`. Returns the file name.
pub async fn write_source(rule_set: &PlainRuleSet, dir: &Path, name: &str) -> Result<String> {
    let file_name = format!("{}.json", name);
    let content = rule_set.to_json()?;
    fs::write(dir.join(&file_name), content).await?;
    debug!("wrote {}", file_name);
    Ok(file_name)
}

/// Write `<dir>/<name>.srs`. Returns the file name.
pub async fn write_binary(rule_set: &PlainRuleSet, dir: &Path, name: &str) -> Result<String> {
    let file_name = format!("{}.srs", name);
    let content = srs::write_rule_set(rule_set)?;
    fs::write(dir.join(&file_name), content).await?;
    debug!("wrote {}", file_name);
    Ok(file_name)
}

/// Both forms of one rule-set, written concurrently.
pub async fn write_rule_set(rule_set: &PlainRuleSet, dir: &Path, name: &str) -> Result<[String; 2]> {
    let (source, binary) = tokio::try_join!(
        write_source(rule_set, dir, name),
        write_binary(rule_set, dir, name)
    )?;
    Ok([source, binary])
}
