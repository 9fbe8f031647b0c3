// 标签过滤与合并
use crate::error::{Result, RuleError};
use crate::rules::item::{EntrySet, TagMap};
use log::info;

/// Aggregate tag that receives every eligible `category-*@cn` tag.
pub const GEOLOCATION_CN: &str = "geolocation-cn";

/// Split `base@suffix`. Names without exactly one `@` are not attribute tags.
fn split_attribute(tag: &str) -> Option<(&str, &str)> {
    let (base, suffix) = tag.split_once('@')?;
    if suffix.contains('@') {
        return None;
    }
    Some((base, suffix))
}

/// Segment of `base` after its final `-`; the whole base when there is no
/// `-` or the segment is empty.
fn last_segment(base: &str) -> &str {
    match base.rsplit_once('-') {
        Some((_, last)) if !last.is_empty() => last,
        _ => base,
    }
}

/// An exclusion queued by the filter: `base` loses every entry of `exclude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub base: String,
    pub exclude: String,
}

/// Actions decided from a snapshot of the tag names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterPlan {
    /// Attribute tags that only repeat their base name (`foo-cn@cn`).
    pub redundant: Vec<String>,
    /// Region exclusion tags (`foo@!cn`, `foo-!cn@cn`).
    pub exclusions: Vec<Exclusion>,
}

/// What a filter run changed, for logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub filtered: Vec<String>,
    pub merged: Vec<String>,
}

impl FilterPlan {
    /// Decide filter actions without touching the map.
    pub fn from_tags(tags: &TagMap) -> Self {
        let mut plan = FilterPlan::default();
        for tag in tags.keys() {
            let Some((base, suffix)) = split_attribute(tag) else {
                continue;
            };
            let last = last_segment(base);
            if last == suffix {
                plan.redundant.push(tag.clone());
                continue;
            }
            // foo@!cn / foo-!cn@cn
            let negated_suffix = suffix.starts_with('!');
            let negated_base = last.strip_prefix('!') == Some(suffix);
            if negated_suffix || negated_base {
                plan.exclusions.push(Exclusion {
                    base: base.to_string(),
                    exclude: tag.clone(),
                });
            }
        }
        plan
    }

    /// Apply the plan: drop redundant tags, then subtract and drop every
    /// exclusion tag. A queued exclusion tag that is missing from the map
    /// is an invariant violation.
    pub fn apply(self, tags: &mut TagMap) -> Result<FilterReport> {
        let mut report = FilterReport::default();
        for tag in self.redundant {
            tags.remove(&tag);
            report.filtered.push(tag);
        }
        for Exclusion { base, exclude } in self.exclusions {
            let excluded = tags
                .remove(&exclude)
                .ok_or_else(|| RuleError::MissingRequiredTag(exclude.clone()))?;
            let entries = tags.entry(base).or_default();
            let remaining: EntrySet = entries.difference(&excluded).cloned().collect();
            *entries = remaining;
            report.merged.push(exclude);
        }
        report.filtered.sort();
        report.merged.sort();
        Ok(report)
    }
}

/// Collapse redundant attribute tags and resolve region exclusions.
pub fn filter_tags(tags: &mut TagMap) -> Result<FilterReport> {
    let report = FilterPlan::from_tags(tags).apply(tags)?;
    info!("filtered {}", report.filtered.join(","));
    info!("merged {}", report.merged.join(","));
    Ok(report)
}

/// Whether `tag` is a `category-*@cn` tag that feeds `geolocation-cn`.
fn is_cn_category(tag: &str) -> bool {
    match split_attribute(tag) {
        Some((base, "cn")) => {
            base.starts_with("category-") && !base.ends_with("-cn") && !base.ends_with("-!cn")
        }
        _ => false,
    }
}

/// Union every eligible `category-*@cn` tag into `geolocation-cn`. Source
/// tags are kept. Returns the merged tag names.
pub fn merge_category_tags(tags: &mut TagMap) -> Vec<String> {
    let cn_tags: Vec<String> = tags.keys().filter(|tag| is_cn_category(tag)).cloned().collect();

    let mut merged = tags.remove(GEOLOCATION_CN).unwrap_or_default();
    for tag in &cn_tags {
        if let Some(entries) = tags.get(tag) {
            merged.extend(entries.iter().cloned());
        }
    }
    tags.insert(GEOLOCATION_CN.to_string(), merged);

    info!("merged cn categories: {}", cn_tags.join(","));
    cn_tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::item::RuleItem;

    fn domains(values: &[&str]) -> EntrySet {
        values.iter().map(|v| RuleItem::Domain(v.to_string())).collect()
    }

    fn tag_map(tags: &[(&str, &[&str])]) -> TagMap {
        tags.iter()
            .map(|(name, values)| (name.to_string(), domains(values)))
            .collect()
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("category-ads-cn"), "cn");
        assert_eq!(last_segment("geolocation-!cn"), "!cn");
        assert_eq!(last_segment("google"), "google");
        assert_eq!(last_segment("trailing-"), "trailing-");
    }

    #[test]
    fn test_split_attribute() {
        assert_eq!(split_attribute("category-ads@cn"), Some(("category-ads", "cn")));
        assert_eq!(split_attribute("google"), None);
        assert_eq!(split_attribute("a@b@c"), None);
    }

    #[test]
    fn test_exclusion_subtracts_and_deletes() {
        let mut tags = tag_map(&[
            ("category-ads", &["a.com", "b.com", "c.com"]),
            ("category-ads@!cn", &["b.com"]),
        ]);
        let report = filter_tags(&mut tags).unwrap();
        assert_eq!(tags["category-ads"], domains(&["a.com", "c.com"]));
        assert!(!tags.contains_key("category-ads@!cn"));
        assert_eq!(report.merged, vec!["category-ads@!cn".to_string()]);
        assert!(report.filtered.is_empty());
    }

    #[test]
    fn test_negated_region_suffix() {
        let mut tags = tag_map(&[
            ("geolocation-cn", &["baidu.com", "google.cn"]),
            ("geolocation-cn@!cn", &["google.cn"]),
        ]);
        let report = filter_tags(&mut tags).unwrap();
        assert_eq!(tags["geolocation-cn"], domains(&["baidu.com"]));
        assert_eq!(report.merged, vec!["geolocation-cn@!cn".to_string()]);
    }

    #[test]
    fn test_negated_base_exclusion() {
        let mut tags = tag_map(&[
            ("geolocation-!cn", &["google.com", "baidu.com"]),
            ("geolocation-!cn@cn", &["baidu.com"]),
        ]);
        filter_tags(&mut tags).unwrap();
        assert_eq!(tags["geolocation-!cn"], domains(&["google.com"]));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_redundant_tag_dropped() {
        let mut tags = tag_map(&[
            ("category-ads-cn", &["a.cn"]),
            ("category-ads-cn@cn", &["a.cn"]),
            ("cn@cn", &["b.cn"]),
        ]);
        let plan = FilterPlan::from_tags(&tags);
        assert!(plan.exclusions.is_empty());
        let report = plan.apply(&mut tags).unwrap();
        assert_eq!(report.filtered, vec!["category-ads-cn@cn".to_string(), "cn@cn".to_string()]);
        assert_eq!(tags.keys().collect::<Vec<_>>(), vec!["category-ads-cn"]);
        // 已删除, 不参与合并
        assert!(merge_category_tags(&mut tags).is_empty());
    }

    #[test]
    fn test_unrelated_tags_untouched() {
        let mut tags = tag_map(&[
            ("google", &["google.com"]),
            ("google@cn", &["google.cn"]),
            ("apple@ads@cn", &["x.com"]),
            ("category-games@cn", &["game.cn"]),
        ]);
        let before = tags.clone();
        let report = filter_tags(&mut tags).unwrap();
        assert_eq!(tags, before);
        assert_eq!(report, FilterReport::default());
    }

    #[test]
    fn test_missing_exclusion_tag_is_fatal() {
        let mut tags = tag_map(&[("category-ads", &["a.com"])]);
        let plan = FilterPlan {
            redundant: Vec::new(),
            exclusions: vec![Exclusion {
                base: "category-ads".to_string(),
                exclude: "category-ads@!cn".to_string(),
            }],
        };
        let err = plan.apply(&mut tags).unwrap_err();
        assert!(matches!(err, RuleError::MissingRequiredTag(ref tag) if tag == "category-ads@!cn"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_exclusion_creates_missing_base() {
        let mut tags = tag_map(&[("orphan@!orphan", &["a.com"])]);
        filter_tags(&mut tags).unwrap();
        assert_eq!(tags.len(), 1);
        assert!(tags["orphan"].is_empty());
    }

    #[test]
    fn test_merge_category_tags() {
        let mut tags = tag_map(&[
            ("geolocation-cn", &["baidu.com", "qq.com"]),
            ("category-games@cn", &["qq.com", "163.com"]),
            ("category-media@cn", &["bilibili.com"]),
            ("category-ads-cn@cn", &["ads.cn"]),
            ("category-ads-!cn@cn", &["ads.example"]),
            ("category-games@!cn", &["steam.com"]),
            ("google@cn", &["google.cn"]),
        ]);
        let merged = merge_category_tags(&mut tags);
        assert_eq!(
            merged,
            vec!["category-games@cn".to_string(), "category-media@cn".to_string()]
        );
        assert_eq!(
            tags[GEOLOCATION_CN],
            domains(&["baidu.com", "qq.com", "163.com", "bilibili.com"])
        );
        // 源标签保留
        assert_eq!(tags["category-games@cn"], domains(&["qq.com", "163.com"]));
        assert_eq!(tags.len(), 7);
    }

    #[test]
    fn test_merge_creates_geolocation_cn() {
        let mut tags = tag_map(&[("category-media@cn", &["bilibili.com"])]);
        merge_category_tags(&mut tags);
        assert_eq!(tags[GEOLOCATION_CN], domains(&["bilibili.com"]));
    }
}
