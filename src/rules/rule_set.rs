// 规则集合数据结构 (sing-box headless rule-set)
use crate::rules::item::{EntrySet, RuleItem};
use serde::{Serialize, Serializer};

/// Source format version written to JSON and SRS.
pub const RULE_SET_VERSION: u8 = 1;

/// Default headless rule. Field order follows sing-box.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefaultRule {
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub domain: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub domain_suffix: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub domain_keyword: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub domain_regex: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub source_ip_cidr: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub ip_cidr: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub source_port: Vec<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub port: Vec<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub process_name: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "listable")]
    pub process_path: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub invert: bool,
}

impl DefaultRule {
    /// Split an entry set into the grouped rule fields.
    pub fn from_items<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a RuleItem>,
    {
        let mut rule = DefaultRule::default();
        for item in items {
            match item {
                RuleItem::Domain(v) => rule.domain.push(v.clone()),
                RuleItem::DomainSuffix(v) => rule.domain_suffix.push(v.clone()),
                RuleItem::DomainKeyword(v) => rule.domain_keyword.push(v.clone()),
                RuleItem::DomainRegex(v) => rule.domain_regex.push(v.clone()),
                RuleItem::IpCidr(v) => rule.ip_cidr.push(v.clone()),
                RuleItem::SourceIpCidr(v) => rule.source_ip_cidr.push(v.clone()),
                RuleItem::SourcePort(v) => rule.source_port.push(*v),
                RuleItem::DestPort(v) => rule.port.push(*v),
                RuleItem::ProcessName(v) => rule.process_name.push(v.clone()),
                RuleItem::ProcessPath(v) => rule.process_path.push(v.clone()),
            }
        }
        rule
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of match values.
    pub fn len(&self) -> usize {
        self.domain.len()
            + self.domain_suffix.len()
            + self.domain_keyword.len()
            + self.domain_regex.len()
            + self.source_ip_cidr.len()
            + self.ip_cidr.len()
            + self.source_port.len()
            + self.port.len()
            + self.process_name.len()
            + self.process_path.len()
    }
}

/// One output unit: a single default rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlainRuleSet {
    pub rules: Vec<DefaultRule>,
}

impl PlainRuleSet {
    pub fn from_entries(entries: &EntrySet) -> Self {
        Self {
            rules: vec![DefaultRule::from_items(entries)],
        }
    }

    /// Versioned JSON source form.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Compat<'a> {
            version: u8,
            #[serde(flatten)]
            options: &'a PlainRuleSet,
        }

        serde_json::to_vec_pretty(&Compat {
            version: RULE_SET_VERSION,
            options: self,
        })
    }
}

/// A list with a single element is written as that element.
#[allow(clippy::ptr_arg)]
fn listable<S, T>(values: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match values.as_slice() {
        [single] => single.serialize(serializer),
        _ => values.serialize(serializer),
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_entries_groups_by_kind() {
        let entries: EntrySet = [
            RuleItem::Domain("example.com".to_string()),
            RuleItem::DomainSuffix(".google.com".to_string()),
            RuleItem::DomainSuffix(".youtube.com".to_string()),
            RuleItem::IpCidr("10.0.0.0/8".to_string()),
            RuleItem::SourcePort(7777),
            RuleItem::DestPort(443),
        ]
        .into_iter()
        .collect();

        let rule_set = PlainRuleSet::from_entries(&entries);
        assert_eq!(rule_set.rules.len(), 1);
        let rule = &rule_set.rules[0];
        assert_eq!(rule.domain, vec!["example.com"]);
        assert_eq!(rule.domain_suffix, vec![".google.com", ".youtube.com"]);
        assert_eq!(rule.ip_cidr, vec!["10.0.0.0/8"]);
        assert_eq!(rule.source_port, vec![7777]);
        assert_eq!(rule.port, vec![443]);
        assert_eq!(rule.len(), 6);
        assert!(!rule.is_empty());
    }

    #[test]
    fn test_json_source_format() {
        let entries: EntrySet = [
            RuleItem::Domain("example.com".to_string()),
            RuleItem::DomainSuffix(".google.com".to_string()),
            RuleItem::DomainSuffix(".youtube.com".to_string()),
            RuleItem::DestPort(443),
        ]
        .into_iter()
        .collect();

        let json = PlainRuleSet::from_entries(&entries).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "version": 1,
                "rules": [{
                    "domain": "example.com",
                    "domain_suffix": [".google.com", ".youtube.com"],
                    "port": 443
                }]
            })
        );
        // 两空格缩进
        let text = String::from_utf8(json).unwrap();
        assert!(text.starts_with("{\n  \"version\": 1,"));
    }

    #[test]
    fn test_empty_rule_serializes_to_empty_object() {
        let rule_set = PlainRuleSet::from_entries(&EntrySet::new());
        assert!(rule_set.rules[0].is_empty());
        let json = rule_set.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value, serde_json::json!({"version": 1, "rules": [{}]}));
    }
}
