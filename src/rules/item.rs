// 规则条目: 统一的分类结果 (kind + value)
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single normalized rule unit.
///
/// Two items are equal iff kind and value are equal, so an [`EntrySet`]
/// deduplicates by kind+value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleItem {
    /// 完整域名匹配
    Domain(String),
    /// 域名后缀匹配, `.example.com` 只匹配子域名
    DomainSuffix(String),
    /// 域名关键字匹配
    DomainKeyword(String),
    /// 正则表达式匹配
    DomainRegex(String),
    /// 目标IP段, canonical text form
    IpCidr(String),
    /// 源IP段
    SourceIpCidr(String),
    SourcePort(u16),
    DestPort(u16),
    ProcessName(String),
    ProcessPath(String),
}

impl fmt::Display for RuleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleItem::Domain(v) => write!(f, "domain={}", v),
            RuleItem::DomainSuffix(v) => write!(f, "domain_suffix={}", v),
            RuleItem::DomainKeyword(v) => write!(f, "domain_keyword={}", v),
            RuleItem::DomainRegex(v) => write!(f, "domain_regex={}", v),
            RuleItem::IpCidr(v) => write!(f, "ip_cidr={}", v),
            RuleItem::SourceIpCidr(v) => write!(f, "source_ip_cidr={}", v),
            RuleItem::SourcePort(v) => write!(f, "source_port={}", v),
            RuleItem::DestPort(v) => write!(f, "port={}", v),
            RuleItem::ProcessName(v) => write!(f, "process_name={}", v),
            RuleItem::ProcessPath(v) => write!(f, "process_path={}", v),
        }
    }
}

/// Set of classified entries, iterated in (kind, value) order.
pub type EntrySet = BTreeSet<RuleItem>;

/// Tag name -> entries. Tag names are unique by construction.
pub type TagMap = BTreeMap<String, EntrySet>;
