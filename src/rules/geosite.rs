// v2ray geosite.dat 解析
//
// Protobuf 定义见 v2ray-core app/router/routercommon/common.proto
use crate::error::Result;
use crate::rules::item::{EntrySet, RuleItem, TagMap};
use log::{info, warn};
use prost::Message;
use std::collections::BTreeMap;

/// Domain record type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DomainType {
    /// 关键字匹配
    Plain = 0,
    /// 正则匹配
    Regex = 1,
    /// 域名及其子域名
    RootDomain = 2,
    /// 完整匹配
    Full = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Domain {
    #[prost(enumeration = "DomainType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub value: String,
    #[prost(message, repeated, tag = "3")]
    pub attribute: Vec<Attribute>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Attribute {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(oneof = "AttributeValue", tags = "2, 3")]
    pub typed_value: Option<AttributeValue>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum AttributeValue {
    #[prost(bool, tag = "2")]
    BoolValue(bool),
    #[prost(int64, tag = "3")]
    IntValue(i64),
}

/// One country / category code.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GeoSite {
    #[prost(string, tag = "1")]
    pub country_code: String,
    #[prost(message, repeated, tag = "2")]
    pub domain: Vec<Domain>,
}

/// The whole geosite.dat file.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GeoSiteList {
    #[prost(message, repeated, tag = "1")]
    pub entry: Vec<GeoSite>,
}

impl Domain {
    /// Classified entries for this record. `RootDomain` yields the bare
    /// domain (only when it has a dot) plus the `.`-prefixed suffix.
    pub fn items(&self) -> Vec<RuleItem> {
        match DomainType::try_from(self.r#type) {
            Ok(DomainType::Plain) => vec![RuleItem::DomainKeyword(self.value.clone())],
            Ok(DomainType::Regex) => vec![RuleItem::DomainRegex(self.value.clone())],
            Ok(DomainType::RootDomain) => {
                let mut items = Vec::with_capacity(2);
                if self.value.contains('.') {
                    items.push(RuleItem::Domain(self.value.clone()));
                }
                items.push(RuleItem::DomainSuffix(format!(".{}", self.value)));
                items
            }
            Ok(DomainType::Full) => vec![RuleItem::Domain(self.value.clone())],
            Err(_) => {
                warn!("unknown domain type {} for {}, skipping", self.r#type, self.value);
                Vec::new()
            }
        }
    }
}

/// Decode geosite.dat into tag -> entries.
///
/// Every code becomes a lowercased tag; every attribute key seen under a
/// code adds a `code@key` tag holding only the records carrying it.
pub fn decode_geosite(data: &[u8]) -> Result<TagMap> {
    let list = GeoSiteList::decode(data)?;
    Ok(tags_from_list(&list))
}

/// Build the tag map from an already decoded list.
pub fn tags_from_list(list: &GeoSiteList) -> TagMap {
    let mut tags = TagMap::new();
    for site in &list.entry {
        let code = site.country_code.to_lowercase();
        let mut attributes: BTreeMap<&str, EntrySet> = BTreeMap::new();
        let mut items = EntrySet::new();
        for domain in &site.domain {
            let mapped = domain.items();
            for attribute in &domain.attribute {
                attributes
                    .entry(attribute.key.as_str())
                    .or_default()
                    .extend(mapped.iter().cloned());
            }
            items.extend(mapped);
        }
        tags.entry(code.clone()).or_default().extend(items);
        for (key, attribute_items) in attributes {
            tags.entry(format!("{}@{}", code, key))
                .or_default()
                .extend(attribute_items);
        }
    }
    info!("decoded {} geosite codes into {} tags", list.entry.len(), tags.len());
    tags
}
