// 规则解析与标签处理
pub mod clash;
pub mod geosite;
pub mod item;
pub mod rule_set;
pub mod tags;

pub use clash::{classify_lines, classify_payload, Classified};
pub use geosite::decode_geosite;
pub use item::{EntrySet, RuleItem, TagMap};
pub use rule_set::{DefaultRule, PlainRuleSet};
pub use tags::{filter_tags, merge_category_tags, FilterReport};
