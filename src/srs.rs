// sing-box 二进制规则集 (.srs) 编码
//
// 格式: "SRS" | version(1) | zlib(rules)
use crate::error::{Result, RuleError};
use crate::rules::rule_set::{DefaultRule, PlainRuleSet, RULE_SET_VERSION};
use bytes::{BufMut, BytesMut};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ipnet::IpNet;
use std::collections::HashSet;
use std::io::Write;
use std::net::IpAddr;

pub const SRS_MAGIC: [u8; 3] = *b"SRS";

const RULE_TYPE_DEFAULT: u8 = 0;
const RULE_ITEM_FINAL: u8 = 0xFF;

// 规则项类型码
const ITEM_DOMAIN: u8 = 2;
const ITEM_DOMAIN_KEYWORD: u8 = 3;
const ITEM_DOMAIN_REGEX: u8 = 4;
const ITEM_SOURCE_IP_CIDR: u8 = 5;
const ITEM_IP_CIDR: u8 = 6;
const ITEM_SOURCE_PORT: u8 = 7;
const ITEM_PORT: u8 = 9;
const ITEM_PROCESS_NAME: u8 = 11;
const ITEM_PROCESS_PATH: u8 = 12;

/// Domain matcher keys: exact suffix anchor and root-label anchor.
const PREFIX_LABEL: char = '\r';
const ROOT_LABEL: char = '\n';

/// Encode a rule-set into the compressed binary form.
pub fn write_rule_set(rule_set: &PlainRuleSet) -> Result<Vec<u8>> {
    let mut body = BytesMut::new();
    put_uvarint(&mut body, rule_set.rules.len() as u64);
    for rule in &rule_set.rules {
        write_default_rule(&mut body, rule)?;
    }

    let mut out = Vec::with_capacity(body.len() / 2 + 4);
    out.extend_from_slice(&SRS_MAGIC);
    out.push(RULE_SET_VERSION);
    let mut encoder = ZlibEncoder::new(out, Compression::best());
    encoder.write_all(&body)?;
    Ok(encoder.finish()?)
}

fn write_default_rule(buf: &mut BytesMut, rule: &DefaultRule) -> Result<()> {
    buf.put_u8(RULE_TYPE_DEFAULT);
    if !rule.domain.is_empty() || !rule.domain_suffix.is_empty() {
        buf.put_u8(ITEM_DOMAIN);
        DomainMatcher::new(&rule.domain, &rule.domain_suffix).write(buf);
    }
    put_string_item(buf, ITEM_DOMAIN_KEYWORD, &rule.domain_keyword);
    put_string_item(buf, ITEM_DOMAIN_REGEX, &rule.domain_regex);
    if !rule.source_ip_cidr.is_empty() {
        buf.put_u8(ITEM_SOURCE_IP_CIDR);
        IpSet::from_cidrs(&rule.source_ip_cidr)?.write(buf);
    }
    if !rule.ip_cidr.is_empty() {
        buf.put_u8(ITEM_IP_CIDR);
        IpSet::from_cidrs(&rule.ip_cidr)?.write(buf);
    }
    put_u16_item(buf, ITEM_SOURCE_PORT, &rule.source_port);
    put_u16_item(buf, ITEM_PORT, &rule.port);
    put_string_item(buf, ITEM_PROCESS_NAME, &rule.process_name);
    put_string_item(buf, ITEM_PROCESS_PATH, &rule.process_path);
    buf.put_u8(RULE_ITEM_FINAL);
    buf.put_u8(rule.invert as u8);
    Ok(())
}

pub(crate) fn put_uvarint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub(crate) fn put_bytes(buf: &mut BytesMut, value: &[u8]) {
    put_uvarint(buf, value.len() as u64);
    buf.put_slice(value);
}

fn put_string_item(buf: &mut BytesMut, code: u8, values: &[String]) {
    if values.is_empty() {
        return;
    }
    buf.put_u8(code);
    put_uvarint(buf, values.len() as u64);
    for value in values {
        put_bytes(buf, value.as_bytes());
    }
}

fn put_u16_item(buf: &mut BytesMut, code: u8, values: &[u16]) {
    if values.is_empty() {
        return;
    }
    buf.put_u8(code);
    put_uvarint(buf, values.len() as u64);
    for value in values {
        buf.put_u16(*value);
    }
}

fn put_u64s(buf: &mut BytesMut, values: &[u64]) {
    put_uvarint(buf, values.len() as u64);
    for value in values {
        buf.put_u64(*value);
    }
}

/// Reversed-label succinct trie over exact domains and suffixes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DomainMatcher {
    leaves: Vec<u64>,
    label_bitmap: Vec<u64>,
    labels: Vec<u8>,
}

impl DomainMatcher {
    pub fn new(domains: &[String], suffixes: &[String]) -> Self {
        Self::from_keys(&matcher_keys(domains, suffixes))
    }

    /// Build from sorted, unique keys. Level order: each node emits one
    /// 0-bit per child label followed by a closing 1-bit.
    fn from_keys(keys: &[Vec<u8>]) -> Self {
        let mut matcher = DomainMatcher::default();
        let mut label_index = 0;
        let mut queue = vec![(0usize, keys.len(), 0usize)];
        let mut i = 0;
        while i < queue.len() {
            let (mut start, end, col) = queue[i];
            if keys.get(start).map_or(false, |key| key.len() == col) {
                start += 1;
                set_bit(&mut matcher.leaves, i, true);
            }
            let mut j = start;
            while j < end {
                let from = j;
                let label = keys[from][col];
                while j < end && keys[j][col] == label {
                    j += 1;
                }
                queue.push((from, j, col + 1));
                matcher.labels.push(label);
                set_bit(&mut matcher.label_bitmap, label_index, false);
                label_index += 1;
            }
            set_bit(&mut matcher.label_bitmap, label_index, true);
            label_index += 1;
            i += 1;
        }
        matcher
    }

    fn write(&self, buf: &mut BytesMut) {
        // matcher version
        buf.put_u8(0);
        put_u64s(buf, &self.leaves);
        put_u64s(buf, &self.label_bitmap);
        put_bytes(buf, &self.labels);
    }
}

/// Sorted reversed keys. A value already seen (as suffix or domain) is
/// skipped.
fn matcher_keys(domains: &[String], suffixes: &[String]) -> Vec<Vec<u8>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keys = Vec::with_capacity(domains.len() + suffixes.len());
    for suffix in suffixes {
        if !seen.insert(suffix.as_str()) {
            continue;
        }
        let anchor = if suffix.starts_with('.') {
            PREFIX_LABEL
        } else {
            ROOT_LABEL
        };
        keys.push(reverse_domain(std::iter::once(anchor).chain(suffix.chars())));
    }
    for domain in domains {
        if !seen.insert(domain.as_str()) {
            continue;
        }
        keys.push(reverse_domain(domain.chars()));
    }
    keys.sort();
    keys
}

fn reverse_domain<I>(chars: I) -> Vec<u8>
where
    I: DoubleEndedIterator<Item = char>,
{
    chars.rev().collect::<String>().into_bytes()
}

fn set_bit(bitmap: &mut Vec<u64>, i: usize, value: bool) {
    while i >> 6 >= bitmap.len() {
        bitmap.push(0);
    }
    if value {
        bitmap[i >> 6] |= 1 << (i & 63);
    }
}

/// Merged address ranges, IPv4 before IPv6.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IpSet {
    v4: Vec<(u32, u32)>,
    v6: Vec<(u128, u128)>,
}

impl IpSet {
    /// Parse prefixes or bare addresses. Any other value is `InvalidCidr`.
    pub fn from_cidrs(values: &[String]) -> Result<Self> {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for value in values {
            match parse_cidr(value)? {
                IpNet::V4(net) => v4.push((u32::from(net.network()), u32::from(net.broadcast()))),
                IpNet::V6(net) => v6.push((u128::from(net.network()), u128::from(net.broadcast()))),
            }
        }
        Ok(Self {
            v4: merge_ranges(v4),
            v6: merge_ranges(v6),
        })
    }

    fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    fn write(&self, buf: &mut BytesMut) {
        // ip set version
        buf.put_u8(1);
        buf.put_u64(self.len() as u64);
        for (from, to) in &self.v4 {
            put_bytes(buf, &from.to_be_bytes());
            put_bytes(buf, &to.to_be_bytes());
        }
        for (from, to) in &self.v6 {
            put_bytes(buf, &from.to_be_bytes());
            put_bytes(buf, &to.to_be_bytes());
        }
    }
}

fn parse_cidr(value: &str) -> Result<IpNet> {
    if let Ok(net) = value.parse::<IpNet>() {
        return Ok(net);
    }
    let addr = value
        .parse::<IpAddr>()
        .map_err(|_| RuleError::InvalidCidr(value.to_string()))?;
    let host_len = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, host_len).map_err(|_| RuleError::InvalidCidr(value.to_string()))
}

/// Sort and coalesce overlapping or adjacent inclusive ranges.
fn merge_ranges<T>(mut ranges: Vec<(T, T)>) -> Vec<(T, T)>
where
    T: Copy + Ord + Into<u128>,
{
    ranges.sort();
    let mut merged: Vec<(T, T)> = Vec::with_capacity(ranges.len());
    for (from, to) in ranges {
        if let Some(last) = merged.last_mut() {
            let end: u128 = last.1.into();
            if end.saturating_add(1) >= from.into() {
                if to > last.1 {
                    last.1 = to;
                }
                continue;
            }
        }
        merged.push((from, to));
    }
    merged
}
