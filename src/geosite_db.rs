// sing-box geosite.db 写入
use crate::rules::item::{EntrySet, RuleItem, TagMap};
use crate::srs::{put_bytes, put_uvarint};
use bytes::{BufMut, BytesMut};
use std::collections::BTreeSet;

/// Item type byte and value in the geosite database.
fn domain_item(item: &RuleItem) -> Option<(u8, &str)> {
    match item {
        RuleItem::Domain(v) => Some((0, v)),
        RuleItem::DomainSuffix(v) => Some((1, v)),
        RuleItem::DomainKeyword(v) => Some((2, v)),
        RuleItem::DomainRegex(v) => Some((3, v)),
        _ => None,
    }
}

fn put_string(buf: &mut BytesMut, value: &str) {
    put_bytes(buf, value.as_bytes());
}

/// Encode codes and their domain items.
///
/// Layout: version 0, code count, per code `(name, content offset, item
/// count)`, then the concatenated items. Codes are written in sorted order;
/// entries that are not domain matchers are left out.
pub fn write_geosite_db<'a, I>(codes: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a String, &'a EntrySet)>,
{
    let mut content = BytesMut::new();
    let mut index = Vec::new();
    for (code, entries) in codes {
        let offset = content.len();
        let mut count = 0u64;
        for item in entries {
            let Some((kind, value)) = domain_item(item) else {
                continue;
            };
            content.put_u8(kind);
            put_string(&mut content, value);
            count += 1;
        }
        index.push((code.as_str(), offset, count));
    }
    index.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = BytesMut::with_capacity(content.len() + index.len() * 16 + 8);
    out.put_u8(0);
    put_uvarint(&mut out, index.len() as u64);
    for (code, offset, count) in &index {
        put_string(&mut out, code);
        put_uvarint(&mut out, *offset as u64);
        put_uvarint(&mut out, *count);
    }
    out.put_slice(&content);
    out.to_vec()
}

/// Database restricted to `codes`. Codes absent from the map are written
/// empty, repeated codes once.
pub fn write_geosite_subset(tags: &TagMap, codes: &[String]) -> Vec<u8> {
    let empty = EntrySet::new();
    let codes: BTreeSet<&String> = codes.iter().collect();
    write_geosite_db(
        codes
            .into_iter()
            .map(|code| (code, tags.get(code).unwrap_or(&empty))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_uvarint(data: &[u8], pos: &mut usize) -> u64 {
        let mut value = 0u64;
        let mut shift = 0;
        loop {
            let byte = data[*pos];
            *pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return value;
            }
            shift += 7;
        }
    }

    fn read_string(data: &[u8], pos: &mut usize) -> String {
        let len = read_uvarint(data, pos) as usize;
        let s = String::from_utf8(data[*pos..*pos + len].to_vec()).unwrap();
        *pos += len;
        s
    }

    #[test]
    fn test_header_and_items() {
        let mut tags = TagMap::new();
        tags.insert(
            "google".to_string(),
            [
                RuleItem::Domain("google.com".to_string()),
                RuleItem::DomainSuffix(".google.com".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        tags.insert(
            "ads".to_string(),
            [
                RuleItem::DomainKeyword("ad".to_string()),
                RuleItem::DomainRegex("^ad\\.".to_string()),
                RuleItem::SourcePort(80),
            ]
            .into_iter()
            .collect(),
        );

        let data = write_geosite_db(&tags);
        let mut pos = 0;
        assert_eq!(data[pos], 0);
        pos += 1;
        assert_eq!(read_uvarint(&data, &mut pos), 2);

        let mut header = Vec::new();
        for _ in 0..2 {
            let code = read_string(&data, &mut pos);
            let offset = read_uvarint(&data, &mut pos);
            let count = read_uvarint(&data, &mut pos);
            header.push((code, offset, count));
        }
        assert_eq!(header[0], ("ads".to_string(), 0, 2));
        assert_eq!(header[1].0, "google");
        assert_eq!(header[1].2, 2);

        let content = &data[pos..];
        let mut cpos = header[1].1 as usize;
        assert_eq!(content[cpos], 0);
        cpos += 1;
        assert_eq!(read_string(content, &mut cpos), "google.com");
        assert_eq!(content[cpos], 1);
        cpos += 1;
        assert_eq!(read_string(content, &mut cpos), ".google.com");
        assert_eq!(cpos, content.len());

        // 关键字在正则之前
        let mut apos = 0;
        assert_eq!(content[apos], 2);
        apos += 1;
        assert_eq!(read_string(content, &mut apos), "ad");
        assert_eq!(content[apos], 3);
    }

    #[test]
    fn test_subset() {
        let mut tags = TagMap::new();
        tags.insert(
            "geolocation-cn".to_string(),
            [RuleItem::Domain("baidu.com".to_string())].into_iter().collect(),
        );
        tags.insert(
            "google".to_string(),
            [RuleItem::Domain("google.com".to_string())].into_iter().collect(),
        );
        let data = write_geosite_subset(&tags, &["geolocation-cn".to_string()]);
        let mut pos = 1;
        assert_eq!(read_uvarint(&data, &mut pos), 1);
        assert_eq!(read_string(&data, &mut pos), "geolocation-cn");
        assert!(!data.windows(6).any(|w| w == b"google"));
    }

    #[test]
    fn test_subset_repeated_code() {
        let mut tags = TagMap::new();
        tags.insert(
            "geolocation-cn".to_string(),
            [RuleItem::Domain("baidu.com".to_string())].into_iter().collect(),
        );
        let codes = ["geolocation-cn".to_string(), "geolocation-cn".to_string()];
        let data = write_geosite_subset(&tags, &codes);
        let mut pos = 1;
        assert_eq!(read_uvarint(&data, &mut pos), 1);
        assert_eq!(read_string(&data, &mut pos), "geolocation-cn");
        assert_eq!(read_uvarint(&data, &mut pos), 0);
        assert_eq!(read_uvarint(&data, &mut pos), 1);
        assert_eq!(data.windows(9).filter(|w| *w == b"baidu.com").count(), 1);
    }
}
