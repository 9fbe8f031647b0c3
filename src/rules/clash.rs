// Clash 规则解析
//
// > REF: https://clash.wiki/premium/rule-providers.html
// > REF: https://clash.wiki/configuration/rules.html
use crate::error::{Result, RuleError};
use crate::rules::item::{EntrySet, RuleItem};
use ipnet::IpNet;
use log::{debug, error, trace, warn};
use serde::Deserialize;
use std::net::IpAddr;

/// Explicit directives, in match precedence order.
const DIRECTIVES: [(&str, Directive); 10] = [
    ("DOMAIN,", Directive::Domain),
    ("DOMAIN-SUFFIX,", Directive::DomainSuffix),
    ("DOMAIN-KEYWORD,", Directive::DomainKeyword),
    ("IP-CIDR,", Directive::IpCidr),
    ("IP-CIDR6,", Directive::IpCidr),
    ("SRC-IP-CIDR,", Directive::SourceIpCidr),
    ("SRC-PORT,", Directive::SourcePort),
    ("DST-PORT,", Directive::DestPort),
    ("PROCESS-NAME,", Directive::ProcessName),
    ("PROCESS-PATH,", Directive::ProcessPath),
];

/// Recognized by Clash but not expressible in a headless rule-set.
const UNSUPPORTED: [&str; 4] = ["GEOIP,", "IPSET,", "RULE-SET,", "SCRIPT,"];

#[derive(Debug, Clone, Copy)]
enum Directive {
    Domain,
    DomainSuffix,
    DomainKeyword,
    IpCidr,
    SourceIpCidr,
    SourcePort,
    DestPort,
    ProcessName,
    ProcessPath,
}

impl Directive {
    fn classify(self, line: &str, value: &str) -> Result<RuleItem> {
        if value.is_empty() {
            return Err(RuleError::MalformedInput(format!("missing value: {}", line)));
        }
        let item = match self {
            Directive::Domain => RuleItem::Domain(value.to_string()),
            Directive::DomainSuffix => RuleItem::DomainSuffix(value.to_string()),
            Directive::DomainKeyword => RuleItem::DomainKeyword(value.to_string()),
            Directive::IpCidr => RuleItem::IpCidr(canonical_cidr(value)?),
            Directive::SourceIpCidr => RuleItem::SourceIpCidr(canonical_cidr(value)?),
            Directive::SourcePort => RuleItem::SourcePort(parse_port(line, value)?),
            Directive::DestPort => RuleItem::DestPort(parse_port(line, value)?),
            Directive::ProcessName => RuleItem::ProcessName(value.to_string()),
            Directive::ProcessPath => RuleItem::ProcessPath(value.to_string()),
        };
        Ok(item)
    }
}

/// Result of classifying one rule-provider payload.
#[derive(Debug, Default)]
pub struct Classified {
    pub items: EntrySet,
    /// Lines that were dropped, one recoverable error each.
    pub diagnostics: Vec<RuleError>,
}

#[derive(Deserialize)]
struct RuleProvider {
    payload: Vec<String>,
}

/// Parse the structured rule-provider format (`payload:` list).
pub fn parse_rule_provider(raw: &[u8]) -> Result<Vec<String>> {
    serde_yaml::from_slice::<RuleProvider>(raw)
        .map(|provider| provider.payload)
        .map_err(|e| RuleError::MalformedInput(e.to_string()))
}

/// Line sequence of a payload: the `payload` list when the data is a rule
/// provider, otherwise the newline separated text itself.
pub fn payload_lines(raw: &[u8]) -> Vec<String> {
    match parse_rule_provider(raw) {
        Ok(lines) => lines,
        Err(e) => {
            debug!("not a rule provider, reading plain lines ({})", e);
            String::from_utf8_lossy(raw)
                .split('\n')
                .map(str::to_string)
                .collect()
        }
    }
}

/// Classify raw rule-provider bytes.
pub fn classify_payload(raw: &[u8]) -> Classified {
    classify_lines(payload_lines(raw))
}

/// Classify rule lines. Never fails: bad lines are logged, recorded in
/// [`Classified::diagnostics`] and dropped.
pub fn classify_lines<I, S>(lines: I) -> Classified
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut classified = Classified::default();
    for line in lines {
        match classify_line(line.as_ref()) {
            Ok(Some(item)) => {
                trace!("{}", item);
                classified.items.insert(item);
            }
            Ok(None) => {}
            Err(e) => {
                if e.is_recoverable() {
                    warn!("{}", e);
                } else {
                    error!("{}", e);
                }
                classified.diagnostics.push(e);
            }
        }
    }
    classified
}

/// Classify a single line. `Ok(None)` for blank and comment lines.
pub fn classify_line(line: &str) -> Result<Option<RuleItem>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    for (prefix, directive) in DIRECTIVES {
        if let Some(rest) = line.strip_prefix(prefix) {
            // KEY,VALUE[,OPTION...]
            let value = rest.split(',').next().unwrap_or_default().trim();
            return directive.classify(line, value).map(Some);
        }
    }
    if UNSUPPORTED.iter().any(|prefix| line.starts_with(prefix)) {
        return Err(RuleError::UnsupportedDirective(line.to_string()));
    }

    // 无前缀: +.后缀 / CIDR / IP / 域名
    if let Some(suffix) = line.strip_prefix('+') {
        if suffix.starts_with('.') {
            return Ok(Some(RuleItem::DomainSuffix(suffix.to_string())));
        }
    }
    if let Ok(net) = line.parse::<IpNet>() {
        return Ok(Some(RuleItem::IpCidr(net.to_string())));
    }
    if let Ok(addr) = line.parse::<IpAddr>() {
        return Ok(Some(RuleItem::IpCidr(addr.to_string())));
    }
    Ok(Some(RuleItem::Domain(line.to_string())))
}

/// Canonical text form of a CIDR prefix or a single address.
pub fn canonical_cidr(value: &str) -> Result<String> {
    if let Ok(net) = value.parse::<IpNet>() {
        return Ok(net.to_string());
    }
    value
        .parse::<IpAddr>()
        .map(|addr| addr.to_string())
        .map_err(|_| RuleError::InvalidCidr(value.to_string()))
}

fn parse_port(line: &str, value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .map_err(|source| RuleError::InvalidNumericField {
            line: line.to_string(),
            source,
        })
}
