//! Literal matcher: classify string literals as URLs, IPv4 or IPv6 addresses.
//!
//! Classification order is fixed and the first hit wins, so one string
//! address yields at most one finding. Strings are bounded to
//! `max_len` characters before any pattern runs.

use std::net::Ipv6Addr;
use std::str::FromStr;

use log::warn;
use regex::Regex;

use crate::error::EngineError;
use crate::model::{Diagnostic, DiagnosticKind, LiteralFinding, LiteralKind, RawString};

/// Default bound on evaluated string length, in characters.
pub const DEFAULT_MAX_STRING_LEN: usize = 2048;

const URL_PATTERN: &str = r#"(?i)\b(https?|wss?|ftp)://([A-Za-z0-9\-._~%]+|\[[0-9A-Fa-f:.]+\])(:\d{1,5})?([/?#][^\s"'<>]*)?"#;

const IPV4_PATTERN: &str = r"(?:^|[^0-9A-Za-z.])((?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9]))(?:$|[^0-9A-Za-z.])";

/// Tokens made of characters that can appear in an IPv6 literal (with zone id).
const IPV6_TOKEN_PATTERN: &str = r"[0-9A-Za-z:.%_\-]+";

/// Output of matching a batch of strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiteralMatches {
    pub findings: Vec<LiteralFinding>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LiteralMatches {
    pub fn merge(&mut self, other: LiteralMatches) {
        self.findings.extend(other.findings);
        self.diagnostics.extend(other.diagnostics);
    }
}

/// Result of classifying one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: LiteralKind,
    pub value: String,
    pub scheme: Option<String>,
}

impl Classification {
    fn unknown() -> Self {
        Self { kind: LiteralKind::Unknown, value: String::new(), scheme: None }
    }
}

#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    url: Regex,
    ipv4: Regex,
    ipv6_token: Regex,
    max_len: usize,
}

impl LiteralMatcher {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_max_len(DEFAULT_MAX_STRING_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Result<Self, EngineError> {
        Ok(Self {
            url: Regex::new(URL_PATTERN)?,
            ipv4: Regex::new(IPV4_PATTERN)?,
            ipv6_token: Regex::new(IPV6_TOKEN_PATTERN)?,
            max_len: max_len.max(1),
        })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Classify `text`; `Unknown` means "not a network literal".
    pub fn classify(&self, text: &str) -> Classification {
        if let Some(caps) = self.url.captures(text) {
            let value = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let scheme = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
            return Classification { kind: LiteralKind::Url, value: value.to_string(), scheme };
        }
        if let Some(m) = self.ipv4.captures(text).and_then(|caps| caps.get(1)) {
            return Classification {
                kind: LiteralKind::Ipv4,
                value: m.as_str().to_string(),
                scheme: None,
            };
        }
        if let Some(value) = self.find_ipv6(text) {
            return Classification { kind: LiteralKind::Ipv6, value, scheme: None };
        }
        Classification::unknown()
    }

    /// Colon-separated hextets, `::` compression and embedded IPv4 tails are
    /// validated by the standard parser; the unspecified `::` is ignored so
    /// C++ scope separators are not reported.
    fn find_ipv6(&self, text: &str) -> Option<String> {
        self.ipv6_token.find_iter(text).find_map(|m| {
            let token = m.as_str().trim_matches(|c| c == '.' || c == '-' || c == '_');
            if token.matches(':').count() < 2 {
                return None;
            }
            let addr_part = token.split('%').next().unwrap_or(token);
            let addr = Ipv6Addr::from_str(addr_part).ok()?;
            (!addr.is_unspecified()).then(|| token.to_string())
        })
    }

    /// Decode, bound and classify one string table entry.
    pub fn match_string(&self, raw: &RawString) -> Result<Option<LiteralFinding>, EngineError> {
        let text = decode_literal(raw)?;
        let bounded = truncate_chars(text, self.max_len);
        let class = self.classify(bounded);
        if class.kind == LiteralKind::Unknown {
            return Ok(None);
        }
        Ok(Some(LiteralFinding {
            address: raw.address,
            raw_string: bounded.to_string(),
            value: class.value,
            kind: class.kind,
            scheme: class.scheme,
        }))
    }

    /// Match a batch, recovering from undecodable entries.
    pub fn match_strings(&self, strings: &[RawString]) -> LiteralMatches {
        let mut out = LiteralMatches::default();
        for raw in strings {
            match self.match_string(raw) {
                Ok(Some(finding)) => out.findings.push(finding),
                Ok(None) => {}
                Err(err) => {
                    warn!("Skipping string: {err}");
                    out.diagnostics.push(Diagnostic {
                        address: raw.address,
                        kind: DiagnosticKind::StringDecodeError,
                        reason: err.to_string(),
                    });
                }
            }
        }
        out
    }
}

/// Strict UTF-8 decode; trailing NULs from C strings are dropped.
fn decode_literal(raw: &RawString) -> Result<&str, EngineError> {
    let end = raw.bytes.iter().rposition(|b| *b != 0).map(|i| i + 1).unwrap_or(0);
    std::str::from_utf8(&raw.bytes[..end]).map_err(|e| EngineError::StringDecodeError {
        address: raw.address,
        reason: e.to_string(),
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> LiteralMatcher {
        LiteralMatcher::new().expect("patterns compile")
    }

    #[test]
    fn urls_capture_lowercased_scheme() {
        let m = matcher();
        let c = m.classify("endpoint=HTTPS://api.example.com/v1?x=1");
        assert_eq!(c.kind, LiteralKind::Url);
        assert_eq!(c.scheme.as_deref(), Some("https"));
        assert_eq!(c.value, "HTTPS://api.example.com/v1?x=1");

        for (text, scheme) in [
            ("ws://chat.example.org:8080/socket", "ws"),
            ("wss://chat.example.org", "wss"),
            ("ftp://files.example.net/pub", "ftp"),
            ("http://[2001:db8::1]:80/", "http"),
        ] {
            let c = m.classify(text);
            assert_eq!(c.kind, LiteralKind::Url, "{text}");
            assert_eq!(c.scheme.as_deref(), Some(scheme), "{text}");
        }
    }

    #[test]
    fn unsupported_schemes_and_bare_hosts_are_not_urls() {
        let m = matcher();
        assert_eq!(m.classify("file:///etc/passwd").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("gopher://old.example").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("https://").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("api.example.com").kind, LiteralKind::Unknown);
    }

    #[test]
    fn url_wins_over_embedded_ip() {
        let c = matcher().classify("http://10.0.0.1/admin");
        assert_eq!(c.kind, LiteralKind::Url);
    }

    #[test]
    fn ipv4_octets_are_range_checked() {
        let m = matcher();
        let c = m.classify("192.168.1.1");
        assert_eq!((c.kind, c.value.as_str()), (LiteralKind::Ipv4, "192.168.1.1"));
        assert_eq!(m.classify("server at 10.0.0.254:8080").value, "10.0.0.254");
        assert_eq!(m.classify("256.1.1.1").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("1.2.3.4.5").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("v1.2.3.999").kind, LiteralKind::Unknown);
    }

    #[test]
    fn ipv6_literals_including_compression() {
        let m = matcher();
        for text in ["2001:db8::1", "fe80::1%en0", "::1", "2001:0db8:0000:0000:0000:ff00:0042:8329"] {
            assert_eq!(m.classify(text).kind, LiteralKind::Ipv6, "{text}");
        }
        assert_eq!(m.classify("bind [::ffff:192.0.2.1]").kind, LiteralKind::Ipv6);
    }

    #[test]
    fn ipv6_rejects_scope_separators_and_timestamps() {
        let m = matcher();
        assert_eq!(m.classify("std::string").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("::").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("12:30:45").kind, LiteralKind::Unknown);
        assert_eq!(m.classify("aa:bb:cc:dd:ee:ff").kind, LiteralKind::Unknown);
    }

    #[test]
    fn overlong_strings_are_truncated_silently() {
        let m = LiteralMatcher::with_max_len(16).unwrap();
        let mut text = "a".repeat(20);
        text.push_str(" https://late.example.com");
        let raw = RawString::text(0x10, &text);
        assert_eq!(m.match_string(&raw).unwrap(), None);

        let raw = RawString::text(0x20, "https://a.example/very/long/path");
        let finding = m.match_string(&raw).unwrap().expect("url within bound");
        assert_eq!(finding.raw_string.chars().count(), 16);
    }

    #[test]
    fn undecodable_strings_become_diagnostics() {
        let m = matcher();
        let out = m.match_strings(&[
            RawString::new(0x100, vec![0xff, 0xfe, b'a']),
            RawString::new(0x200, b"https://ok.example\0\0".to_vec()),
        ]);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].address, 0x100);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::StringDecodeError);
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].raw_string, "https://ok.example");
    }

    #[test]
    fn non_network_strings_produce_nothing() {
        let out = matcher().match_strings(&[
            RawString::text(1, "Hello, world"),
            RawString::text(2, ""),
            RawString::text(3, "version 1.2.3"),
        ]);
        assert!(out.findings.is_empty());
        assert!(out.diagnostics.is_empty());
    }
}
