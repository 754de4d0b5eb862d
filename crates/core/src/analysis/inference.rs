//! Protocol inference: raw call/literal findings -> per-category conclusions.
//!
//! Rules are independent and non-exclusive. A category with no evidence gets
//! no conclusion at all.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::model::{
    ApiFamily, CallFinding, Evidence, LiteralFinding, NetworkCategory, ProtocolConclusion,
    SocketTransport, SymbolSignature,
};

/// Weight of a `https://` / `wss://` literal toward `TLSHandshake`.
pub const TLS_SCHEME_CONFIDENCE: f64 = 0.6;
/// Weight of an `http(s)://` literal toward `HTTPClient`.
pub const HTTP_SCHEME_CONFIDENCE: f64 = 0.5;
/// Weight of a `ws(s)://` literal toward `WebSocket`.
pub const WEBSOCKET_SCHEME_CONFIDENCE: f64 = 0.6;

/// Everything the matchers produced for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFindings {
    pub calls: Vec<CallFinding>,
    pub literals: Vec<LiteralFinding>,
}

impl RawFindings {
    pub fn new(calls: Vec<CallFinding>, literals: Vec<LiteralFinding>) -> Self {
        Self { calls, literals }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.literals.is_empty()
    }
}

/// Output of [`infer_protocols`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inference {
    pub conclusions: BTreeMap<NetworkCategory, ProtocolConclusion>,
    pub transports: BTreeSet<SocketTransport>,
}

struct Rule {
    category: NetworkCategory,
    call: fn(&SymbolSignature) -> bool,
    schemes: &'static [&'static str],
    scheme_confidence: f64,
}

const RULES: &[Rule] = &[
    Rule {
        category: NetworkCategory::SocketRaw,
        call: |sig| sig.family == ApiFamily::CSocket || sig.category == NetworkCategory::SocketRaw,
        schemes: &[],
        scheme_confidence: 0.0,
    },
    Rule {
        category: NetworkCategory::HttpClient,
        call: |sig| sig.category == NetworkCategory::HttpClient,
        schemes: &["http", "https"],
        scheme_confidence: HTTP_SCHEME_CONFIDENCE,
    },
    Rule {
        category: NetworkCategory::WebSocket,
        call: |sig| sig.category == NetworkCategory::WebSocket,
        schemes: &["ws", "wss"],
        scheme_confidence: WEBSOCKET_SCHEME_CONFIDENCE,
    },
    Rule {
        category: NetworkCategory::TlsHandshake,
        call: |sig| sig.family == ApiFamily::TlsLibrary || sig.category == NetworkCategory::TlsHandshake,
        schemes: &["https", "wss"],
        scheme_confidence: TLS_SCHEME_CONFIDENCE,
    },
    Rule {
        category: NetworkCategory::DnsResolution,
        call: |sig| sig.category == NetworkCategory::DnsResolution,
        schemes: &[],
        scheme_confidence: 0.0,
    },
    Rule {
        category: NetworkCategory::UnknownNetworkApi,
        call: |sig| sig.category == NetworkCategory::UnknownNetworkApi,
        schemes: &[],
        scheme_confidence: 0.0,
    },
];

/// Apply every rule to `raw`.
///
/// Evidence lists hold call findings (ascending address) followed by literal
/// findings (ascending address), with each address at most once.
pub fn infer_protocols(raw: &RawFindings) -> Inference {
    let mut calls: Vec<&CallFinding> = raw.calls.iter().collect();
    calls.sort_by_key(|c| c.address);
    let mut literals: Vec<&LiteralFinding> = raw.literals.iter().collect();
    literals.sort_by_key(|l| l.address);

    let mut out = Inference::default();
    for rule in RULES {
        if let Some(conclusion) = apply_rule(rule, &calls, &literals) {
            out.conclusions.insert(rule.category, conclusion);
        }
    }
    out.transports = calls.iter().filter_map(|c| c.signature.transport).collect();
    out
}

fn apply_rule(
    rule: &Rule,
    calls: &[&CallFinding],
    literals: &[&LiteralFinding],
) -> Option<ProtocolConclusion> {
    let mut seen = HashSet::new();
    let mut evidence = Vec::new();
    let mut confidence: f64 = 0.0;

    for call in calls.iter().filter(|c| (rule.call)(&c.signature)) {
        if seen.insert(call.address) {
            confidence = confidence.max(call.signature.confidence);
            evidence.push(Evidence::Call((*call).clone()));
        }
    }
    if !rule.schemes.is_empty() {
        for lit in literals.iter().filter(|l| l.has_scheme(rule.schemes)) {
            if seen.insert(lit.address) {
                confidence = confidence.max(rule.scheme_confidence);
                evidence.push(Evidence::Literal((*lit).clone()));
            }
        }
    }

    if evidence.is_empty() {
        return None;
    }
    Some(ProtocolConclusion { category: rule.category, evidence, confidence: confidence.clamp(0.0, 1.0) })
}
