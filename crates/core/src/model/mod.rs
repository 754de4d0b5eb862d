//! Core data model for network-surface findings.
//!
//! Everything here is created fresh for one analysis run and discarded once
//! the report has been handed to the caller. The only long-lived values are
//! the `SymbolSignature`s owned by the catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of network categories a finding can be linked to.
///
/// Declaration order is the order categories appear in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkCategory {
    SocketRaw,
    HttpClient,
    WebSocket,
    TlsHandshake,
    DnsResolution,
    UnknownNetworkApi,
}

impl NetworkCategory {
    pub const ALL: [NetworkCategory; 6] = [
        NetworkCategory::SocketRaw,
        NetworkCategory::HttpClient,
        NetworkCategory::WebSocket,
        NetworkCategory::TlsHandshake,
        NetworkCategory::DnsResolution,
        NetworkCategory::UnknownNetworkApi,
    ];

    /// Display label used in console output and annotations.
    pub fn label(self) -> &'static str {
        match self {
            NetworkCategory::SocketRaw => "SocketRaw",
            NetworkCategory::HttpClient => "HTTPClient",
            NetworkCategory::WebSocket => "WebSocket",
            NetworkCategory::TlsHandshake => "TLSHandshake",
            NetworkCategory::DnsResolution => "DNSResolution",
            NetworkCategory::UnknownNetworkApi => "UnknownNetworkAPI",
        }
    }

    /// Serialized (snake_case) name.
    pub fn key(self) -> &'static str {
        match self {
            NetworkCategory::SocketRaw => "socket_raw",
            NetworkCategory::HttpClient => "http_client",
            NetworkCategory::WebSocket => "web_socket",
            NetworkCategory::TlsHandshake => "tls_handshake",
            NetworkCategory::DnsResolution => "dns_resolution",
            NetworkCategory::UnknownNetworkApi => "unknown_network_api",
        }
    }

    /// Parse either the serialized name or the display label.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim();
        NetworkCategory::ALL
            .into_iter()
            .find(|c| c.key() == wanted || c.label().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for NetworkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// API family a cataloged symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFamily {
    CSocket,
    ObjcFoundation,
    SwiftNetwork,
    TlsLibrary,
}

impl ApiFamily {
    pub fn label(self) -> &'static str {
        match self {
            ApiFamily::CSocket => "C sockets",
            ApiFamily::ObjcFoundation => "Objective-C Foundation",
            ApiFamily::SwiftNetwork => "Swift networking",
            ApiFamily::TlsLibrary => "TLS library",
        }
    }
}

impl fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transport-layer hint carried by some socket-level signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketTransport {
    Tcp,
    Udp,
}

impl fmt::Display for SocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketTransport::Tcp => f.write_str("TCP"),
            SocketTransport::Udp => f.write_str("UDP"),
        }
    }
}

/// One catalog entry: an API symbol and what calling it says about the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSignature {
    pub symbol: String,
    pub category: NetworkCategory,
    pub family: ApiFamily,
    /// Weight in `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<SocketTransport>,
}

impl SymbolSignature {
    pub fn new(
        symbol: impl Into<String>,
        category: NetworkCategory,
        family: ApiFamily,
        confidence: f64,
    ) -> Self {
        Self { symbol: symbol.into(), category, family, confidence, transport: None }
    }

    pub fn with_transport(mut self, transport: SocketTransport) -> Self {
        self.transport = Some(transport);
        self
    }
}

/// Outgoing reference from a procedure, as resolved by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    /// Address of the referencing instruction.
    pub address: u64,
    /// Address of the referenced entity, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<u64>,
    /// Display name of the referenced symbol, when the host already has it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl ReferenceEdge {
    pub fn to_symbol(address: u64, symbol: impl Into<String>) -> Self {
        Self { address, target: None, symbol: Some(symbol.into()) }
    }

    pub fn to_target(address: u64, target: u64) -> Self {
        Self { address, target: Some(target), symbol: None }
    }
}

/// A disassembled procedure and its reference edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureRef {
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub references: Vec<ReferenceEdge>,
}

impl ProcedureRef {
    pub fn new(address: u64, name: Option<String>) -> Self {
        Self { address, name, references: Vec::new() }
    }

    pub fn with_reference(mut self, edge: ReferenceEdge) -> Self {
        self.references.push(edge);
        self
    }

    /// Light reference used inside findings.
    pub fn caller(&self) -> CallerRef {
        CallerRef { address: self.address, name: self.name.clone() }
    }
}

/// Entry of the host's string table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawString {
    pub address: u64,
    pub bytes: Vec<u8>,
}

impl RawString {
    pub fn new(address: u64, bytes: impl Into<Vec<u8>>) -> Self {
        Self { address, bytes: bytes.into() }
    }

    pub fn text(address: u64, text: &str) -> Self {
        Self { address, bytes: text.as_bytes().to_vec() }
    }
}

/// Procedure that contains a call finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerRef {
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl fmt::Display for CallerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "sub_{:X}", self.address),
        }
    }
}

/// A reference edge that resolved to a cataloged symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFinding {
    pub address: u64,
    pub caller: CallerRef,
    pub signature: SymbolSignature,
}

/// Classification of a string literal.
///
/// `Unknown` is the matcher's non-match sentinel and never reaches a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    Url,
    Ipv4,
    Ipv6,
    Unknown,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralKind::Url => f.write_str("URL"),
            LiteralKind::Ipv4 => f.write_str("IPv4"),
            LiteralKind::Ipv6 => f.write_str("IPv6"),
            LiteralKind::Unknown => f.write_str("unknown"),
        }
    }
}

/// A string literal that looks like a network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralFinding {
    pub address: u64,
    /// Full literal as evaluated (after length bounding).
    pub raw_string: String,
    /// The matched URL or address inside `raw_string`.
    pub value: String,
    pub kind: LiteralKind,
    /// Lowercased URL scheme for `Url` findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

impl LiteralFinding {
    pub fn has_scheme(&self, schemes: &[&str]) -> bool {
        self.kind == LiteralKind::Url
            && self.scheme.as_deref().map(|s| schemes.contains(&s)).unwrap_or(false)
    }
}

/// One piece of evidence supporting a conclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    Call(CallFinding),
    Literal(LiteralFinding),
}

impl Evidence {
    pub fn address(&self) -> u64 {
        match self {
            Evidence::Call(call) => call.address,
            Evidence::Literal(lit) => lit.address,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Evidence::Call(_))
    }
}

/// Confidence-scored determination that a category is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConclusion {
    pub category: NetworkCategory,
    pub evidence: Vec<Evidence>,
    pub confidence: f64,
}

/// Network-touching procedure, for triage listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureSummary {
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub categories: BTreeSet<NetworkCategory>,
    pub call_count: usize,
}

/// Kind of item skipped during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedReference,
    StringDecodeError,
}

/// Record of a skipped item; enough to reproduce the gap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Diagnostic {
    pub address: u64,
    pub kind: DiagnosticKind,
    pub reason: String,
}

/// Counters describing how much of the host data a run covered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub procedures_total: usize,
    pub procedures_scanned: usize,
    pub strings_total: usize,
    pub strings_scanned: usize,
    pub references_scanned: usize,
    pub unresolved_references: usize,
}

/// Root result object of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub host: String,
    pub catalog_version: String,
    pub generated_at: DateTime<Utc>,
    /// False when the run was cancelled before every batch was processed.
    pub complete: bool,
    pub findings: BTreeMap<NetworkCategory, ProtocolConclusion>,
    pub urls: Vec<LiteralFinding>,
    pub ip_addresses: Vec<LiteralFinding>,
    pub transports: BTreeSet<SocketTransport>,
    pub procedures: Vec<ProcedureSummary>,
    pub stats: ScanStats,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisReport {
    pub fn conclusion(&self, category: NetworkCategory) -> Option<&ProtocolConclusion> {
        self.findings.get(&category)
    }

    pub fn has_network_activity(&self) -> bool {
        !self.findings.is_empty() || !self.urls.is_empty() || !self.ip_addresses.is_empty()
    }

    /// Total evidence items across all conclusions.
    pub fn evidence_count(&self) -> usize {
        self.findings.values().map(|c| c.evidence.len()).sum()
    }
}
