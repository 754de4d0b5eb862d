//! JSON snapshot host.
//!
//! A snapshot is a disassembler export in a small documented shape, so any
//! tool with a scripting API can feed the engine:
//!
//! ```json
//! {
//!   "binary": "client",
//!   "procedures": [
//!     { "address": "0x1000", "name": "net_init",
//!       "references": [ { "address": "0x1004", "symbol": "_socket" },
//!                       { "address": "0x1010", "target": "0x9000" } ] }
//!   ],
//!   "strings": [ { "address": "0x2000", "value": "https://api.example.com" },
//!                { "address": "0x2100", "hex": "c3a9" } ],
//!   "symbols": [ { "address": "0x9000", "name": "sym.imp.connect" } ]
//! }
//! ```
//!
//! Addresses are JSON numbers or `0x`-prefixed hex strings. Annotations are
//! kept in memory and written out with [`SnapshotHost::save`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, HostError};
use crate::host::DisassemblyHost;
use crate::model::{ProcedureRef, RawString, ReferenceEdge};
use crate::services::hosts::{HostLoader, HostRequest};

const HOST_NAME: &str = "snapshot";

/// Address as written in a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotAddress {
    Number(u64),
    Text(String),
}

impl SnapshotAddress {
    pub fn value(&self) -> Result<u64, HostError> {
        match self {
            SnapshotAddress::Number(n) => Ok(*n),
            SnapshotAddress::Text(text) => parse_address(text),
        }
    }
}

impl From<u64> for SnapshotAddress {
    fn from(value: u64) -> Self {
        SnapshotAddress::Text(format!("0x{value:X}"))
    }
}

fn parse_address(text: &str) -> Result<u64, HostError> {
    let t = text.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => t.parse::<u64>(),
    };
    parsed.map_err(|e| HostError::new(format!("invalid address '{text}': {e}")))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default)]
    pub procedures: Vec<SnapshotProcedure>,
    #[serde(default)]
    pub strings: Vec<SnapshotString>,
    #[serde(default)]
    pub symbols: Vec<SnapshotSymbol>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<SnapshotAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotProcedure {
    pub address: SnapshotAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub references: Vec<SnapshotReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReference {
    pub address: SnapshotAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SnapshotAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotString {
    pub address: SnapshotAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Raw bytes as hex, for literals that are not valid UTF-8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSymbol {
    pub address: SnapshotAddress,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAnnotation {
    pub address: SnapshotAddress,
    pub text: String,
}

/// Host backed by a parsed snapshot document.
#[derive(Debug, Clone)]
pub struct SnapshotHost {
    document: SnapshotDocument,
    symbols: HashMap<u64, String>,
    annotations: BTreeMap<u64, Vec<String>>,
}

impl SnapshotHost {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let body = fs::read(path).map_err(|e| {
            EngineError::host_unavailable(HOST_NAME, format!("failed to read {}: {e}", path.display()))
        })?;
        let document: SnapshotDocument = serde_json::from_slice(&body).map_err(|e| {
            EngineError::host_unavailable(HOST_NAME, format!("failed to parse {}: {e}", path.display()))
        })?;
        Self::from_document(document).map_err(|e| EngineError::host_unavailable(HOST_NAME, e))
    }

    pub fn from_document(document: SnapshotDocument) -> Result<Self, HostError> {
        let mut symbols = HashMap::new();
        for sym in &document.symbols {
            symbols.entry(sym.address.value()?).or_insert_with(|| sym.name.clone());
        }
        let mut annotations: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for note in &document.annotations {
            annotations.entry(note.address.value()?).or_default().push(note.text.clone());
        }
        Ok(Self { document, symbols, annotations })
    }

    pub fn binary_name(&self) -> Option<&str> {
        self.document.binary.as_deref()
    }

    pub fn annotations(&self) -> &BTreeMap<u64, Vec<String>> {
        &self.annotations
    }

    /// The document with current annotations folded in.
    pub fn to_document(&self) -> SnapshotDocument {
        let mut document = self.document.clone();
        document.annotations = self
            .annotations
            .iter()
            .flat_map(|(address, texts)| {
                texts.iter().map(move |text| SnapshotAnnotation {
                    address: SnapshotAddress::from(*address),
                    text: text.clone(),
                })
            })
            .collect();
        document
    }

    pub fn save(&self, path: &Path) -> Result<(), HostError> {
        let body = serde_json::to_string_pretty(&self.to_document())
            .map_err(|e| HostError::new(format!("failed to serialize snapshot: {e}")))?;
        fs::write(path, body)
            .map_err(|e| HostError::new(format!("failed to write {}: {e}", path.display())))
    }
}

impl DisassemblyHost for SnapshotHost {
    fn name(&self) -> &str {
        HOST_NAME
    }

    fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError> {
        let mut procedures = Vec::with_capacity(self.document.procedures.len());
        for p in &self.document.procedures {
            let address = match p.address.value() {
                Ok(address) => address,
                Err(err) => {
                    warn!("Skipping snapshot procedure {:?}: {err}", p.name);
                    continue;
                }
            };
            let references = p.references.iter().map(reference_edge).collect();
            procedures.push(ProcedureRef { address, name: p.name.clone(), references });
        }
        Ok(procedures)
    }

    fn list_strings(&self) -> Result<Vec<RawString>, HostError> {
        Ok(self.document.strings.iter().filter_map(raw_string).collect())
    }

    fn resolve_reference_symbol(&self, address: u64) -> Option<String> {
        self.symbols.get(&address).cloned()
    }

    fn supports_annotation(&self) -> bool {
        true
    }

    fn annotate(&mut self, address: u64, text: &str) -> Result<(), HostError> {
        let texts = self.annotations.entry(address).or_default();
        if !texts.iter().any(|t| t == text) {
            texts.push(text.to_string());
        }
        Ok(())
    }
}

/// Unparsable addresses become an edge with no source, which the call-site
/// matcher reports as a malformed reference.
fn reference_edge(r: &SnapshotReference) -> ReferenceEdge {
    let parsed = r
        .address
        .value()
        .and_then(|address| Ok((address, r.target.as_ref().map(SnapshotAddress::value).transpose()?)));
    match parsed {
        Ok((address, target)) => ReferenceEdge { address, target, symbol: r.symbol.clone() },
        Err(err) => {
            warn!("Malformed snapshot reference {:?}: {err}", r.symbol);
            ReferenceEdge { address: 0, target: None, symbol: None }
        }
    }
}

fn raw_string(s: &SnapshotString) -> Option<RawString> {
    let decoded = s.address.value().and_then(|address| {
        let bytes = match (&s.value, &s.hex) {
            (Some(value), _) => value.as_bytes().to_vec(),
            (None, Some(hex)) => decode_hex(hex)?,
            (None, None) => {
                return Err(HostError::new(format!(
                    "string at 0x{address:X} has neither 'value' nor 'hex'"
                )))
            }
        };
        Ok(RawString::new(address, bytes))
    });
    decoded.map_err(|err| warn!("Skipping snapshot string: {err}")).ok()
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, HostError> {
    let clean: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if clean.len() % 2 != 0 {
        return Err(HostError::new(format!("odd-length hex string '{hex}'")));
    }
    clean
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| HostError::new(format!("invalid hex string '{hex}'")))
        })
        .collect()
}

pub struct SnapshotLoader;

impl HostLoader for SnapshotLoader {
    fn name(&self) -> &'static str {
        HOST_NAME
    }

    fn description(&self) -> &'static str {
        "JSON export of procedures, strings and symbols from any disassembler"
    }

    fn load(&self, request: &HostRequest) -> Result<Box<dyn DisassemblyHost>, EngineError> {
        request.require_input(HOST_NAME)?;
        Ok(Box::new(SnapshotHost::open(&request.input)?))
    }
}
