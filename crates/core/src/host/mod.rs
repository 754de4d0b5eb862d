//! Host collaborator contract.
//!
//! The engine never disassembles, parses containers or resolves symbols on
//! its own; a host (a disassembler export, rizin, the bundled capstone
//! loader, ...) hands it procedures with reference edges and a string table.
//! Hosts are injected as trait objects or generics, wrapped in a
//! [`BinaryDocument`] whose lock scopes one analysis run.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{EngineError, HostError};
use crate::model::{ProcedureRef, RawString};

/// Read access to disassembled binary data, plus optional annotation support.
///
/// The listing methods must be stable for the duration of one run.
pub trait DisassemblyHost: Send + Sync {
    /// Human-readable host name (e.g. "rizin").
    fn name(&self) -> &str;

    fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError>;

    fn list_strings(&self) -> Result<Vec<RawString>, HostError>;

    /// Display name of the symbol at `address`, if the host knows one.
    fn resolve_reference_symbol(&self, address: u64) -> Option<String>;

    fn supports_annotation(&self) -> bool {
        false
    }

    /// Attach `text` to `address` in the host document.
    fn annotate(&mut self, address: u64, _text: &str) -> Result<(), HostError> {
        Err(HostError::new(format!(
            "host '{}' cannot annotate 0x{address:X}: annotations not supported",
            self.name()
        )))
    }
}

impl<H: DisassemblyHost + ?Sized> DisassemblyHost for Box<H> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError> {
        (**self).list_procedures()
    }

    fn list_strings(&self) -> Result<Vec<RawString>, HostError> {
        (**self).list_strings()
    }

    fn resolve_reference_symbol(&self, address: u64) -> Option<String> {
        (**self).resolve_reference_symbol(address)
    }

    fn supports_annotation(&self) -> bool {
        (**self).supports_annotation()
    }

    fn annotate(&mut self, address: u64, text: &str) -> Result<(), HostError> {
        (**self).annotate(address, text)
    }
}

/// A host document guarded by a reader/writer lock.
///
/// Analysis holds the read side for a whole run; annotation write-back takes
/// the write side afterwards. Guards release on drop, including early returns.
#[derive(Debug, Default)]
pub struct BinaryDocument<H> {
    host: RwLock<H>,
}

impl<H: DisassemblyHost> BinaryDocument<H> {
    pub fn new(host: H) -> Self {
        Self { host: RwLock::new(host) }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, H>, EngineError> {
        self.host.read().map_err(|_| EngineError::host_unavailable("document", "lock poisoned"))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, H>, EngineError> {
        self.host.write().map_err(|_| EngineError::host_unavailable("document", "lock poisoned"))
    }

    pub fn into_inner(self) -> Result<H, EngineError> {
        self.host
            .into_inner()
            .map_err(|_| EngineError::host_unavailable("document", "lock poisoned"))
    }
}

const TOOL_PREFIXES: &[&str] = &["sym.imp.", "sym.", "imp.", "reloc.", "__imp_"];
const OBJC_CLASS_PREFIXES: &[&str] = &["OBJC_CLASS_$_", "OBJC_METACLASS_$_"];
const SWIFT_MODULES: &[&str] = &["Foundation.", "FoundationNetworking.", "Network."];

/// Reduce a host symbol name to the display form the catalog is keyed by.
///
/// Strips tool prefixes (`sym.imp.`), one Mach-O underscore, Objective-C
/// class-reference prefixes, `@plt`/symbol-version suffixes, reduces
/// `-[Class selector]` to `Class` and `Network.NWConnection.start()` to
/// `NWConnection`.
pub fn normalize_symbol_name(raw: &str) -> String {
    let mut name = raw.trim();

    while let Some(rest) = TOOL_PREFIXES.iter().find_map(|p| name.strip_prefix(p)) {
        name = rest;
    }

    if let Some(class) = objc_method_class(name) {
        return class.to_string();
    }

    if let Some(rest) = name.strip_prefix('_') {
        if rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            name = rest;
        }
    }

    if let Some(rest) = OBJC_CLASS_PREFIXES.iter().find_map(|p| name.strip_prefix(p)) {
        name = rest;
    }

    if let Some(idx) = name.find('@') {
        name = &name[..idx];
    }

    if let Some(rest) = SWIFT_MODULES.iter().find_map(|m| name.strip_prefix(m)) {
        let end = rest.find(|c: char| c == '.' || c == '(' || c == ' ').unwrap_or(rest.len());
        if end > 0 {
            name = &rest[..end];
        }
    }

    name.to_string()
}

/// `-[NSURLSession dataTaskWithURL:]` -> `NSURLSession`.
fn objc_method_class(name: &str) -> Option<&str> {
    let body = name.strip_prefix("-[").or_else(|| name.strip_prefix("+["))?;
    let class = body.split([' ', ']']).next()?;
    // Category methods look like `NSURLSession(Extras)`.
    let class = class.split('(').next()?;
    (!class.is_empty()).then_some(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tool_prefixes_and_suffixes() {
        assert_eq!(normalize_symbol_name("sym.imp.socket"), "socket");
        assert_eq!(normalize_symbol_name("connect@plt"), "connect");
        assert_eq!(normalize_symbol_name("getaddrinfo@@GLIBC_2.2.5"), "getaddrinfo");
        assert_eq!(normalize_symbol_name("reloc.SSL_connect"), "SSL_connect");
        assert_eq!(normalize_symbol_name("__imp_send"), "send");
    }

    #[test]
    fn strips_one_macho_underscore() {
        assert_eq!(normalize_symbol_name("_socket"), "socket");
        assert_eq!(normalize_symbol_name("__init"), "__init");
        assert_eq!(normalize_symbol_name("sym.imp._SSLHandshake"), "SSLHandshake");
    }

    #[test]
    fn reduces_objc_and_swift_names_to_types() {
        assert_eq!(normalize_symbol_name("_OBJC_CLASS_$_NSURLSession"), "NSURLSession");
        assert_eq!(
            normalize_symbol_name("-[NSURLSession dataTaskWithURL:completionHandler:]"),
            "NSURLSession"
        );
        assert_eq!(normalize_symbol_name("+[NSURLConnection(Extras) sendSync:]"), "NSURLConnection");
        assert_eq!(normalize_symbol_name("Network.NWConnection.start(queue:)"), "NWConnection");
        assert_eq!(normalize_symbol_name("Foundation.URLSession.shared"), "URLSession");
    }

    #[test]
    fn leaves_plain_names_untouched() {
        assert_eq!(normalize_symbol_name("main"), "main");
        assert_eq!(normalize_symbol_name("  recv  "), "recv");
        assert_eq!(normalize_symbol_name(""), "");
    }
}
