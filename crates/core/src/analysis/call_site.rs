//! Call-site matcher: procedure -> referenced symbol -> catalog lookup.
//!
//! Only directly referenced symbols are considered. Edges the host cannot
//! name (indirect or dynamic calls) are counted and skipped; they are a known
//! limitation, not findings.

use log::{debug, warn};

use crate::catalog::SignatureCatalog;
use crate::host::{normalize_symbol_name, DisassemblyHost};
use crate::model::{CallFinding, Diagnostic, DiagnosticKind, ProcedureRef, ReferenceEdge};

/// Output of matching one or more procedures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallSiteMatches {
    pub findings: Vec<CallFinding>,
    pub diagnostics: Vec<Diagnostic>,
    pub references_scanned: usize,
    pub unresolved: usize,
}

impl CallSiteMatches {
    pub fn merge(&mut self, other: CallSiteMatches) {
        self.findings.extend(other.findings);
        self.diagnostics.extend(other.diagnostics);
        self.references_scanned += other.references_scanned;
        self.unresolved += other.unresolved;
    }
}

/// How a single edge resolved.
enum EdgeSymbol {
    Named(String),
    Unresolved,
    Malformed(&'static str),
}

pub struct CallSiteMatcher<'a> {
    catalog: &'a SignatureCatalog,
}

impl<'a> CallSiteMatcher<'a> {
    pub fn new(catalog: &'a SignatureCatalog) -> Self {
        Self { catalog }
    }

    /// Match every reference edge of `procedures`, in order.
    pub fn match_procedures<H: DisassemblyHost + ?Sized>(
        &self,
        host: &H,
        procedures: &[ProcedureRef],
    ) -> CallSiteMatches {
        let mut out = CallSiteMatches::default();
        for proc_ref in procedures {
            self.match_procedure(host, proc_ref, &mut out);
        }
        out
    }

    fn match_procedure<H: DisassemblyHost + ?Sized>(
        &self,
        host: &H,
        proc_ref: &ProcedureRef,
        out: &mut CallSiteMatches,
    ) {
        for edge in &proc_ref.references {
            out.references_scanned += 1;
            match resolve_edge(host, edge) {
                EdgeSymbol::Named(symbol) => {
                    if let Some(sig) = self.catalog.lookup(&symbol) {
                        out.findings.push(CallFinding {
                            address: edge.address,
                            caller: proc_ref.caller(),
                            signature: sig.clone(),
                        });
                    }
                }
                EdgeSymbol::Unresolved => {
                    out.unresolved += 1;
                    debug!(
                        "Unresolved reference at 0x{:X} in {}; skipping",
                        edge.address,
                        proc_ref.caller()
                    );
                }
                EdgeSymbol::Malformed(reason) => {
                    warn!(
                        "Skipping malformed reference at 0x{:X} in {}: {reason}",
                        edge.address,
                        proc_ref.caller()
                    );
                    out.diagnostics.push(Diagnostic {
                        address: edge.address,
                        kind: DiagnosticKind::MalformedReference,
                        reason: reason.to_string(),
                    });
                }
            }
        }
    }
}

fn resolve_edge<H: DisassemblyHost + ?Sized>(host: &H, edge: &ReferenceEdge) -> EdgeSymbol {
    if edge.address == 0 {
        return EdgeSymbol::Malformed("reference has no source address");
    }
    if let Some(raw) = &edge.symbol {
        let name = normalize_symbol_name(raw);
        return if name.is_empty() {
            EdgeSymbol::Malformed("reference names an empty symbol")
        } else {
            EdgeSymbol::Named(name)
        };
    }
    match edge.target.and_then(|target| host.resolve_reference_symbol(target)) {
        Some(raw) => {
            let name = normalize_symbol_name(&raw);
            if name.is_empty() {
                EdgeSymbol::Malformed("host resolved target to an empty symbol")
            } else {
                EdgeSymbol::Named(name)
            }
        }
        None => EdgeSymbol::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::HostError;
    use crate::model::{NetworkCategory, RawString};

    struct MapHost {
        symbols: HashMap<u64, String>,
    }

    impl DisassemblyHost for MapHost {
        fn name(&self) -> &str {
            "map"
        }
        fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError> {
            Ok(vec![])
        }
        fn list_strings(&self) -> Result<Vec<RawString>, HostError> {
            Ok(vec![])
        }
        fn resolve_reference_symbol(&self, address: u64) -> Option<String> {
            self.symbols.get(&address).cloned()
        }
    }

    fn host() -> MapHost {
        MapHost {
            symbols: HashMap::from([
                (0x9000, "_connect".to_string()),
                (0x9100, "memcpy".to_string()),
                (0x9200, "   ".to_string()),
            ]),
        }
    }

    #[test]
    fn named_and_resolved_edges_produce_findings() {
        let catalog = SignatureCatalog::builtin();
        let proc_ref = ProcedureRef::new(0x1000, Some("net_init".into()))
            .with_reference(ReferenceEdge::to_symbol(0x1004, "sym.imp.socket"))
            .with_reference(ReferenceEdge::to_target(0x1008, 0x9000))
            .with_reference(ReferenceEdge::to_target(0x100C, 0x9100));

        let out = CallSiteMatcher::new(&catalog).match_procedures(&host(), &[proc_ref]);
        let symbols: Vec<_> = out.findings.iter().map(|f| f.signature.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["socket", "connect"]);
        assert_eq!(out.findings[0].address, 0x1004);
        assert_eq!(out.findings[0].caller.name.as_deref(), Some("net_init"));
        assert_eq!(out.findings[1].signature.category, NetworkCategory::SocketRaw);
        assert_eq!(out.references_scanned, 3);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn unresolved_edges_are_counted_not_reported() {
        let catalog = SignatureCatalog::builtin();
        let proc_ref = ProcedureRef::new(0x2000, None)
            .with_reference(ReferenceEdge { address: 0x2004, target: None, symbol: None })
            .with_reference(ReferenceEdge::to_target(0x2008, 0xDEAD));
        let out = CallSiteMatcher::new(&catalog).match_procedures(&host(), &[proc_ref]);
        assert!(out.findings.is_empty());
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.unresolved, 2);
    }

    #[test]
    fn malformed_edges_are_skipped_with_diagnostics() {
        let catalog = SignatureCatalog::builtin();
        let proc_ref = ProcedureRef::new(0x3000, None)
            .with_reference(ReferenceEdge::to_symbol(0x3004, ""))
            .with_reference(ReferenceEdge::to_symbol(0, "socket"))
            .with_reference(ReferenceEdge::to_target(0x300C, 0x9200))
            .with_reference(ReferenceEdge::to_symbol(0x3010, "send"));
        let out = CallSiteMatcher::new(&catalog).match_procedures(&host(), &[proc_ref]);
        assert_eq!(out.diagnostics.len(), 3);
        assert!(out.diagnostics.iter().all(|d| d.kind == DiagnosticKind::MalformedReference));
        assert_eq!(out.findings.len(), 1, "run continues past malformed edges");
        assert_eq!(out.findings[0].signature.symbol, "send");
    }
}
