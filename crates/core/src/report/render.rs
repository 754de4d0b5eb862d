use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::{AnalysisReport, Evidence, LiteralFinding};

/// Prefix of every annotation the engine writes, so write-backs are easy to spot.
pub const ANNOTATION_PREFIX: &str = "[netsurface]";

/// Console rendering of a report.
pub fn render_text(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let status = if report.complete { "complete" } else { "partial (cancelled)" };
    let _ = writeln!(out, "Network surface report ({status})");
    let _ = writeln!(out, "  Host: {}", report.host);
    let _ = writeln!(out, "  Catalog: {}", report.catalog_version);
    let _ = writeln!(out, "  Generated: {}", report.generated_at.to_rfc3339());
    let s = &report.stats;
    let _ = writeln!(
        out,
        "  Scanned: {}/{} procedures, {}/{} strings, {} references ({} unresolved)",
        s.procedures_scanned,
        s.procedures_total,
        s.strings_scanned,
        s.strings_total,
        s.references_scanned,
        s.unresolved_references
    );

    if !report.has_network_activity() {
        let _ = writeln!(out, "\nNo network activity detected.");
    }

    if !report.findings.is_empty() {
        let _ = writeln!(out, "\nConclusions:");
        for conclusion in report.findings.values() {
            let _ = writeln!(
                out,
                "- {} (confidence {:.2}, {} evidence)",
                conclusion.category,
                conclusion.confidence,
                conclusion.evidence.len()
            );
            for evidence in &conclusion.evidence {
                let _ = writeln!(out, "    0x{:08X}  {}", evidence.address(), describe_evidence(evidence));
            }
        }
    }

    if !report.transports.is_empty() {
        let names: Vec<String> = report.transports.iter().map(|t| t.to_string()).collect();
        let _ = writeln!(out, "\nTransports: {}", names.join(", "));
    }

    write_literals(&mut out, "URLs", &report.urls);
    write_literals(&mut out, "IP addresses", &report.ip_addresses);

    if !report.procedures.is_empty() {
        let _ = writeln!(out, "\nNetwork procedures:");
        for proc_sum in &report.procedures {
            let cats: Vec<&str> = proc_sum.categories.iter().map(|c| c.label()).collect();
            let name = proc_sum.name.clone().unwrap_or_else(|| format!("sub_{:X}", proc_sum.address));
            let _ = writeln!(
                out,
                "- 0x{:08X}  {name}: {} ({} calls)",
                proc_sum.address,
                cats.join(", "),
                proc_sum.call_count
            );
        }
    }

    if !report.diagnostics.is_empty() {
        let _ = writeln!(out, "\nSkipped items: {}", report.diagnostics.len());
        for diag in &report.diagnostics {
            let _ = writeln!(out, "- 0x{:08X}  {:?}: {}", diag.address, diag.kind, diag.reason);
        }
    }

    out
}

fn write_literals(out: &mut String, title: &str, literals: &[LiteralFinding]) {
    if literals.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}:");
    for lit in literals {
        let _ = writeln!(out, "- 0x{:08X}  {} {}", lit.address, lit.kind, lit.value);
    }
}

fn describe_evidence(evidence: &Evidence) -> String {
    match evidence {
        Evidence::Call(call) => format!(
            "call {} in {} [{}]",
            call.signature.symbol, call.caller, call.signature.family
        ),
        Evidence::Literal(lit) => format!("{} literal {}", lit.kind, lit.value),
    }
}

/// One annotation per evidence or literal address, in ascending address order.
///
/// Categories concluded at the same address are merged into one text.
pub fn annotation_entries(report: &AnalysisReport) -> Vec<(u64, String)> {
    let mut by_address: BTreeMap<u64, (Vec<&str>, String)> = BTreeMap::new();
    for conclusion in report.findings.values() {
        for evidence in &conclusion.evidence {
            let entry = by_address
                .entry(evidence.address())
                .or_insert_with(|| (Vec::new(), subject(evidence)));
            entry.0.push(conclusion.category.label());
        }
    }
    for lit in report.urls.iter().chain(report.ip_addresses.iter()) {
        by_address
            .entry(lit.address)
            .or_insert_with(|| (Vec::new(), format!("{} literal {}", lit.kind, lit.value)));
    }

    by_address
        .into_iter()
        .map(|(address, (labels, subject))| {
            let text = if labels.is_empty() {
                format!("{ANNOTATION_PREFIX} {subject}")
            } else {
                format!("{ANNOTATION_PREFIX} {}: {subject}", labels.join(", "))
            };
            (address, text)
        })
        .collect()
}

fn subject(evidence: &Evidence) -> String {
    match evidence {
        Evidence::Call(call) => format!("call to {}", call.signature.symbol),
        Evidence::Literal(lit) => format!("{} literal {}", lit.kind, lit.value),
    }
}
