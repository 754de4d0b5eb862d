//! Report aggregation.
//!
//! Turns raw matcher output into the final [`AnalysisReport`]: duplicates are
//! dropped, every list gets a total order, and inference runs over the
//! deduplicated findings. Given the same inputs in any order the aggregator
//! returns the same report.

mod render;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::analysis::{infer_protocols, RawFindings};
use crate::model::{
    AnalysisReport, CallFinding, Diagnostic, LiteralFinding, LiteralKind, ProcedureSummary,
    ScanStats,
};

pub use render::{annotation_entries, render_text, ANNOTATION_PREFIX};

/// Report metadata fixed before aggregation starts.
#[derive(Debug, Clone)]
pub struct ReportAggregator {
    pub host: String,
    pub catalog_version: String,
    pub generated_at: DateTime<Utc>,
}

impl ReportAggregator {
    pub fn new(
        host: impl Into<String>,
        catalog_version: impl Into<String>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self { host: host.into(), catalog_version: catalog_version.into(), generated_at }
    }

    /// Build the report from everything a run produced.
    pub fn aggregate(
        &self,
        raw: RawFindings,
        mut diagnostics: Vec<Diagnostic>,
        stats: ScanStats,
        complete: bool,
    ) -> AnalysisReport {
        let calls = dedup_calls(raw.calls);
        let literals = dedup_literals(raw.literals);
        let procedures = summarize_procedures(&calls);

        let (urls, ip_addresses): (Vec<_>, Vec<_>) =
            literals.iter().cloned().partition(|lit| lit.kind == LiteralKind::Url);

        let inference = infer_protocols(&RawFindings::new(calls, literals));

        diagnostics.sort();
        diagnostics.dedup();

        AnalysisReport {
            host: self.host.clone(),
            catalog_version: self.catalog_version.clone(),
            generated_at: self.generated_at,
            complete,
            findings: inference.conclusions,
            urls,
            ip_addresses,
            transports: inference.transports,
            procedures,
            stats,
            diagnostics,
        }
    }
}

/// Keep the first finding per (address, category), ordered by address.
fn dedup_calls(mut calls: Vec<CallFinding>) -> Vec<CallFinding> {
    calls.sort_by(|a, b| {
        (a.address, a.signature.category, &a.signature.symbol).cmp(&(
            b.address,
            b.signature.category,
            &b.signature.symbol,
        ))
    });
    let mut seen = HashSet::new();
    calls.retain(|c| seen.insert((c.address, c.signature.category)));
    calls
}

/// Keep one literal per (address, kind), ordered by address. `Unknown` never
/// survives.
fn dedup_literals(mut literals: Vec<LiteralFinding>) -> Vec<LiteralFinding> {
    literals.retain(|lit| lit.kind != LiteralKind::Unknown);
    literals.sort_by(|a, b| (a.address, a.kind, &a.value).cmp(&(b.address, b.kind, &b.value)));
    let mut seen = HashSet::new();
    literals.retain(|lit| seen.insert((lit.address, lit.kind)));
    literals
}

fn summarize_procedures(calls: &[CallFinding]) -> Vec<ProcedureSummary> {
    let mut by_caller: BTreeMap<u64, ProcedureSummary> = BTreeMap::new();
    for call in calls {
        let entry = by_caller.entry(call.caller.address).or_insert_with(|| ProcedureSummary {
            address: call.caller.address,
            name: call.caller.name.clone(),
            categories: Default::default(),
            call_count: 0,
        });
        entry.categories.insert(call.signature.category);
        entry.call_count += 1;
    }
    by_caller.into_values().collect()
}
