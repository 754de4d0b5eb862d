//! Analysis orchestrator: one entry point per user action.
//!
//! Sequence: take the document read lock, list procedures and strings, run
//! the call-site and literal matchers (optionally in parallel), aggregate,
//! release the lock. Annotation write-back is a separate phase under the
//! write lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::{
    CallSiteMatcher, CallSiteMatches, LiteralMatcher, LiteralMatches, RawFindings,
    DEFAULT_MAX_STRING_LEN,
};
use crate::catalog::SignatureCatalog;
use crate::error::{EngineError, EngineResult};
use crate::host::{BinaryDocument, DisassemblyHost};
use crate::model::{AnalysisReport, ProcedureRef, RawString, ScanStats};
use crate::report::{annotation_entries, ReportAggregator};

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Options for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Procedures/strings processed between cancellation checks.
    pub batch_size: usize,
    /// Strings longer than this (in characters) are truncated before matching.
    pub max_string_len: usize,
    /// Run the literal matcher on a worker thread.
    pub parallel: bool,
    /// Pin the report timestamp (reproducible output).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            parallel: true,
            generated_at: None,
        }
    }
}

/// Cooperative cancellation flag shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Receives progress as `processed / total` in `0.0..=1.0`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64, processed: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, usize, usize) + Send + Sync,
{
    fn report(&self, fraction: f64, processed: usize, total: usize) {
        self(fraction, processed, total)
    }
}

/// Sink that ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64, _processed: usize, _total: usize) {}
}

/// Serializes progress from both matcher threads so observers see a
/// non-decreasing fraction.
struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    total: usize,
    processed: Mutex<usize>,
}

impl<'a> ProgressTracker<'a> {
    fn new(sink: &'a dyn ProgressSink, total: usize) -> Self {
        Self { sink, total, processed: Mutex::new(0) }
    }

    fn advance(&self, items: usize) {
        let mut processed = match self.processed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *processed += items;
        let fraction = if self.total == 0 { 1.0 } else { *processed as f64 / self.total as f64 };
        self.sink.report(fraction.min(1.0), *processed, self.total);
    }
}

/// A single address whose annotation could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationFailure {
    pub address: u64,
    pub reason: String,
}

/// Result of the annotation phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationOutcome {
    pub written: usize,
    /// Entries not attempted because the host cannot annotate.
    pub skipped: usize,
    pub failures: Vec<AnnotationFailure>,
}

/// Drives the matchers, inference and aggregation for one document.
pub struct NetworkAnalyzer<'c> {
    catalog: &'c SignatureCatalog,
    options: AnalysisOptions,
}

struct ScanOutcome<T> {
    matches: T,
    scanned: usize,
    finished: bool,
}

impl<'c> NetworkAnalyzer<'c> {
    pub fn new(catalog: &'c SignatureCatalog, options: AnalysisOptions) -> Self {
        Self { catalog, options }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Run a full analysis pass over `document`.
    ///
    /// Fails only when the host cannot list its procedures or strings. A
    /// cancelled run returns the findings of every batch finished before the
    /// cancellation was observed, with `complete == false`.
    pub fn analyze<H: DisassemblyHost>(
        &self,
        document: &BinaryDocument<H>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> EngineResult<AnalysisReport> {
        let literal_matcher = LiteralMatcher::with_max_len(self.options.max_string_len)?;
        let host = document.read()?;
        let host_name = host.name().to_string();

        let procedures =
            host.list_procedures().map_err(|e| EngineError::host_unavailable(&host_name, e))?;
        let strings = host.list_strings().map_err(|e| EngineError::host_unavailable(&host_name, e))?;
        info!(
            "Analyzing {} procedures and {} strings from host '{}'",
            procedures.len(),
            strings.len(),
            host_name
        );

        let tracker = ProgressTracker::new(progress, procedures.len() + strings.len());
        let call_matcher = CallSiteMatcher::new(self.catalog);
        let batch = self.options.batch_size.max(1);

        let (calls, literals) = if self.options.parallel {
            thread::scope(|scope| {
                let worker = scope.spawn(|| {
                    scan_strings(&literal_matcher, &strings, batch, cancel, &tracker)
                });
                let calls = scan_procedures(&call_matcher, &*host, &procedures, batch, cancel, &tracker);
                match worker.join() {
                    Ok(literals) => (calls, literals),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            })
        } else {
            let calls = scan_procedures(&call_matcher, &*host, &procedures, batch, cancel, &tracker);
            let literals = scan_strings(&literal_matcher, &strings, batch, cancel, &tracker);
            (calls, literals)
        };
        drop(host);

        let complete = calls.finished && literals.finished;
        if !complete {
            warn!(
                "Analysis cancelled after {}/{} procedures and {}/{} strings",
                calls.scanned,
                procedures.len(),
                literals.scanned,
                strings.len()
            );
        } else if tracker.total == 0 {
            tracker.advance(0);
        }

        let stats = ScanStats {
            procedures_total: procedures.len(),
            procedures_scanned: calls.scanned,
            strings_total: strings.len(),
            strings_scanned: literals.scanned,
            references_scanned: calls.matches.references_scanned,
            unresolved_references: calls.matches.unresolved,
        };
        let mut diagnostics = calls.matches.diagnostics;
        diagnostics.extend(literals.matches.diagnostics);

        let generated_at = self.options.generated_at.unwrap_or_else(Utc::now);
        let aggregator = ReportAggregator::new(host_name, self.catalog.version(), generated_at);
        let report = aggregator.aggregate(
            RawFindings::new(calls.matches.findings, literals.matches.findings),
            diagnostics,
            stats,
            complete,
        );
        info!(
            "Analysis finished: {} conclusions, {} URLs, {} IP addresses, {} skipped items",
            report.findings.len(),
            report.urls.len(),
            report.ip_addresses.len(),
            report.diagnostics.len()
        );
        Ok(report)
    }

    /// Write one annotation per finding address back into the document.
    ///
    /// Takes the write lock, so it must run after `analyze` returned. Failed
    /// writes are collected, never propagated.
    pub fn annotate<H: DisassemblyHost>(
        &self,
        document: &BinaryDocument<H>,
        report: &AnalysisReport,
    ) -> EngineResult<AnnotationOutcome> {
        let entries = annotation_entries(report);
        let mut host = document.write()?;
        let mut outcome = AnnotationOutcome::default();

        if !host.supports_annotation() {
            warn!(
                "Host '{}' does not support annotations; skipping {} entries",
                host.name(),
                entries.len()
            );
            outcome.skipped = entries.len();
            return Ok(outcome);
        }

        for (address, text) in entries {
            match host.annotate(address, &text) {
                Ok(()) => outcome.written += 1,
                Err(err) => {
                    let err = EngineError::AnnotationWriteFailure { address, reason: err.to_string() };
                    warn!("{err}");
                    outcome.failures.push(AnnotationFailure { address, reason: err.to_string() });
                }
            }
        }
        info!("Wrote {} annotations ({} failed)", outcome.written, outcome.failures.len());
        Ok(outcome)
    }
}

fn scan_procedures<H: DisassemblyHost + ?Sized>(
    matcher: &CallSiteMatcher<'_>,
    host: &H,
    procedures: &[ProcedureRef],
    batch: usize,
    cancel: &CancellationToken,
    tracker: &ProgressTracker<'_>,
) -> ScanOutcome<CallSiteMatches> {
    let mut out = ScanOutcome { matches: CallSiteMatches::default(), scanned: 0, finished: true };
    for chunk in procedures.chunks(batch) {
        if cancel.is_cancelled() {
            out.finished = false;
            break;
        }
        out.matches.merge(matcher.match_procedures(host, chunk));
        out.scanned += chunk.len();
        tracker.advance(chunk.len());
    }
    out
}

fn scan_strings(
    matcher: &LiteralMatcher,
    strings: &[RawString],
    batch: usize,
    cancel: &CancellationToken,
    tracker: &ProgressTracker<'_>,
) -> ScanOutcome<LiteralMatches> {
    let mut out = ScanOutcome { matches: LiteralMatches::default(), scanned: 0, finished: true };
    for chunk in strings.chunks(batch) {
        if cancel.is_cancelled() {
            out.finished = false;
            break;
        }
        out.matches.merge(matcher.match_strings(chunk));
        out.scanned += chunk.len();
        tracker.advance(chunk.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::model::ReferenceEdge;

    struct Fixed {
        procedures: Vec<ProcedureRef>,
        strings: Vec<RawString>,
    }

    impl DisassemblyHost for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError> {
            Ok(self.procedures.clone())
        }
        fn list_strings(&self) -> Result<Vec<RawString>, HostError> {
            Ok(self.strings.clone())
        }
        fn resolve_reference_symbol(&self, _address: u64) -> Option<String> {
            None
        }
    }

    #[test]
    fn cancellation_token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn empty_host_reports_full_progress() {
        let doc = BinaryDocument::new(Fixed { procedures: vec![], strings: vec![] });
        let seen = Mutex::new(Vec::new());
        let sink = |f: f64, _: usize, _: usize| seen.lock().unwrap().push(f);
        let report = NetworkAnalyzer::new(SignatureCatalog::global(), AnalysisOptions::default())
            .analyze(&doc, &CancellationToken::new(), &sink)
            .expect("analyze");
        assert!(report.complete);
        assert_eq!(seen.into_inner().unwrap(), vec![1.0]);
    }

    #[test]
    fn pre_cancelled_run_is_empty_and_incomplete() {
        let doc = BinaryDocument::new(Fixed {
            procedures: vec![ProcedureRef::new(0x10, None)
                .with_reference(ReferenceEdge::to_symbol(0x14, "socket"))],
            strings: vec![RawString::text(0x20, "http://a.example")],
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = NetworkAnalyzer::new(SignatureCatalog::global(), AnalysisOptions::default())
            .analyze(&doc, &cancel, &NoProgress)
            .expect("analyze");
        assert!(!report.complete);
        assert!(report.findings.is_empty());
        assert_eq!(report.stats.procedures_scanned, 0);
        assert_eq!(report.stats.procedures_total, 1);
    }

    #[test]
    fn annotating_unsupported_host_skips_entries() {
        let doc = BinaryDocument::new(Fixed {
            procedures: vec![ProcedureRef::new(0x10, None)
                .with_reference(ReferenceEdge::to_symbol(0x14, "connect"))],
            strings: vec![],
        });
        let analyzer = NetworkAnalyzer::new(SignatureCatalog::global(), AnalysisOptions::default());
        let report = analyzer.analyze(&doc, &CancellationToken::new(), &NoProgress).unwrap();
        let outcome = analyzer.annotate(&doc, &report).unwrap();
        assert_eq!(outcome, AnnotationOutcome { written: 0, skipped: 1, failures: vec![] });
    }
}
