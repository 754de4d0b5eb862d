use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use netsurface::{canonicalize_or_current, default_host_for, sha256_file};
use netsurface_core::db::AnnotationDb;
use netsurface_core::host::{BinaryDocument, DisassemblyHost};
use netsurface_core::model::AnalysisReport;
use netsurface_core::report::render_text;
use netsurface_core::services::analysis::{
    AnalysisOptions, AnnotationOutcome, CancellationToken, NetworkAnalyzer, NoProgress,
    ProgressSink,
};
use netsurface_core::services::hosts::{default_host_registry, Annotated, HostRequest, SnapshotHost};
use serde::Serialize;

use crate::commands::{emit, load_catalog};

/// Everything `analyze` needs, as parsed from the command line.
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub input: String,
    pub host: Option<String>,
    pub tool_path: Option<PathBuf>,
    pub arch: Option<String>,
    pub catalog: Option<PathBuf>,
    pub lenient_catalog: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub annotate_db: Option<PathBuf>,
    pub annotate_snapshot: Option<PathBuf>,
    pub sequential: bool,
    pub batch_size: usize,
    pub max_string_len: usize,
    pub quiet: bool,
}

/// JSON document emitted by `analyze --json`.
#[derive(Debug, Serialize)]
pub struct AnalysisRecord {
    pub input: String,
    pub sha256: String,
    pub report: AnalysisReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<AnnotationOutcome>,
}

/// Run the detection engine over one input and emit the report.
pub fn analyze_command(args: &AnalyzeArgs) -> Result<()> {
    if args.annotate_db.is_some() && args.annotate_snapshot.is_some() {
        bail!("--annotate-db and --annotate-snapshot are mutually exclusive");
    }
    let input = canonicalize_or_current(&args.input)?;
    if !input.is_file() {
        bail!("Input not found: {}", input.display());
    }
    let sha256 = sha256_file(&input)?;
    let catalog = load_catalog(args.catalog.as_deref(), args.lenient_catalog)?;

    let registry = default_host_registry();
    let host_name = args.host.clone().unwrap_or_else(|| default_host_for(&input, &registry.names()));
    let request = HostRequest {
        input: input.clone(),
        tool_path: args.tool_path.clone(),
        arch: args.arch.clone(),
    };

    let analyzer = NetworkAnalyzer::new(
        &catalog,
        AnalysisOptions {
            batch_size: args.batch_size,
            max_string_len: args.max_string_len,
            parallel: !args.sequential,
            generated_at: None,
        },
    );
    let show_progress = !args.quiet && !args.json;

    let (report, annotations) = if let Some(out_path) = &args.annotate_snapshot {
        if host_name != "snapshot" {
            bail!("--annotate-snapshot needs the snapshot host (got '{host_name}')");
        }
        let doc = BinaryDocument::new(SnapshotHost::open(&input)?);
        let report = run_with_progress(&analyzer, &doc, show_progress)?;
        let outcome = analyzer.annotate(&doc, &report)?;
        doc.into_inner()?
            .save(out_path)
            .with_context(|| format!("Failed to write annotated snapshot {}", out_path.display()))?;
        info!("Annotated snapshot written to {}", out_path.display());
        (report, Some(outcome))
    } else {
        let host = registry
            .open(&host_name, &request)
            .with_context(|| format!("Failed to open {} with host '{host_name}'", input.display()))?;
        match &args.annotate_db {
            Some(db_path) => {
                let db = AnnotationDb::open(db_path).with_context(|| {
                    format!("Failed to open annotation database {}", db_path.display())
                })?;
                let doc = BinaryDocument::new(Annotated::new(host, db));
                let report = run_with_progress(&analyzer, &doc, show_progress)?;
                let outcome = analyzer.annotate(&doc, &report)?;
                (report, Some(outcome))
            }
            None => {
                let doc = BinaryDocument::new(host);
                (run_with_progress(&analyzer, &doc, show_progress)?, None)
            }
        }
    };

    let body = if args.json {
        let record = AnalysisRecord {
            input: input.display().to_string(),
            sha256,
            report,
            annotations,
        };
        let mut body = serde_json::to_string_pretty(&record)?;
        body.push('\n');
        body
    } else {
        let mut body = format!("Input: {} (sha256 {sha256})\n", input.display());
        body.push_str(&render_text(&report));
        if let Some(outcome) = &annotations {
            body.push_str(&describe_annotations(outcome));
        }
        body
    };
    emit(&body, args.output.as_deref())
}

fn run_with_progress<H: DisassemblyHost>(
    analyzer: &NetworkAnalyzer<'_>,
    doc: &BinaryDocument<H>,
    show_progress: bool,
) -> Result<AnalysisReport> {
    let cancel = CancellationToken::new();
    if !show_progress {
        return Ok(analyzer.analyze(doc, &cancel, &NoProgress)?);
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_err(|e| anyhow!("Invalid progress template: {e}"))?
            .progress_chars("=>-"),
    );
    pb.set_message("Scanning procedures and strings");
    let sink = |_fraction: f64, processed: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(processed as u64);
    };
    let result = analyzer.analyze(doc, &cancel, &sink as &dyn ProgressSink);
    pb.finish_and_clear();
    Ok(result?)
}

fn describe_annotations(outcome: &AnnotationOutcome) -> String {
    let mut out = format!(
        "\nAnnotations: {} written, {} skipped, {} failed\n",
        outcome.written,
        outcome.skipped,
        outcome.failures.len()
    );
    for failure in &outcome.failures {
        out.push_str(&format!("- 0x{:08X}  {}\n", failure.address, failure.reason));
    }
    out
}
