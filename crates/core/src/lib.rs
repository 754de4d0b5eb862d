//! netsurface-core
//!
//! Detection engine that surfaces the network-facing parts of a disassembled
//! native binary: calls into socket, HTTP, WebSocket, TLS and DNS APIs, and
//! embedded URL / IP literals, folded into per-protocol conclusions.
//!
//! The engine never parses containers or disassembles on its own. A host
//! (see [`host::DisassemblyHost`]) supplies procedures, reference edges and a
//! string table; [`services::analysis::NetworkAnalyzer`] runs the matchers,
//! inference and aggregation over it and returns an
//! [`model::AnalysisReport`].
//!
//! All substantive logic lives here so it is testable and reusable from
//! multiple frontends (the `netsurface` CLI, disassembler plugins, ...).

pub mod analysis;
pub mod catalog;
pub mod db;
pub mod error;
pub mod host;
pub mod model;
pub mod report;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
