//! Matching and inference.
//!
//! - `call_site`: procedure reference edges -> catalog hits
//! - `literal`: string table -> URL / IPv4 / IPv6 findings
//! - `inference`: raw findings -> per-category protocol conclusions
//!
//! The two matchers share no state and can run on separate threads; the
//! orchestrator joins them before inference.

pub mod call_site;
pub mod inference;
pub mod literal;

pub use call_site::{CallSiteMatcher, CallSiteMatches};
pub use inference::{infer_protocols, Inference, RawFindings};
pub use literal::{Classification, LiteralMatcher, LiteralMatches, DEFAULT_MAX_STRING_LEN};
