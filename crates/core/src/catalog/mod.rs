//! Signature catalog: API symbol name -> network category and weight.
//!
//! The catalog is a plain immutable map built once (built-in table, then any
//! configured extensions) and shared read-only by every analysis run. Lookup
//! is a case-sensitive exact match on the display name; there is no prefix or
//! substring matching.

mod builtin;
mod config;

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use log::error;
use thiserror::Error;

use crate::model::{NetworkCategory, SymbolSignature};

pub use builtin::{builtin_signatures, BUILTIN_CATALOG_VERSION};
pub use config::{load_catalog_config, CatalogConfig, SignatureEntry};

/// Errors raised while building or extending the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Two entries registered the same symbol name.
    #[error(
        "Catalog conflict: symbol '{symbol}' already registered ({existing}), rejected duplicate ({rejected})"
    )]
    Conflict { symbol: String, existing: String, rejected: String },

    /// An entry failed validation.
    #[error("Invalid catalog entry '{symbol}': {reason}")]
    InvalidEntry { symbol: String, reason: String },

    /// The extension document could not be read or parsed.
    #[error("Failed to load catalog config {path}: {reason}")]
    Config { path: String, reason: String },
}

/// A rejected duplicate registration.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConflict {
    pub existing: SymbolSignature,
    pub rejected: SymbolSignature,
}

impl CatalogConflict {
    fn into_error(self) -> CatalogError {
        CatalogError::Conflict {
            symbol: self.existing.symbol.clone(),
            existing: describe(&self.existing),
            rejected: describe(&self.rejected),
        }
    }
}

fn describe(sig: &SymbolSignature) -> String {
    format!("{} / {}", sig.family, sig.category)
}

/// Immutable symbol catalog.
#[derive(Debug, Clone)]
pub struct SignatureCatalog {
    version: String,
    by_symbol: HashMap<String, SymbolSignature>,
    /// Symbols in registration order, for listings.
    order: Vec<String>,
}

impl SignatureCatalog {
    /// Catalog holding only the built-in table.
    pub fn builtin() -> Self {
        let mut builder = CatalogBuilder::new(BUILTIN_CATALOG_VERSION);
        builder.extend(builtin_signatures());
        // The built-in table has unique symbols; see the unit tests below.
        builder.build_lenient()
    }

    /// Process-wide built-in catalog, initialized on first use.
    pub fn global() -> &'static SignatureCatalog {
        static GLOBAL: OnceLock<SignatureCatalog> = OnceLock::new();
        GLOBAL.get_or_init(SignatureCatalog::builtin)
    }

    /// Built-in table plus a configured extension.
    ///
    /// With `strict`, the first duplicate symbol fails the load; otherwise the
    /// first-registered entry wins and each conflict is logged once.
    pub fn with_extension(config: &CatalogConfig, strict: bool) -> Result<Self, CatalogError> {
        let version = match &config.version {
            Some(v) => format!("{BUILTIN_CATALOG_VERSION}+{v}"),
            None => format!("{BUILTIN_CATALOG_VERSION}+ext"),
        };
        let mut builder = CatalogBuilder::new(version);
        builder.extend(builtin_signatures());
        for entry in &config.signatures {
            builder.add(entry.to_signature()?);
        }
        if strict {
            builder.build()
        } else {
            Ok(builder.build_lenient())
        }
    }

    pub fn lookup(&self, symbol: &str) -> Option<&SymbolSignature> {
        self.by_symbol.get(symbol)
    }

    /// Categories that at least one entry maps to.
    pub fn all_categories(&self) -> BTreeSet<NetworkCategory> {
        self.by_symbol.values().map(|sig| sig.category).collect()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in registration order.
    pub fn signatures(&self) -> impl Iterator<Item = &SymbolSignature> {
        self.order.iter().filter_map(|symbol| self.by_symbol.get(symbol))
    }
}

/// Append-only builder; first registration of a symbol wins.
#[derive(Debug)]
pub struct CatalogBuilder {
    version: String,
    by_symbol: HashMap<String, SymbolSignature>,
    order: Vec<String>,
    conflicts: Vec<CatalogConflict>,
}

impl CatalogBuilder {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            by_symbol: HashMap::new(),
            order: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn add(&mut self, signature: SymbolSignature) -> &mut Self {
        if let Some(existing) = self.by_symbol.get(&signature.symbol) {
            self.conflicts
                .push(CatalogConflict { existing: existing.clone(), rejected: signature });
        } else {
            self.order.push(signature.symbol.clone());
            self.by_symbol.insert(signature.symbol.clone(), signature);
        }
        self
    }

    pub fn extend(&mut self, signatures: impl IntoIterator<Item = SymbolSignature>) -> &mut Self {
        for sig in signatures {
            self.add(sig);
        }
        self
    }

    pub fn conflicts(&self) -> &[CatalogConflict] {
        &self.conflicts
    }

    /// Fail on the first recorded conflict.
    pub fn build(self) -> Result<SignatureCatalog, CatalogError> {
        if let Some(conflict) = self.conflicts.into_iter().next() {
            return Err(conflict.into_error());
        }
        Ok(SignatureCatalog { version: self.version, by_symbol: self.by_symbol, order: self.order })
    }

    /// Keep first-registered entries and log every conflict once.
    pub fn build_lenient(self) -> SignatureCatalog {
        for conflict in self.conflicts {
            error!("{}", conflict.into_error());
        }
        SignatureCatalog { version: self.version, by_symbol: self.by_symbol, order: self.order }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ApiFamily;

    #[test]
    fn builtin_table_has_no_duplicate_symbols() {
        let mut builder = CatalogBuilder::new("test");
        builder.extend(builtin_signatures());
        assert!(builder.conflicts().is_empty(), "conflicts: {:?}", builder.conflicts());
    }

    #[test]
    fn builtin_confidences_are_in_unit_range() {
        for sig in builtin_signatures() {
            assert!((0.0..=1.0).contains(&sig.confidence), "{} out of range", sig.symbol);
        }
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let catalog = SignatureCatalog::builtin();
        assert_eq!(catalog.lookup("socket").map(|s| s.category), Some(NetworkCategory::SocketRaw));
        assert!(catalog.lookup("Socket").is_none());
        assert!(catalog.lookup("socket_wrapper").is_none());
        assert!(catalog.lookup("sock").is_none());
    }

    #[test]
    fn builtin_covers_every_category() {
        let catalog = SignatureCatalog::builtin();
        let all: BTreeSet<_> = NetworkCategory::ALL.into_iter().collect();
        assert_eq!(catalog.all_categories(), all);
    }

    #[test]
    fn first_registration_wins_and_conflict_is_recorded() {
        let mut builder = CatalogBuilder::new("t");
        builder.add(SymbolSignature::new(
            "connect",
            NetworkCategory::SocketRaw,
            ApiFamily::CSocket,
            0.9,
        ));
        builder.add(SymbolSignature::new(
            "connect",
            NetworkCategory::HttpClient,
            ApiFamily::SwiftNetwork,
            0.4,
        ));
        assert_eq!(builder.conflicts().len(), 1);

        let catalog = builder.build_lenient();
        let sig = catalog.lookup("connect").expect("connect");
        assert_eq!(sig.family, ApiFamily::CSocket);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn strict_build_rejects_conflicts() {
        let mut builder = CatalogBuilder::new("t");
        builder.add(SymbolSignature::new("x", NetworkCategory::SocketRaw, ApiFamily::CSocket, 0.5));
        builder.add(SymbolSignature::new("x", NetworkCategory::SocketRaw, ApiFamily::CSocket, 0.5));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { ref symbol, .. } if symbol == "x"));
    }

    #[test]
    fn signatures_iterate_in_registration_order() {
        let catalog = SignatureCatalog::builtin();
        let first: Vec<_> = catalog.signatures().take(3).map(|s| s.symbol.as_str()).collect();
        assert_eq!(first, vec!["socket", "socketpair", "connect"]);
    }
}
