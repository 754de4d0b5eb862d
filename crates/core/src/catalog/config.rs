use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogError;
use crate::model::{ApiFamily, NetworkCategory, SocketTransport, SymbolSignature};

/// Catalog extension document (YAML or JSON).
///
/// ```yaml
/// version: "acme-1"
/// signatures:
///   - symbol: acme_http_get
///     category: http_client
///     family: c_socket
///     confidence: 0.8
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub signatures: Vec<SignatureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub symbol: String,
    pub category: NetworkCategory,
    pub family: ApiFamily,
    pub confidence: f64,
    #[serde(default)]
    pub transport: Option<SocketTransport>,
}

impl SignatureEntry {
    pub fn to_signature(&self) -> Result<SymbolSignature, CatalogError> {
        if self.symbol.trim().is_empty() {
            return Err(CatalogError::InvalidEntry {
                symbol: self.symbol.clone(),
                reason: "symbol name is empty".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(CatalogError::InvalidEntry {
                symbol: self.symbol.clone(),
                reason: format!("confidence {} outside 0..=1", self.confidence),
            });
        }
        Ok(SymbolSignature {
            symbol: self.symbol.clone(),
            category: self.category,
            family: self.family,
            confidence: self.confidence,
            transport: self.transport,
        })
    }
}

/// Read an extension document; `.json` files parse as JSON, everything else as YAML.
pub fn load_catalog_config(path: &Path) -> Result<CatalogConfig, CatalogError> {
    let config_err = |reason: String| CatalogError::Config { path: path.display().to_string(), reason };
    let body = std::fs::read(path).map_err(|e| config_err(e.to_string()))?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_slice(&body).map_err(|e| config_err(e.to_string()))
    } else {
        serde_yaml::from_slice(&body).map_err(|e| config_err(e.to_string()))
    }
}
