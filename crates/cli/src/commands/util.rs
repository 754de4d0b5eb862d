use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use netsurface_core::catalog::{load_catalog_config, SignatureCatalog};

/// Built-in catalog, extended with `path` when given.
///
/// Strict loading turns the first duplicate symbol into an error; lenient
/// loading keeps the first entry and logs each conflict.
pub fn load_catalog(path: Option<&Path>, lenient: bool) -> Result<SignatureCatalog> {
    let Some(path) = path else {
        return Ok(SignatureCatalog::builtin());
    };
    let config = load_catalog_config(path)?;
    let catalog = SignatureCatalog::with_extension(&config, !lenient)
        .with_context(|| format!("Failed to extend catalog from {}", path.display()))?;
    info!("Loaded catalog {} ({} signatures)", catalog.version(), catalog.len());
    Ok(catalog)
}

/// Write `body` to `path`, or print it when no path is given.
pub fn emit(body: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, body)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{body}"),
    }
    Ok(())
}
