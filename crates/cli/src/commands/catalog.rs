use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Serialize;

use netsurface_core::model::{NetworkCategory, SymbolSignature};

use crate::commands::load_catalog;

#[derive(Debug, Serialize)]
pub struct CatalogListing<'a> {
    pub version: &'a str,
    pub signatures: Vec<&'a SymbolSignature>,
}

/// Print the signature catalog, optionally filtered to one category.
pub fn catalog_command(
    catalog_path: Option<&Path>,
    lenient: bool,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let catalog = load_catalog(catalog_path, lenient)?;
    let wanted = category
        .map(|name| {
            NetworkCategory::parse(name).ok_or_else(|| {
                let known: Vec<&str> = NetworkCategory::ALL.iter().map(|c| c.key()).collect();
                anyhow!("Unknown category '{name}'. Known: {}", known.join(", "))
            })
        })
        .transpose()?;

    let signatures: Vec<&SymbolSignature> = catalog
        .signatures()
        .filter(|sig| wanted.map(|c| sig.category == c).unwrap_or(true))
        .collect();

    if json {
        let listing = CatalogListing { version: catalog.version(), signatures };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Catalog {} ({} signatures)", catalog.version(), signatures.len());
    for category in NetworkCategory::ALL {
        let in_category: Vec<&&SymbolSignature> =
            signatures.iter().filter(|sig| sig.category == category).collect();
        if in_category.is_empty() {
            continue;
        }
        println!("\n{category}:");
        for sig in in_category {
            let transport = sig.transport.map(|t| format!(", {t}")).unwrap_or_default();
            println!("- {} [{}] {:.2}{transport}", sig.symbol, sig.family, sig.confidence);
        }
    }

    Ok(())
}
