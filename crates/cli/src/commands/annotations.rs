use std::path::Path;

use anyhow::{bail, Context, Result};

use netsurface_core::db::AnnotationDb;

/// Print the annotations stored by `analyze --annotate-db`.
pub fn annotations_command(db_path: &Path, json: bool) -> Result<()> {
    if !db_path.is_file() {
        bail!("Annotation database not found: {}", db_path.display());
    }
    let db = AnnotationDb::open(db_path)
        .with_context(|| format!("Failed to open annotation database {}", db_path.display()))?;
    let records = db.list_annotations()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("Annotations: (none)");
        return Ok(());
    }

    println!("Annotations:");
    for record in records {
        println!("- 0x{:08X}  {}", record.address, record.text);
    }

    Ok(())
}
