//! SQLite annotation store.
//!
//! Hosts without a native annotation API can still receive write-backs by
//! being wrapped in [`crate::services::hosts::Annotated`], which records each
//! annotation here. The store keeps:
//! - `AnnotationDb`: a small SQLite wrapper with `PRAGMA user_version` migrations.
//! - `AnnotationRecord`: one `(address, text)` row.

pub mod annotation_db;
pub mod models;

pub use annotation_db::{AnnotationDb, DbError, DbResult, CURRENT_SCHEMA_VERSION};
pub use models::AnnotationRecord;
