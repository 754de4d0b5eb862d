use std::sync::Mutex;

use log::debug;

use crate::db::{AnnotationDb, AnnotationRecord, DbResult};
use crate::error::HostError;
use crate::host::DisassemblyHost;
use crate::model::{ProcedureRef, RawString};

/// Host wrapper that records annotations in an [`AnnotationDb`].
///
/// Listing calls go to the wrapped host; annotation write-backs go to the
/// database instead, so read-only hosts (capstone, rizin) can be annotated.
#[derive(Debug)]
pub struct Annotated<H> {
    inner: H,
    db: Mutex<AnnotationDb>,
}

impl<H: DisassemblyHost> Annotated<H> {
    pub fn new(inner: H, db: AnnotationDb) -> Self {
        Self { inner, db: Mutex::new(db) }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Everything written so far, ordered by address.
    pub fn annotations(&self) -> Result<Vec<AnnotationRecord>, HostError> {
        self.with_db(|db| db.list_annotations())
    }

    pub fn into_parts(self) -> (H, Option<AnnotationDb>) {
        (self.inner, self.db.into_inner().ok())
    }

    fn with_db<T>(&self, f: impl FnOnce(&AnnotationDb) -> DbResult<T>) -> Result<T, HostError> {
        let db = self.db.lock().map_err(|_| HostError::new("annotation store lock poisoned"))?;
        f(&db).map_err(|e| HostError::new(e.to_string()))
    }
}

impl<H: DisassemblyHost> DisassemblyHost for Annotated<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError> {
        self.inner.list_procedures()
    }

    fn list_strings(&self) -> Result<Vec<RawString>, HostError> {
        self.inner.list_strings()
    }

    fn resolve_reference_symbol(&self, address: u64) -> Option<String> {
        self.inner.resolve_reference_symbol(address)
    }

    fn supports_annotation(&self) -> bool {
        true
    }

    fn annotate(&mut self, address: u64, text: &str) -> Result<(), HostError> {
        let inserted = self.with_db(|db| db.insert_annotation(address, text))?;
        if !inserted {
            debug!("Annotation at 0x{address:X} already stored");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Listing;

    impl DisassemblyHost for Listing {
        fn name(&self) -> &str {
            "listing"
        }

        fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError> {
            Ok(vec![ProcedureRef::new(0x1000, Some("main".into()))])
        }

        fn list_strings(&self) -> Result<Vec<RawString>, HostError> {
            Ok(vec![RawString::text(0x2000, "http://a.example")])
        }

        fn resolve_reference_symbol(&self, address: u64) -> Option<String> {
            (address == 0x9000).then(|| "connect".to_string())
        }
    }

    #[test]
    fn delegates_listings_and_adds_annotation_support() {
        let inner = Listing;
        assert!(!inner.supports_annotation());

        let host = Annotated::new(Listing, AnnotationDb::open_in_memory().unwrap());
        assert!(host.supports_annotation());
        assert_eq!(host.name(), "listing");
        assert_eq!(host.list_procedures().unwrap().len(), 1);
        assert_eq!(host.list_strings().unwrap()[0].address, 0x2000);
        assert_eq!(host.resolve_reference_symbol(0x9000).as_deref(), Some("connect"));
    }

    #[test]
    fn annotations_land_in_the_store_once() {
        let mut host = Annotated::new(Listing, AnnotationDb::open_in_memory().unwrap());
        host.annotate(0x1004, "[netsurface] SocketRaw: call to socket").unwrap();
        host.annotate(0x1004, "[netsurface] SocketRaw: call to socket").unwrap();
        host.annotate(0x2000, "[netsurface] URL literal http://a.example").unwrap();

        let notes = host.annotations().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].address, 0x1004);
    }
}
