use netsurface_core::catalog::{SignatureCatalog, BUILTIN_CATALOG_VERSION};

#[test]
fn core_version_is_non_empty() {
    let v = netsurface_core::version();
    assert!(!v.is_empty(), "core version should not be empty");
}

#[test]
fn builtin_catalog_is_loaded_once_and_versioned() {
    let a = SignatureCatalog::global();
    let b = SignatureCatalog::global();
    assert!(std::ptr::eq(a, b));
    assert_eq!(a.version(), BUILTIN_CATALOG_VERSION);
    assert!(a.lookup("socket").is_some());
    assert!(a.lookup("Socket").is_none(), "lookup is case-sensitive");
    assert!(a.lookup("sock").is_none(), "no prefix matching");
}
