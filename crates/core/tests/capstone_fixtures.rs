#![cfg(feature = "capstone-backend")]

use netsurface_core::catalog::SignatureCatalog;
use netsurface_core::host::{BinaryDocument, DisassemblyHost};
use netsurface_core::model::{Evidence, NetworkCategory};
use netsurface_core::services::analysis::{
    AnalysisOptions, CancellationToken, NetworkAnalyzer, NoProgress,
};
use netsurface_core::services::hosts::{default_host_registry, CapstoneHost, HostRequest};
use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

fn text_symbol(name: &str, value: u64, size: u64, section: object::write::SectionId) -> Symbol {
    Symbol {
        name: name.as_bytes().to_vec(),
        value,
        size,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(section),
        flags: SymbolFlags::None,
    }
}

/// Relocatable x86_64 ELF: `main` at 0x10 calls `socket` at 0x20, and
/// `.rodata` carries an https URL.
fn build_elf_fixture() -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);

    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    let mut code = vec![0x90u8; 16];
    // call rel32 -> 0x15 + 0x0b = 0x20
    code.extend_from_slice(&[0xE8, 0x0B, 0x00, 0x00, 0x00]);
    code.extend(std::iter::repeat(0x90u8).take(11));
    code.push(0xC3);
    obj.section_mut(text_id).set_data(code, 16);

    let ro_id = obj.add_section(Vec::new(), b".rodata".to_vec(), SectionKind::ReadOnlyData);
    obj.section_mut(ro_id).append_data(b"\0\0\0\0\0\0\0\0https://api.example.com\0", 1);

    obj.add_symbol(text_symbol("main", 0x10, 0x10, text_id));
    obj.add_symbol(text_symbol("socket", 0x20, 1, text_id));

    obj.write().expect("write elf fixture")
}

#[test]
fn capstone_host_lists_symbols_calls_and_strings_from_elf() {
    let host = CapstoneHost::from_bytes(&build_elf_fixture(), None).expect("elf host");
    assert_eq!(host.format(), "elf");
    assert_eq!(host.arch(), "x86_64");

    let procs = host.list_procedures().unwrap();
    let main = procs.iter().find(|p| p.name.as_deref() == Some("main")).expect("main");
    assert_eq!(main.address, 0x10);
    assert_eq!(main.references.len(), 1);
    assert_eq!(main.references[0].address, 0x10);
    assert_eq!(main.references[0].target, Some(0x20));
    assert_eq!(host.resolve_reference_symbol(0x20).as_deref(), Some("socket"));

    let strings = host.list_strings().unwrap();
    assert!(
        strings.iter().any(|s| s.address == 8 && s.bytes == b"https://api.example.com"),
        "expected the URL from .rodata, got {strings:?}"
    );
}

#[test]
fn capstone_host_feeds_the_analyzer_through_the_registry() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("fixture.o");
    std::fs::write(&path, build_elf_fixture()).unwrap();

    let host = default_host_registry()
        .open("capstone", &HostRequest::new(&path))
        .expect("open capstone host");
    let doc = BinaryDocument::new(host);
    let report = NetworkAnalyzer::new(SignatureCatalog::global(), AnalysisOptions::default())
        .analyze(&doc, &CancellationToken::new(), &NoProgress)
        .unwrap();

    let socket = report.conclusion(NetworkCategory::SocketRaw).expect("socket call");
    assert_eq!(socket.evidence.iter().map(Evidence::address).collect::<Vec<_>>(), vec![0x10]);
    assert!(report.conclusion(NetworkCategory::TlsHandshake).is_some());
    assert_eq!(report.urls.len(), 1);
    assert_eq!(report.host, "capstone");
}

#[test]
fn unrecognised_input_is_treated_as_raw_code() {
    let host = CapstoneHost::from_bytes(&[0x55, 0x48, 0x89, 0xE5, 0xC3], Some("x86_64")).unwrap();
    assert_eq!(host.format(), "raw");
    assert_eq!(host.list_procedures().unwrap().len(), 1);
}
