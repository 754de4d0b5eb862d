//! Bundled host: goblin for containers, capstone for call sites.
//!
//! Everything is decoded at load time; the host keeps only plain listings so
//! it can be shared across matcher threads.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use capstone::arch::arm::ArmOperandType;
use capstone::arch::arm64::Arm64OperandType;
use capstone::arch::x86::X86OperandType;
use capstone::arch::ArchOperand;
use capstone::{arch, prelude::*, Capstone, InsnDetail, InsnGroupId, InsnGroupType};
use goblin::{elf, mach, pe, Object};
use log::{debug, warn};

use crate::error::{EngineError, HostError};
use crate::host::DisassemblyHost;
use crate::model::{ProcedureRef, RawString, ReferenceEdge};
use crate::services::hosts::{HostLoader, HostRequest};

const HOST_NAME: &str = "capstone";
const MAX_FUNCTION_INSNS: usize = 16_384;
const MIN_STRING_LEN: usize = 4;
/// x86_64 lazy-binding PLT entries.
const PLT_ENTRY_SIZE: u64 = 16;
/// Sections made of single `jmp [slot]` stubs.
const JUMP_STUB_SECTIONS: &[&str] = &["__stubs", ".plt.got"];

#[derive(Debug, Clone)]
struct FunctionRange {
    name: Option<String>,
    address: u64,
    file_range: (usize, usize),
    section: Option<usize>,
}

#[derive(Debug, Clone)]
struct SectionRange {
    name: String,
    start: u64,
    size: u64,
    file_offset: Option<usize>,
}

impl SectionRange {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.start.saturating_add(self.size)
    }

    fn bytes<'b>(&self, bytes: &'b [u8]) -> Option<&'b [u8]> {
        let start = self.file_offset?;
        let end = start.saturating_add(self.size as usize).min(bytes.len());
        (start < end).then(|| &bytes[start..end])
    }

    fn is_data(&self) -> bool {
        let n = self.name.as_str();
        n.starts_with(".rodata")
            || n.starts_with(".data")
            || n == ".rdata"
            || matches!(n, "__cstring" | "__const" | "__data")
    }
}

/// Container-level facts needed for disassembly and symbol resolution.
#[derive(Debug, Default)]
struct Layout {
    format: &'static str,
    arch: Option<String>,
    functions: Vec<FunctionRange>,
    sections: Vec<SectionRange>,
    /// Symbol names keyed by address (definitions, PLT stubs, import slots).
    names: HashMap<u64, String>,
    /// Relocation symbols keyed by (patched section, offset); object files only.
    relocs: HashMap<(usize, u64), String>,
}

/// Host built from a binary on disk.
#[derive(Debug, Clone)]
pub struct CapstoneHost {
    format: &'static str,
    arch: String,
    procedures: Vec<ProcedureRef>,
    strings: Vec<RawString>,
    names: HashMap<u64, String>,
}

impl CapstoneHost {
    pub fn open(path: &Path, arch_hint: Option<&str>) -> Result<Self, EngineError> {
        let bytes = fs::read(path).map_err(|e| {
            EngineError::host_unavailable(HOST_NAME, format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes, arch_hint).map_err(|e| EngineError::host_unavailable(HOST_NAME, e))
    }

    pub fn from_bytes(bytes: &[u8], arch_hint: Option<&str>) -> Result<Self, HostError> {
        let mut layout = match Object::parse(bytes) {
            Ok(Object::Elf(elf)) => elf_layout(&elf, bytes),
            Ok(Object::PE(pe)) => pe_layout(&pe, bytes),
            Ok(Object::Mach(mach::Mach::Binary(bin))) => mach_layout(&bin, bytes),
            Ok(Object::Mach(mach::Mach::Fat(_))) => {
                return Err(HostError::new("fat Mach-O binaries are not supported; extract one slice first"))
            }
            _ => raw_layout(bytes),
        };

        let arch = arch_hint
            .map(str::to_lowercase)
            .or_else(|| layout.arch.clone())
            .unwrap_or_else(|| "x86_64".to_string());
        let cs = make_cs(&arch)?;

        // Unsized symbols would otherwise run to the end of their section.
        clip_to_next_function(&mut layout.functions);
        follow_jump_stubs(&cs, &mut layout, bytes);

        let mut procedures: BTreeMap<u64, ProcedureRef> = BTreeMap::new();
        for func in &layout.functions {
            if procedures.contains_key(&func.address) {
                continue;
            }
            let proc_ref = disassemble_function(&cs, func, &layout, bytes);
            procedures.insert(func.address, proc_ref);
        }

        let strings = if layout.format == "raw" {
            ascii_runs(bytes, 0)
        } else {
            layout
                .sections
                .iter()
                .filter(|s| s.is_data())
                .filter_map(|s| s.bytes(bytes).map(|data| ascii_runs(data, s.start)))
                .flatten()
                .collect()
        };

        debug!(
            "capstone host: {} {} procedures, {} strings, {} named addresses",
            layout.format,
            procedures.len(),
            strings.len(),
            layout.names.len()
        );
        Ok(Self {
            format: layout.format,
            arch,
            procedures: procedures.into_values().collect(),
            strings,
            names: layout.names,
        })
    }

    /// Container format: `elf`, `pe`, `mach-o` or `raw`.
    pub fn format(&self) -> &str {
        self.format
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn capstone_version() -> String {
        let (major, minor) = Capstone::lib_version();
        format!("{major}.{minor}")
    }
}

impl DisassemblyHost for CapstoneHost {
    fn name(&self) -> &str {
        HOST_NAME
    }

    fn list_procedures(&self) -> Result<Vec<ProcedureRef>, HostError> {
        Ok(self.procedures.clone())
    }

    fn list_strings(&self) -> Result<Vec<RawString>, HostError> {
        Ok(self.strings.clone())
    }

    fn resolve_reference_symbol(&self, address: u64) -> Option<String> {
        self.names.get(&address).cloned()
    }
}

pub struct CapstoneLoader;

impl HostLoader for CapstoneLoader {
    fn name(&self) -> &'static str {
        HOST_NAME
    }

    fn description(&self) -> &'static str {
        "Bundled goblin + capstone loader for ELF, PE, Mach-O and raw x86/ARM code"
    }

    fn load(&self, request: &HostRequest) -> Result<Box<dyn DisassemblyHost>, EngineError> {
        request.require_input(HOST_NAME)?;
        Ok(Box::new(CapstoneHost::open(&request.input, request.arch.as_deref())?))
    }
}

fn make_cs(arch: &str) -> Result<Capstone, HostError> {
    let built = match arch {
        "x86_64" | "amd64" => Capstone::new().x86().mode(arch::x86::ArchMode::Mode64).detail(true).build(),
        "x86" | "i386" => Capstone::new().x86().mode(arch::x86::ArchMode::Mode32).detail(true).build(),
        "arm" | "armv7" => Capstone::new().arm().mode(arch::arm::ArchMode::Arm).detail(true).build(),
        "arm64" | "aarch64" => {
            Capstone::new().arm64().mode(arch::arm64::ArchMode::Arm).detail(true).build()
        }
        other => {
            warn!("Unknown architecture '{other}', falling back to x86_64");
            Capstone::new().x86().mode(arch::x86::ArchMode::Mode64).detail(true).build()
        }
    };
    built.map_err(|e| HostError::new(format!("capstone init failed for {arch}: {e}")))
}

fn section_range_to_file(
    addr: u64,
    size: Option<u64>,
    sec_addr: u64,
    sec_size: u64,
    sec_offset: u64,
    bytes_len: usize,
) -> Option<(usize, usize)> {
    if addr < sec_addr || addr >= sec_addr.saturating_add(sec_size) {
        return None;
    }
    let offset_in_section = addr - sec_addr;
    let start = sec_offset.saturating_add(offset_in_section);
    if start as usize >= bytes_len {
        return None;
    }
    let available = sec_size - offset_in_section;
    let length = size.unwrap_or(available).min(available);
    let end = start.saturating_add(length).min(bytes_len as u64);
    (end > start).then_some((start as usize, end as usize))
}

/// Header values come straight from the file, so address math wraps.
fn plt_stub_address(plt_base: u64, slot: u64) -> u64 {
    plt_base.wrapping_add(PLT_ENTRY_SIZE.wrapping_mul(slot))
}

fn nonzero(v: u64) -> Option<u64> {
    (v > 0).then_some(v)
}

fn elf_layout(elf: &elf::Elf, bytes: &[u8]) -> Layout {
    let arch = match elf.header.e_machine {
        elf::header::EM_X86_64 => Some("x86_64".into()),
        elf::header::EM_386 => Some("x86".into()),
        elf::header::EM_AARCH64 => Some("arm64".into()),
        elf::header::EM_ARM => Some("arm".into()),
        _ => None,
    };
    let sections: Vec<SectionRange> = elf
        .section_headers
        .iter()
        .map(|sh| SectionRange {
            name: elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("").to_string(),
            start: sh.sh_addr,
            size: sh.sh_size,
            file_offset: (sh.sh_type != elf::section_header::SHT_NOBITS).then_some(sh.sh_offset as usize),
        })
        .collect();

    let mut layout = Layout { format: "elf", arch, sections, ..Layout::default() };

    let tables = [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)];
    for (syms, strtab) in tables {
        for sym in syms.iter() {
            if sym.st_shndx == elf::section_header::SHN_UNDEF as usize || sym.st_value == 0 {
                continue;
            }
            let Some(name) = strtab.get_at(sym.st_name).filter(|n| !n.is_empty()) else { continue };
            layout.names.entry(sym.st_value).or_insert_with(|| name.to_string());
            if !sym.is_function() {
                continue;
            }
            let range = elf.section_headers.get(sym.st_shndx).and_then(|sh| {
                section_range_to_file(
                    sym.st_value,
                    nonzero(sym.st_size),
                    sh.sh_addr,
                    sh.sh_size,
                    sh.sh_offset,
                    bytes.len(),
                )
            });
            if let Some(file_range) = range {
                layout.functions.push(FunctionRange {
                    name: Some(name.to_string()),
                    address: sym.st_value,
                    file_range,
                    section: Some(sym.st_shndx),
                });
            }
        }
    }

    let dyn_name = |r_sym: usize| {
        elf.dynsyms
            .get(r_sym)
            .and_then(|s| elf.dynstrtab.get_at(s.st_name))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    };

    // GOT slots, for calls through `[rip+slot]` (-fno-plt).
    for rel in elf.dynrelas.iter().chain(elf.pltrelocs.iter()) {
        if let Some(name) = dyn_name(rel.r_sym) {
            layout.names.entry(rel.r_offset).or_insert(name);
        }
    }

    if elf.header.e_machine == elf::header::EM_X86_64 {
        let plt = layout
            .sections
            .iter()
            .find(|s| s.name == ".plt.sec")
            .map(|s| (s.start, 0))
            .or_else(|| layout.sections.iter().find(|s| s.name == ".plt").map(|s| (s.start, 1)));
        if let Some((base, first)) = plt {
            for (i, rel) in elf.pltrelocs.iter().enumerate() {
                if let Some(name) = dyn_name(rel.r_sym) {
                    let stub = plt_stub_address(base, i as u64 + first);
                    layout.names.entry(stub).or_insert(name);
                }
            }
        }
    }

    if elf.header.e_type == elf::header::ET_REL {
        for (shndx, relocs) in &elf.shdr_relocs {
            let Some(patched) = elf.section_headers.get(*shndx).map(|sh| sh.sh_info as usize) else {
                continue;
            };
            for rel in relocs.iter() {
                let name = elf
                    .syms
                    .get(rel.r_sym)
                    .and_then(|s| elf.strtab.get_at(s.st_name))
                    .filter(|n| !n.is_empty());
                if let Some(name) = name {
                    layout.relocs.insert((patched, rel.r_offset), name.to_string());
                }
            }
        }
    }

    layout
}

fn pe_layout(pe: &pe::PE, bytes: &[u8]) -> Layout {
    let arch = match pe.header.coff_header.machine {
        pe::header::COFF_MACHINE_X86 => Some("x86".into()),
        pe::header::COFF_MACHINE_X86_64 => Some("x86_64".into()),
        pe::header::COFF_MACHINE_ARM => Some("arm".into()),
        pe::header::COFF_MACHINE_ARM64 => Some("arm64".into()),
        _ => None,
    };
    let image_base = pe.image_base as u64;
    let sections: Vec<SectionRange> = pe
        .sections
        .iter()
        .map(|sec| SectionRange {
            name: sec.name().unwrap_or_default().to_string(),
            start: image_base.wrapping_add(sec.virtual_address as u64),
            size: if sec.virtual_size == 0 {
                sec.size_of_raw_data as u64
            } else {
                (sec.virtual_size as u64).min(sec.size_of_raw_data as u64)
            },
            file_offset: Some(sec.pointer_to_raw_data as usize),
        })
        .collect();
    let mut layout = Layout { format: "pe", arch, sections, ..Layout::default() };

    let mut entries: Vec<(Option<String>, u64)> = pe
        .exports
        .iter()
        .filter(|exp| exp.rva != 0)
        .map(|exp| (exp.name.map(str::to_string), image_base.wrapping_add(exp.rva as u64)))
        .collect();
    if pe.entry != 0 {
        entries.push((Some("entry".to_string()), image_base.wrapping_add(pe.entry as u64)));
    }
    for (name, address) in entries {
        if let Some(name) = &name {
            layout.names.entry(address).or_insert_with(|| name.clone());
        }
        let range = layout.sections.iter().find(|s| s.contains(address)).and_then(|s| {
            section_range_to_file(address, None, s.start, s.size, s.file_offset? as u64, bytes.len())
        });
        if let Some(file_range) = range {
            layout.functions.push(FunctionRange { name, address, file_range, section: None });
        }
    }

    // Import address table slots.
    for imp in &pe.imports {
        layout.names.entry(image_base.wrapping_add(imp.rva as u64)).or_insert_with(|| imp.name.to_string());
    }
    layout
}

fn mach_layout(bin: &mach::MachO, bytes: &[u8]) -> Layout {
    let arch = match bin.header.cputype() {
        mach::cputype::CPU_TYPE_X86 => Some("x86".into()),
        mach::cputype::CPU_TYPE_X86_64 => Some("x86_64".into()),
        mach::cputype::CPU_TYPE_ARM => Some("arm".into()),
        mach::cputype::CPU_TYPE_ARM64 => Some("arm64".into()),
        _ => None,
    };
    let sections: Vec<SectionRange> = bin
        .segments
        .sections()
        .flatten()
        .filter_map(Result::ok)
        .map(|(sec, _)| SectionRange {
            name: sec.name().unwrap_or("").to_string(),
            start: sec.addr,
            size: sec.size,
            file_offset: Some(sec.offset as usize),
        })
        .collect();
    let mut layout = Layout { format: "mach-o", arch, sections, ..Layout::default() };

    for sym in bin.symbols() {
        let Ok((name, nlist)) = sym else { continue };
        if nlist.n_value == 0 || name.is_empty() {
            continue;
        }
        layout.names.entry(nlist.n_value).or_insert_with(|| name.to_string());
        let Some(sec) = layout.sections.iter().find(|s| s.contains(nlist.n_value)) else { continue };
        if sec.name != "__text" {
            continue;
        }
        let Some(offset) = sec.file_offset else { continue };
        if let Some(file_range) =
            section_range_to_file(nlist.n_value, None, sec.start, sec.size, offset as u64, bytes.len())
        {
            layout.functions.push(FunctionRange {
                name: Some(name.to_string()),
                address: nlist.n_value,
                file_range,
                section: None,
            });
        }
    }
    // Bound pointer slots (__got / __la_symbol_ptr).
    match bin.imports() {
        Ok(imports) => {
            for imp in imports {
                layout.names.entry(imp.address).or_insert_with(|| imp.name.to_string());
            }
        }
        Err(e) => debug!("Mach-O imports unavailable: {e}"),
    }
    layout
}

fn raw_layout(bytes: &[u8]) -> Layout {
    let mut layout = Layout { format: "raw", ..Layout::default() };
    if !bytes.is_empty() {
        layout.functions.push(FunctionRange {
            name: None,
            address: 0,
            file_range: (0, bytes.len()),
            section: None,
        });
    }
    layout
}

/// Cut each function's bytes where the next function's bytes begin.
fn clip_to_next_function(functions: &mut [FunctionRange]) {
    functions.sort_by_key(|f| (f.file_range.0, f.address));
    for i in 0..functions.len().saturating_sub(1) {
        let next_start = functions[i + 1].file_range.0;
        let func = &mut functions[i];
        if next_start > func.file_range.0 {
            func.file_range.1 = func.file_range.1.min(next_start);
        }
    }
}

/// Name each `jmp [slot]` stub after the symbol bound to its slot.
fn follow_jump_stubs(cs: &Capstone, layout: &mut Layout, bytes: &[u8]) {
    let stubs: Vec<SectionRange> = layout
        .sections
        .iter()
        .filter(|s| JUMP_STUB_SECTIONS.contains(&s.name.as_str()))
        .cloned()
        .collect();
    for sec in stubs {
        let Some(code) = sec.bytes(bytes) else { continue };
        let Ok(insns) = cs.disasm_all(code, sec.start) else { continue };
        for insn in insns.iter() {
            let Ok(detail) = cs.insn_detail(insn) else { continue };
            if !has_group(&detail, InsnGroupType::CS_GRP_JUMP as u8) {
                continue;
            }
            let end = insn.address().wrapping_add(insn.bytes().len() as u64);
            if let Some(name) = branch_target(cs, &detail, end).and_then(|slot| layout.names.get(&slot)) {
                let name = name.clone();
                layout.names.entry(insn.address()).or_insert(name);
            }
        }
    }
}

fn has_group(detail: &InsnDetail, group: u8) -> bool {
    detail.groups().iter().any(|g| *g == InsnGroupId(group))
}

/// Immediate target, or the memory slot of an absolute / RIP-relative operand.
fn branch_target(cs: &Capstone, detail: &InsnDetail, insn_end: u64) -> Option<u64> {
    detail.arch_detail().operands().iter().find_map(|op| match op {
        ArchOperand::X86Operand(op) => match &op.op_type {
            X86OperandType::Imm(imm) => Some(*imm as u64),
            X86OperandType::Mem(mem) => {
                if mem.index().0 != 0 {
                    None
                } else if mem.base().0 == 0 {
                    Some(mem.disp() as u64)
                } else if cs.reg_name(mem.base()).as_deref() == Some("rip") {
                    Some(insn_end.wrapping_add(mem.disp() as u64))
                } else {
                    None
                }
            }
            _ => None,
        },
        ArchOperand::ArmOperand(op) => match op.op_type {
            ArmOperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        ArchOperand::Arm64Operand(op) => match op.op_type {
            Arm64OperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        _ => None,
    })
}

fn disassemble_function(cs: &Capstone, func: &FunctionRange, layout: &Layout, bytes: &[u8]) -> ProcedureRef {
    let mut proc_ref = ProcedureRef::new(func.address, func.name.clone());
    let code = &bytes[func.file_range.0..func.file_range.1];
    let insns = match cs.disasm_count(code, func.address, MAX_FUNCTION_INSNS) {
        Ok(insns) => insns,
        Err(e) => {
            warn!("Failed to disassemble procedure at 0x{:X}: {e}", func.address);
            return proc_ref;
        }
    };

    for insn in insns.iter() {
        let Ok(detail) = cs.insn_detail(insn) else { continue };
        if !has_group(&detail, InsnGroupType::CS_GRP_CALL as u8) {
            continue;
        }
        let address = insn.address();
        let end = address.wrapping_add(insn.bytes().len() as u64);
        let reloc = func.section.and_then(|sec| {
            (address.wrapping_add(1)..end).find_map(|offset| layout.relocs.get(&(sec, offset)).cloned())
        });
        proc_ref.references.push(ReferenceEdge {
            address,
            target: branch_target(cs, &detail, end),
            symbol: reloc,
        });
    }
    proc_ref
}

/// Printable ASCII runs of at least `MIN_STRING_LEN` bytes.
fn ascii_runs(data: &[u8], base: u64) -> Vec<RawString> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, b) in data.iter().enumerate() {
        let printable = b.is_ascii_graphic() || *b == b' ' || *b == b'\t';
        match (printable, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= MIN_STRING_LEN {
                    out.push(RawString::new(base.wrapping_add(s as u64), &data[s..i]));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if data.len() - s >= MIN_STRING_LEN {
            out.push(RawString::new(base.wrapping_add(s as u64), &data[s..]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_runs_skip_short_and_binary_data() {
        let runs = ascii_runs(b"ab\0https://x.io\0\x01\x02tail", 0x100);
        let texts: Vec<_> = runs.iter().map(|r| (r.address, r.bytes.clone())).collect();
        assert_eq!(
            texts,
            vec![(0x103, b"https://x.io".to_vec()), (0x112, b"tail".to_vec())]
        );
    }

    #[test]
    fn hostile_header_addresses_wrap_instead_of_panicking() {
        assert_eq!(plt_stub_address(u64::MAX - 7, 1), 8);
        assert_eq!(plt_stub_address(0x401000, 2), 0x401020);

        let runs = ascii_runs(b"\0\0tail", u64::MAX - 1);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].address, 0);

        assert_eq!(section_range_to_file(u64::MAX - 1, None, u64::MAX - 4, 16, 0, 64), Some((3, 16)));
    }

    #[test]
    fn raw_blob_is_one_procedure_at_zero() {
        // nop; call +0 (rel32 = 0); ret
        let code = [0x90, 0xE8, 0x00, 0x00, 0x00, 0x00, 0xC3];
        let host = CapstoneHost::from_bytes(&code, Some("x86_64")).expect("raw host");
        assert_eq!(host.format(), "raw");
        let procs = host.list_procedures().unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].address, 0);
        assert_eq!(procs[0].references, vec![ReferenceEdge::to_target(1, 6)]);
    }

    #[test]
    fn rip_relative_calls_target_their_slot() {
        // call qword ptr [rip + 0x10]
        let code = [0xFF, 0x15, 0x10, 0x00, 0x00, 0x00];
        let host = CapstoneHost::from_bytes(&code, Some("x86_64")).expect("raw host");
        let procs = host.list_procedures().unwrap();
        assert_eq!(procs[0].references[0].target, Some(6 + 0x10));
    }

    #[test]
    fn register_calls_have_no_target() {
        // call rax
        let host = CapstoneHost::from_bytes(&[0xFF, 0xD0], Some("x86_64")).unwrap();
        assert_eq!(host.list_procedures().unwrap()[0].references[0].target, None);
    }

    #[test]
    fn clipping_stops_functions_at_the_next_symbol() {
        let mut funcs = vec![
            FunctionRange { name: None, address: 0x20, file_range: (0x20, 0x40), section: None },
            FunctionRange { name: None, address: 0x10, file_range: (0x10, 0x40), section: None },
        ];
        clip_to_next_function(&mut funcs);
        assert_eq!(funcs[0].file_range, (0x10, 0x20));
        assert_eq!(funcs[1].file_range, (0x20, 0x40));
    }
}
