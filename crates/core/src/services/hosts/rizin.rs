use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use serde::Deserialize;

use crate::error::{EngineError, HostError};
use crate::host::DisassemblyHost;
use crate::model::{ProcedureRef, RawString, ReferenceEdge};
use crate::services::hosts::{HostLoader, HostRequest};

const HOST_NAME: &str = "rizin";

/// Host that shells out to rizin/rz and reads its JSON listings.
///
/// Listings are fetched once at load time, so the data stays stable for a
/// whole analysis run.
#[derive(Debug, Clone)]
pub struct RizinHost {
    version: String,
    tool_path: PathBuf,
    procedures: Vec<ProcedureRef>,
    strings: Vec<RawString>,
    imports: HashMap<u64, String>,
}

impl RizinHost {
    pub fn open(binary: &Path, tool_path: Option<&Path>) -> Result<Self, EngineError> {
        let rizin_path = tool_path.map(Path::to_path_buf).unwrap_or_else(resolve_rizin_path);
        let unavailable = |e: HostError| EngineError::host_unavailable(HOST_NAME, e);

        let version = version_string(&rizin_path).map_err(unavailable)?;
        let functions =
            fake_or_run("NETSURFACE_RIZIN_FAKE_FUNCTIONS", &rizin_path, binary, "aa;aflj")
                .map_err(unavailable)?;
        let strings = fake_or_run("NETSURFACE_RIZIN_FAKE_STRINGS", &rizin_path, binary, "izj")
            .map_err(unavailable)?;
        let imports = fake_or_run("NETSURFACE_RIZIN_FAKE_IMPORTS", &rizin_path, binary, "iij")
            .map_err(unavailable)?;

        Ok(Self {
            version,
            tool_path: rizin_path,
            procedures: parse_functions(&functions).map_err(unavailable)?,
            strings: parse_strings(&strings).map_err(unavailable)?,
            imports: parse_imports(&imports).map_err(unavailable)?,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn tool_path(&self) -> &Path {
        &self.tool_path
    }
}

impl DisassemblyHost for RizinHost {
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
        self.imports.get(&address).cloned()
    }
}

pub struct RizinLoader;

impl HostLoader for RizinLoader {
    fn name(&self) -> &'static str {
        HOST_NAME
    }

    fn description(&self) -> &'static str {
        "rizin headless (aflj/izj/iij); set RIZIN_BIN or --tool-path"
    }

    fn load(&self, request: &HostRequest) -> Result<Box<dyn DisassemblyHost>, EngineError> {
        request.require_input(HOST_NAME)?;
        Ok(Box::new(RizinHost::open(&request.input, request.tool_path.as_deref())?))
    }
}

fn resolve_rizin_path() -> PathBuf {
    std::env::var_os("RIZIN_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("rizin"))
}

/// Read canned JSON from the file named by `env_key`, or run rizin.
fn fake_or_run(env_key: &str, rizin_bin: &Path, binary: &Path, command: &str) -> Result<String, HostError> {
    if let Some(fake) = std::env::var_os(env_key) {
        debug!("Using {env_key} instead of running rizin '{command}'");
        return fs::read_to_string(&fake)
            .map_err(|e| HostError::new(format!("failed to read {env_key}: {e}")));
    }
    run_rizin_json(rizin_bin, binary, command)
}

fn run_rizin_json(rizin_bin: &Path, binary: &Path, command: &str) -> Result<String, HostError> {
    let output = Command::new(rizin_bin)
        .args(["-2", "-q0", "-c", command])
        .arg(binary)
        .output()
        .map_err(|e| HostError::new(format!("failed to spawn rizin: {e}")))?;
    if !output.status.success() {
        return Err(HostError::new(format!("rizin '{command}' exited with {}", output.status)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn version_string(rizin_bin: &Path) -> Result<String, HostError> {
    if let Some(fake) = std::env::var_os("NETSURFACE_RIZIN_FAKE_VERSION") {
        return Ok(fake.to_string_lossy().to_string());
    }
    let output = Command::new(rizin_bin)
        .arg("-v")
        .output()
        .map_err(|e| HostError::new(format!("failed to spawn rizin: {e}")))?;
    if !output.status.success() {
        return Err(HostError::new(format!("rizin -v exited with {}", output.status)));
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        Err(HostError::new("rizin -v produced no output"))
    } else {
        Ok(stdout)
    }
}

#[derive(Debug, Deserialize)]
struct RizinFunction {
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    callrefs: Option<Vec<RizinCallRef>>,
}

#[derive(Debug, Deserialize)]
struct RizinCallRef {
    /// Referenced address.
    #[serde(default)]
    addr: Option<u64>,
    /// Referencing instruction.
    #[serde(default)]
    at: Option<u64>,
    #[serde(default)]
    #[serde(rename = "type")]
    typ: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RizinString {
    #[serde(default)]
    vaddr: Option<u64>,
    #[serde(default)]
    string: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RizinStrings {
    List(Vec<RizinString>),
    Wrapped { strings: Vec<RizinString> },
}

#[derive(Debug, Deserialize)]
struct RizinImport {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    plt: Option<u64>,
}

fn empty_or<T: Default>(body: &str, parse: impl FnOnce(&str) -> Result<T, HostError>) -> Result<T, HostError> {
    if body.trim().is_empty() {
        Ok(T::default())
    } else {
        parse(body)
    }
}

fn parse_functions(body: &str) -> Result<Vec<ProcedureRef>, HostError> {
    empty_or(body, |body| {
        let funcs: Vec<RizinFunction> = serde_json::from_str(body)
            .map_err(|e| HostError::new(format!("failed to parse rizin aflj JSON: {e}")))?;
        Ok(funcs
            .into_iter()
            .map(|f| {
                let mut proc_ref = ProcedureRef::new(f.offset.unwrap_or(0), f.name);
                for cref in f.callrefs.unwrap_or_default() {
                    if !matches!(cref.typ.as_deref(), Some("C") | Some("CALL") | Some("call")) {
                        continue;
                    }
                    proc_ref.references.push(ReferenceEdge {
                        address: cref.at.unwrap_or(0),
                        target: cref.addr,
                        symbol: cref.name,
                    });
                }
                proc_ref
            })
            .collect())
    })
}

fn parse_strings(body: &str) -> Result<Vec<RawString>, HostError> {
    empty_or(body, |body| {
        let strs: RizinStrings = serde_json::from_str(body)
            .map_err(|e| HostError::new(format!("failed to parse rizin izj JSON: {e}")))?;
        let strs = match strs {
            RizinStrings::List(list) => list,
            RizinStrings::Wrapped { strings } => strings,
        };
        Ok(strs
            .into_iter()
            .filter_map(|s| match (s.vaddr, s.string) {
                (Some(vaddr), Some(text)) => Some(RawString::text(vaddr, &text)),
                (vaddr, text) => {
                    debug!("Dropping izj entry without address or text: vaddr={vaddr:?} string={text:?}");
                    None
                }
            })
            .collect())
    })
}

fn parse_imports(body: &str) -> Result<HashMap<u64, String>, HostError> {
    empty_or(body, |body| {
        let imports: Vec<RizinImport> = serde_json::from_str(body)
            .map_err(|e| HostError::new(format!("failed to parse rizin iij JSON: {e}")))?;
        Ok(imports
            .into_iter()
            .filter_map(|imp| match (imp.plt, imp.name) {
                (Some(plt), Some(name)) => Some((plt, name)),
                (plt, name) => {
                    debug!("Dropping iij entry without plt slot or name: plt={plt:?} name={name:?}");
                    None
                }
            })
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functions_keep_only_call_refs() {
        let procs = parse_functions(
            r#"[{"offset":4096,"name":"main","callrefs":[
                {"addr":8192,"at":4100,"type":"CALL","name":"sym.imp.socket"},
                {"addr":4200,"at":4104,"type":"CODE"},
                {"addr":12288,"at":4108,"type":"C"}]}]"#,
        )
        .unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].references.len(), 2);
        assert_eq!(procs[0].references[0].symbol.as_deref(), Some("sym.imp.socket"));
        assert_eq!(procs[0].references[1].target, Some(12288));
        assert_eq!(procs[0].references[1].address, 4108);
    }

    #[test]
    fn strings_accept_plain_and_wrapped_listings() {
        let plain = parse_strings(r#"[{"vaddr":16,"string":"http://a.example"}]"#).unwrap();
        let wrapped = parse_strings(r#"{"strings":[{"vaddr":16,"string":"http://a.example"}]}"#).unwrap();
        assert_eq!(plain, wrapped);
        assert_eq!(plain[0].address, 16);
    }

    #[test]
    fn strings_without_address_or_text_are_dropped() {
        let strings = parse_strings(
            r#"[{"vaddr":16,"string":"http://a.example"},{"string":"no address"},{"vaddr":32}]"#,
        )
        .unwrap();
        assert_eq!(strings, vec![RawString::text(16, "http://a.example")]);
    }

    #[test]
    fn imports_map_plt_slots_to_names() {
        let imports = parse_imports(r#"[{"name":"connect","plt":4352},{"name":"noplt"}]"#).unwrap();
        assert_eq!(imports.get(&4352).map(String::as_str), Some("connect"));
        assert_eq!(imports.len(), 1);
    }

    #[test]
    fn empty_output_is_empty_listing() {
        assert!(parse_functions("  ").unwrap().is_empty());
        assert!(parse_imports("").unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_functions("{not json").is_err());
    }
}
