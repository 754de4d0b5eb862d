//! Host adapters and the name-keyed registry callers select them from.

mod annotated;
#[cfg(feature = "capstone-backend")]
pub mod capstone;
#[cfg(feature = "rizin-backend")]
pub mod rizin;
pub mod snapshot;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::host::DisassemblyHost;

pub use annotated::Annotated;
#[cfg(feature = "capstone-backend")]
pub use capstone::{CapstoneHost, CapstoneLoader};
#[cfg(feature = "rizin-backend")]
pub use rizin::{RizinHost, RizinLoader};
pub use snapshot::{SnapshotHost, SnapshotLoader};

/// What to open and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRequest {
    pub input: PathBuf,
    /// Optional explicit tool path (e.g. a rizin binary).
    #[serde(default)]
    pub tool_path: Option<PathBuf>,
    /// Optional architecture hint (x86_64, x86, arm64, arm).
    #[serde(default)]
    pub arch: Option<String>,
}

impl HostRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self { input: input.into(), tool_path: None, arch: None }
    }

    fn require_input(&self, host: &str) -> Result<(), EngineError> {
        if self.input.is_file() {
            Ok(())
        } else {
            Err(EngineError::host_unavailable(
                host,
                format!("input not found at {}", self.input.display()),
            ))
        }
    }
}

/// Opens a host for a request.
pub trait HostLoader: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn load(&self, request: &HostRequest) -> Result<Box<dyn DisassemblyHost>, EngineError>;
}

/// Registry of host loaders; callers select by name.
#[derive(Default)]
pub struct HostRegistry {
    loaders: HashMap<String, Box<dyn HostLoader>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self { loaders: HashMap::new() }
    }

    pub fn register<L: HostLoader + 'static>(&mut self, loader: L) -> &mut Self {
        self.loaders.insert(loader.name().to_string(), Box::new(loader));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn HostLoader> {
        self.loaders.get(name).map(|l| &**l)
    }

    /// Sorted loader names, for error messages and help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.loaders.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Look up `name` and open the request with it.
    pub fn open(&self, name: &str, request: &HostRequest) -> Result<Box<dyn DisassemblyHost>, EngineError> {
        let loader = self.get(name).ok_or_else(|| EngineError::UnknownHost {
            name: name.to_string(),
            available: self.names().join(", "),
        })?;
        loader.load(request)
    }
}

/// Registry populated with every host compiled into this build.
pub fn default_host_registry() -> HostRegistry {
    let mut registry = HostRegistry::new();
    registry.register(SnapshotLoader);
    #[cfg(feature = "capstone-backend")]
    {
        registry.register(CapstoneLoader);
    }
    #[cfg(feature = "rizin-backend")]
    {
        registry.register(RizinLoader);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_lists_sorted_names() {
        let names = default_host_registry().names();
        assert!(names.contains(&"snapshot".to_string()));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn unknown_host_names_the_alternatives() {
        let err = default_host_registry()
            .open("ida", &HostRequest::new("whatever.bin"))
            .err()
            .expect("unknown host");
        match err {
            EngineError::UnknownHost { name, available } => {
                assert_eq!(name, "ida");
                assert!(available.contains("snapshot"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_input_is_host_data_unavailable() {
        let err = default_host_registry()
            .open("snapshot", &HostRequest::new("does/not/exist.json"))
            .err()
            .expect("missing input");
        assert!(matches!(err, EngineError::HostDataUnavailable { .. }));
    }
}
