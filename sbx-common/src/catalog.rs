// sbx-common/src/catalog.rs
//! The artifact catalog: an embedded declarative registry of every piece of
//! software sbx knows how to provision. Parsed once at startup; a parse
//! failure aborts with a configuration-load error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::error::{Result, SbxError};
use super::model::ArtifactMetadata;

const CATALOG_JSON: &str = include_str!("../data/catalog.json");

pub struct Catalog {
    entries: HashMap<String, Arc<ArtifactMetadata>>,
}

impl Catalog {
    /// Loads the catalog bundled into the binary.
    pub fn load() -> Result<Self> {
        Self::from_json(CATALOG_JSON)
    }

    /// Parses a catalog document. Duplicate software names violate the
    /// catalog invariant and are rejected outright.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: Vec<ArtifactMetadata> =
            serde_json::from_str(raw).map_err(|e| SbxError::ConfigLoad {
                reason: format!("failed to parse artifact catalog: {e}"),
            })?;
        debug!("Parsed {} catalog entries.", parsed.len());

        let mut entries = HashMap::with_capacity(parsed.len());
        for artifact in parsed {
            let name = artifact.name.clone();
            if entries.insert(name.clone(), Arc::new(artifact)).is_some() {
                return Err(SbxError::ConfigLoad {
                    reason: format!("duplicate catalog entry for software '{name}'"),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn artifact(&self, name: &str) -> Result<ArtifactMetadata> {
        match self.entries.get(name) {
            Some(artifact) => {
                debug!("Loaded artifact '{}' from catalog.", name);
                Ok(Arc::clone(artifact).as_ref().clone())
            }
            None => Err(SbxError::SoftwareNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Names of all cataloged software, sorted for stable listing output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}
