// sbx-common/src/model/artifact.rs
//! Serde model for catalog entries: one named software artifact with its
//! versioned archives, binaries and configuration files.

use std::collections::HashMap;
use std::env;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SbxError};
use crate::template::{self, TemplateData};

/// The (OS, architecture) pair used to select checksums and URLs from a
/// multi-platform catalog entry. Defaults to the running host, using the
/// `linux/amd64`-style names the upstream release artifacts are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn host() -> Self {
        let arch = match env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            os: env::consts::OS.to_string(),
            arch: arch.to_string(),
        }
    }

    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

/// Algorithm tag plus expected hex digest for one file on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: String,
    pub digest: String,
}

/// OS -> architecture -> checksum map carried by every binary and config
/// detail (and optionally by archives).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformChecksums(pub HashMap<String, HashMap<String, Checksum>>);

impl PlatformChecksums {
    /// Walks OS -> arch, discriminating missing platform support from a
    /// missing version (the caller reports `VersionNotFound` before getting
    /// here).
    pub fn lookup(
        &self,
        software: &str,
        version: &str,
        platform: &Platform,
    ) -> Result<&Checksum> {
        self.0
            .get(&platform.os)
            .and_then(|arch_map| arch_map.get(&platform.arch))
            .ok_or_else(|| SbxError::PlatformNotFound {
                software: software.to_string(),
                version: version.to_string(),
                os: platform.os.clone(),
                arch: platform.arch.clone(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A downloadable compressed bundle containing zero or more binaries/configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveDetail {
    /// Templated file name, e.g. `cri-o.{{ARCH}}.v{{VERSION}}.tar.gz`.
    pub name: String,
    /// Templated download URL.
    pub url: String,
    /// Checksum of the archive itself. When absent the archive is always
    /// re-fetched; idempotency is then gated by the checksums of its
    /// extracted contents.
    #[serde(default)]
    pub checksums: Option<PlatformChecksums>,
}

/// A binary shipped either inside a named archive or from its own URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryDetail {
    /// Templated binary name.
    pub name: String,
    /// Name (template) of the containing archive, if archive-sourced.
    #[serde(default)]
    pub archive: Option<String>,
    /// Templated direct download URL, if downloaded standalone.
    #[serde(default)]
    pub url: Option<String>,
    pub checksums: PlatformChecksums,
}

/// A configuration file with the same archive-or-direct-URL duality as
/// [`BinaryDetail`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDetail {
    pub name: String,
    #[serde(default)]
    pub archive: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub checksums: PlatformChecksums,
}

/// Download/install/config shape of one version of a software artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDetails {
    #[serde(default)]
    pub archives: Vec<ArchiveDetail>,
    #[serde(default)]
    pub binaries: Vec<BinaryDetail>,
    #[serde(default)]
    pub configs: Vec<ConfigDetail>,
}

/// One named software package in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub versions: HashMap<String, VersionDetails>,
    /// Platform resolver. Not part of the catalog document; defaults to the
    /// running host and is overridable for testing.
    #[serde(skip, default)]
    pub platform: Platform,
}

impl ArtifactMetadata {
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn version_details(&self, version: &str) -> Result<&VersionDetails> {
        self.versions
            .get(version)
            .ok_or_else(|| SbxError::VersionNotFound {
                software: self.name.clone(),
                version: version.to_string(),
            })
    }

    /// Selects the newest version by strict semantic-version ordering.
    ///
    /// Every version key must parse as semver; a single unparsable key fails
    /// the whole call rather than falling back to alphabetical ordering.
    pub fn latest_version(&self) -> Result<String> {
        let mut parsed: Vec<(Version, &str)> = Vec::with_capacity(self.versions.len());
        for key in self.versions.keys() {
            let version = Version::parse(key).map_err(|_| SbxError::InvalidVersion {
                software: self.name.clone(),
                version: key.clone(),
            })?;
            parsed.push((version, key));
        }
        parsed
            .into_iter()
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, key)| key.to_string())
            .ok_or_else(|| SbxError::VersionNotFound {
                software: self.name.clone(),
                version: "latest".to_string(),
            })
    }

    pub fn template_data(&self, version: &str) -> TemplateData {
        TemplateData {
            version: version.to_string(),
            os: self.platform.os.clone(),
            arch: self.platform.arch.clone(),
        }
    }

    /// Renders a templated catalog field for one version of this artifact.
    /// Every file name and URL used by the installers is built through here.
    pub fn resolve(&self, template: &str, version: &str) -> Result<String> {
        template::render(template, &self.template_data(version), &self.name)
    }
}
