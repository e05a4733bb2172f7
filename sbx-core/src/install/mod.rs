// sbx-core/src/install/mod.rs
//! The artifact installation engine: the generic lifecycle in [`base`] and
//! the per-software installers that compose with it.

use std::fs;
use std::io;
#[cfg(unix)]
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

use sbx_common::catalog::Catalog;
use sbx_common::config::Config;
use sbx_common::error::{Result, SbxError};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub mod base;
pub mod cilium;
pub mod crio;
pub mod kubeadm;
pub mod kubelet;
pub mod teleport;

pub use base::Installer;

use cilium::CiliumInstaller;
use crio::CrioInstaller;
use kubeadm::KubeadmInstaller;
use kubelet::KubeletInstaller;
use teleport::TeleportInstaller;

/// Dispatch over the specialized installers. Software without bespoke steps
/// runs on the generic engine directly.
pub enum AnyInstaller {
    Crio(CrioInstaller),
    Kubeadm(KubeadmInstaller),
    Kubelet(KubeletInstaller),
    Teleport(TeleportInstaller),
    Cilium(CiliumInstaller),
    Generic(Installer),
}

impl AnyInstaller {
    pub fn for_software(
        catalog: &Catalog,
        software: &str,
        version: Option<String>,
        config: Config,
    ) -> Result<Self> {
        let base = Installer::new(catalog, software, version, config)?;
        Ok(match software {
            "crio" => Self::Crio(CrioInstaller::new(base)),
            "kubeadm" => Self::Kubeadm(KubeadmInstaller::new(base)),
            "kubelet" => Self::Kubelet(KubeletInstaller::new(base)),
            "teleport" => Self::Teleport(TeleportInstaller::new(base)),
            "cilium" => Self::Cilium(CiliumInstaller::new(base)),
            _ => Self::Generic(base),
        })
    }

    pub fn base(&self) -> &Installer {
        match self {
            Self::Crio(i) => i.base(),
            Self::Kubeadm(i) => i.base(),
            Self::Kubelet(i) => i.base(),
            Self::Teleport(i) => i.base(),
            Self::Cilium(i) => i.base(),
            Self::Generic(i) => i,
        }
    }

    pub async fn download(&self) -> Result<()> {
        self.base().download().await
    }

    pub fn extract(&self) -> Result<()> {
        self.base().extract()
    }

    pub fn install(&self) -> Result<()> {
        match self {
            Self::Crio(i) => i.install(),
            Self::Kubeadm(i) => i.install(),
            Self::Kubelet(i) => i.install(),
            Self::Teleport(i) => i.install(),
            Self::Cilium(i) => i.install(),
            Self::Generic(i) => i.install(None),
        }
    }

    pub fn configure(&self) -> Result<()> {
        match self {
            Self::Crio(i) => i.configure(),
            Self::Kubeadm(i) => i.configure(),
            Self::Kubelet(i) => i.configure(),
            Self::Teleport(i) => i.configure(),
            Self::Cilium(i) => i.configure(),
            Self::Generic(i) => i.configure(),
        }
    }

    pub fn uninstall(&self) -> Result<()> {
        match self {
            Self::Crio(i) => i.uninstall(),
            Self::Kubeadm(i) => i.uninstall(),
            Self::Kubelet(i) => i.uninstall(),
            Self::Teleport(i) => i.uninstall(),
            Self::Cilium(i) => i.uninstall(),
            Self::Generic(i) => i.uninstall(None),
        }
    }

    pub fn remove_configuration(&self) -> Result<()> {
        match self {
            Self::Crio(i) => i.remove_configuration(),
            Self::Kubeadm(i) => i.remove_configuration(),
            Self::Kubelet(i) => i.remove_configuration(),
            Self::Teleport(i) => i.remove_configuration(),
            Self::Cilium(i) => i.remove_configuration(),
            Self::Generic(i) => i.remove_configuration(),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.base().is_installed()
    }

    pub fn is_configured(&self) -> bool {
        match self {
            Self::Crio(i) => i.is_configured(),
            _ => self.base().is_configured(),
        }
    }

    pub fn cleanup(&self) -> Result<()> {
        self.base().cleanup()
    }
}

pub(crate) fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    fs::copy(source, destination).map_err(|e| SbxError::FileSystem {
        path: destination.to_path_buf(),
        reason: format!("failed to copy from {}: {}", source.display(), e),
    })?;
    Ok(())
}

pub(crate) fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
            SbxError::FileSystem {
                path: path.to_path_buf(),
                reason: format!("failed to set executable permissions: {e}"),
            }
        })?;
    }
    Ok(())
}

/// First regular file named `name` under `root`, if any. Archive layouts
/// differ per upstream (flat, `bin/` subdir, versioned top-level dir), so
/// extracted payloads are located by walking the unpack tree.
pub(crate) fn find_in_dir(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}

/// First directory named `name` under `root`, if any.
pub(crate) fn find_dir_in_dir(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_dir() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}

/// Creates (or replaces) a symlink at `link` pointing to `target`.
pub(crate) fn symlink_into(target: &Path, link: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        if let Err(e) = fs::remove_file(link) {
            warn!(
                "Could not remove existing entry at {}: {}",
                link.display(),
                e
            );
        }
    }
    #[cfg(unix)]
    unix_fs::symlink(target, link).map_err(|e| SbxError::FileSystem {
        path: link.to_path_buf(),
        reason: format!("failed to create symlink to {}: {}", target.display(), e),
    })?;
    #[cfg(not(unix))]
    warn!(
        "Cannot create symlink on non-unix system: {} -> {}",
        link.display(),
        target.display()
    );
    debug!("Linked {} -> {}", link.display(), target.display());
    Ok(())
}

/// Removes `link` only when it is a symlink that still resolves to
/// `expected_target`. A path that was repointed by something else is left
/// alone. Returns whether the link was removed.
pub(crate) fn remove_symlink_if_ours(link: &Path, expected_target: &Path) -> Result<bool> {
    match fs::read_link(link) {
        Ok(current) if current == expected_target => {
            fs::remove_file(link).map_err(|e| SbxError::FileSystem {
                path: link.to_path_buf(),
                reason: format!("failed to remove symlink: {e}"),
            })?;
            debug!("Removed symlink {}", link.display());
            Ok(true)
        }
        Ok(current) => {
            warn!(
                "Leaving {} in place: it points at {} instead of {}",
                link.display(),
                current.display(),
                expected_target.display()
            );
            Ok(false)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
            // Not a symlink; someone replaced it with a real file.
            warn!("Leaving {} in place: not a symlink", link.display());
            Ok(false)
        }
        Err(e) => Err(SbxError::FileSystem {
            path: link.to_path_buf(),
            reason: format!("failed to inspect symlink: {e}"),
        }),
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SbxError::FileSystem {
            path: path.to_path_buf(),
            reason: format!("failed to remove: {e}"),
        }),
    }
}

/// Exact-substring replacement for patching unit files. Returns `None` when
/// the needle is absent so callers can fail loudly instead of writing an
/// unpatched file.
pub(crate) fn replace_exact(content: &str, needle: &str, replacement: &str) -> Option<String> {
    if content.contains(needle) {
        Some(content.replace(needle, replacement))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replace_exact_requires_the_needle() {
        assert_eq!(
            replace_exact("ExecStart=/usr/bin/kubelet", "/usr/bin/kubelet", "/opt/sbx/bin/kubelet"),
            Some("ExecStart=/opt/sbx/bin/kubelet".to_string())
        );
        assert_eq!(replace_exact("ExecStart=/usr/bin/other", "/usr/bin/kubelet", "x"), None);
    }

    #[cfg(unix)]
    #[test]
    fn remove_symlink_if_ours_leaves_foreign_links() {
        let dir = TempDir::new().unwrap();
        let ours = dir.path().join("ours");
        let foreign = dir.path().join("foreign");
        fs::write(&ours, "a").unwrap();
        fs::write(&foreign, "b").unwrap();

        let link = dir.path().join("link");
        unix_fs::symlink(&foreign, &link).unwrap();
        assert!(!remove_symlink_if_ours(&link, &ours).unwrap());
        assert!(link.symlink_metadata().is_ok());

        fs::remove_file(&link).unwrap();
        unix_fs::symlink(&ours, &link).unwrap();
        assert!(remove_symlink_if_ours(&link, &ours).unwrap());
        assert!(link.symlink_metadata().is_err());
    }

    #[test]
    fn find_in_dir_walks_nested_layouts() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("cri-o/bin");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("crio"), "bin").unwrap();

        let found = find_in_dir(dir.path(), "crio").unwrap();
        assert_eq!(found, nested.join("crio"));
        assert!(find_in_dir(dir.path(), "absent").is_none());
    }
}
