// sbx-core/src/install/cilium.rs
//! Cilium CLI installer. The archive carries a single binary and nothing
//! needs patching, so everything delegates to the generic engine.

use sbx_common::error::Result;

use super::base::Installer;

pub struct CiliumInstaller {
    base: Installer,
}

impl CiliumInstaller {
    pub fn new(base: Installer) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Installer {
        &self.base
    }

    pub fn install(&self) -> Result<()> {
        self.base.install(None)
    }

    pub fn configure(&self) -> Result<()> {
        self.base.configure()
    }

    pub fn uninstall(&self) -> Result<()> {
        self.base.uninstall(None)
    }

    pub fn remove_configuration(&self) -> Result<()> {
        self.base.remove_configuration()
    }
}
