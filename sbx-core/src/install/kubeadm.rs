// sbx-core/src/install/kubeadm.rs
//! kubeadm installer. Generic binary placement plus generation of a
//! bootstrap token the node can join a cluster with.

use std::fs;
use std::path::PathBuf;

use rand::Rng;
use sbx_common::error::{Result, SbxError};
use tracing::debug;

use super::base::Installer;
use super::remove_file_if_exists;

/// Bootstrap tokens are `[a-z0-9]{6}.[a-z0-9]{16}`.
const TOKEN_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_ID_LEN: usize = 6;
const TOKEN_SECRET_LEN: usize = 16;

const TOKEN_FILE_NAME: &str = "bootstrap-token";

/// Generates a kubeadm bootstrap token. Each character is drawn with
/// `random_range`, which samples the alphabet uniformly instead of reducing
/// a wider value modulo 36.
pub fn generate_bootstrap_token() -> String {
    let mut rng = rand::rng();
    let mut section = |len: usize| {
        (0..len)
            .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
            .collect::<String>()
    };
    let id = section(TOKEN_ID_LEN);
    let secret = section(TOKEN_SECRET_LEN);
    format!("{id}.{secret}")
}

pub struct KubeadmInstaller {
    base: Installer,
}

impl KubeadmInstaller {
    pub fn new(base: Installer) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Installer {
        &self.base
    }

    fn token_dir(&self) -> PathBuf {
        self.base.config().etc_dir().join("kubeadm")
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_dir().join(TOKEN_FILE_NAME)
    }

    pub fn install(&self) -> Result<()> {
        self.base.install(None)
    }

    /// Generic configuration plus a generated bootstrap token. An existing
    /// token is kept so re-running configure does not invalidate a join
    /// already in flight.
    pub fn configure(&self) -> Result<()> {
        self.base.configure()?;

        let token_path = self.token_path();
        if token_path.is_file() {
            debug!("Bootstrap token already present at {}", token_path.display());
            return Ok(());
        }
        fs::create_dir_all(self.token_dir()).map_err(|e| SbxError::Configuration {
            software: self.base.software().to_string(),
            reason: format!("failed to create token directory: {e}"),
        })?;
        let token = generate_bootstrap_token();
        fs::write(&token_path, format!("{token}\n")).map_err(|e| SbxError::Configuration {
            software: self.base.software().to_string(),
            reason: format!("failed to write bootstrap token: {e}"),
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&token_path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                SbxError::Configuration {
                    software: self.base.software().to_string(),
                    reason: format!("failed to restrict token permissions: {e}"),
                }
            })?;
        }
        debug!("Wrote bootstrap token to {}", token_path.display());
        Ok(())
    }

    pub fn uninstall(&self) -> Result<()> {
        self.base.uninstall(None)
    }

    pub fn remove_configuration(&self) -> Result<()> {
        remove_file_if_exists(&self.token_path())?;
        self.base.remove_configuration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_matches_the_required_shape() {
        for _ in 0..64 {
            let token = generate_bootstrap_token();
            assert_eq!(token.len(), TOKEN_ID_LEN + 1 + TOKEN_SECRET_LEN);
            let (id, secret) = token.split_once('.').expect("token has a dot separator");
            assert_eq!(id.len(), TOKEN_ID_LEN);
            assert_eq!(secret.len(), TOKEN_SECRET_LEN);
            for c in id.chars().chain(secret.chars()) {
                assert!(TOKEN_ALPHABET.contains(&(c as u8)), "unexpected char {c}");
            }
        }
    }

    #[test]
    fn tokens_are_not_repeated() {
        let a = generate_bootstrap_token();
        let b = generate_bootstrap_token();
        assert_ne!(a, b);
    }
}
