// sbx-net/src/checksum.rs
use std::fs::File;
use std::io;
use std::path::Path;

use md5::Md5;
use sbx_common::error::{Result, SbxError};
use sha2::{Digest, Sha256, Sha512};

/// Verifies the digest of a file under a named algorithm.
///
/// The whole file is read; comparison is case-insensitive hex. The algorithm
/// tag must be one of `md5`, `sha256` or `sha512` — anything else is an
/// `UnsupportedAlgorithm` error, never a silent skip.
pub fn verify_checksum(path: &Path, expected: &str, algorithm: &str) -> Result<()> {
    tracing::debug!("Verifying {} checksum for: {}", algorithm, path.display());
    let actual = compute_digest(path, algorithm)?;
    tracing::debug!("Calculated {}: {}", algorithm, actual);
    tracing::debug!("Expected {}:   {}", algorithm, expected);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(SbxError::ChecksumMismatch {
            path: path.to_path_buf(),
            algorithm: algorithm.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Computes the hex digest of a file under a named algorithm.
pub fn compute_digest(path: &Path, algorithm: &str) -> Result<String> {
    // Reject the algorithm tag before touching the file so a bad catalog
    // entry is not reported as a missing file.
    match algorithm {
        "md5" | "sha256" | "sha512" => {}
        other => {
            return Err(SbxError::UnsupportedAlgorithm {
                algorithm: other.to_string(),
            })
        }
    }

    let file = File::open(path).map_err(|_| SbxError::FileNotFound {
        path: path.to_path_buf(),
    })?;

    match algorithm {
        "md5" => digest_file::<Md5>(file),
        "sha256" => digest_file::<Sha256>(file),
        "sha512" => digest_file::<Sha512>(file),
        _ => unreachable!("algorithm validated above"),
    }
}

fn digest_file<D: Digest + io::Write>(mut file: File) -> Result<String> {
    let mut hasher = D::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
