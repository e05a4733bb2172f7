// sbx-net/src/validation.rs
//! URL and path validation for every download. The catalog and its URL
//! templates are data, so each URL (and each redirect hop, see `http.rs`)
//! is checked against the domain allowlist, and each destination path is
//! checked against the sandbox base directory before anything touches the
//! network or the disk.

use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};

use sbx_common::error::{Result, SbxError};
use url::Url;

/// Exact-domain or subdomain match against the allowlist.
pub fn is_allowed_host(host: &str, allowed_domains: &[String]) -> bool {
    allowed_domains
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Validates scheme and allowlist membership of a download URL.
///
/// https is required for everything except loopback hosts (local mirrors
/// and the test servers).
pub fn validate_url(url_str: &str, allowed_domains: &[String]) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|e| SbxError::InvalidUrl {
        url: url_str.to_string(),
        reason: format!("failed to parse: {e}"),
    })?;

    let host = url
        .host_str()
        .ok_or_else(|| SbxError::InvalidUrl {
            url: url_str.to_string(),
            reason: "URL has no host".to_string(),
        })?
        .to_string();

    match url.scheme() {
        "https" => {}
        "http" if is_loopback_host(&host) => {}
        other => {
            return Err(SbxError::InvalidUrl {
                url: url_str.to_string(),
                reason: format!("scheme must be https, got '{other}'"),
            })
        }
    }

    if !is_allowed_host(&host, allowed_domains) {
        return Err(SbxError::InvalidUrl {
            url: url_str.to_string(),
            reason: format!("untrusted domain '{host}'"),
        });
    }

    Ok(url)
}

fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Climbing above what we've seen so far escapes the base.
                if !normalized.pop() {
                    return None;
                }
            }
            other => normalized.push(other),
        }
    }
    Some(normalized)
}

/// Resolves `path` (absolute, or relative to `base`) and requires the result
/// to stay inside `base` after `.`/`..` normalization.
pub fn contain_path(path: &Path, base: &Path) -> Result<PathBuf> {
    let base_normalized =
        lexical_normalize(base).ok_or_else(|| SbxError::PathTraversal {
            path: path.to_path_buf(),
            base: base.to_path_buf(),
        })?;
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_normalized.join(path)
    };
    let normalized = lexical_normalize(&joined).filter(|p| p.starts_with(&base_normalized));
    normalized.ok_or_else(|| SbxError::PathTraversal {
        path: path.to_path_buf(),
        base: base.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["example.com".to_string(), "dl.k8s.io".to_string()]
    }

    #[test]
    fn exact_and_subdomain_hosts_are_allowed() {
        let url = validate_url("https://example.com/a.tar.gz", &allowed()).unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        validate_url("https://cdn.example.com/a.tar.gz", &allowed()).unwrap();
    }

    #[test]
    fn untrusted_domain_is_named_in_the_error() {
        let err = validate_url("https://evil.test/a.tar.gz", &allowed()).unwrap_err();
        assert!(err.to_string().contains("untrusted domain 'evil.test'"));
    }

    #[test]
    fn suffix_lookalike_domain_is_rejected() {
        let err = validate_url("https://notexample.com/a", &allowed()).unwrap_err();
        assert!(matches!(err, SbxError::InvalidUrl { .. }));
    }

    #[test]
    fn plain_http_requires_loopback() {
        let err = validate_url("http://example.com/a", &allowed()).unwrap_err();
        assert!(err.to_string().contains("scheme must be https"));

        let loopback = vec!["127.0.0.1".to_string()];
        validate_url("http://127.0.0.1:8080/a", &loopback).unwrap();
    }

    #[test]
    fn unparsable_url_is_invalid() {
        assert!(matches!(
            validate_url("://nope", &allowed()).unwrap_err(),
            SbxError::InvalidUrl { .. }
        ));
    }

    #[test]
    fn contained_relative_path_resolves_under_base() {
        let base = Path::new("/opt/sbx");
        let resolved = contain_path(Path::new("downloads/crio/archive.tar.gz"), base).unwrap();
        assert_eq!(
            resolved,
            PathBuf::from("/opt/sbx/downloads/crio/archive.tar.gz")
        );
    }

    #[test]
    fn dotdot_escape_is_rejected() {
        let base = Path::new("/opt/sbx");
        let err = contain_path(Path::new("downloads/../../etc/passwd"), base).unwrap_err();
        assert!(matches!(err, SbxError::PathTraversal { .. }));
    }

    #[test]
    fn absolute_path_outside_base_is_rejected() {
        let base = Path::new("/opt/sbx");
        let err = contain_path(Path::new("/etc/passwd"), base).unwrap_err();
        assert!(matches!(err, SbxError::PathTraversal { .. }));
    }

    #[test]
    fn internal_dotdot_that_stays_inside_is_allowed() {
        let base = Path::new("/opt/sbx");
        let resolved = contain_path(Path::new("downloads/../bin/crio"), base).unwrap();
        assert_eq!(resolved, PathBuf::from("/opt/sbx/bin/crio"));
    }
}
