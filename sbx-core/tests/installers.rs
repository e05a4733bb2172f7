// Specialized installer flows on a temp sandbox/system root. Archives are
// staged into the download folder directly; no network is involved.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use sbx_common::config::Config;
use sbx_common::model::{
    ArchiveDetail, ArtifactMetadata, BinaryDetail, Checksum, ConfigDetail, Platform,
    PlatformChecksums, VersionDetails,
};
use sbx_core::install::crio::CrioInstaller;
use sbx_core::install::kubeadm::KubeadmInstaller;
use sbx_core::install::kubelet::KubeletInstaller;
use sbx_core::install::teleport::TeleportInstaller;
use sbx_core::Installer;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn checksums(data: &[u8]) -> PlatformChecksums {
    let mut arch_map = HashMap::new();
    arch_map.insert(
        "amd64".to_string(),
        Checksum {
            algorithm: "sha256".to_string(),
            digest: sha256_hex(data),
        },
    );
    let mut os_map = HashMap::new();
    os_map.insert("linux".to_string(), arch_map);
    PlatformChecksums(os_map)
}

fn test_config(root: &TempDir) -> Config {
    Config {
        sbx_root: root.path().join("sandbox"),
        system_root: root.path().join("system"),
        allowed_domains: vec!["127.0.0.1".to_string()],
        download_timeout: Duration::from_secs(10),
    }
}

fn build_tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn archive_binary(name: &str, archive: &str, data: &[u8]) -> BinaryDetail {
    BinaryDetail {
        name: name.to_string(),
        archive: Some(archive.to_string()),
        url: None,
        checksums: checksums(data),
    }
}

fn archive_config(name: &str, archive: &str, data: &[u8]) -> ConfigDetail {
    ConfigDetail {
        name: name.to_string(),
        archive: Some(archive.to_string()),
        url: None,
        checksums: checksums(data),
    }
}

const CRIO_BIN: &[u8] = b"#!/bin/sh\necho crio\n";
const PINNS_BIN: &[u8] = b"#!/bin/sh\necho pinns\n";
const CRICTL_BIN: &[u8] = b"#!/bin/sh\necho crictl\n";
const BRIDGE_PLUGIN: &[u8] = b"#!/bin/sh\necho bridge\n";
const CRIO_CONF: &[u8] = b"[crio.runtime]\ndefault_runtime = \"kata\"\nlog_level = \"info\"\n";
const CRIO_SERVICE: &[u8] =
    b"[Unit]\nDescription=CRI-O\n\n[Service]\nExecStart=/usr/local/bin/crio\n";

fn crio_installer(root: &TempDir) -> (CrioInstaller, Config) {
    let config = test_config(root);
    let archive_name = "cri-o.tar.gz";
    let archive = build_tar_gz(&[
        ("cri-o/bin/crio", CRIO_BIN, 0o755),
        ("cri-o/bin/pinns", PINNS_BIN, 0o755),
        ("cri-o/bin/crictl", CRICTL_BIN, 0o755),
        ("cri-o/etc/crio.conf", CRIO_CONF, 0o644),
        ("cri-o/contrib/crio.service", CRIO_SERVICE, 0o644),
        ("cri-o/cni-plugins/bridge", BRIDGE_PLUGIN, 0o755),
    ]);

    let mut versions = HashMap::new();
    versions.insert(
        "1.30.4".to_string(),
        VersionDetails {
            archives: vec![ArchiveDetail {
                name: archive_name.to_string(),
                url: "https://storage.googleapis.com/cri-o/artifacts/cri-o.tar.gz".to_string(),
                checksums: Some(checksums(&archive)),
            }],
            binaries: vec![
                archive_binary("crio", archive_name, CRIO_BIN),
                archive_binary("pinns", archive_name, PINNS_BIN),
                archive_binary("crictl", archive_name, CRICTL_BIN),
            ],
            configs: vec![
                archive_config("crio.conf", archive_name, CRIO_CONF),
                archive_config("crio.service", archive_name, CRIO_SERVICE),
            ],
        },
    );
    let metadata = ArtifactMetadata {
        name: "crio".to_string(),
        versions,
        platform: Platform::new("linux", "amd64"),
    };

    let base = Installer::with_metadata(metadata, None, config.clone()).unwrap();
    fs::create_dir_all(base.download_dir()).unwrap();
    fs::write(base.download_dir().join(archive_name), &archive).unwrap();
    (CrioInstaller::new(base), config)
}

#[test]
fn crio_install_creates_layout_and_fans_out_cni_plugins() {
    let root = TempDir::new().unwrap();
    let (crio, config) = crio_installer(&root);

    crio.base().extract().unwrap();
    crio.install().unwrap();

    for dir in [
        "etc/crio",
        "etc/containers",
        "etc/cni/net.d",
        "usr/libexec/crio",
        "usr/share/oci-umount/oci-umount.d",
    ] {
        assert!(
            root.path().join("system").join(dir).is_dir(),
            "missing system dir {dir}"
        );
    }

    let bridge = config.cni_bin_dir().join("bridge");
    assert_eq!(fs::read(&bridge).unwrap(), BRIDGE_PLUGIN);

    let manifest = root.path().join("system/usr/libexec/crio/crio-install");
    let manifest_content = fs::read_to_string(manifest).unwrap();
    assert!(manifest_content.contains("crio"));
    assert!(manifest_content.contains("pinns"));

    assert_eq!(
        fs::read(config.etc_dir().join("crio/crio.conf")).unwrap(),
        CRIO_CONF
    );
    assert!(crio.base().is_installed());
}

#[test]
fn crio_configure_patches_toml_and_unit() {
    let root = TempDir::new().unwrap();
    let (crio, config) = crio_installer(&root);
    crio.base().extract().unwrap();
    crio.install().unwrap();
    crio.configure().unwrap();

    let patched: toml::Value = fs::read_to_string(root.path().join("system/etc/crio/crio.conf"))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(
        patched["crio"]["runtime"]["default_runtime"].as_str(),
        Some("runc")
    );
    // Keys outside the override set survive the patch.
    assert_eq!(patched["crio"]["runtime"]["log_level"].as_str(), Some("info"));
    let plugin_dirs = patched["crio"]["network"]["plugin_dirs"].as_array().unwrap();
    assert_eq!(
        plugin_dirs[0].as_str(),
        Some(&*config.cni_bin_dir().to_string_lossy())
    );

    let unit =
        fs::read_to_string(root.path().join("system/usr/lib/systemd/system/crio.service"))
            .unwrap();
    let sandbox_bin = config.bin_dir().join("crio");
    assert!(unit.contains(&*sandbox_bin.to_string_lossy()));
    assert!(!unit.contains("ExecStart=/usr/local/bin/crio"));

    assert!(crio.is_configured());
}

#[test]
fn crio_is_configured_layers_content_checks_on_the_marker() {
    let root = TempDir::new().unwrap();
    let (crio, _config) = crio_installer(&root);
    crio.base().extract().unwrap();
    crio.install().unwrap();
    crio.configure().unwrap();
    assert!(crio.is_configured());

    // Marker still present, but the patched unit is gone: deep check fails.
    fs::remove_file(root.path().join("system/usr/lib/systemd/system/crio.service")).unwrap();
    assert!(!crio.is_configured());
    assert!(crio.base().is_configured());
}

#[test]
fn crio_reverse_steps_clean_up_what_was_applied() {
    let root = TempDir::new().unwrap();
    let (crio, config) = crio_installer(&root);
    crio.base().extract().unwrap();
    crio.install().unwrap();
    crio.configure().unwrap();

    crio.remove_configuration().unwrap();
    assert!(!root
        .path()
        .join("system/usr/lib/systemd/system/crio.service")
        .exists());
    assert!(!root.path().join("system/etc/crio/crio.conf").exists());
    assert!(!crio.base().is_configured());

    crio.uninstall().unwrap();
    assert!(!config.bin_dir().join("crio").exists());
    assert!(!root
        .path()
        .join("system/usr/libexec/crio/crio-install")
        .exists());
    assert!(!crio.base().is_installed());
}

const KUBELET_BIN: &[u8] = b"#!/bin/sh\necho kubelet\n";
const KUBELET_SERVICE: &[u8] =
    b"[Service]\nExecStart=/usr/bin/kubelet\nRestart=always\n";
const KUBEADM_DROPIN: &[u8] =
    b"[Service]\nExecStart=\nExecStart=/usr/bin/kubelet $KUBELET_KUBEADM_ARGS\n";

fn kubelet_installer(root: &TempDir, os_release: Option<&str>) -> (KubeletInstaller, Config) {
    let config = test_config(root);
    if let Some(content) = os_release {
        fs::create_dir_all(config.system_path("/etc")).unwrap();
        fs::write(config.os_release_path(), content).unwrap();
    }

    let mut versions = HashMap::new();
    versions.insert(
        "1.30.4".to_string(),
        VersionDetails {
            archives: vec![],
            binaries: vec![BinaryDetail {
                name: "kubelet".to_string(),
                archive: None,
                url: Some("https://dl.k8s.io/v{{VERSION}}/kubelet".to_string()),
                checksums: checksums(KUBELET_BIN),
            }],
            configs: vec![
                ConfigDetail {
                    name: "kubelet.service".to_string(),
                    archive: None,
                    url: Some("https://dl.k8s.io/kubelet.service".to_string()),
                    checksums: checksums(KUBELET_SERVICE),
                },
                ConfigDetail {
                    name: "10-kubeadm.conf".to_string(),
                    archive: None,
                    url: Some("https://dl.k8s.io/10-kubeadm.conf".to_string()),
                    checksums: checksums(KUBEADM_DROPIN),
                },
            ],
        },
    );
    let metadata = ArtifactMetadata {
        name: "kubelet".to_string(),
        versions,
        platform: Platform::new("linux", "amd64"),
    };

    let base = Installer::with_metadata(metadata, None, config.clone()).unwrap();
    fs::create_dir_all(base.download_dir()).unwrap();
    fs::write(base.download_dir().join("kubelet"), KUBELET_BIN).unwrap();
    fs::write(base.download_dir().join("kubelet.service"), KUBELET_SERVICE).unwrap();
    fs::write(base.download_dir().join("10-kubeadm.conf"), KUBEADM_DROPIN).unwrap();
    (KubeletInstaller::new(base), config)
}

#[test]
fn kubelet_configure_patches_units_and_seeds_sysconfig() {
    let root = TempDir::new().unwrap();
    let (kubelet, config) = kubelet_installer(&root, Some("ID=ubuntu\n"));

    kubelet.install().unwrap();
    kubelet.configure().unwrap();

    let unit =
        fs::read_to_string(root.path().join("system/usr/lib/systemd/system/kubelet.service"))
            .unwrap();
    let sandbox_bin = config.bin_dir().join("kubelet");
    assert!(unit.contains(&*sandbox_bin.to_string_lossy()));
    assert!(!unit.contains("ExecStart=/usr/bin/kubelet"));

    let dropin = fs::read_to_string(
        root.path()
            .join("system/usr/lib/systemd/system/kubelet.service.d/10-kubeadm.conf"),
    )
    .unwrap();
    assert!(dropin.contains(&*sandbox_bin.to_string_lossy()));

    // ubuntu vendor -> /etc/default
    let sysconfig = root.path().join("system/etc/default/kubelet");
    assert_eq!(
        fs::read_to_string(&sysconfig).unwrap(),
        "KUBELET_EXTRA_ARGS=\n"
    );
}

#[test]
fn kubelet_sysconfig_defaults_to_etc_sysconfig_elsewhere() {
    let root = TempDir::new().unwrap();
    let (kubelet, _config) = kubelet_installer(&root, Some("ID=\"rocky\"\n"));

    kubelet.install().unwrap();
    kubelet.configure().unwrap();
    assert!(root.path().join("system/etc/sysconfig/kubelet").is_file());
}

#[test]
fn kubelet_remove_configuration_is_symmetric() {
    let root = TempDir::new().unwrap();
    let (kubelet, _config) = kubelet_installer(&root, Some("ID=ubuntu\n"));
    kubelet.install().unwrap();
    kubelet.configure().unwrap();

    kubelet.remove_configuration().unwrap();
    assert!(!root
        .path()
        .join("system/usr/lib/systemd/system/kubelet.service")
        .exists());
    assert!(!root.path().join("system/etc/default/kubelet").exists());
    assert!(!kubelet.base().is_configured());
}

const KUBEADM_BIN: &[u8] = b"#!/bin/sh\necho kubeadm\n";

fn kubeadm_installer(root: &TempDir) -> (KubeadmInstaller, Config) {
    let config = test_config(root);
    let mut versions = HashMap::new();
    versions.insert(
        "1.30.4".to_string(),
        VersionDetails {
            archives: vec![],
            binaries: vec![BinaryDetail {
                name: "kubeadm".to_string(),
                archive: None,
                url: Some("https://dl.k8s.io/v{{VERSION}}/kubeadm".to_string()),
                checksums: checksums(KUBEADM_BIN),
            }],
            configs: vec![],
        },
    );
    let metadata = ArtifactMetadata {
        name: "kubeadm".to_string(),
        versions,
        platform: Platform::new("linux", "amd64"),
    };
    let base = Installer::with_metadata(metadata, None, config.clone()).unwrap();
    fs::create_dir_all(base.download_dir()).unwrap();
    fs::write(base.download_dir().join("kubeadm"), KUBEADM_BIN).unwrap();
    (KubeadmInstaller::new(base), config)
}

#[test]
fn kubeadm_configure_generates_a_well_formed_token_once() {
    let root = TempDir::new().unwrap();
    let (kubeadm, _config) = kubeadm_installer(&root);

    kubeadm.install().unwrap();
    kubeadm.configure().unwrap();

    let token = fs::read_to_string(kubeadm.token_path()).unwrap();
    let token = token.trim();
    let (id, secret) = token.split_once('.').expect("token has a dot");
    assert_eq!(id.len(), 6);
    assert_eq!(secret.len(), 16);
    assert!(token
        .chars()
        .all(|c| c == '.' || c.is_ascii_lowercase() || c.is_ascii_digit()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(kubeadm.token_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // Re-running configure keeps the existing token.
    kubeadm.configure().unwrap();
    assert_eq!(
        fs::read_to_string(kubeadm.token_path()).unwrap().trim(),
        token
    );

    kubeadm.remove_configuration().unwrap();
    assert!(!kubeadm.token_path().exists());
}

const TELEPORT_BIN: &[u8] = b"#!/bin/sh\necho teleport\n";
const TCTL_BIN: &[u8] = b"#!/bin/sh\necho tctl\n";
const TSH_BIN: &[u8] = b"#!/bin/sh\necho tsh\n";

fn teleport_installer(root: &TempDir) -> (TeleportInstaller, Config) {
    let config = test_config(root);
    let archive_name = "teleport-bin.tar.gz";
    let archive = build_tar_gz(&[
        ("teleport/teleport", TELEPORT_BIN, 0o755),
        ("teleport/tctl", TCTL_BIN, 0o755),
        ("teleport/tsh", TSH_BIN, 0o755),
    ]);

    let mut versions = HashMap::new();
    versions.insert(
        "16.1.4".to_string(),
        VersionDetails {
            archives: vec![ArchiveDetail {
                name: archive_name.to_string(),
                url: "https://cdn.teleport.dev/teleport-bin.tar.gz".to_string(),
                checksums: Some(checksums(&archive)),
            }],
            binaries: vec![
                archive_binary("teleport", archive_name, TELEPORT_BIN),
                archive_binary("tctl", archive_name, TCTL_BIN),
                archive_binary("tsh", archive_name, TSH_BIN),
            ],
            configs: vec![],
        },
    );
    let metadata = ArtifactMetadata {
        name: "teleport".to_string(),
        versions,
        platform: Platform::new("linux", "amd64"),
    };
    let base = Installer::with_metadata(metadata, None, config.clone()).unwrap();
    fs::create_dir_all(base.download_dir()).unwrap();
    fs::write(base.download_dir().join(archive_name), &archive).unwrap();
    (TeleportInstaller::new(base), config)
}

#[test]
fn teleport_configure_writes_config_and_unit() {
    let root = TempDir::new().unwrap();
    let (teleport, config) = teleport_installer(&root);

    teleport.base().extract().unwrap();
    teleport.install().unwrap();
    teleport.configure().unwrap();

    let node_config =
        fs::read_to_string(root.path().join("system/etc/teleport.yaml")).unwrap();
    let data_dir = config.sbx_root().join("var/lib/teleport");
    assert!(node_config.contains(&*data_dir.to_string_lossy()));
    assert!(data_dir.is_dir());

    let unit = fs::read_to_string(
        root.path()
            .join("system/usr/lib/systemd/system/teleport.service"),
    )
    .unwrap();
    let sandbox_bin = config.bin_dir().join("teleport");
    assert!(unit.contains(&*sandbox_bin.to_string_lossy()));
    assert!(unit.contains(&*root.path().join("system/etc/teleport.yaml").to_string_lossy()));

    for binary in ["teleport", "tctl", "tsh"] {
        assert_eq!(
            fs::read_link(config.system_bin_dir().join(binary)).unwrap(),
            config.bin_dir().join(binary)
        );
    }

    teleport.remove_configuration().unwrap();
    assert!(!root.path().join("system/etc/teleport.yaml").exists());
    assert!(!root
        .path()
        .join("system/usr/lib/systemd/system/teleport.service")
        .exists());
}
