//! Operator-level configuration threaded into every values computation.
//!
//! Nothing in this module is read from ambient process state at merge time;
//! the runtime populates one [`OperatorConfig`] at startup and passes it by
//! reference into each reconcile.

use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Vendor-mandated values fragments, keyed by version, baked into the binary
/// at build time. Vendor builds replace this file.
const VENDOR_DEFAULTS_YAML: &str = include_str!("vendor_defaults.yaml");

#[derive(Clone, Debug, Default)]
pub struct OperatorConfig {
    /// Root of the versioned resource tree; profiles live under
    /// `<resource_dir>/<version>/profiles/`.
    pub resource_dir: PathBuf,

    /// Profile applied when the Mesh does not select one.
    pub default_profile: Option<String>,

    /// Non-default platform requiring platform-specific values, if any.
    pub platform: Option<String>,

    /// Whether the host kernel runs in FIPS mode. Detected once at startup.
    pub fips_enabled: bool,

    /// TLS cipher suites mandated by the operator's own configuration.
    pub tls_cipher_suites: Option<Vec<String>>,

    /// Per-version pinned image digests.
    pub image_digests: HashMap<String, ImageDigests>,

    /// Per-version vendor defaults merged underneath user values.
    pub vendor_defaults: HashMap<String, Value>,
}

impl OperatorConfig {
    /// Parses the embedded vendor-defaults document.
    pub fn embedded_vendor_defaults() -> Result<HashMap<String, Value>, serde_yaml::Error> {
        serde_yaml::from_str(VENDOR_DEFAULTS_YAML)
    }

    /// Loads the per-version image-digest table from a mounted YAML file.
    pub fn load_image_digests(
        path: &Path,
    ) -> Result<HashMap<String, ImageDigests>, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed digest table {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Pinned component images for one version. Only applied when the user has
/// not steered image resolution themselves.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDigests {
    pub pilot: Option<String>,
    pub cni: Option<String>,
    pub proxy: Option<String>,
}
