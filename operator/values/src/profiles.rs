//! Built-in values profiles: name resolution, traversal-safe loading, and
//! ordered merging.

use serde_json::{Map, Value};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use trellis_operator_core::values;

/// The profile that is always applied first, implicitly.
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile name is empty")]
    EmptyName,

    #[error("invalid profile name {name:?}: resolves outside the profiles directory")]
    UnsafeName { name: String },

    #[error("failed to read profile {name:?}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed profile {name:?}: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("profile {name:?} values are not representable: {source}")]
    Convert {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Resolves the ordered list of profiles to apply.
///
/// "default" is implicit and always first. A user-selected profile takes
/// precedence over the operator's configured default; naming "default"
/// explicitly is a no-op. The result never contains duplicates.
pub fn resolve(default_profile: Option<&str>, user_profile: Option<&str>) -> Vec<String> {
    let mut names = vec![DEFAULT_PROFILE.to_string()];
    let selected = [user_profile, default_profile]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty() && *name != DEFAULT_PROFILE);
    if let Some(name) = selected {
        names.push(name.to_string());
    }
    names
}

/// Loads and merges the named profiles in order, later profiles overriding
/// earlier ones. Names that were already applied are skipped.
pub async fn load(
    resource_dir: &Path,
    version: &str,
    names: &[String],
) -> Result<Value, ProfileError> {
    let mut merged = Value::Object(Map::new());
    let mut applied = HashSet::new();
    for name in names {
        if !applied.insert(name.as_str()) {
            continue;
        }
        let fragment = load_one(resource_dir, version, name).await?;
        merged = values::merge(merged, &fragment);
    }
    Ok(merged)
}

async fn load_one(resource_dir: &Path, version: &str, name: &str) -> Result<Value, ProfileError> {
    let path = profile_path(resource_dir, version, name)?;
    tracing::debug!(profile = %name, path = %path.display(), "Loading profile");
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ProfileError::Read {
            name: name.to_string(),
            source,
        })?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|source| ProfileError::Parse {
            name: name.to_string(),
            source,
        })?;

    // Profiles are Mesh-shaped documents; only spec.values matters here. A
    // profile without values is a legitimate empty fragment.
    let fragment = doc
        .get("spec")
        .and_then(|spec| spec.get("values"))
        .cloned()
        .unwrap_or(serde_yaml::Value::Null);
    if fragment.is_null() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::to_value(fragment).map_err(|source| ProfileError::Convert {
        name: name.to_string(),
        source,
    })
}

/// Builds the on-disk path for a profile, rejecting names that would escape
/// the per-version profiles directory.
fn profile_path(resource_dir: &Path, version: &str, name: &str) -> Result<PathBuf, ProfileError> {
    if name.is_empty() {
        return Err(ProfileError::EmptyName);
    }
    let dir = resource_dir.join(version).join("profiles");
    let path = dir.join(format!("{name}.yaml"));
    // Join does not normalize, so "../x" or "a/b" leave a parent other than
    // the profiles directory itself.
    if path.parent() != Some(dir.as_path()) {
        return Err(ProfileError::UnsafeName {
            name: name.to_string(),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(None, None, &["default"])]
    #[case(Some("demo"), None, &["default", "demo"])]
    #[case(None, Some("prod"), &["default", "prod"])]
    #[case(Some("demo"), Some("prod"), &["default", "prod"])]
    #[case(Some("default"), None, &["default"])]
    #[case(Some("demo"), Some("default"), &["default", "demo"])]
    #[case(None, Some("default"), &["default"])]
    #[case(Some(""), Some(""), &["default"])]
    fn resolve_orders_and_dedupes(
        #[case] default_profile: Option<&str>,
        #[case] user_profile: Option<&str>,
        #[case] expected: &[&str],
    ) {
        assert_eq!(resolve(default_profile, user_profile), expected);
    }

    #[rstest]
    #[case("../secrets")]
    #[case("../../etc/passwd")]
    #[case("nested/profile")]
    #[case("/absolute")]
    fn profile_path_rejects_escaping_names(#[case] name: &str) {
        let err = profile_path(Path::new("/resources"), "1.24.0", name).unwrap_err();
        assert!(matches!(err, ProfileError::UnsafeName { .. }), "{err}");
    }

    #[test]
    fn profile_path_rejects_empty_name() {
        let err = profile_path(Path::new("/resources"), "1.24.0", "").unwrap_err();
        assert!(matches!(err, ProfileError::EmptyName));
    }

    #[test]
    fn profile_path_stays_inside_profiles_dir() {
        let path = profile_path(Path::new("/resources"), "1.24.0", "demo").unwrap();
        assert_eq!(
            path,
            Path::new("/resources/1.24.0/profiles/demo.yaml").to_path_buf()
        );
    }

    fn write_profiles(dir: &Path, version: &str, profiles: &[(&str, &str)]) {
        let profiles_dir = dir.join(version).join("profiles");
        std::fs::create_dir_all(&profiles_dir).unwrap();
        for (name, content) in profiles {
            std::fs::write(profiles_dir.join(format!("{name}.yaml")), content).unwrap();
        }
    }

    #[tokio::test]
    async fn load_merges_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_profiles(
            dir.path(),
            "1.24.0",
            &[
                (
                    "default",
                    "spec:\n  values:\n    pilot:\n      tag: A\n      hub: docker.io/trellis\n",
                ),
                ("custom", "spec:\n  values:\n    pilot:\n      tag: B\n"),
            ],
        );

        let names = vec!["default".to_string(), "custom".to_string()];
        let merged = load(dir.path(), "1.24.0", &names).await.unwrap();
        assert_eq!(
            merged,
            json!({"pilot": {"tag": "B", "hub": "docker.io/trellis"}})
        );
    }

    #[tokio::test]
    async fn load_skips_already_applied_names() {
        let dir = tempfile::tempdir().unwrap();
        write_profiles(
            dir.path(),
            "1.24.0",
            &[("default", "spec:\n  values:\n    pilot:\n      tag: A\n")],
        );

        let names = vec!["default".to_string(), "default".to_string()];
        let merged = load(dir.path(), "1.24.0", &names).await.unwrap();
        assert_eq!(merged, json!({"pilot": {"tag": "A"}}));
    }

    #[tokio::test]
    async fn load_treats_missing_values_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_profiles(dir.path(), "1.24.0", &[("default", "spec: {}\n")]);

        let names = vec!["default".to_string()];
        let merged = load(dir.path(), "1.24.0", &names).await.unwrap();
        assert_eq!(merged, json!({}));
    }

    #[tokio::test]
    async fn load_fails_on_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write_profiles(dir.path(), "1.24.0", &[("default", "spec: [odd\n")]);

        let names = vec!["default".to_string()];
        let err = load(dir.path(), "1.24.0", &names).await.unwrap_err();
        assert!(matches!(err, ProfileError::Parse { .. }), "{err}");
    }

    #[tokio::test]
    async fn load_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        write_profiles(dir.path(), "1.24.0", &[]);

        let names = vec!["default".to_string()];
        let err = load(dir.path(), "1.24.0", &names).await.unwrap_err();
        assert!(matches!(err, ProfileError::Read { .. }), "{err}");
    }
}
