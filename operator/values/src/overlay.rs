//! The configuration overlay pipeline.
//!
//! Layering, from bottom to top: profile defaults, vendor defaults, user
//! values. Image digests and the FIPS/TLS/platform overrides fill gaps the
//! user left open; the final overrides are operator-managed and always win.

use crate::{
    config::OperatorConfig,
    profiles::{self, ProfileError},
    schema::MeshValues,
};
use serde_json::{json, Map, Value};
use trellis_operator_core::values;

const PILOT_IMAGE: &str = "pilot.image";
const CNI_IMAGE: &str = "cni.image";
const PROXY_IMAGE: &str = "global.proxy.image";
const GLOBAL_HUB: &str = "global.hub";
const GLOBAL_TAG: &str = "global.tag";
const COMPLIANCE_POLICY: &str = "pilot.env.COMPLIANCE_POLICY";
const TLS_CIPHER_SUITES: &str = "global.tls.cipherSuites";
const PLATFORM: &str = "global.platform";
const REVISION: &str = "revision";
const MESH_NAMESPACE: &str = "global.meshNamespace";

/// The FIPS 140-2 compliance policy enforced on the control plane when the
/// host kernel runs in FIPS mode.
const FIPS_COMPLIANCE_POLICY: &str = "fips-140-2";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to apply profiles: {0}")]
    Profiles(#[from] ProfileError),

    #[error("failed to convert merged values to the typed configuration: {0}")]
    Convert(#[source] serde_json::Error),
}

/// Computes the final values tree for one revision.
///
/// `revision` is the active revision name; `namespace` is the parent's
/// declared control-plane namespace. The pipeline is strictly ordered and
/// returns no partial result on error.
pub async fn compute(
    version: &str,
    namespace: &str,
    revision: &str,
    profile: Option<&str>,
    user_values: Option<&Value>,
    config: &OperatorConfig,
) -> Result<Value, Error> {
    let mut merged = user_values
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    // Digest pins fill image fields the user left open; an explicit hub, tag
    // or image always stands.
    apply_image_digests(&mut merged, version, config);

    // Vendor defaults sit underneath user values: opposite precedence to the
    // digest pins above.
    if let Some(vendor) = config.vendor_defaults.get(version) {
        merged = values::merge(vendor.clone(), &merged);
    }

    // Profiles are the bottom layer; everything accumulated so far wins.
    let names = profiles::resolve(config.default_profile.as_deref(), profile);
    let profile_values = profiles::load(&config.resource_dir, version, &names).await?;
    merged = values::merge(profile_values, &merged);

    if config.fips_enabled {
        values::set_path_if_unset(&mut merged, COMPLIANCE_POLICY, json!(FIPS_COMPLIANCE_POLICY));
    }

    if let Some(suites) = config.tls_cipher_suites.as_deref().filter(|s| !s.is_empty()) {
        values::set_path_if_unset(&mut merged, TLS_CIPHER_SUITES, json!(suites));
    }

    if let Some(platform) = config.platform.as_deref().filter(|p| !p.is_empty()) {
        values::set_path_if_unset(&mut merged, PLATFORM, json!(platform));
    }

    // Operator-managed fields, overwritten regardless of user input. The
    // injection webhook matches the default revision on the empty string, so
    // the "default" sentinel must never reach the rendered values.
    let revision = if revision == profiles::DEFAULT_PROFILE {
        ""
    } else {
        revision
    };
    values::set_path(&mut merged, REVISION, json!(revision));
    values::set_path(&mut merged, MESH_NAMESPACE, json!(namespace));

    // Round-trip through the typed shape so a tree the rendering layer could
    // not consume fails here, before a revision is written.
    let typed: MeshValues = serde_json::from_value(merged).map_err(Error::Convert)?;
    serde_json::to_value(&typed).map_err(Error::Convert)
}

fn apply_image_digests(merged: &mut Value, version: &str, config: &OperatorConfig) {
    let Some(digests) = config.image_digests.get(version) else {
        return;
    };
    // A user-set hub or tag means the user is steering image resolution for
    // every component; pins would produce a mixed deployment.
    if values::get_path(merged, GLOBAL_HUB).is_some()
        || values::get_path(merged, GLOBAL_TAG).is_some()
    {
        return;
    }
    if let Some(image) = &digests.pilot {
        values::set_path_if_unset(merged, PILOT_IMAGE, json!(image));
    }
    if let Some(image) = &digests.cni {
        values::set_path_if_unset(merged, CNI_IMAGE, json!(image));
    }
    if let Some(image) = &digests.proxy {
        values::set_path_if_unset(merged, PROXY_IMAGE, json!(image));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageDigests;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use trellis_operator_core::values::get_path;

    const VERSION: &str = "1.24.0";

    fn write_profiles(dir: &Path, profiles: &[(&str, &str)]) {
        let profiles_dir = dir.join(VERSION).join("profiles");
        std::fs::create_dir_all(&profiles_dir).unwrap();
        for (name, content) in profiles {
            std::fs::write(profiles_dir.join(format!("{name}.yaml")), content).unwrap();
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> OperatorConfig {
        write_profiles(
            dir.path(),
            &[("default", "spec:\n  values:\n    pilot:\n      tag: A\n")],
        );
        OperatorConfig {
            resource_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    async fn compute_with(
        config: &OperatorConfig,
        user_values: Option<&Value>,
    ) -> Result<Value, Error> {
        compute(VERSION, "trellis-system", "default", None, user_values, config).await
    }

    #[tokio::test]
    async fn digest_pins_fill_unset_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.image_digests.insert(
            VERSION.to_string(),
            ImageDigests {
                pilot: Some("pilot@sha256:aaa".to_string()),
                cni: Some("cni@sha256:bbb".to_string()),
                proxy: Some("proxy@sha256:ccc".to_string()),
            },
        );

        let out = compute_with(&config, None).await.unwrap();
        assert_eq!(get_path(&out, "pilot.image"), Some(&json!("pilot@sha256:aaa")));
        assert_eq!(get_path(&out, "cni.image"), Some(&json!("cni@sha256:bbb")));
        assert_eq!(
            get_path(&out, "global.proxy.image"),
            Some(&json!("proxy@sha256:ccc"))
        );
    }

    #[tokio::test]
    async fn digest_pins_never_override_user_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.image_digests.insert(
            VERSION.to_string(),
            ImageDigests {
                pilot: Some("pilot@sha256:aaa".to_string()),
                ..Default::default()
            },
        );

        let user = json!({"pilot": {"image": "my-pilot:v2"}});
        let out = compute_with(&config, Some(&user)).await.unwrap();
        assert_eq!(get_path(&out, "pilot.image"), Some(&json!("my-pilot:v2")));
    }

    #[tokio::test]
    async fn digest_pins_skipped_when_user_sets_hub_or_tag() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.image_digests.insert(
            VERSION.to_string(),
            ImageDigests {
                pilot: Some("pilot@sha256:aaa".to_string()),
                ..Default::default()
            },
        );

        let user = json!({"global": {"hub": "registry.example.com"}});
        let out = compute_with(&config, Some(&user)).await.unwrap();
        assert_eq!(get_path(&out, "pilot.image"), None);
    }

    #[tokio::test]
    async fn vendor_defaults_sit_under_user_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.vendor_defaults.insert(
            VERSION.to_string(),
            json!({"pilot": {"replicaCount": 2, "tag": "vendor"}}),
        );

        let user = json!({"pilot": {"tag": "user"}});
        let out = compute_with(&config, Some(&user)).await.unwrap();
        assert_eq!(get_path(&out, "pilot.replicaCount"), Some(&json!(2)));
        assert_eq!(get_path(&out, "pilot.tag"), Some(&json!("user")));
    }

    #[tokio::test]
    async fn profiles_layer_under_user_values() {
        let dir = tempfile::tempdir().unwrap();
        write_profiles(
            dir.path(),
            &[
                ("default", "spec:\n  values:\n    pilot:\n      tag: A\n"),
                ("custom", "spec:\n  values:\n    pilot:\n      tag: B\n"),
            ],
        );
        let config = OperatorConfig {
            resource_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        // Selected profile overrides the default profile.
        let out = compute(VERSION, "ns", "default", Some("custom"), None, &config)
            .await
            .unwrap();
        assert_eq!(get_path(&out, "pilot.tag"), Some(&json!("B")));

        // User values override any profile.
        let user = json!({"pilot": {"tag": "C"}});
        let out = compute(VERSION, "ns", "default", Some("custom"), Some(&user), &config)
            .await
            .unwrap();
        assert_eq!(get_path(&out, "pilot.tag"), Some(&json!("C")));
    }

    #[tokio::test]
    async fn unsafe_profile_name_aborts_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        let err = compute(VERSION, "ns", "default", Some("../escape"), None, &config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Profiles(ProfileError::UnsafeName { .. })
        ));
    }

    #[tokio::test]
    async fn fips_sets_compliance_policy_unless_user_did() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.fips_enabled = true;

        let out = compute_with(&config, None).await.unwrap();
        assert_eq!(
            get_path(&out, "pilot.env.COMPLIANCE_POLICY"),
            Some(&json!("fips-140-2"))
        );

        let user = json!({"pilot": {"env": {"COMPLIANCE_POLICY": "custom-policy"}}});
        let out = compute_with(&config, Some(&user)).await.unwrap();
        assert_eq!(
            get_path(&out, "pilot.env.COMPLIANCE_POLICY"),
            Some(&json!("custom-policy"))
        );
    }

    #[tokio::test]
    async fn tls_cipher_suites_fill_unset_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.tls_cipher_suites = Some(vec![
            "TLS_AES_128_GCM_SHA256".to_string(),
            "TLS_AES_256_GCM_SHA384".to_string(),
        ]);

        let out = compute_with(&config, None).await.unwrap();
        assert_eq!(
            get_path(&out, "global.tls.cipherSuites"),
            Some(&json!(["TLS_AES_128_GCM_SHA256", "TLS_AES_256_GCM_SHA384"]))
        );

        let user = json!({"global": {"tls": {"cipherSuites": ["TLS_CHACHA20_POLY1305_SHA256"]}}});
        let out = compute_with(&config, Some(&user)).await.unwrap();
        assert_eq!(
            get_path(&out, "global.tls.cipherSuites"),
            Some(&json!(["TLS_CHACHA20_POLY1305_SHA256"]))
        );
    }

    #[tokio::test]
    async fn platform_set_only_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.platform = Some("openshift".to_string());

        let out = compute_with(&config, None).await.unwrap();
        assert_eq!(get_path(&out, "global.platform"), Some(&json!("openshift")));

        let user = json!({"global": {"platform": "gke"}});
        let out = compute_with(&config, Some(&user)).await.unwrap();
        assert_eq!(get_path(&out, "global.platform"), Some(&json!("gke")));
    }

    #[tokio::test]
    async fn default_revision_normalizes_to_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        let out = compute(VERSION, "ns", "default", None, None, &config)
            .await
            .unwrap();
        assert_eq!(get_path(&out, "revision"), Some(&json!("")));

        let out = compute(VERSION, "ns", "my-mesh-1-24-0", None, None, &config)
            .await
            .unwrap();
        assert_eq!(get_path(&out, "revision"), Some(&json!("my-mesh-1-24-0")));
    }

    #[tokio::test]
    async fn mesh_namespace_always_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        let user = json!({"global": {"meshNamespace": "user-picked"}});
        let out = compute(VERSION, "trellis-system", "default", None, Some(&user), &config)
            .await
            .unwrap();
        assert_eq!(
            get_path(&out, "global.meshNamespace"),
            Some(&json!("trellis-system"))
        );
    }

    #[tokio::test]
    async fn untypable_tree_fails_with_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        // `pilot` must be a mapping in the typed shape.
        let user = json!({"pilot": "disabled"});
        let err = compute_with(&config, Some(&user)).await.unwrap_err();
        assert!(matches!(err, Error::Convert(_)), "{err}");
    }
}
