use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Enables scanning of this cluster's workloads against a tenant's scan
/// backend.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "scan-controller.io",
    version = "v1alpha1",
    kind = "ScanIntegration",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ScanIntegrationSpec {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    /// URL of the scan API.
    pub endpoint: String,

    #[serde(default)]
    pub integration_id: String,

    /// Secret, in the integration's namespace, holding the API token.
    pub token_secret_ref: Option<SecretKeyRef>,

    /// Namespace globs; when set, only these namespaces are scanned.
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Namespace globs excluded from scanning when `namespaces` is empty.
    #[serde(default)]
    pub namespaces_exclude: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecretKeyRef {
    pub name: String,
    #[serde(default = "default_token_key")]
    pub key: String,
}

fn enabled_by_default() -> bool {
    true
}

fn default_token_key() -> String {
    "token".to_string()
}
