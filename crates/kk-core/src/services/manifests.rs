//! Fixed payloads applied to the cluster.

use serde_json::json;

use crate::models::{PortAllocation, PortRole};

pub const ESO_NAMESPACE: &str = "external-secrets";
pub const ESO_RELEASE: &str = "external-secrets";
pub const ESO_CHART: &str = "external-secrets/external-secrets";
pub const ESO_REPO_URL: &str = "https://charts.external-secrets.io";

pub const DASHBOARD_NAMESPACE: &str = "kubernetes-dashboard";
pub const DASHBOARD_RELEASE: &str = "kubernetes-dashboard";
pub const DASHBOARD_CHART: &str = "kubernetes-dashboard/kubernetes-dashboard";
pub const DASHBOARD_REPO_URL: &str = "https://kubernetes.github.io/dashboard/";
pub const DASHBOARD_ADMIN: &str = "admin-user";

pub const CREDENTIAL_SECRET: &str = "keeper-credential";
pub const CREDENTIAL_KEY: &str = "auth";
pub const CLUSTER_STORE: &str = "keeper-secret-store";

const ESO_API_VERSION: &str = "external-secrets.io/v1beta1";

/// kind cluster config publishing the allocated host ports.
pub fn kind_config(ports: &PortAllocation) -> String {
    let http = ports.get(PortRole::Http).unwrap_or(PortRole::Http.default_port());
    let https = ports
        .get(PortRole::Https)
        .unwrap_or(PortRole::Https.default_port());
    let nodeport = ports
        .get(PortRole::NodeportBase)
        .unwrap_or(PortRole::NodeportBase.default_port());

    format!(
        r#"kind: Cluster
apiVersion: kind.x-k8s.io/v1alpha4
nodes:
- role: control-plane
  kubeadmConfigPatches:
  - |
    kind: InitConfiguration
    nodeRegistration:
      kubeletExtraArgs:
        node-labels: "ingress-ready=true"
  extraPortMappings:
  - containerPort: 80
    hostPort: {http}
    protocol: TCP
  - containerPort: 443
    hostPort: {https}
    protocol: TCP
  - containerPort: {nodeport}
    hostPort: {nodeport}
    protocol: TCP
"#
    )
}

/// Service account and binding whose token logs into the dashboard.
pub fn dashboard_admin() -> String {
    json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            {
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": { "name": DASHBOARD_ADMIN, "namespace": DASHBOARD_NAMESPACE }
            },
            {
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRoleBinding",
                "metadata": { "name": DASHBOARD_ADMIN },
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "ClusterRole",
                    "name": "cluster-admin"
                },
                "subjects": [{
                    "kind": "ServiceAccount",
                    "name": DASHBOARD_ADMIN,
                    "namespace": DASHBOARD_NAMESPACE
                }]
            }
        ]
    })
    .to_string()
}

/// Secret holding the KSM client config the provider authenticates with.
pub fn credential_secret(ksm_config: &str) -> String {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": CREDENTIAL_SECRET, "namespace": ESO_NAMESPACE },
        "type": "Opaque",
        "stringData": { CREDENTIAL_KEY: ksm_config }
    })
    .to_string()
}

/// Cluster-wide store scoped to one Keeper shared folder.
pub fn cluster_secret_store(folder_id: &str) -> String {
    json!({
        "apiVersion": ESO_API_VERSION,
        "kind": "ClusterSecretStore",
        "metadata": { "name": CLUSTER_STORE },
        "spec": {
            "provider": {
                "keepersecurity": {
                    "authRef": {
                        "name": CREDENTIAL_SECRET,
                        "key": CREDENTIAL_KEY,
                        "namespace": ESO_NAMESPACE
                    },
                    "folderID": folder_id
                }
            }
        }
    })
    .to_string()
}

pub fn sample_external_secret() -> String {
    json!({
        "apiVersion": ESO_API_VERSION,
        "kind": "ExternalSecret",
        "metadata": { "name": "k8s-keeper-probe", "namespace": "default" },
        "spec": {
            "refreshInterval": "1h",
            "secretStoreRef": { "kind": "ClusterSecretStore", "name": CLUSTER_STORE },
            "target": { "name": "k8s-keeper-probe" },
            "data": [{
                "secretKey": "probe",
                "remoteRef": { "key": "probe" }
            }]
        }
    })
    .to_string()
}

pub fn sample_secret_store() -> String {
    json!({
        "apiVersion": ESO_API_VERSION,
        "kind": "SecretStore",
        "metadata": { "name": "k8s-keeper-probe", "namespace": "default" },
        "spec": {
            "provider": {
                "fake": { "data": [{ "key": "probe", "value": "ok" }] }
            }
        }
    })
    .to_string()
}

pub fn sample_cluster_secret_store() -> String {
    json!({
        "apiVersion": ESO_API_VERSION,
        "kind": "ClusterSecretStore",
        "metadata": { "name": "k8s-keeper-probe" },
        "spec": {
            "provider": {
                "fake": { "data": [{ "key": "probe", "value": "ok" }] }
            }
        }
    })
    .to_string()
}
