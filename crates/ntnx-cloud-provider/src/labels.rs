//! Prism Element and host labels on nodes
//!
//! When custom labeling is enabled, every node is labeled with the UUID and
//! name of the Prism Element cluster and the physical host running its VM.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use ntnx_common::{
    Error, Result, CLIENT_NAME, CUSTOM_HOST_NAME_LABEL, CUSTOM_HOST_UUID_LABEL,
    CUSTOM_PE_NAME_LABEL, CUSTOM_PE_UUID_LABEL,
};

use crate::prism::{Prism, Vm};

/// Maximum length of a Kubernetes label value
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Add-or-update access to node labels
///
/// Implementations merge the given labels into the node's existing labels and
/// never remove labels they were not given.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeLabeler: Send + Sync {
    /// Add or overwrite labels on a node
    async fn add_or_update_labels(
        &self,
        node_name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// [`NodeLabeler`] backed by the Kubernetes API
pub struct KubeNodeLabeler {
    client: Client,
    field_manager: String,
}

impl KubeNodeLabeler {
    /// Create a labeler patching nodes as the cloud controller manager
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: CLIENT_NAME.to_string(),
        }
    }
}

#[async_trait]
impl NodeLabeler for KubeNodeLabeler {
    async fn add_or_update_labels(
        &self,
        node_name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "metadata": { "labels": labels } });
        api.patch(
            node_name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| Error::labeling_rejected(node_name, e))?;
        Ok(())
    }
}

/// Computes and applies topology labels for a node
#[derive(Clone)]
pub struct LabelReconciler {
    labeler: Arc<dyn NodeLabeler>,
}

impl LabelReconciler {
    /// Create a reconciler writing through `labeler`
    pub fn new(labeler: Arc<dyn NodeLabeler>) -> Self {
        Self { labeler }
    }

    /// Label `node` with the cluster and host running `vm`
    ///
    /// A cluster lookup failure fails the call. A host lookup failure is
    /// logged and the host labels are left out. Only labels whose value
    /// differs from the node's current value are written.
    pub async fn apply_topology_labels(
        &self,
        prism: &dyn Prism,
        node: &Node,
        vm: &Vm,
    ) -> Result<()> {
        let node_name = node.name_any();
        let desired = desired_labels(prism, vm).await?;

        let current = node.labels();
        let changed: BTreeMap<String, String> = desired
            .into_iter()
            .filter(|(key, value)| current.get(key) != Some(value))
            .collect();

        if changed.is_empty() {
            debug!(node = %node_name, "topology labels already up to date");
            return Ok(());
        }

        self.labeler.add_or_update_labels(&node_name, &changed).await?;
        info!(node = %node_name, labels = ?changed, "updated topology labels");
        Ok(())
    }
}

async fn desired_labels(prism: &dyn Prism, vm: &Vm) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    let Some(cluster_uuid) = vm.cluster.as_deref() else {
        debug!(vm = %vm.ext_id, "VM has no cluster reference, no topology labels");
        return Ok(labels);
    };

    let cluster = prism.get_cluster(cluster_uuid).await.map_err(|e| {
        warn!(vm = %vm.name, cluster = %cluster_uuid, error = %e, "failed to fetch cluster for node labels");
        e
    })?;
    labels.insert(
        CUSTOM_PE_UUID_LABEL.to_string(),
        sanitize_label_value(&cluster.ext_id),
    );
    labels.insert(
        CUSTOM_PE_NAME_LABEL.to_string(),
        sanitize_label_value(&cluster.name),
    );

    if let Some(host_uuid) = vm.host.as_deref() {
        match prism.get_cluster_host(&cluster.ext_id, host_uuid).await {
            Ok(host) => {
                labels.insert(
                    CUSTOM_HOST_UUID_LABEL.to_string(),
                    sanitize_label_value(&host.ext_id),
                );
                labels.insert(
                    CUSTOM_HOST_NAME_LABEL.to_string(),
                    sanitize_label_value(&host.name),
                );
            }
            Err(e) => {
                warn!(vm = %vm.ext_id, host = %host_uuid, error = %e, "failed to fetch host, skipping host labels");
            }
        }
    }

    Ok(labels)
}

/// Coerce a value into the Kubernetes label value charset
///
/// Keeps ASCII alphanumerics and `-_.`, replaces runs of anything else with a
/// single `_`, trims separators from both ends and caps the length at 63.
pub fn sanitize_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let is_separator = |c: char| matches!(c, '-' | '_' | '.');
    let trimmed = out.trim_matches(is_separator);
    let truncated = &trimmed[..trimmed.len().min(MAX_LABEL_VALUE_LEN)];
    truncated.trim_end_matches(is_separator).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prism::{Cluster, Host, MockPrism};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use ntnx_common::EntityKind;
    use rstest::rstest;
    use std::sync::Mutex;

    /// Labeler keeping an in-memory label map per node
    #[derive(Clone, Default)]
    struct RecordingLabeler {
        nodes: Arc<Mutex<BTreeMap<String, BTreeMap<String, String>>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl RecordingLabeler {
        fn labels_of(&self, node: &str) -> BTreeMap<String, String> {
            self.nodes.lock().unwrap().get(node).cloned().unwrap_or_default()
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl NodeLabeler for RecordingLabeler {
        async fn add_or_update_labels(
            &self,
            node_name: &str,
            labels: &BTreeMap<String, String>,
        ) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            let mut nodes = self.nodes.lock().unwrap();
            let current = nodes.entry(node_name.to_string()).or_default();
            current.extend(labels.clone());
            Ok(())
        }
    }

    fn node(name: &str, labels: BTreeMap<String, String>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn vm(cluster: Option<&str>, host: Option<&str>) -> Vm {
        Vm {
            ext_id: "vm-1".to_string(),
            name: "my-vm".to_string(),
            cluster: cluster.map(str::to_string),
            host: host.map(str::to_string),
            ..Default::default()
        }
    }

    fn prism() -> MockPrism {
        let mut prism = MockPrism::new();
        prism.expect_get_cluster().returning(|uuid| {
            Ok(Cluster {
                ext_id: uuid.to_string(),
                name: "pe cluster/1".to_string(),
                ..Default::default()
            })
        });
        prism
            .expect_get_cluster_host()
            .returning(|_, host_uuid| match host_uuid {
                "host-1" => Ok(Host {
                    ext_id: host_uuid.to_string(),
                    name: "ahv-host-1".to_string(),
                }),
                other => Err(Error::not_found(EntityKind::Host, other)),
            });
        prism
    }

    #[rstest]
    #[case::plain("cluster-1", "cluster-1")]
    #[case::spaces_and_slashes("pe cluster/1", "pe_cluster_1")]
    #[case::collapses_runs("a  //  b", "a_b")]
    #[case::trims_separators("--_.value._-", "value")]
    #[case::non_ascii("zöne", "z_ne")]
    #[case::only_invalid("***", "")]
    #[case::empty("", "")]
    fn sanitizes_label_values(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_label_value(input), expected);
    }

    #[test]
    fn truncates_and_retrims_long_values() {
        let input = format!("{}-{}", "a".repeat(62), "b".repeat(10));
        let out = sanitize_label_value(&input);
        assert_eq!(out, "a".repeat(62));

        let out = sanitize_label_value(&"x".repeat(100));
        assert_eq!(out.len(), MAX_LABEL_VALUE_LEN);
    }

    #[tokio::test]
    async fn cluster_and_host_labels_are_applied() {
        let labeler = RecordingLabeler::default();
        let reconciler = LabelReconciler::new(Arc::new(labeler.clone()));

        reconciler
            .apply_topology_labels(&prism(), &node("worker-0", BTreeMap::new()), &vm(Some("pe-1"), Some("host-1")))
            .await
            .unwrap();

        let labels = labeler.labels_of("worker-0");
        assert_eq!(labels.get(CUSTOM_PE_UUID_LABEL).map(String::as_str), Some("pe-1"));
        assert_eq!(labels.get(CUSTOM_PE_NAME_LABEL).map(String::as_str), Some("pe_cluster_1"));
        assert_eq!(labels.get(CUSTOM_HOST_UUID_LABEL).map(String::as_str), Some("host-1"));
        assert_eq!(labels.get(CUSTOM_HOST_NAME_LABEL).map(String::as_str), Some("ahv-host-1"));
    }

    #[tokio::test]
    async fn powered_off_vm_gets_only_cluster_labels() {
        let labeler = RecordingLabeler::default();
        LabelReconciler::new(Arc::new(labeler.clone()))
            .apply_topology_labels(&prism(), &node("worker-0", BTreeMap::new()), &vm(Some("pe-1"), None))
            .await
            .unwrap();

        let labels = labeler.labels_of("worker-0");
        assert_eq!(labels.len(), 2);
        assert!(!labels.contains_key(CUSTOM_HOST_UUID_LABEL));
    }

    #[tokio::test]
    async fn host_lookup_failure_skips_host_labels() {
        let labeler = RecordingLabeler::default();
        LabelReconciler::new(Arc::new(labeler.clone()))
            .apply_topology_labels(&prism(), &node("worker-0", BTreeMap::new()), &vm(Some("pe-1"), Some("gone")))
            .await
            .unwrap();

        let labels = labeler.labels_of("worker-0");
        assert!(labels.contains_key(CUSTOM_PE_UUID_LABEL));
        assert!(!labels.contains_key(CUSTOM_HOST_NAME_LABEL));
    }

    #[tokio::test]
    async fn cluster_lookup_failure_fails_the_call() {
        let mut prism = MockPrism::new();
        prism
            .expect_get_cluster()
            .returning(|_| Err(Error::prism("get_cluster", "503 Service Unavailable")));
        let mut labeler = MockNodeLabeler::new();
        labeler.expect_add_or_update_labels().never();

        let err = LabelReconciler::new(Arc::new(labeler))
            .apply_topology_labels(&prism, &node("worker-0", BTreeMap::new()), &vm(Some("pe-1"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Prism { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_cluster_stays_not_found() {
        let mut prism = MockPrism::new();
        prism
            .expect_get_cluster()
            .returning(|uuid| Err(Error::not_found(EntityKind::Cluster, uuid)));
        let mut labeler = MockNodeLabeler::new();
        labeler.expect_add_or_update_labels().never();

        let err = LabelReconciler::new(Arc::new(labeler))
            .apply_topology_labels(&prism, &node("worker-0", BTreeMap::new()), &vm(Some("pe-1"), None))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            Error::NotFound {
                kind: EntityKind::Cluster,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn vm_without_cluster_writes_nothing() {
        let mut labeler = MockNodeLabeler::new();
        labeler.expect_add_or_update_labels().never();

        LabelReconciler::new(Arc::new(labeler))
            .apply_topology_labels(&MockPrism::new(), &node("worker-0", BTreeMap::new()), &vm(None, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn applying_twice_converges_without_touching_other_labels() {
        let labeler = RecordingLabeler::default();
        let reconciler = LabelReconciler::new(Arc::new(labeler.clone()));
        let vm = vm(Some("pe-1"), Some("host-1"));

        let mut existing = BTreeMap::new();
        existing.insert("team".to_string(), "storage".to_string());
        labeler
            .add_or_update_labels("worker-0", &existing)
            .await
            .unwrap();

        reconciler
            .apply_topology_labels(&prism(), &node("worker-0", labeler.labels_of("worker-0")), &vm)
            .await
            .unwrap();
        let first = labeler.labels_of("worker-0");

        reconciler
            .apply_topology_labels(&prism(), &node("worker-0", first.clone()), &vm)
            .await
            .unwrap();
        let second = labeler.labels_of("worker-0");

        assert_eq!(first, second);
        assert_eq!(second.get("team").map(String::as_str), Some("storage"));
        assert_eq!(second.len(), 5);
        // seed write plus one topology write; the second pass finds nothing to change
        assert_eq!(labeler.calls(), 2);
    }

    #[tokio::test]
    async fn only_changed_labels_are_sent() {
        let mut current = BTreeMap::new();
        current.insert(CUSTOM_PE_UUID_LABEL.to_string(), "pe-1".to_string());
        current.insert(CUSTOM_PE_NAME_LABEL.to_string(), "old-name".to_string());

        let mut labeler = MockNodeLabeler::new();
        labeler
            .expect_add_or_update_labels()
            .withf(|node, labels| {
                node == "worker-0"
                    && labels.len() == 1
                    && labels.get(CUSTOM_PE_NAME_LABEL).map(String::as_str) == Some("pe_cluster_1")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        LabelReconciler::new(Arc::new(labeler))
            .apply_topology_labels(&prism(), &node("worker-0", current), &vm(Some("pe-1"), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn labeler_failure_names_the_node() {
        let mut labeler = MockNodeLabeler::new();
        labeler
            .expect_add_or_update_labels()
            .returning(|node, _| Err(Error::labeling(node, "forbidden")));

        let err = LabelReconciler::new(Arc::new(labeler))
            .apply_topology_labels(&prism(), &node("worker-0", BTreeMap::new()), &vm(Some("pe-1"), None))
            .await
            .unwrap_err();
        assert_eq!(err.node(), Some("worker-0"));
    }
}
