//! Per-node instance operations against Prism Central
//!
//! [`NutanixManager`] keeps no state between calls: every operation resolves
//! the node's VM from scratch, makes a single attempt at each Prism lookup and
//! hands failures back wrapped with the node and the operation.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, NodeAddress};
use kube::ResourceExt;
use tracing::debug;

use ntnx_common::config::Config;
use ntnx_common::{Error, Result, INSTANCE_TYPE, PROVIDER_NAME};

use crate::addresses::{has_node_addresses, AddressResolver};
use crate::ignored_ips::IgnoredAddressSet;
use crate::instances::InstanceMetadata;
use crate::labels::{LabelReconciler, NodeLabeler};
use crate::prism::Prism;
use crate::topology::TopologyResolver;

const OP_EXISTS: &str = "instance exists";
const OP_SHUTDOWN: &str = "instance shutdown";
const OP_METADATA: &str = "instance metadata";

/// Resolves instance state and metadata for nodes
#[derive(Clone)]
pub struct NutanixManager {
    prism: Arc<dyn Prism>,
    addresses: AddressResolver,
    topology: TopologyResolver,
    labels: Option<LabelReconciler>,
}

impl NutanixManager {
    /// Build a manager from validated configuration
    ///
    /// Fails if any `ignoredNodeIPs` entry is malformed. Node labeling is only
    /// wired up when custom labeling is enabled.
    pub fn new(
        config: &Config,
        prism: Arc<dyn Prism>,
        labeler: Arc<dyn NodeLabeler>,
    ) -> Result<Self> {
        let ignored = IgnoredAddressSet::parse(&config.ignored_node_ips)?;
        debug!(entries = config.ignored_node_ips.len(), "built ignored node address set");

        Ok(Self {
            prism,
            addresses: AddressResolver::new(Arc::new(ignored)),
            topology: TopologyResolver::new(config.topology_discovery.clone()),
            labels: config
                .enable_custom_labeling
                .then(|| LabelReconciler::new(labeler)),
        })
    }

    /// Whether the node's VM still exists
    pub async fn instance_exists(&self, node: &Node) -> Result<bool> {
        self.exists(node)
            .await
            .map_err(|e| e.for_instance(node.name_any(), OP_EXISTS))
    }

    /// Whether the node's VM is powered off
    pub async fn instance_shutdown(&self, node: &Node) -> Result<bool> {
        self.shutdown(node)
            .await
            .map_err(|e| e.for_instance(node.name_any(), OP_SHUTDOWN))
    }

    /// Provider ID, addresses and topology of the node's VM
    ///
    /// Applies topology labels to the node first when custom labeling is
    /// enabled; a labeling failure fails the call.
    pub async fn instance_metadata(&self, node: &Node) -> Result<InstanceMetadata> {
        self.metadata(node)
            .await
            .map_err(|e| e.for_instance(node.name_any(), OP_METADATA))
    }

    async fn exists(&self, node: &Node) -> Result<bool> {
        let vm_uuid = node_vm_uuid(node)?;
        match self.prism.get_vm(&vm_uuid).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!(node = %node.name_any(), vm = %vm_uuid, "VM not found");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn shutdown(&self, node: &Node) -> Result<bool> {
        let vm_uuid = node_vm_uuid(node)?;
        let vm = self.prism.get_vm(&vm_uuid).await?;
        Ok(vm.is_shutdown())
    }

    async fn metadata(&self, node: &Node) -> Result<InstanceMetadata> {
        let node_name = node.name_any();
        let vm_uuid = node_vm_uuid(node)?;
        let provider_id = generate_provider_id(&vm_uuid)?;
        let vm = self.prism.get_vm(&vm_uuid).await?;

        let node_addresses = match existing_addresses(node) {
            Some(addresses) => {
                debug!(node = %node_name, "reusing addresses reported on node");
                addresses
            }
            None => {
                debug!(node = %node_name, vm = %vm_uuid, "resolving node addresses");
                self.addresses.resolve_addresses(&vm)?
            }
        };

        let topology = self.topology.resolve(self.prism.as_ref(), &vm).await?;

        if let Some(labels) = &self.labels {
            labels
                .apply_topology_labels(self.prism.as_ref(), node, &vm)
                .await?;
        }

        Ok(InstanceMetadata {
            provider_id,
            instance_type: INSTANCE_TYPE.to_string(),
            node_addresses,
            region: topology.region,
            zone: topology.zone,
        })
    }
}

fn existing_addresses(node: &Node) -> Option<Vec<NodeAddress>> {
    if !has_node_addresses(node) {
        return None;
    }
    node.status.as_ref().and_then(|s| s.addresses.clone())
}

/// VM UUID of a node, taken from its reported system UUID
pub fn node_vm_uuid(node: &Node) -> Result<String> {
    let uuid = node
        .status
        .as_ref()
        .and_then(|s| s.node_info.as_ref())
        .map(|info| info.system_uuid.as_str())
        .unwrap_or_default();

    if uuid.is_empty() {
        return Err(Error::invalid_node(
            node.name_any(),
            "node does not report a system UUID",
        ));
    }
    Ok(uuid.to_lowercase())
}

/// Provider ID for a VM UUID (`nutanix://<uuid>`, lowercased)
pub fn generate_provider_id(vm_uuid: &str) -> Result<String> {
    if vm_uuid.is_empty() {
        return Err(Error::invalid_input(
            "VM UUID cannot be empty when generating a provider ID",
        ));
    }
    Ok(format!("{}://{}", PROVIDER_NAME, vm_uuid.to_lowercase()))
}

/// VM UUID carried by a provider ID; other values are returned unchanged
pub fn strip_provider_id(provider_id: &str) -> &str {
    provider_id
        .strip_prefix(PROVIDER_NAME)
        .and_then(|rest| rest.strip_prefix("://"))
        .unwrap_or(provider_id)
}
