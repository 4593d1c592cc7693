//! Cloud provider surface consumed by the node lifecycle controllers

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, NodeAddress};
use kube::ResourceExt;
use tracing::{debug, info, warn};

use ntnx_common::config::{ccm_namespace, Config, PrismEndpoint};
use ntnx_common::{Result, PROVIDER_NAME};

use crate::labels::NodeLabeler;
use crate::manager::NutanixManager;
use crate::prism::Prism;

/// Metadata reported for a node's instance
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceMetadata {
    /// `nutanix://<vm uuid>`
    pub provider_id: String,
    /// Always `ahv-vm`
    pub instance_type: String,
    /// Internal IPs followed by the hostname
    pub node_addresses: Vec<NodeAddress>,
    /// Region, empty when topology is not discoverable
    pub region: String,
    /// Zone, empty when topology is not discoverable
    pub zone: String,
}

/// Instance queries answered for every node
#[async_trait]
pub trait InstancesV2: Send + Sync {
    /// Whether the instance backing the node exists
    async fn instance_exists(&self, node: &Node) -> Result<bool>;

    /// Whether the instance backing the node is shut down
    async fn instance_shutdown(&self, node: &Node) -> Result<bool>;

    /// Metadata of the instance backing the node
    async fn instance_metadata(&self, node: &Node) -> Result<InstanceMetadata>;
}

/// [`InstancesV2`] backed by a [`NutanixManager`]
#[derive(Clone)]
pub struct Instances {
    manager: NutanixManager,
}

impl Instances {
    /// Wrap a manager
    pub fn new(manager: NutanixManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl InstancesV2 for Instances {
    async fn instance_exists(&self, node: &Node) -> Result<bool> {
        let name = node.name_any();
        debug!(node = %name, "checking if instance exists");
        match self.manager.instance_exists(node).await {
            Ok(exists) => {
                info!(node = %name, exists, "instance existence checked");
                Ok(exists)
            }
            Err(e) => {
                warn!(node = %name, error = %e, "failed to check if instance exists");
                Err(e)
            }
        }
    }

    async fn instance_shutdown(&self, node: &Node) -> Result<bool> {
        let name = node.name_any();
        debug!(node = %name, "checking if instance is shut down");
        match self.manager.instance_shutdown(node).await {
            Ok(shutdown) => {
                info!(node = %name, shutdown, "instance power state checked");
                Ok(shutdown)
            }
            Err(e) => {
                warn!(node = %name, error = %e, "failed to check if instance is shut down");
                Err(e)
            }
        }
    }

    async fn instance_metadata(&self, node: &Node) -> Result<InstanceMetadata> {
        let name = node.name_any();
        debug!(node = %name, "fetching instance metadata");
        match self.manager.instance_metadata(node).await {
            Ok(metadata) => {
                info!(
                    node = %name,
                    provider_id = %metadata.provider_id,
                    region = %metadata.region,
                    zone = %metadata.zone,
                    addresses = metadata.node_addresses.len(),
                    "fetched instance metadata"
                );
                Ok(metadata)
            }
            Err(e) => {
                warn!(node = %name, error = %e, "failed to fetch instance metadata");
                Err(e)
            }
        }
    }
}

/// The Nutanix cloud provider
///
/// Only the v2 instances interface is offered. Load balancers, routes, zones
/// and the legacy instances interface are not supported.
pub struct CloudProvider {
    namespace: String,
    prism_central: PrismEndpoint,
    instances: Arc<Instances>,
}

impl CloudProvider {
    /// Create the provider, reading the controller namespace from `POD_NAMESPACE`
    pub fn new(
        config: Config,
        prism: Arc<dyn Prism>,
        labeler: Arc<dyn NodeLabeler>,
    ) -> Result<Self> {
        let namespace = ccm_namespace()?;
        Self::with_namespace(config, prism, labeler, namespace)
    }

    /// Create the provider for an explicit controller namespace
    pub fn with_namespace(
        config: Config,
        prism: Arc<dyn Prism>,
        labeler: Arc<dyn NodeLabeler>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let manager = NutanixManager::new(&config, prism, labeler)?;
        let prism_central = config.prism_central.with_default_namespace(&namespace);
        info!(
            namespace = %namespace,
            prism_central = %prism_central.address,
            custom_labeling = config.enable_custom_labeling,
            "initialized Nutanix cloud provider"
        );

        Ok(Self {
            namespace,
            prism_central,
            instances: Arc::new(Instances::new(manager)),
        })
    }

    /// Name the provider registers under
    pub fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    /// Whether a cluster ID is required
    pub fn has_cluster_id(&self) -> bool {
        true
    }

    /// The v2 instances interface
    pub fn instances_v2(&self) -> Arc<dyn InstancesV2> {
        self.instances.clone()
    }

    /// Namespace the controller runs in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Prism Central endpoint with reference namespaces filled in
    pub fn prism_central(&self) -> &PrismEndpoint {
        &self.prism_central
    }
}
