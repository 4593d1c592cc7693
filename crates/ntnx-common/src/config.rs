//! Cloud provider configuration
//!
//! The controller reads a JSON document at startup (the `--cloud-config`
//! file). Loading validates it once: a misconfigured topology discovery stops
//! the process before it starts serving, nothing is re-checked per call.
//!
//! ```json
//! {
//!   "prismCentral": { "address": "pc.example.com", "port": 9440,
//!                     "credentialRef": { "kind": "Secret", "name": "nutanix-creds" } },
//!   "topologyDiscovery": { "type": "Categories",
//!                          "topologyCategories": { "regionCategory": "region", "zoneCategory": "zone" } },
//!   "enableCustomLabeling": true,
//!   "ignoredNodeIPs": ["10.0.0.1", "10.1.0.0/16", "10.2.0.1-10.2.0.9"]
//! }
//! ```

use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result, CCM_NAMESPACE_KEY};

/// Topology discovery type value selecting the Prism hierarchy strategy
pub const PRISM_TOPOLOGY_DISCOVERY_TYPE: &str = "Prism";

/// Topology discovery type value selecting the category strategy
pub const CATEGORIES_TOPOLOGY_DISCOVERY_TYPE: &str = "Categories";

/// Validated cloud provider configuration
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Prism Central endpoint and credential references
    pub prism_central: PrismEndpoint,

    /// How region and zone are discovered for a node
    pub topology_discovery: TopologyDiscovery,

    /// Whether Prism Element / host labels are added to nodes
    pub enable_custom_labeling: bool,

    /// Addresses, CIDRs and dash ranges never reported as node addresses
    #[serde(rename = "ignoredNodeIPs")]
    pub ignored_node_ips: Vec<String>,
}

/// Strategy used to discover a node's region and zone
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "topologyCategories")]
pub enum TopologyDiscovery {
    /// Region is the Prism Central name, zone is the Prism Element cluster name
    Prism,
    /// Region and zone are read from categories on the VM or its cluster
    Categories(TopologyCategories),
}

/// Category keys holding region and zone values
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyCategories {
    /// Category key whose value is the zone
    #[serde(default)]
    pub zone_category: String,

    /// Category key whose value is the region
    #[serde(default)]
    pub region_category: String,
}

/// Prism Central endpoint
///
/// Opaque to the instance engine; handed to the Prism client collaborator.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrismEndpoint {
    /// DNS name or IP address of Prism Central
    #[serde(default)]
    pub address: String,

    /// Port of the Prism Central API
    #[serde(default)]
    pub port: u16,

    /// Skip TLS verification
    #[serde(default)]
    pub insecure: bool,

    /// Secret holding Prism Central credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<CredentialReference>,

    /// Additional CA bundle used to verify Prism Central
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_trust_bundle: Option<TrustBundleReference>,
}

/// Reference to a credentials Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialReference {
    /// Kind of the credential source (only "Secret" is understood)
    #[serde(default)]
    pub kind: String,

    /// Name of the Secret
    pub name: String,

    /// Namespace of the Secret; defaults to the controller namespace
    #[serde(default)]
    pub namespace: String,
}

/// Source of an additional trust bundle
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum TrustBundleKind {
    /// PEM data stored in a ConfigMap
    ConfigMap,
    /// PEM data inlined in the config
    String,
}

/// Reference to an additional trust bundle
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrustBundleReference {
    /// Where the bundle lives
    pub kind: TrustBundleKind,

    /// Name of the ConfigMap
    #[serde(default)]
    pub name: String,

    /// Namespace of the ConfigMap; defaults to the controller namespace
    #[serde(default)]
    pub namespace: String,

    /// Inline PEM data
    #[serde(default)]
    pub data: String,
}

impl PrismEndpoint {
    /// Fill in empty reference namespaces with the controller namespace
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        if let Some(cred) = self.credential_ref.as_mut() {
            if cred.namespace.is_empty() {
                cred.namespace = namespace.to_string();
            }
        }
        if let Some(bundle) = self.additional_trust_bundle.as_mut() {
            if bundle.kind == TrustBundleKind::ConfigMap && bundle.namespace.is_empty() {
                bundle.namespace = namespace.to_string();
            }
        }
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    prism_central: PrismEndpoint,
    #[serde(default)]
    topology_discovery: RawTopologyDiscovery,
    #[serde(default)]
    enable_custom_labeling: bool,
    #[serde(default, rename = "ignoredNodeIPs")]
    ignored_node_ips: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTopologyDiscovery {
    #[serde(default, rename = "type")]
    type_: String,
    #[serde(default)]
    topology_categories: Option<TopologyCategories>,
}

impl Config {
    /// Parse and validate a configuration document
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: RawConfig = serde_json::from_slice(bytes)?;
        let topology_discovery = validate_topology_discovery(raw.topology_discovery)?;

        Ok(Self {
            prism_central: raw.prism_central,
            topology_discovery,
            enable_custom_labeling: raw.enable_custom_labeling,
            ignored_node_ips: raw.ignored_node_ips,
        })
    }

    /// Read, parse and validate a configuration document
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::config(format!("failed to read cloud config: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

fn validate_topology_discovery(raw: RawTopologyDiscovery) -> Result<TopologyDiscovery> {
    match raw.type_.as_str() {
        PRISM_TOPOLOGY_DISCOVERY_TYPE => Ok(TopologyDiscovery::Prism),
        "" => {
            warn!(
                default = PRISM_TOPOLOGY_DISCOVERY_TYPE,
                "topology discovery type was not set, using default"
            );
            Ok(TopologyDiscovery::Prism)
        }
        CATEGORIES_TOPOLOGY_DISCOVERY_TYPE => {
            let categories = raw.topology_categories.ok_or_else(|| {
                Error::config_for_field(
                    "topologyDiscovery.topologyCategories",
                    format!(
                        "topologyCategories must be set when using topology discovery type: {}",
                        CATEGORIES_TOPOLOGY_DISCOVERY_TYPE
                    ),
                )
            })?;
            if categories.region_category.is_empty() {
                return Err(Error::config_for_field(
                    "topologyDiscovery.topologyCategories.regionCategory",
                    "regionCategory must not be empty",
                ));
            }
            if categories.zone_category.is_empty() {
                return Err(Error::config_for_field(
                    "topologyDiscovery.topologyCategories.zoneCategory",
                    "zoneCategory must not be empty",
                ));
            }
            debug!(
                region_category = %categories.region_category,
                zone_category = %categories.zone_category,
                "using categories to discover topology"
            );
            Ok(TopologyDiscovery::Categories(categories))
        }
        other => Err(Error::config_for_field(
            "topologyDiscovery.type",
            format!("unsupported topology discovery type: {}", other),
        )),
    }
}

/// Namespace the controller runs in, read from `POD_NAMESPACE`
pub fn ccm_namespace() -> Result<String> {
    namespace_from(std::env::var(CCM_NAMESPACE_KEY).ok())
}

/// Validate a namespace value obtained from the environment
pub fn namespace_from(value: Option<String>) -> Result<String> {
    match value {
        Some(ns) if !ns.is_empty() => Ok(ns),
        _ => Err(Error::config(format!(
            "failed to retrieve CCM namespace. Make sure {} env variable is set",
            CCM_NAMESPACE_KEY
        ))),
    }
}
