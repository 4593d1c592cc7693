//! Prism Central entities and the capability trait used to read them
//!
//! The instance engine never talks HTTP itself. Everything it needs from
//! Prism goes through [`Prism`], which production wires to the cached v4 API
//! client and tests replace with mocks or an in-memory fixture.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use ntnx_common::{Error, PRISM_CENTRAL_SERVICE};

/// Power state of a virtual machine
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PowerState {
    /// Running
    #[default]
    On,
    /// Powered off
    Off,
    /// Any transitional or unknown state (paused, suspended, ...)
    Other(String),
}

/// A virtual machine as reported by Prism
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vm {
    /// VM UUID
    pub ext_id: String,
    /// VM name, reported as the node hostname
    pub name: String,
    /// Current power state
    pub power_state: PowerState,
    /// UUID of the Prism Element cluster hosting the VM
    pub cluster: Option<String>,
    /// UUID of the physical host running the VM (absent while powered off)
    pub host: Option<String>,
    /// UUIDs of categories attached to the VM
    pub categories: Vec<String>,
    /// Network interfaces
    pub nics: Vec<Nic>,
}

impl Vm {
    /// Whether the VM is powered off
    pub fn is_shutdown(&self) -> bool {
        self.power_state == PowerState::Off
    }
}

/// A virtual network interface
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Nic {
    /// NIC UUID
    pub ext_id: Option<String>,
    /// Network configuration, absent for NICs Prism has not reported on yet
    pub network_info: Option<NicNetworkInfo>,
}

/// Network information variants a NIC can carry
#[derive(Clone, Debug, PartialEq)]
pub enum NicNetworkInfo {
    /// Regular virtual ethernet NIC
    VirtualEthernet(NicIpv4),
    /// Data-plane offload NIC
    DpOffload(NicIpv4),
    /// A network info shape this controller does not understand
    Unsupported(String),
}

impl NicNetworkInfo {
    /// IPv4 settings of the NIC, if the variant carries any
    pub fn ipv4(&self) -> Option<&NicIpv4> {
        match self {
            NicNetworkInfo::VirtualEthernet(ipv4) | NicNetworkInfo::DpOffload(ipv4) => Some(ipv4),
            NicNetworkInfo::Unsupported(_) => None,
        }
    }
}

/// IPv4 addresses of a NIC
///
/// Values are kept as reported; parsing happens during address resolution so
/// that a malformed entry surfaces as an error instead of vanishing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NicIpv4 {
    /// Statically assigned primary address
    pub primary: Option<String>,
    /// Statically assigned secondary addresses
    pub secondary: Vec<String>,
    /// Addresses learned from guest traffic (DHCP)
    pub learned: Vec<String>,
}

/// Software running on a cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SoftwareType {
    /// Prism Central, the multi-cluster management plane
    PrismCentral,
    /// Prism Element / AOS
    PrismElement,
    /// Nutanix Cluster Check
    Ncc,
    /// Anything else, stored as reported
    Other(String),
}

impl SoftwareType {
    /// Parse the API's software type name (case-insensitive)
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            PRISM_CENTRAL_SERVICE => SoftwareType::PrismCentral,
            "PRISM_ELEMENT" | "NOS" => SoftwareType::PrismElement,
            "NCC" => SoftwareType::Ncc,
            _ => SoftwareType::Other(name.to_string()),
        }
    }
}

/// A cluster known to Prism Central
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cluster {
    /// Cluster UUID
    pub ext_id: String,
    /// Cluster name
    pub name: String,
    /// UUIDs of categories attached to the cluster
    pub categories: Vec<String>,
    /// Software installed on the cluster
    pub software: Vec<SoftwareType>,
}

impl Cluster {
    /// Whether this cluster entity is the Prism Central instance itself
    pub fn is_prism_central(&self) -> bool {
        self.software.contains(&SoftwareType::PrismCentral)
    }
}

/// A physical host inside a cluster
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Host {
    /// Host UUID
    pub ext_id: String,
    /// Hypervisor hostname
    pub name: String,
}

/// A category: a key/value tag attachable to VMs and clusters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Category {
    /// Category UUID
    pub ext_id: String,
    /// Category key (e.g., "region")
    pub key: String,
    /// Category value (e.g., "us-east")
    pub value: String,
}

/// Read access to Prism Central
///
/// Implementations must report a missing VM or category as
/// [`Error::NotFound`]; callers rely on that to tell "gone" apart from
/// transport failures. Implementations are shared between concurrent calls.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Prism: Send + Sync {
    /// Fetch a VM by UUID
    async fn get_vm(&self, vm_uuid: &str) -> Result<Vm, Error>;

    /// Fetch a cluster by UUID
    async fn get_cluster(&self, cluster_uuid: &str) -> Result<Cluster, Error>;

    /// List every cluster registered with Prism Central, including itself
    async fn list_all_clusters(&self) -> Result<Vec<Cluster>, Error>;

    /// Fetch a category by UUID
    async fn get_category(&self, category_uuid: &str) -> Result<Category, Error>;

    /// Fetch a host of a cluster
    async fn get_cluster_host(&self, cluster_uuid: &str, host_uuid: &str) -> Result<Host, Error>;
}
