//! Node address resolution
//!
//! Turns the NICs of a VM into the address list reported on the Node: every
//! usable IPv4 as `InternalIP`, de-duplicated across NICs, followed by a single
//! `Hostname` entry carrying the VM name.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, NodeAddress};
use tracing::{debug, warn};

use ntnx_common::{Error, Result};

use crate::ignored_ips::IgnoredAddressSet;
use crate::prism::{NicIpv4, NicNetworkInfo, Vm};

/// Node address type for cluster-internal IPs
pub const NODE_INTERNAL_IP: &str = "InternalIP";

/// Node address type for the hostname
pub const NODE_HOSTNAME: &str = "Hostname";

/// Resolves node addresses from VM NICs
#[derive(Clone, Debug, Default)]
pub struct AddressResolver {
    ignored: Arc<IgnoredAddressSet>,
}

impl AddressResolver {
    /// Create a resolver filtering out the given addresses
    pub fn new(ignored: Arc<IgnoredAddressSet>) -> Self {
        Self { ignored }
    }

    /// Resolve the addresses of a VM
    ///
    /// Fails if the VM has no NICs, if any reported address is malformed, or
    /// if no address survives filtering.
    pub fn resolve_addresses(&self, vm: &Vm) -> Result<Vec<NodeAddress>> {
        if vm.nics.is_empty() {
            return Err(Error::missing_data(
                &vm.ext_id,
                "VM has no network interfaces",
            ));
        }

        let mut addresses: Vec<NodeAddress> = Vec::new();
        for nic in &vm.nics {
            let Some(info) = nic.network_info.as_ref() else {
                warn!(vm = %vm.ext_id, nic = ?nic.ext_id, "NIC has no network info, skipping");
                continue;
            };
            let Some(ipv4) = info.ipv4() else {
                if let NicNetworkInfo::Unsupported(kind) = info {
                    warn!(vm = %vm.ext_id, nic = ?nic.ext_id, kind = %kind, "unsupported NIC network info, skipping");
                }
                continue;
            };

            for candidate in candidates(ipv4) {
                let ip = IpAddr::from_str(candidate)
                    .map_err(|e| Error::invalid_address(candidate, e))?;
                if self.ignored.contains(ip) {
                    debug!(vm = %vm.ext_id, address = %candidate, "ignoring address");
                    continue;
                }
                push_unique(&mut addresses, internal_ip(candidate));
            }
        }

        if addresses.is_empty() {
            return Err(Error::missing_data(
                &vm.ext_id,
                format!(
                    "unable to determine network interfaces from VM with UUID {}",
                    vm.ext_id
                ),
            ));
        }

        addresses.push(NodeAddress {
            type_: NODE_HOSTNAME.to_string(),
            address: vm.name.clone(),
        });
        Ok(addresses)
    }
}

/// Candidate addresses of a NIC: primary, secondaries, then the first learned
fn candidates(ipv4: &NicIpv4) -> impl Iterator<Item = &str> {
    ipv4.primary
        .iter()
        .chain(ipv4.secondary.iter())
        .chain(ipv4.learned.first())
        .map(String::as_str)
}

fn internal_ip(address: &str) -> NodeAddress {
    NodeAddress {
        type_: NODE_INTERNAL_IP.to_string(),
        address: address.to_string(),
    }
}

fn push_unique(addresses: &mut Vec<NodeAddress>, address: NodeAddress) {
    if !addresses.contains(&address) {
        addresses.push(address);
    }
}

/// Whether the node already reports both an internal IP and a hostname
pub fn has_node_addresses(node: &Node) -> bool {
    let Some(addresses) = node.status.as_ref().and_then(|s| s.addresses.as_ref()) else {
        return false;
    };
    let has_type = |t: &str| addresses.iter().any(|a| a.type_ == t);
    has_type(NODE_INTERNAL_IP) && has_type(NODE_HOSTNAME)
}
