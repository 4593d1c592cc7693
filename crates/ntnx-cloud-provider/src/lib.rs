//! Nutanix cloud provider instance engine
//!
//! Maps Kubernetes nodes to Prism Central VMs and answers whether the VM
//! exists, whether it is shut down, and what its addresses, region and zone
//! are. Prism access goes through the [`prism::Prism`] trait; node label
//! writes go through [`labels::NodeLabeler`].

#![deny(missing_docs)]

pub mod addresses;
pub mod ignored_ips;
pub mod instances;
pub mod labels;
pub mod manager;
pub mod prism;
pub mod topology;

#[cfg(test)]
mod fixtures;

pub use addresses::AddressResolver;
pub use ignored_ips::IgnoredAddressSet;
pub use instances::{CloudProvider, InstanceMetadata, Instances, InstancesV2};
pub use labels::{KubeNodeLabeler, LabelReconciler, NodeLabeler};
pub use manager::{generate_provider_id, strip_provider_id, NutanixManager};
pub use topology::{TopologyInfo, TopologyResolver};
