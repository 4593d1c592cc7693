//! Common types for the Nutanix cloud controller: errors, configuration and telemetry

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;

pub use error::{EntityKind, Error};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Cloud provider name registered with the controller manager
pub const PROVIDER_NAME: &str = "nutanix";

/// Client name used as the field manager for node updates
pub const CLIENT_NAME: &str = "nutanix-cloud-controller-manager";

/// Environment variable holding the namespace the controller runs in
pub const CCM_NAMESPACE_KEY: &str = "POD_NAMESPACE";

/// Instance type reported for every Nutanix AHV virtual machine
pub const INSTANCE_TYPE: &str = "ahv-vm";

/// Software type advertised by the Prism Central management cluster
pub const PRISM_CENTRAL_SERVICE: &str = "PRISM_CENTRAL";

/// Label carrying the UUID of the Prism Element cluster hosting the node
pub const CUSTOM_PE_UUID_LABEL: &str = "nutanix.com/prism-element-uuid";

/// Label carrying the name of the Prism Element cluster hosting the node
pub const CUSTOM_PE_NAME_LABEL: &str = "nutanix.com/prism-element-name";

/// Label carrying the UUID of the physical host running the node
pub const CUSTOM_HOST_UUID_LABEL: &str = "nutanix.com/prism-host-uuid";

/// Label carrying the name of the physical host running the node
pub const CUSTOM_HOST_NAME_LABEL: &str = "nutanix.com/prism-host-name";
