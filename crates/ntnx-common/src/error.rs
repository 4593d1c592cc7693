//! Error types for the Nutanix cloud controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the node, VM or entity it relates to so that the
//! calling reconciliation loop can report a useful message without extra
//! lookups.

use std::fmt;

use thiserror::Error;

/// Kind of Prism entity an error refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A virtual machine
    Vm,
    /// A Prism Element or Prism Central cluster
    Cluster,
    /// A physical host inside a cluster
    Host,
    /// A category (key/value tag)
    Category,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vm => "VM",
            EntityKind::Cluster => "cluster",
            EntityKind::Host => "host",
            EntityKind::Category => "category",
        };
        f.write_str(name)
    }
}

/// Main error type for cloud controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// The node handed to us cannot be mapped to an instance
    #[error("invalid node {node}: {message}")]
    InvalidNode {
        /// Name of the node
        node: String,
        /// Description of what's missing
        message: String,
    },

    /// A caller-supplied value is unusable (e.g., an empty VM UUID)
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of what's wrong
        message: String,
    },

    /// A Prism entity does not exist
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up
        kind: EntityKind,
        /// UUID used for the lookup
        id: String,
    },

    /// A Prism API call failed
    #[error("prism error during {operation}: {message}")]
    Prism {
        /// API operation that failed (e.g., "get_vm")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// More (or fewer) candidates than exactly one were found
    #[error("ambiguous {subject}: {message}")]
    Ambiguous {
        /// What was being resolved (e.g., "central cluster", "category region")
        subject: String,
        /// Description of the ambiguity
        message: String,
    },

    /// A VM lacks data required by the current operation
    #[error("incomplete data for VM {vm}: {message}")]
    MissingData {
        /// Name or UUID of the VM
        vm: String,
        /// Description of what's missing
        message: String,
    },

    /// An address reported by Prism or supplied in configuration is malformed
    #[error("invalid IP address {address:?}: {message}")]
    InvalidAddress {
        /// The offending value
        address: String,
        /// Parser error
        message: String,
    },

    /// Configuration is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "topologyDiscovery.type")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Labels could not be persisted on a node
    #[error("error occurred while updating labels on node {node}: {message}")]
    Labeling {
        /// Name of the node
        node: String,
        /// Description of what failed
        message: String,
        /// Kubernetes API error behind the failure, if any
        #[source]
        source: Option<kube::Error>,
    },

    /// An instance operation failed for a node
    #[error("{operation} failed for node {node}: {source}")]
    Instance {
        /// Name of the node
        node: String,
        /// Instance operation (exists, shutdown, metadata)
        operation: &'static str,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid node error
    pub fn invalid_node(node: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidNode {
            node: node.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a not found error for a Prism entity
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a Prism API error
    pub fn prism(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Prism {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create an ambiguity error
    pub fn ambiguous(subject: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Ambiguous {
            subject: subject.into(),
            message: msg.into(),
        }
    }

    /// Create a missing data error for a VM
    pub fn missing_data(vm: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MissingData {
            vm: vm.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, msg: impl fmt::Display) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: msg.to_string(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a configuration error with a field path
    pub fn config_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a labeling error for a node
    pub fn labeling(node: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Labeling {
            node: node.into(),
            message: msg.into(),
            source: None,
        }
    }

    /// Create a labeling error caused by a failed Kubernetes API call
    pub fn labeling_rejected(node: impl Into<String>, source: kube::Error) -> Self {
        Self::Labeling {
            node: node.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Wrap this error with the node and instance operation it occurred in
    pub fn for_instance(self, node: impl Into<String>, operation: &'static str) -> Self {
        Self::Instance {
            node: node.into(),
            operation,
            source: Box::new(self),
        }
    }

    /// Check whether this error means the looked-up entity does not exist
    ///
    /// Looks through instance context wrapping.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Instance { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Get the node name if this error is associated with a specific node
    pub fn node(&self) -> Option<&str> {
        match self {
            Error::InvalidNode { node, .. } => Some(node),
            Error::Labeling { node, .. } => Some(node),
            Error::Instance { node, .. } => Some(node),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}
