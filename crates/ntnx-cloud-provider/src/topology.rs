//! Region and zone discovery
//!
//! Two strategies, selected once from configuration:
//! - Prism: region is the Prism Central name, zone is the VM's cluster name.
//! - Categories: region and zone are read from categories on the VM, falling
//!   back to categories on the VM's cluster for anything the VM leaves unset.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use ntnx_common::config::{TopologyCategories, TopologyDiscovery};
use ntnx_common::{Error, Result};

use crate::prism::{Cluster, Prism, Vm};

/// Region and zone of an instance
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologyInfo {
    /// Region name
    pub region: String,
    /// Zone name
    pub zone: String,
}

impl TopologyInfo {
    /// Whether the topology is incomplete (either field unset)
    pub fn is_empty(&self) -> bool {
        self.region.is_empty() || self.zone.is_empty()
    }

    fn is_unset(&self) -> bool {
        self.region.is_empty() && self.zone.is_empty()
    }
}

/// Resolves [`TopologyInfo`] for a VM using the configured strategy
#[derive(Clone, Debug)]
pub struct TopologyResolver {
    discovery: TopologyDiscovery,
}

impl TopologyResolver {
    /// Create a resolver for a validated discovery configuration
    pub fn new(discovery: TopologyDiscovery) -> Self {
        Self { discovery }
    }

    /// Resolve the topology of a VM
    pub async fn resolve(&self, prism: &dyn Prism, vm: &Vm) -> Result<TopologyInfo> {
        match &self.discovery {
            TopologyDiscovery::Prism => from_prism(prism, vm).await,
            TopologyDiscovery::Categories(keys) => from_categories(prism, vm, keys).await,
        }
    }
}

async fn from_prism(prism: &dyn Prism, vm: &Vm) -> Result<TopologyInfo> {
    let cluster_uuid = vm
        .cluster
        .as_deref()
        .ok_or_else(|| Error::missing_data(&vm.ext_id, "VM has no cluster reference"))?;

    let central = prism_central_cluster(prism).await?;
    let cluster = prism.get_cluster(cluster_uuid).await?;

    debug!(vm = %vm.ext_id, region = %central.name, zone = %cluster.name, "resolved topology from Prism");
    Ok(TopologyInfo {
        region: central.name,
        zone: cluster.name,
    })
}

/// The single cluster entity that is Prism Central
async fn prism_central_cluster(prism: &dyn Prism) -> Result<Cluster> {
    let mut central: Vec<Cluster> = prism
        .list_all_clusters()
        .await?
        .into_iter()
        .filter(Cluster::is_prism_central)
        .collect();

    match central.len() {
        1 => Ok(central.remove(0)),
        0 => Err(Error::ambiguous(
            "central cluster",
            "failed to retrieve central cluster",
        )),
        n => Err(Error::ambiguous(
            "central cluster",
            format!("more than one central cluster found ({n})"),
        )),
    }
}

async fn from_categories(
    prism: &dyn Prism,
    vm: &Vm,
    keys: &TopologyCategories,
) -> Result<TopologyInfo> {
    let mut topology = TopologyInfo::default();

    let values = category_values(prism, &vm.categories).await?;
    fill_from_categories(&mut topology, &values, keys)?;

    if topology.is_empty() {
        if let Some(cluster_uuid) = vm.cluster.as_deref() {
            debug!(vm = %vm.ext_id, cluster = %cluster_uuid, "searching cluster categories for topology");
            let cluster = prism.get_cluster(cluster_uuid).await?;
            let values = category_values(prism, &cluster.categories).await?;
            fill_from_categories(&mut topology, &values, keys)?;
        }
    }

    if topology.is_unset() {
        debug!(vm = %vm.ext_id, "no topology categories found");
        return Ok(topology);
    }
    if topology.is_empty() {
        return Err(Error::missing_data(
            &vm.ext_id,
            format!(
                "incomplete topology from categories: region={:?} zone={:?}",
                topology.region, topology.zone
            ),
        ));
    }

    debug!(vm = %vm.ext_id, region = %topology.region, zone = %topology.zone, "resolved topology from categories");
    Ok(topology)
}

/// Resolve category references into key -> distinct values
///
/// A key whose categories all carry an empty value maps to an empty list.
async fn category_values(
    prism: &dyn Prism,
    references: &[String],
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for reference in references {
        let category = match prism.get_category(reference).await {
            Ok(category) => category,
            Err(e) if e.is_not_found() => {
                warn!(category = %reference, "category not found, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };

        let entry = values.entry(category.key).or_default();
        if !category.value.is_empty() && !entry.contains(&category.value) {
            entry.push(category.value);
        }
    }
    Ok(values)
}

/// Fill unset topology fields from resolved category values
fn fill_from_categories(
    topology: &mut TopologyInfo,
    values: &BTreeMap<String, Vec<String>>,
    keys: &TopologyCategories,
) -> Result<()> {
    let fields = [
        (&mut topology.region, &keys.region_category),
        (&mut topology.zone, &keys.zone_category),
    ];
    for (field, key) in fields {
        if !field.is_empty() {
            continue;
        }
        match values.get(key).map(Vec::as_slice) {
            None => {}
            Some([value]) => *field = value.clone(),
            Some([]) => {
                return Err(Error::ambiguous(
                    format!("category {key}"),
                    "category has no value",
                ))
            }
            Some(multiple) => {
                return Err(Error::ambiguous(
                    format!("category {key}"),
                    format!("category has multiple values: {}", multiple.join(", ")),
                ))
            }
        }
    }
    Ok(())
}
