//! In-memory Prism Central for scenario tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, NodeStatus, NodeSystemInfo};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use ntnx_common::{EntityKind, Error};

use crate::prism::{
    Category, Cluster, Host, Nic, NicIpv4, NicNetworkInfo, PowerState, Prism, SoftwareType, Vm,
};

pub const PRISM_CENTRAL_NAME: &str = "prism-central";
pub const CLUSTER_UUID: &str = "00000000-0000-0000-0000-00000000c001";
pub const CLUSTER_NAME: &str = "pe-cluster-1";
pub const HOST_UUID: &str = "00000000-0000-0000-0000-00000000h001";
pub const HOST_NAME: &str = "ahv-host-1";

/// Prism backed by hash maps, seeded with one Prism Central, one Prism
/// Element cluster and one host
#[derive(Default)]
pub struct FakePrism {
    vms: Mutex<HashMap<String, Vm>>,
    clusters: Mutex<HashMap<String, Cluster>>,
    hosts: Mutex<HashMap<(String, String), Host>>,
    categories: Mutex<HashMap<String, Category>>,
}

impl FakePrism {
    pub fn new() -> Self {
        let prism = Self::default();
        prism.add_cluster(Cluster {
            ext_id: "pc".to_string(),
            name: PRISM_CENTRAL_NAME.to_string(),
            software: vec![SoftwareType::PrismCentral],
            ..Default::default()
        });
        prism.add_cluster(Cluster {
            ext_id: CLUSTER_UUID.to_string(),
            name: CLUSTER_NAME.to_string(),
            software: vec![SoftwareType::PrismElement, SoftwareType::Ncc],
            ..Default::default()
        });
        prism.hosts.lock().unwrap().insert(
            (CLUSTER_UUID.to_string(), HOST_UUID.to_string()),
            Host {
                ext_id: HOST_UUID.to_string(),
                name: HOST_NAME.to_string(),
            },
        );
        prism
    }

    pub fn add_vm(&self, vm: Vm) {
        self.vms.lock().unwrap().insert(vm.ext_id.clone(), vm);
    }

    pub fn add_cluster(&self, cluster: Cluster) {
        self.clusters
            .lock()
            .unwrap()
            .insert(cluster.ext_id.clone(), cluster);
    }

    pub fn remove_cluster(&self, uuid: &str) {
        self.clusters.lock().unwrap().remove(uuid);
    }

    pub fn add_category(&self, uuid: &str, key: &str, value: &str) {
        self.categories.lock().unwrap().insert(
            uuid.to_string(),
            Category {
                ext_id: uuid.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    pub fn tag_cluster(&self, cluster_uuid: &str, category_uuid: &str) {
        if let Some(cluster) = self.clusters.lock().unwrap().get_mut(cluster_uuid) {
            cluster.categories.push(category_uuid.to_string());
        }
    }
}

#[async_trait]
impl Prism for FakePrism {
    async fn get_vm(&self, vm_uuid: &str) -> Result<Vm, Error> {
        self.vms
            .lock()
            .unwrap()
            .get(vm_uuid)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Vm, vm_uuid))
    }

    async fn get_cluster(&self, cluster_uuid: &str) -> Result<Cluster, Error> {
        self.clusters
            .lock()
            .unwrap()
            .get(cluster_uuid)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Cluster, cluster_uuid))
    }

    async fn list_all_clusters(&self) -> Result<Vec<Cluster>, Error> {
        Ok(self.clusters.lock().unwrap().values().cloned().collect())
    }

    async fn get_category(&self, category_uuid: &str) -> Result<Category, Error> {
        self.categories
            .lock()
            .unwrap()
            .get(category_uuid)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Category, category_uuid))
    }

    async fn get_cluster_host(&self, cluster_uuid: &str, host_uuid: &str) -> Result<Host, Error> {
        self.hosts
            .lock()
            .unwrap()
            .get(&(cluster_uuid.to_string(), host_uuid.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Host, host_uuid))
    }
}

/// A running VM on the seeded cluster and host with one NIC
pub fn running_vm(uuid: &str, name: &str, primary_ip: &str) -> Vm {
    Vm {
        ext_id: uuid.to_string(),
        name: name.to_string(),
        power_state: PowerState::On,
        cluster: Some(CLUSTER_UUID.to_string()),
        host: Some(HOST_UUID.to_string()),
        categories: vec![],
        nics: vec![Nic {
            ext_id: Some(format!("{uuid}-nic-0")),
            network_info: Some(NicNetworkInfo::VirtualEthernet(NicIpv4 {
                primary: Some(primary_ip.to_string()),
                ..Default::default()
            })),
        }],
    }
}

/// A node whose system UUID points at `vm_uuid`
pub fn node_for(name: &str, vm_uuid: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            node_info: Some(NodeSystemInfo {
                system_uuid: vm_uuid.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
