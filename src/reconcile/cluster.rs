// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Status generation for the [`PlatformCluster`]: storage classes, node
//! candidates for the gateway and chaos components, readiness conditions
//! and the aggregated phase.

use super::ensure::update_status;
use super::{Error, WAIT_REQUEUE};
use crate::config::Config;
use crate::context::Context;
use crate::phase;
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::{
    AvailableNodes, ClusterConditionType, ClusterPhase, ClusterStatus, DEFAULT_GATEWAY_PORTS,
    InstallMode, K8sNode, PlatformCluster, StorageClassInfo,
};
use crate::types::v1alpha1::component::{ComponentConditionType, PlatformComponent};
use crate::types::v1alpha1::condition::{Condition, Conditions};
use crate::types::v1alpha1::k8s::Owner;
use crate::types::v1alpha1::package::{PackagePhase, PlatformPackage};
use crate::utils::probe;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const GATEWAY_NODE_LABEL: &str = "platform.io/gateway";
pub const CHAOS_NODE_LABEL: &str = "platform.io/chaos";

const MASTER_ROLE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Refresh interval once the platform runs; node and storage changes are
/// not watched.
const REFRESH_REQUEUE: Duration = Duration::from_secs(30);

pub async fn reconcile_cluster(
    cluster: Arc<PlatformCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let previous = cluster.status.as_ref().and_then(|s| s.phase);
    let phase = sync(&ctx.store, &ctx.config, &cluster).await?;

    if previous != Some(phase) {
        let from = previous.map_or_else(|| "None".to_owned(), |p| p.to_string());
        info!(name = %cluster.name_any(), %from, to = %phase, "cluster phase changed");
        if let Err(e) = ctx
            .record(
                cluster.as_ref(),
                EventType::Normal,
                "PhaseChanged",
                &format!("phase changed from {from} to {phase}"),
            )
            .await
        {
            warn!(name = %cluster.name_any(), "failed to record event: {}", e);
        }
    }

    Ok(match phase {
        ClusterPhase::Running => Action::requeue(REFRESH_REQUEUE),
        _ => Action::requeue(WAIT_REQUEUE),
    })
}

/// Observes the cluster's surroundings, persists the resulting status when
/// it changed and returns the aggregated phase.
pub async fn sync<S: ObjectStore>(
    store: &S,
    config: &Config,
    cluster: &PlatformCluster,
) -> Result<ClusterPhase, Error> {
    let namespace = cluster.require_namespace()?;
    let mut status = cluster.status.clone().unwrap_or_default();

    let storage_classes = store.list::<storagev1::StorageClass>(None, None).await?;
    status.storage_classes = storage_class_infos(&storage_classes);

    let nodes = store.list::<corev1::Node>(None, None).await?;
    let masters = nodes_matching(&nodes, |labels| {
        MASTER_ROLE_LABELS.iter().any(|l| labels.contains_key(*l))
    });
    let specified_gateway = nodes_matching(&nodes, |labels| {
        labels.get(GATEWAY_NODE_LABEL).is_some_and(|v| v == "true")
    });
    let specified_chaos = nodes_matching(&nodes, |labels| {
        labels.get(CHAOS_NODE_LABEL).is_some_and(|v| v == "true")
    });

    let listed = status.gateway_available_nodes.take().unwrap_or_default();
    status.gateway_available_nodes = Some(AvailableNodes {
        specified_nodes: gateway_candidates(
            cluster,
            config,
            &listed.specified_nodes,
            specified_gateway,
        )
        .await,
        master_nodes: gateway_candidates(cluster, config, &listed.master_nodes, masters.clone())
            .await,
    });
    status.chaos_available_nodes = Some(AvailableNodes {
        specified_nodes: specified_chaos,
        master_nodes: masters,
    });

    let pkg = store
        .get::<PlatformPackage>(Some(&namespace), &config.package_name)
        .await?;
    let components = store
        .list::<PlatformComponent>(Some(&namespace), None)
        .await?;

    let conditions = &mut status.conditions;
    conditions.update(storage_condition(cluster, &status.storage_classes));
    observe(conditions, image_repository_condition(cluster, &components));
    for condition in package_conditions(cluster, pkg.as_ref()) {
        observe(conditions, condition);
    }
    if let Some(db) = &cluster.spec.region_database
        && !conditions.is_true(ClusterConditionType::DatabaseRegion)
    {
        conditions.update(database_condition(ClusterConditionType::DatabaseRegion, &db.address()).await);
    }
    if let Some(db) = &cluster.spec.ui_database
        && !conditions.is_true(ClusterConditionType::DatabaseConsole)
    {
        conditions.update(database_condition(ClusterConditionType::DatabaseConsole, &db.address()).await);
    }
    observe(conditions, running_condition(&components));

    let mut observed = cluster.clone();
    observed.status = Some(status.clone());
    let phase = phase::aggregate(Some(&observed), pkg.as_ref(), &components);
    status.phase = Some(phase);

    persist(store, config, cluster, status).await?;
    Ok(phase)
}

async fn persist<S: ObjectStore>(
    store: &S,
    config: &Config,
    cluster: &PlatformCluster,
    status: ClusterStatus,
) -> Result<(), Error> {
    if cluster.status.as_ref() == Some(&status) {
        return Ok(());
    }

    let result = update_status(
        store,
        cluster.clone(),
        config.status_retries,
        |c: &mut PlatformCluster| c.status = Some(status.clone()),
    )
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!(name = %cluster.name_any(), "cluster deleted before its status was written");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Records `condition` unless its type is already True. Milestones never
/// regress once reached.
fn observe(conditions: &mut Conditions<ClusterConditionType>, condition: Condition<ClusterConditionType>) {
    if !conditions.is_true(condition.type_) {
        conditions.update(condition);
    }
}

/// Access mode volumes of a known provisioner support.
fn access_mode(provisioner: &str) -> Option<&'static str> {
    match provisioner {
        "kubernetes.io/aws-ebs"
        | "kubernetes.io/azure-disk"
        | "kubernetes.io/cinder"
        | "kubernetes.io/gce-pd"
        | "kubernetes.io/iscsi"
        | "diskplugin.csi.alibabacloud.com"
        | "alicloud/disk" => Some("ReadWriteOnce"),
        "kubernetes.io/azure-file"
        | "kubernetes.io/cephfs"
        | "kubernetes.io/glusterfs"
        | "kubernetes.io/nfs"
        | "kubernetes.io/rbd"
        | "nfs.csi.k8s.io"
        | "nasplugin.csi.alibabacloud.com"
        | "cpfsplugin.csi.alibabacloud.com"
        | "ossplugin.csi.alibabacloud.com"
        | crate::component::NFS_PROVISIONER => Some("ReadWriteMany"),
        _ => None,
    }
}

fn storage_class_infos(classes: &[storagev1::StorageClass]) -> Vec<StorageClassInfo> {
    let mut infos: Vec<StorageClassInfo> = classes
        .iter()
        .map(|sc| StorageClassInfo {
            name: sc.name_any(),
            provisioner: sc.provisioner.clone(),
            access_mode: access_mode(&sc.provisioner).map(str::to_owned),
        })
        .collect();
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    infos
}

fn address(node: &corev1::Node, type_: &str) -> String {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addrs| addrs.iter().find(|a| a.type_ == type_))
        .map(|a| a.address.clone())
        .unwrap_or_default()
}

/// Nodes whose labels satisfy `filter`, sorted by name.
fn nodes_matching<F>(nodes: &[corev1::Node], filter: F) -> Vec<K8sNode>
where
    F: Fn(&std::collections::BTreeMap<String, String>) -> bool,
{
    let mut matched: Vec<K8sNode> = nodes
        .iter()
        .filter(|n| filter(n.labels()))
        .map(|n| K8sNode {
            name: n.name_any(),
            internal_ip: address(n, "InternalIP"),
            external_ip: address(n, "ExternalIP"),
        })
        .collect();
    matched.sort_by(|a, b| a.name.cmp(&b.name));
    matched
}

/// Address and ports the gateway would bind on `node`.
fn gateway_ports(cluster: &PlatformCluster, node: &K8sNode) -> (String, Vec<i32>) {
    let declared = cluster
        .spec
        .node_avail_ports
        .iter()
        .find(|p| p.node_name == node.name);

    let ip = declared
        .map(|p| p.node_ip.clone())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| node.internal_ip.clone());
    let ports = declared
        .map(|p| p.ports.clone())
        .filter(|ports| !ports.is_empty())
        .unwrap_or_else(|| DEFAULT_GATEWAY_PORTS.to_vec());
    (ip, ports)
}

/// Drops nodes whose gateway ports are already taken. Nodes listed by a
/// previous pass are kept as is: once the gateway runs there it holds
/// those ports itself.
async fn gateway_candidates(
    cluster: &PlatformCluster,
    config: &Config,
    listed: &[K8sNode],
    nodes: Vec<K8sNode>,
) -> Vec<K8sNode> {
    if !config.check_gateway_ports {
        return nodes;
    }

    let mut available = Vec::with_capacity(nodes.len());
    for node in nodes {
        if listed.iter().any(|l| l.name == node.name) {
            available.push(node);
            continue;
        }

        let (ip, ports) = gateway_ports(cluster, &node);
        if ip.is_empty() {
            available.push(node);
            continue;
        }
        let occupied = probe::occupied_ports(&ip, &ports).await;
        if occupied.is_empty() {
            available.push(node);
        } else {
            debug!(node = %node.name, ?occupied, "gateway ports in use, skipping node");
        }
    }
    available
}

fn storage_condition(
    cluster: &PlatformCluster,
    classes: &[StorageClassInfo],
) -> Condition<ClusterConditionType> {
    let type_ = ClusterConditionType::StorageReady;
    match cluster.storage_class() {
        None => Condition::new(type_, false, "StorageClassNotSet", "no storage class configured"),
        Some(name) if classes.iter().any(|c| c.name == name) => {
            Condition::new(type_, true, "StorageClassFound", "")
        }
        Some(name) => Condition::new(
            type_,
            false,
            "StorageClassNotFound",
            &format!("storage class {name} not found"),
        ),
    }
}

fn condition_ready(component: &PlatformComponent) -> bool {
    component
        .status
        .as_ref()
        .is_some_and(|s| s.conditions.is_true(ComponentConditionType::Ready))
}

fn image_repository_condition(
    cluster: &PlatformCluster,
    components: &[PlatformComponent],
) -> Condition<ClusterConditionType> {
    let type_ = ClusterConditionType::ImageRepositoryInstalled;
    if cluster
        .spec
        .image_hub
        .as_ref()
        .is_some_and(|hub| !hub.domain.is_empty())
    {
        return Condition::new(type_, true, "ExternalImageHub", "");
    }

    let hub_tag = crate::component::ComponentType::ImageHub.to_string();
    let hubs: Vec<&PlatformComponent> = components
        .iter()
        .filter(|c| c.spec.type_ == hub_tag)
        .collect();
    if hubs.is_empty() {
        Condition::new(type_, false, "ImageHubNotFound", "no image hub component")
    } else if hubs.iter().any(|c| condition_ready(c)) {
        Condition::new(type_, true, "ImageHubReady", "")
    } else {
        Condition::new(type_, false, "ImageHubNotReady", "image hub is not ready")
    }
}

/// Package milestones derived from how far the package phase got.
fn package_conditions(
    cluster: &PlatformCluster,
    pkg: Option<&PlatformPackage>,
) -> Vec<Condition<ClusterConditionType>> {
    let (ordinal, reason) = match pkg {
        Some(pkg) => (pkg.phase().ordinal(), pkg.phase().to_string()),
        None if cluster.spec.install_mode != InstallMode::WithPackage => (
            PackagePhase::Completed.ordinal(),
            "PackageNotRequired".to_owned(),
        ),
        None => (PackagePhase::Waiting.ordinal(), "PackageNotFound".to_owned()),
    };

    [
        (ClusterConditionType::PackageExtracted, PackagePhase::Loading),
        (ClusterConditionType::ImagesLoaded, PackagePhase::Pushing),
        (ClusterConditionType::ImagesPushed, PackagePhase::Completed),
        (ClusterConditionType::PackageReady, PackagePhase::Completed),
    ]
    .into_iter()
    .map(|(type_, reached)| Condition::new(type_, ordinal >= reached.ordinal(), &reason, ""))
    .collect()
}

async fn database_condition(
    type_: ClusterConditionType,
    address: &str,
) -> Condition<ClusterConditionType> {
    if probe::tcp_reachable(address, probe::PROBE_TIMEOUT).await {
        Condition::new(type_, true, "DatabaseReachable", "")
    } else {
        Condition::new(
            type_,
            false,
            "DatabaseUnreachable",
            &format!("cannot connect to {address}"),
        )
    }
}

fn running_condition(components: &[PlatformComponent]) -> Condition<ClusterConditionType> {
    let type_ = ClusterConditionType::Running;
    if components.is_empty() {
        return Condition::new(type_, false, "NoComponents", "no platform components yet");
    }
    match components.iter().find(|c| !condition_ready(c)) {
        Some(c) => Condition::new(
            type_,
            false,
            "ComponentNotReady",
            &format!("component {} not ready", c.name_any()),
        ),
        None => Condition::new(type_, true, "AllComponentsReady", ""),
    }
}
