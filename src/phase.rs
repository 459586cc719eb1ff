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

//! Folds the cluster, package and component observations into the single
//! lifecycle phase reported on the cluster.

use crate::store::{self, ObjectStore};
use crate::types::v1alpha1::cluster::{ClusterPhase, PlatformCluster};
use crate::types::v1alpha1::component::{ComponentPhase, PlatformComponent};
use crate::types::v1alpha1::package::PlatformPackage;

fn cluster_phase(cluster: Option<&PlatformCluster>) -> ClusterPhase {
    match cluster {
        None => ClusterPhase::Waiting,
        Some(c) if c.status.is_none() => ClusterPhase::Initing,
        Some(_) => ClusterPhase::Setting,
    }
}

fn configured(cluster: Option<&PlatformCluster>) -> bool {
    cluster.is_some_and(|c| c.status.is_some() && c.spec.config_completed)
}

fn package_phase(cluster: Option<&PlatformCluster>, pkg: Option<&PlatformPackage>) -> ClusterPhase {
    if configured(cluster) && pkg.is_some() {
        ClusterPhase::Installing
    } else {
        ClusterPhase::Setting
    }
}

fn component_phase(
    cluster: Option<&PlatformCluster>,
    components: &[PlatformComponent],
) -> ClusterPhase {
    // Terminating wins over every other observation.
    if components
        .iter()
        .any(|c| c.phase() == Some(ComponentPhase::Terminating))
    {
        return ClusterPhase::UnInstalling;
    }

    if !configured(cluster) || components.is_empty() {
        return ClusterPhase::Setting;
    }

    if components.iter().all(PlatformComponent::is_ready) {
        ClusterPhase::Running
    } else {
        ClusterPhase::Installing
    }
}

/// Computes the aggregate phase. Pure: identical inputs give the identical
/// phase.
pub fn aggregate(
    cluster: Option<&PlatformCluster>,
    pkg: Option<&PlatformPackage>,
    components: &[PlatformComponent],
) -> ClusterPhase {
    let cluster_sub = cluster_phase(cluster);
    let package_sub = package_phase(cluster, pkg);
    let component_sub = component_phase(cluster, components);

    match (cluster_sub, package_sub, component_sub) {
        (_, _, ClusterPhase::UnInstalling) => ClusterPhase::UnInstalling,
        (ClusterPhase::Waiting, _, _) => ClusterPhase::Waiting,
        (ClusterPhase::Initing, _, _) => ClusterPhase::Initing,
        (_, ClusterPhase::Setting, ClusterPhase::Setting) => ClusterPhase::Setting,
        (_, _, ClusterPhase::Running) => ClusterPhase::Running,
        (_, ClusterPhase::Installing, _) | (_, _, ClusterPhase::Installing) => {
            ClusterPhase::Installing
        }
        (cluster_sub, _, _) => cluster_sub,
    }
}

/// Reads the live objects in `namespace` and aggregates their phase.
pub async fn status<S: ObjectStore>(
    store: &S,
    namespace: &str,
    cluster_name: &str,
    package_name: &str,
) -> Result<ClusterPhase, store::Error> {
    let cluster = store
        .get::<PlatformCluster>(Some(namespace), cluster_name)
        .await?;
    let pkg = store
        .get::<PlatformPackage>(Some(namespace), package_name)
        .await?;
    let components = store
        .list::<PlatformComponent>(Some(namespace), None)
        .await?;

    Ok(aggregate(cluster.as_ref(), pkg.as_ref(), &components))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::v1alpha1::cluster::ClusterStatus;
    use crate::types::v1alpha1::component::ComponentStatus;

    fn cluster_with_status() -> PlatformCluster {
        let mut cluster = crate::tests::create_test_cluster();
        cluster.status = Some(ClusterStatus::default());
        cluster
    }

    fn component(replicas: i32, ready: i32, phase: Option<ComponentPhase>) -> PlatformComponent {
        let mut c = crate::tests::create_test_component("api", "api-server");
        c.status = Some(ComponentStatus {
            replicas,
            ready_replicas: ready,
            phase,
            ..Default::default()
        });
        c
    }

    // Test: scenario without a cluster object
    #[tokio::test]
    async fn test_status_without_cluster_is_waiting() {
        let store = MemoryStore::new();
        let phase = status(&store, "default", "platformcluster", "platformpackage")
            .await
            .unwrap();
        assert_eq!(phase, ClusterPhase::Waiting);
    }

    #[test]
    fn test_cluster_without_status_is_initing() {
        let cluster = crate::tests::create_test_cluster();
        assert_eq!(aggregate(Some(&cluster), None, &[]), ClusterPhase::Initing);
    }

    #[test]
    fn test_nothing_installed_is_setting() {
        let cluster = cluster_with_status();
        assert_eq!(aggregate(Some(&cluster), None, &[]), ClusterPhase::Setting);
    }

    #[test]
    fn test_unfinished_config_is_setting() {
        let mut cluster = cluster_with_status();
        cluster.spec.config_completed = false;
        let pkg = crate::tests::create_test_package(None);

        assert_eq!(
            aggregate(Some(&cluster), Some(&pkg), &[component(1, 0, None)]),
            ClusterPhase::Setting
        );
    }

    #[test]
    fn test_component_not_ready_is_installing() {
        let cluster = cluster_with_status();
        let pkg = crate::tests::create_test_package(None);
        assert_eq!(
            aggregate(Some(&cluster), Some(&pkg), &[component(1, 0, None)]),
            ClusterPhase::Installing
        );
    }

    #[test]
    fn test_package_alone_is_installing() {
        let cluster = cluster_with_status();
        let pkg = crate::tests::create_test_package(None);
        assert_eq!(
            aggregate(Some(&cluster), Some(&pkg), &[]),
            ClusterPhase::Installing
        );
    }

    #[test]
    fn test_all_components_ready_is_running() {
        let cluster = cluster_with_status();
        let pkg = crate::tests::create_test_package(None);
        let components = [component(1, 1, Some(ComponentPhase::Running))];

        let phase = aggregate(Some(&cluster), Some(&pkg), &components);
        assert_eq!(phase, ClusterPhase::Running);
        assert_eq!(
            aggregate(Some(&cluster), Some(&pkg), &components),
            phase,
            "aggregation must be deterministic"
        );
    }

    // Test: a terminating component overrides every other sub-phase
    #[test]
    fn test_terminating_component_wins() {
        let terminating = component(1, 1, Some(ComponentPhase::Terminating));
        let pkg = crate::tests::create_test_package(None);
        let no_status = crate::tests::create_test_cluster();
        let with_status = cluster_with_status();

        for cluster in [None, Some(&no_status), Some(&with_status)] {
            for pkg in [None, Some(&pkg)] {
                assert_eq!(
                    aggregate(cluster, pkg, std::slice::from_ref(&terminating)),
                    ClusterPhase::UnInstalling
                );
            }
        }
    }

    #[tokio::test]
    async fn test_status_reads_live_objects() {
        let store = MemoryStore::new();
        store.insert(cluster_with_status());
        store.insert(crate::tests::create_test_package(None));
        store.insert(component(2, 1, Some(ComponentPhase::Installing)));

        let phase = status(&store, "default", "platformcluster", "platformpackage")
            .await
            .unwrap();
        assert_eq!(phase, ClusterPhase::Installing);
    }
}
