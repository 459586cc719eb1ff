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

//! Install protocol for one [`PlatformComponent`]: gate on the cluster and
//! package, run the handler hooks around the sub-object ensure step, then
//! derive readiness from the component's pods.

use super::ensure::{Ensured, ensure_desired, update_status};
use super::{CREATED_REQUEUE, Error, Outcome, RETRY_REQUEUE, WAIT_REQUEUE};
use crate::component::{HandlerError, InstallContext, Registry};
use crate::config::Config;
use crate::context::Context;
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::{ClusterConditionType, PlatformCluster};
use crate::types::v1alpha1::component::{
    ComponentConditionType, ComponentPhase, ComponentStatus, PlatformComponent, PodStatus,
};
use crate::types::v1alpha1::condition::Condition;
use crate::types::v1alpha1::k8s::Owner;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn reconcile_component(
    component: Arc<PlatformComponent>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let outcome = sync(&ctx.store, &ctx.registry, &ctx.config, &component).await?;
    Ok(outcome.publish(&ctx, component.as_ref()).await)
}

/// Runs one install pass and persists the resulting status.
pub async fn sync<S: ObjectStore + 'static>(
    store: &S,
    registry: &Registry<S>,
    config: &Config,
    component: &PlatformComponent,
) -> Result<Outcome, Error> {
    let namespace = component.require_namespace()?;
    let name = component.name_any();
    let mut status = component.status.clone().unwrap_or_default();

    if component.metadata.deletion_timestamp.is_some() {
        debug!(%name, "component is being deleted");
        status.phase = Some(ComponentPhase::Terminating);
        persist(store, config, component, status).await?;
        return Ok(Outcome::done());
    }

    let (type_, handler) = match registry.resolve(&component.spec.type_) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(%name, "{}", e);
            status.conditions.update(Condition::new(
                ComponentConditionType::Ready,
                false,
                "UnsupportedType",
                &e.to_string(),
            ));
            persist(store, config, component, status).await?;
            return Ok(Outcome {
                action: Action::await_change(),
                ..Outcome::failed(RETRY_REQUEUE, "UnsupportedType", e.to_string())
            });
        }
    };

    let cluster = match store
        .get::<PlatformCluster>(Some(&config.namespace), &config.cluster_name)
        .await
    {
        Ok(Some(cluster)) => cluster,
        Ok(None) => {
            status.conditions.update(Condition::new(
                ComponentConditionType::ClusterConfigCompleted,
                false,
                "ClusterNotFound",
                &format!("cluster {} not found", config.cluster_name),
            ));
            persist(store, config, component, status).await?;
            return Ok(Outcome::requeue(RETRY_REQUEUE));
        }
        Err(e) => {
            status.conditions.update(Condition::new(
                ComponentConditionType::ClusterConfigCompleted,
                false,
                "UnknownErr",
                &e.to_string(),
            ));
            persist(store, config, component, status).await?;
            return Ok(Outcome::requeue(RETRY_REQUEUE));
        }
    };

    if !cluster.spec.config_completed {
        status.conditions.update(Condition::new(
            ComponentConditionType::ClusterConfigCompleted,
            false,
            "ConfigNotCompleted",
            "cluster configuration is not completed",
        ));
        persist(store, config, component, status).await?;
        return Ok(Outcome::requeue(RETRY_REQUEUE));
    }
    status.conditions.update(Condition::new(
        ComponentConditionType::ClusterConfigCompleted,
        true,
        "ConfigCompleted",
        "",
    ));

    let package_ready =
        cluster.skips_package() || cluster.condition_true(ClusterConditionType::PackageReady);
    status.conditions.update(Condition::new(
        ComponentConditionType::PackageReady,
        package_ready,
        if package_ready { "PackageReady" } else { "PackageNotReady" },
        "",
    ));
    if !package_ready && !component.spec.priority_component {
        debug!(%name, "waiting for the package before installing");
        status.conditions.update(Condition::new(
            ComponentConditionType::Ready,
            false,
            "PrerequisitesFailed",
            "waiting for the package to be installed",
        ));
        persist(store, config, component, status).await?;
        return Ok(Outcome::requeue(RETRY_REQUEUE));
    }

    let cx = InstallContext {
        store,
        component,
        cluster: &cluster,
        namespace: &namespace,
    };

    match handler.before(&cx).await {
        Ok(()) => {}
        Err(HandlerError::Ignorable { reason }) => {
            debug!(%name, %type_, %reason, "precondition not met yet");
            return Ok(Outcome::requeue(RETRY_REQUEUE));
        }
        Err(HandlerError::Fatal { reason, message }) => {
            warn!(%name, %type_, %reason, "precondition failed: {}", message);
            return fail(store, config, component, status, "PrerequisitesFailed", message).await;
        }
    }

    let owner = component.new_owner_ref();
    let mut created = false;
    for desired in handler.resources(component, &cluster) {
        match ensure_desired(store, desired, owner.clone()).await {
            Ok(Ensured::Created) => created = true,
            Ok(_) => {}
            Err(e) => {
                warn!(%name, %type_, "failed to apply resources: {}", e);
                return fail(store, config, component, status, "ErrCreateResources", e.to_string())
                    .await;
            }
        }
    }

    if created {
        info!(%name, %type_, "created component resources");
        status.phase = Some(ComponentPhase::Installing);
        persist(store, config, component, status).await?;
        return Ok(Outcome::requeue(CREATED_REQUEUE));
    }

    match handler.after(&cx).await {
        Ok(()) => {}
        Err(HandlerError::Ignorable { reason }) => {
            debug!(%name, %type_, %reason, "post-install step not possible yet");
            return Ok(Outcome::requeue(RETRY_REQUEUE));
        }
        Err(HandlerError::Fatal { reason, message }) => {
            warn!(%name, %type_, %reason, "post-install step failed: {}", message);
            return fail(store, config, component, status, "ErrAfterProcess", message).await;
        }
    }

    let mut pods = match store
        .list::<corev1::Pod>(Some(&namespace), Some(&component.selector()))
        .await
    {
        Ok(pods) => pods,
        Err(e) => {
            return fail(store, config, component, status, "ErrListPods", e.to_string()).await;
        }
    };

    pods.sort_by_key(|p| p.name_any());

    let replicas = handler
        .replicas(component, &cluster)
        .or(component.spec.replicas)
        .unwrap_or(1);
    let pod_status = partition(&pods);
    let ready_replicas = i32::try_from(pod_status.ready.len()).unwrap_or(i32::MAX);
    // A pod still shutting down means a rollout is in flight.
    let terminating = pods.iter().any(|p| p.metadata.deletion_timestamp.is_some());
    let ready = ready_replicas == replicas && !terminating;

    status.replicas = replicas;
    status.ready_replicas = ready_replicas;
    status.pods = pods.iter().map(ResourceExt::name_any).collect();
    status.pod_status = Some(pod_status);
    status.phase = Some(if ready {
        ComponentPhase::Running
    } else {
        ComponentPhase::Installing
    });
    status.message = format!("{ready_replicas}/{replicas} pods ready");
    status.conditions.update(if ready {
        Condition::new(ComponentConditionType::Ready, true, "Ready", "")
    } else {
        Condition::new(
            ComponentConditionType::Ready,
            false,
            "NotReady",
            &status.message,
        )
    });
    persist(store, config, component, status).await?;

    Ok(if ready {
        Outcome::done()
    } else {
        Outcome::requeue(WAIT_REQUEUE)
    })
}

async fn fail<S: ObjectStore>(
    store: &S,
    config: &Config,
    component: &PlatformComponent,
    mut status: ComponentStatus,
    reason: &str,
    message: String,
) -> Result<Outcome, Error> {
    status.conditions.update(Condition::new(
        ComponentConditionType::Ready,
        false,
        reason,
        &message,
    ));
    persist(store, config, component, status).await?;
    Ok(Outcome::failed(RETRY_REQUEUE, reason, message))
}

/// Writes `status` when it differs from the stored one. The Ready condition
/// is always present afterwards.
async fn persist<S: ObjectStore>(
    store: &S,
    config: &Config,
    component: &PlatformComponent,
    mut status: ComponentStatus,
) -> Result<(), Error> {
    if status.conditions.get(ComponentConditionType::Ready).is_none() {
        status.conditions.update(Condition::new(
            ComponentConditionType::Ready,
            false,
            "Installing",
            "",
        ));
    }
    if component.status.as_ref() == Some(&status) {
        return Ok(());
    }

    let result = update_status(
        store,
        component.clone(),
        config.status_retries,
        |c: &mut PlatformComponent| c.status = Some(status.clone()),
    )
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!(name = %component.name_any(), "component deleted before its status was written");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_pod_ready(pod: &corev1::Pod) -> bool {
    pod.metadata.deletion_timestamp.is_none()
        && pod
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conds| {
                conds
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            })
}

/// Ready pods whose containers never restarted.
fn is_pod_healthy(pod: &corev1::Pod) -> bool {
    is_pod_ready(pod)
        && pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .is_none_or(|cs| cs.iter().all(|c| c.restart_count == 0))
}

fn partition(pods: &[corev1::Pod]) -> PodStatus {
    let mut status = PodStatus::default();
    for pod in pods {
        let name = pod.name_any();
        if is_pod_ready(pod) {
            status.ready.push(name.clone());
        } else {
            status.unready.push(name.clone());
        }
        if is_pod_healthy(pod) {
            status.healthy.push(name);
        } else {
            status.un_healthy.push(name);
        }
    }
    status
}
