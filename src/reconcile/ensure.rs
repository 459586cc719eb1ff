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

//! Idempotent create-or-update of owned sub-objects, and status writes
//! with optimistic-concurrency retry.

use crate::component::DesiredObject;
use crate::store::{self, NotFoundSnafu, ObjectStore, StoreObject};
use crate::types::v1alpha1::k8s::stamp_owner;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1 as apiregv1;
use kube::{Resource, ResourceExt};
use snafu::OptionExt;
use tracing::debug;

/// What [`ensure`] did to the live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    /// The object did not exist. Callers should requeue, since side effects
    /// of the new object are not observable yet.
    Created,
    Updated,
    /// The object exists and has nothing mutable to apply.
    Unchanged,
}

/// Per-kind update rule applied when the desired object already exists.
pub trait Mergeable: StoreObject {
    /// Returns the object to write over `live`, or `None` when nothing may
    /// be updated.
    fn merge(live: &Self, mut desired: Self) -> Option<Self> {
        carry_live_meta(live, &mut desired);
        Some(desired)
    }
}

/// Copies the live resource version onto `desired`, along with annotations
/// other controllers wrote that `desired` does not set itself.
fn carry_live_meta<K: Resource>(live: &K, desired: &mut K) {
    let meta = desired.meta_mut();
    meta.resource_version = live.meta().resource_version.clone();
    if let Some(live_annotations) = &live.meta().annotations {
        let annotations = meta.annotations.get_or_insert_with(Default::default);
        for (k, v) in live_annotations {
            annotations.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl Mergeable for appsv1::Deployment {}
impl Mergeable for appsv1::StatefulSet {}
impl Mergeable for appsv1::DaemonSet {}
impl Mergeable for corev1::Secret {}
impl Mergeable for corev1::ConfigMap {}
impl Mergeable for apiregv1::APIService {}

impl Mergeable for corev1::Service {
    fn merge(live: &Self, mut desired: Self) -> Option<Self> {
        carry_live_meta(live, &mut desired);
        if let (Some(live_spec), Some(spec)) = (&live.spec, desired.spec.as_mut()) {
            spec.cluster_ip = live_spec.cluster_ip.clone();
            spec.cluster_ips = live_spec.cluster_ips.clone();
        }
        Some(desired)
    }
}

impl Mergeable for corev1::PersistentVolumeClaim {
    /// Only the storage request of a claim may change after creation.
    fn merge(live: &Self, desired: Self) -> Option<Self> {
        let storage = desired
            .spec
            .as_ref()
            .and_then(|s| s.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get("storage"))
            .cloned()?;

        let mut updated = live.clone();
        let requests = updated
            .spec
            .get_or_insert_with(Default::default)
            .resources
            .get_or_insert_with(Default::default)
            .requests
            .get_or_insert_with(Default::default);
        if requests.get("storage") == Some(&storage) {
            return None;
        }
        requests.insert("storage".to_owned(), storage);
        Some(updated)
    }
}

impl Mergeable for storagev1::StorageClass {
    fn merge(_live: &Self, _desired: Self) -> Option<Self> {
        None
    }
}

/// Creates `desired` if it does not exist, otherwise applies its mutable
/// part over the live object.
pub async fn ensure<S, K>(
    store: &S,
    mut desired: K,
    owner: Option<metav1::OwnerReference>,
) -> Result<Ensured, store::Error>
where
    S: ObjectStore,
    K: Mergeable,
{
    let name = desired.name_any();
    let namespace = desired.namespace();
    if let Some(owner) = owner {
        stamp_owner(desired.meta_mut(), owner);
    }

    match store.get::<K>(namespace.as_deref(), &name).await? {
        None => {
            debug!(kind = %K::kind(&()), %name, "creating resource");
            store.create(&desired).await?;
            Ok(Ensured::Created)
        }
        Some(live) => match K::merge(&live, desired) {
            Some(update) => {
                store.replace(&update).await?;
                Ok(Ensured::Updated)
            }
            None => Ok(Ensured::Unchanged),
        },
    }
}

/// [`ensure`] over the tagged desired-object variants.
pub async fn ensure_desired<S: ObjectStore>(
    store: &S,
    desired: DesiredObject,
    owner: metav1::OwnerReference,
) -> Result<Ensured, store::Error> {
    let owner = Some(owner);
    match desired {
        DesiredObject::Deployment(o) => ensure(store, *o, owner).await,
        DesiredObject::StatefulSet(o) => ensure(store, *o, owner).await,
        DesiredObject::DaemonSet(o) => ensure(store, *o, owner).await,
        DesiredObject::Service(o) => ensure(store, *o, owner).await,
        DesiredObject::Secret(o) => ensure(store, *o, owner).await,
        DesiredObject::ConfigMap(o) => ensure(store, *o, owner).await,
        DesiredObject::PersistentVolumeClaim(o) => ensure(store, *o, owner).await,
        // Cluster-scoped objects cannot be owned by namespaced resources.
        DesiredObject::StorageClass(o) => ensure(store, *o, None).await,
    }
}

/// Writes a status mutation, re-fetching and reapplying it on version
/// conflicts up to `attempts` times in total.
pub async fn update_status<S, K, F>(
    store: &S,
    latest: K,
    attempts: usize,
    mut mutate: F,
) -> Result<K, store::Error>
where
    S: ObjectStore,
    K: StoreObject,
    F: FnMut(&mut K) + Send,
{
    let name = latest.name_any();
    let namespace = latest.namespace();
    let mut current = latest;
    let mut attempt = 1;

    loop {
        mutate(&mut current);
        match store.replace_status(&current).await {
            Ok(updated) => return Ok(updated),
            Err(e) if e.is_conflict() && attempt < attempts => {
                attempt += 1;
                debug!(
                    kind = %K::kind(&()),
                    %name,
                    attempt,
                    "status update conflicted, retrieving the latest resource and retrying"
                );
                current = store
                    .get::<K>(namespace.as_deref(), &name)
                    .await?
                    .context(NotFoundSnafu {
                        kind: K::kind(&()).to_string(),
                        name: name.clone(),
                    })?;
            }
            Err(e) => return Err(e),
        }
    }
}
