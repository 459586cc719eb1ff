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

//! Typed access to the API server's object store.
//!
//! Reconcilers talk to [`ObjectStore`] rather than `kube::Api` directly so
//! the create-or-update and conflict-retry paths can run against an
//! in-memory store in tests.

use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use crate::types::v1alpha1::package::PlatformPackage;
use crate::types::v1alpha1::volume::PlatformVolume;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1 as apiregv1;
use kube::api::{ListParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::{OptionExt, ResultExt, Snafu};
use std::fmt::Debug;

#[cfg(test)]
pub mod memory;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} '{}' not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("conflict writing {} '{}', object has been modified", kind, name))]
    Conflict { kind: String, name: String },

    #[snafu(display("{} has no name", kind))]
    Unnamed { kind: String },

    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("serde_json error: {}", source))]
    SerdeJson { source: serde_json::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

fn classify<K: StoreObject>(name: &str, err: kube::Error) -> Error {
    let kind = K::kind(&()).to_string();
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound {
            kind,
            name: name.to_owned(),
        },
        kube::Error::Api(ae) if ae.code == 409 => Error::Conflict {
            kind,
            name: name.to_owned(),
        },
        source => Error::Kube { source },
    }
}

/// Object kinds the operator reads or writes, with their API scope.
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
    fn api(client: kube::Client, namespace: Option<&str>) -> Api<Self>;
}

macro_rules! namespaced {
    ($($ty:ty),* $(,)?) => {
        $(impl StoreObject for $ty {
            fn api(client: kube::Client, namespace: Option<&str>) -> Api<Self> {
                match namespace {
                    Some(ns) => Api::namespaced(client, ns),
                    None => Api::all(client),
                }
            }
        })*
    };
}

macro_rules! cluster_scoped {
    ($($ty:ty),* $(,)?) => {
        $(impl StoreObject for $ty {
            fn api(client: kube::Client, _namespace: Option<&str>) -> Api<Self> {
                Api::all(client)
            }
        })*
    };
}

namespaced!(
    PlatformCluster,
    PlatformPackage,
    PlatformComponent,
    PlatformVolume,
    appsv1::Deployment,
    appsv1::StatefulSet,
    appsv1::DaemonSet,
    corev1::Service,
    corev1::Secret,
    corev1::ConfigMap,
    corev1::PersistentVolumeClaim,
    corev1::Pod,
);

cluster_scoped!(
    corev1::Node,
    storagev1::StorageClass,
    apiregv1::APIService,
);

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches an object, mapping not-found to `None`.
    async fn get<K: StoreObject>(&self, namespace: Option<&str>, name: &str)
    -> Result<Option<K>, Error>;

    /// Lists objects, optionally filtered by an equality label selector.
    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<K>, Error>;

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, Error>;

    /// Full replace guarded by the object's resource version.
    async fn replace<K: StoreObject>(&self, obj: &K) -> Result<K, Error>;

    /// Writes only the status, guarded by the object's resource version.
    async fn replace_status<K: StoreObject>(&self, obj: &K) -> Result<K, Error>;
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: kube::Client,
}

impl KubeStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

fn name_of<K: StoreObject>(obj: &K) -> Result<String, Error> {
    obj.meta().name.clone().context(UnnamedSnafu {
        kind: K::kind(&()).to_string(),
    })
}

/// Body of a status replace. The whole object goes out so the API server
/// checks its resource version and fields cleared locally are cleared
/// remotely too.
fn status_body<K: StoreObject>(obj: &K) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(obj).context(SerdeJsonSnafu)
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, Error> {
        K::api(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify::<K>(name, e))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<K>, Error> {
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            params = params.labels(selector);
        }
        let list = K::api(self.client.clone(), namespace)
            .list(&params)
            .await
            .context(KubeSnafu)?;
        Ok(list.items)
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, Error> {
        let name = name_of(obj)?;
        K::api(self.client.clone(), obj.namespace().as_deref())
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| classify::<K>(&name, e))
    }

    async fn replace<K: StoreObject>(&self, obj: &K) -> Result<K, Error> {
        let name = name_of(obj)?;
        K::api(self.client.clone(), obj.namespace().as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| classify::<K>(&name, e))
    }

    async fn replace_status<K: StoreObject>(&self, obj: &K) -> Result<K, Error> {
        let name = name_of(obj)?;
        K::api(self.client.clone(), obj.namespace().as_deref())
            .replace_status(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| classify::<K>(&name, e))
    }
}
