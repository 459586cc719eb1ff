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

//! Per-component-type install handlers.
//!
//! Every platform component type has a [`ComponentHandler`] that checks its
//! preconditions, declares the sub-objects it needs and runs a hook once
//! those exist. Handlers are looked up through a [`Registry`] built once at
//! startup and handed to the component reconciler.

use crate::store::{self, ObjectStore};
use crate::types::error::{Error, UnsupportedComponentTypeSnafu};
use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use snafu::{OptionExt, Snafu};
use std::collections::HashMap;
use std::str::FromStr;
use strum::{Display, EnumString};

mod api_server;
mod database;
mod gateway;
mod image_hub;
mod monitor;
mod nfs_provisioner;
mod workloads;

pub use api_server::ApiServer;
pub use database::Database;
pub use gateway::Gateway;
pub use image_hub::ImageHub;
pub use monitor::Monitor;
pub use nfs_provisioner::{NfsProvisioner, PROVISIONER as NFS_PROVISIONER};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ComponentType {
    Database,
    ImageHub,
    ApiServer,
    Gateway,
    NfsProvisioner,
    Monitor,
}

/// Failure of a handler hook.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HandlerError {
    /// A precondition is not met yet. The component is requeued without
    /// being marked failed.
    #[snafu(display("precondition not met: {}", reason))]
    Ignorable { reason: String },

    #[snafu(display("{}: {}", reason, message))]
    Fatal { reason: String, message: String },
}

impl From<store::Error> for HandlerError {
    fn from(source: store::Error) -> Self {
        HandlerError::Fatal {
            reason: "ErrStore".to_owned(),
            message: source.to_string(),
        }
    }
}

/// A sub-object a handler wants to exist.
#[derive(Clone, Debug)]
pub enum DesiredObject {
    Deployment(Box<appsv1::Deployment>),
    StatefulSet(Box<appsv1::StatefulSet>),
    DaemonSet(Box<appsv1::DaemonSet>),
    Service(Box<corev1::Service>),
    Secret(Box<corev1::Secret>),
    ConfigMap(Box<corev1::ConfigMap>),
    PersistentVolumeClaim(Box<corev1::PersistentVolumeClaim>),
    StorageClass(Box<storagev1::StorageClass>),
}

macro_rules! desired_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(impl From<$ty> for DesiredObject {
            fn from(obj: $ty) -> Self {
                DesiredObject::$variant(Box::new(obj))
            }
        })*
    };
}

desired_from!(
    Deployment => appsv1::Deployment,
    StatefulSet => appsv1::StatefulSet,
    DaemonSet => appsv1::DaemonSet,
    Service => corev1::Service,
    Secret => corev1::Secret,
    ConfigMap => corev1::ConfigMap,
    PersistentVolumeClaim => corev1::PersistentVolumeClaim,
    StorageClass => storagev1::StorageClass,
);

/// Inputs available to the I/O performing hooks.
pub struct InstallContext<'a, S> {
    pub store: &'a S,
    pub component: &'a PlatformComponent,
    pub cluster: &'a PlatformCluster,
    pub namespace: &'a str,
}

#[async_trait]
pub trait ComponentHandler<S: ObjectStore>: Send + Sync {
    /// Validates preconditions before anything is applied.
    async fn before(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Desired sub-objects. Must not perform I/O.
    fn resources(&self, component: &PlatformComponent, cluster: &PlatformCluster)
    -> Vec<DesiredObject>;

    /// Runs once every desired sub-object exists.
    async fn after(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Replica count overriding the component spec.
    fn replicas(&self, component: &PlatformComponent, cluster: &PlatformCluster) -> Option<i32> {
        None
    }
}

/// Checks that the storage class named by the cluster exists.
async fn require_storage_class<S: ObjectStore>(
    cx: &InstallContext<'_, S>,
) -> Result<String, HandlerError> {
    let Some(name) = cx.cluster.storage_class() else {
        return IgnorableSnafu {
            reason: "no storage class configured on the cluster",
        }
        .fail();
    };

    match cx.store.get::<storagev1::StorageClass>(None, name).await? {
        Some(_) => Ok(name.to_owned()),
        None => IgnorableSnafu {
            reason: format!("storage class {name} not found"),
        }
        .fail(),
    }
}

/// Handlers keyed by component type.
pub struct Registry<S> {
    handlers: HashMap<ComponentType, Box<dyn ComponentHandler<S>>>,
}

impl<S: ObjectStore + 'static> Default for Registry<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S: ObjectStore + 'static> Registry<S> {
    /// Registry holding every handler shipped with the operator.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(ComponentType::Database, Database);
        registry.register(ComponentType::ImageHub, ImageHub);
        registry.register(ComponentType::ApiServer, ApiServer);
        registry.register(ComponentType::Gateway, Gateway);
        registry.register(ComponentType::NfsProvisioner, NfsProvisioner);
        registry.register(ComponentType::Monitor, Monitor);
        registry
    }

    pub fn register(&mut self, type_: ComponentType, handler: impl ComponentHandler<S> + 'static) {
        self.handlers.insert(type_, Box::new(handler));
    }

    /// Resolves the handler for a component's type tag.
    pub fn resolve(&self, tag: &str) -> Result<(ComponentType, &dyn ComponentHandler<S>), Error> {
        let type_ = ComponentType::from_str(tag)
            .ok()
            .context(UnsupportedComponentTypeSnafu { tag })?;
        let handler = self
            .handlers
            .get(&type_)
            .context(UnsupportedComponentTypeSnafu { tag })?;
        Ok((type_, handler.as_ref()))
    }
}
