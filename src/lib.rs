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

#![allow(clippy::single_match)]

use crate::config::Config;
use crate::context::Context;
use crate::reconcile::cluster::reconcile_cluster;
use crate::reconcile::component::reconcile_component;
use crate::reconcile::error_policy;
use crate::reconcile::package::reconcile_package;
use crate::reconcile::volume::reconcile_volume;
use crate::server::ServerState;
use crate::store::KubeStore;
use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use crate::types::v1alpha1::package::PlatformPackage;
use crate::types::v1alpha1::volume::PlatformVolume;
use futures::StreamExt;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client, CustomResourceExt, Resource};
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod component;
pub mod config;
mod context;
pub mod phase;
pub mod pipeline;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod types;
pub mod utils;


async fn report<K, E>(res: Result<(ObjectRef<K>, Action), E>)
where
    K: Resource<DynamicType = ()>,
    E: Display,
{
    match res {
        Ok((obj, _)) => info!("reconciled successful, object {}", obj),
        Err(e) => warn!("reconcile failed: {}", e),
    }
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("a rustls crypto provider was already installed");
    }

    let client = Client::try_default().await?;
    let namespace = config.namespace.clone();
    info!(%namespace, cluster = %config.cluster_name, "starting platform operator");

    let status_server = ServerState {
        store: KubeStore::new(client.clone()),
        config: config.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = server::serve(status_server).await {
            error!("{}", e);
        }
    });

    let context = Arc::new(Context::new(client.clone(), config.clone()));

    // Package and component changes move the aggregated phase.
    let cluster_ref = ObjectRef::<PlatformCluster>::new(&config.cluster_name).within(&namespace);
    let package_ref = cluster_ref.clone();
    let cluster = Controller::new(
        Api::<PlatformCluster>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .watches(
        Api::<PlatformPackage>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
        move |_| Some(package_ref.clone()),
    )
    .watches(
        Api::<PlatformComponent>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
        move |_| Some(cluster_ref.clone()),
    )
    .run(reconcile_cluster, error_policy, context.clone())
    .for_each(report);

    let package = Controller::new(
        Api::<PlatformPackage>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .run(reconcile_package, error_policy, context.clone())
    .for_each(report);

    let component = Controller::new(
        Api::<PlatformComponent>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .owns(
        Api::<appsv1::Deployment>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .owns(
        Api::<appsv1::StatefulSet>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .owns(
        Api::<appsv1::DaemonSet>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .owns(
        Api::<corev1::Service>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .run(reconcile_component, error_policy, context.clone())
    .for_each(report);

    let volume = Controller::new(
        Api::<PlatformVolume>::namespaced(client.clone(), &namespace),
        watcher::Config::default(),
    )
    .run(reconcile_volume, error_policy, context.clone())
    .for_each(report);

    tokio::join!(cluster, package, component, volume);

    Ok(())
}

/// Every custom resource definition as one multi-document YAML stream.
pub fn crds() -> Result<String, serde_yaml_ng::Error> {
    let docs = [
        serde_yaml_ng::to_string(&PlatformCluster::crd())?,
        serde_yaml_ng::to_string(&PlatformPackage::crd())?,
        serde_yaml_ng::to_string(&PlatformComponent::crd())?,
        serde_yaml_ng::to_string(&PlatformVolume::crd())?,
    ];
    Ok(docs.join("---\n"))
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer.write_all(crds()?.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}
