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

//! Read-only HTTP endpoint reporting the platform phase and the versions
//! the cluster can be upgraded to.

use crate::config::Config;
use crate::phase;
use crate::store::{self, ObjectStore};
use crate::types::v1alpha1::cluster::{ClusterPhase, PlatformCluster};
use crate::utils::version;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to bind status server on {}: {}", addr, source))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("status server stopped: {}", source))]
    Serve { source: std::io::Error },

    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Version { source: version::Error },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let error = match &self {
            Error::Store { .. } => "StoreError",
            Error::Version { .. } => "VersionError",
            Error::Bind { .. } | Error::Serve { .. } => "ServerError",
        };
        let body = Json(ErrorResponse {
            error: error.to_owned(),
            message: self.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub struct ServerState<S> {
    pub store: S,
    pub config: Config,
}

#[derive(Serialize, Debug)]
pub struct PhaseResponse {
    pub phase: ClusterPhase,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VersionsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    pub versions: Vec<String>,
}

pub fn router<S: ObjectStore + 'static>(state: Arc<ServerState<S>>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(ready_check))
        .route("/api/v1/status", get(cluster_status::<S>))
        .route("/api/v1/versions", get(upgrade_versions::<S>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve<S: ObjectStore + 'static>(state: ServerState<S>) -> Result<(), Error> {
    let addr = state.config.status_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(BindSnafu { addr })?;

    info!(%addr, "status server listening");
    axum::serve(listener, router(Arc::new(state)))
        .await
        .context(ServeSnafu)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_check() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}

async fn cluster_status<S: ObjectStore>(
    State(state): State<Arc<ServerState<S>>>,
) -> Result<Json<PhaseResponse>, Error> {
    let config = &state.config;
    let phase = phase::status(
        &state.store,
        &config.namespace,
        &config.cluster_name,
        &config.package_name,
    )
    .await?;
    Ok(Json(PhaseResponse { phase }))
}

async fn upgrade_versions<S: ObjectStore>(
    State(state): State<Arc<ServerState<S>>>,
) -> Result<Json<VersionsResponse>, Error> {
    let config = &state.config;
    let cluster = state
        .store
        .get::<PlatformCluster>(Some(&config.namespace), &config.cluster_name)
        .await?;
    let current_version = cluster.and_then(|c| c.spec.install_version);

    let versions =
        version::upgradable_versions(&config.version_dir, current_version.as_deref()).await?;
    Ok(Json(VersionsResponse {
        current_version,
        versions,
    }))
}
