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

use clap::{ArgAction, Args};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "platform-system";
pub const DEFAULT_CLUSTER_NAME: &str = "platformcluster";
pub const DEFAULT_PACKAGE_NAME: &str = "platformpackage";

/// Settings of the `server` command.
#[derive(Args, Clone, Debug)]
pub struct Config {
    /// Namespace holding the platform resources.
    #[arg(long, env = "PLATFORM_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Name of the PlatformCluster object.
    #[arg(long, env = "PLATFORM_CLUSTER_NAME", default_value = DEFAULT_CLUSTER_NAME)]
    pub cluster_name: String,

    /// Name of the PlatformPackage object.
    #[arg(long, env = "PLATFORM_PACKAGE_NAME", default_value = DEFAULT_PACKAGE_NAME)]
    pub package_name: String,

    /// Directory packages are extracted into.
    #[arg(long, env = "PLATFORM_PACKAGE_DIR", default_value = "/opt/platform/pkg/files")]
    pub package_dir: PathBuf,

    /// Container CLI used to load, tag and push images.
    #[arg(long, env = "PLATFORM_IMAGE_RUNTIME", default_value = "docker")]
    pub image_runtime: String,

    #[arg(long, env = "PLATFORM_STATUS_ADDR", default_value = "0.0.0.0:8080")]
    pub status_addr: SocketAddr,

    /// Attempts for a status write before giving up on version conflicts.
    #[arg(long, env = "PLATFORM_STATUS_RETRIES", default_value_t = 5)]
    pub status_retries: usize,

    /// Directory whose `vX.Y.Z` entries are the available upgrades.
    #[arg(long, env = "PLATFORM_VERSION_DIR", default_value = "/opt/platform/versions")]
    pub version_dir: PathBuf,

    /// Drop gateway candidates whose ports already accept connections.
    #[arg(long, env = "PLATFORM_CHECK_GATEWAY_PORTS", default_value_t = true, action = ArgAction::Set)]
    pub check_gateway_ports: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            cluster_name: DEFAULT_CLUSTER_NAME.to_owned(),
            package_name: DEFAULT_PACKAGE_NAME.to_owned(),
            package_dir: PathBuf::from("/opt/platform/pkg/files"),
            image_runtime: "docker".to_owned(),
            status_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            status_retries: 5,
            version_dir: PathBuf::from("/opt/platform/versions"),
            check_gateway_ports: true,
        }
    }
}
