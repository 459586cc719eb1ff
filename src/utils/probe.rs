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

//! Point-in-time TCP reachability checks.

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Per-dial timeout so one unreachable target cannot stall a reconcile.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Returns true when something accepts a TCP connection at `addr` within
/// `timeout`.
pub async fn tcp_reachable(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(%addr, "dial failed: {}", e);
            false
        }
        Err(_) => {
            debug!(%addr, "dial timed out after {:?}", timeout);
            false
        }
    }
}

/// Ports on `ip` that already accept connections.
pub async fn occupied_ports(ip: &str, ports: &[i32]) -> Vec<i32> {
    let checks = ports.iter().map(|port| async move {
        let addr = format!("{ip}:{port}");
        tcp_reachable(&addr, PROBE_TIMEOUT).await.then_some(*port)
    });
    futures::future::join_all(checks)
        .await
        .into_iter()
        .flatten()
        .collect()
}
