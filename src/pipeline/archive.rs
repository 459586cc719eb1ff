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

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};
use std::path::Path;
use tokio::process::Command;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to execute tar: {}", source))]
    Spawn { source: std::io::Error },

    #[snafu(display("tar failed on {}: {}", archive, stderr))]
    Tar { archive: String, stderr: String },
}

/// Unpacks an installation archive into a directory.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), Error>;
}

/// [`Extractor`] using the system `tar`, which detects the compression itself.
pub struct TarExtractor;

#[async_trait]
impl Extractor for TarExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), Error> {
        let output = Command::new("tar")
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg(dest)
            .arg("--warning=no-unknown-keyword")
            .output()
            .await
            .context(SpawnSnafu)?;

        if !output.status.success() {
            return TarSnafu {
                archive: archive.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            }
            .fail();
        }
        Ok(())
    }
}
