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

//! Container image runtime driven through its command line client.

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to run '{}': {}", command, source))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' exited with {}: {}", command, code, stderr))]
    Exit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[snafu(display("no image found in '{}'", archive))]
    NothingLoaded { archive: String },
}

/// Local image store operations the package pipeline needs.
#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// Loads an image archive, returning the references it contained.
    async fn load(&self, archive: &Path) -> Result<Vec<String>, Error>;

    async fn tag(&self, source: &str, target: &str) -> Result<(), Error>;

    async fn login(&self, registry: &str, username: &str, password: &str) -> Result<(), Error>;

    async fn push(&self, image: &str) -> Result<(), Error>;

    /// References present locally that match `reference`.
    async fn list(&self, reference: &str) -> Result<Vec<String>, Error>;
}

/// [`ImageRuntime`] shelling out to `docker` or a compatible CLI.
pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<String, Error> {
        let command = format!("{} {}", self.binary, args.first().unwrap_or(&""));
        debug!(%command, "running image runtime");

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(SpawnSnafu {
                command: command.clone(),
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .context(SpawnSnafu {
                    command: command.clone(),
                })?;
        }

        let output = child.wait_with_output().await.context(SpawnSnafu {
            command: command.clone(),
        })?;
        if !output.status.success() {
            return ExitSnafu {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            }
            .fail();
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Image references from `docker load` output.
fn loaded_images(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            line.strip_prefix("Loaded image: ")
                .or_else(|| line.strip_prefix("Loaded image ID: "))
        })
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

#[async_trait]
impl ImageRuntime for CliRuntime {
    async fn load(&self, archive: &Path) -> Result<Vec<String>, Error> {
        let path = archive.to_string_lossy();
        let images = loaded_images(&self.run(&["load", "-i", &path], None).await?);
        if images.is_empty() {
            return NothingLoadedSnafu { archive: path }.fail();
        }
        Ok(images)
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), Error> {
        self.run(&["tag", source, target], None).await.map(|_| ())
    }

    async fn login(&self, registry: &str, username: &str, password: &str) -> Result<(), Error> {
        self.run(
            &["login", "--username", username, "--password-stdin", registry],
            Some(password),
        )
        .await
        .map(|_| ())
    }

    async fn push(&self, image: &str) -> Result<(), Error> {
        self.run(&["push", image], None).await.map(|_| ())
    }

    async fn list(&self, reference: &str) -> Result<Vec<String>, Error> {
        let stdout = self
            .run(
                &[
                    "images",
                    "--filter",
                    &format!("reference={reference}"),
                    "--format",
                    "{{.Repository}}:{{.Tag}}",
                ],
                None,
            )
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect())
    }
}
