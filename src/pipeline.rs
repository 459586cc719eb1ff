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

//! Installation archive pipeline: extract, read the manifest, load every
//! image, retag it under the cluster registry and push it.
//!
//! Each stage is a separate call so the caller can publish progress between
//! stages. The pipeline is safe to restart from the top at any point: a
//! finished extraction carries a marker file, an extracted directory is
//! never unpacked twice, and loading, tagging and pushing an image that is
//! already present are harmless overwrites.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

pub mod archive;
pub mod runtime;

pub use archive::{Extractor, TarExtractor};
pub use runtime::{CliRuntime, ImageRuntime};

const MANIFEST: &str = "manifest.yaml";
const COMPLETED_MARKER: &str = ".completed";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to read package {}: {}", path.display(), source))]
    ReadPackage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("package checksum mismatch: expected {}, got {}", expected, actual))]
    ChecksumMismatch { expected: String, actual: String },

    #[snafu(display("failed to prepare {}: {}", path.display(), source))]
    WorkDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to extract package: {}", source))]
    Extract { source: archive::Error },

    #[snafu(display("failed to read manifest {}: {}", path.display(), source))]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("invalid manifest {}: {}", path.display(), source))]
    ParseManifest {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[snafu(display("failed to load image {}: {}", file, source))]
    Load {
        file: String,
        source: runtime::Error,
    },

    #[snafu(display("image {} listed in the manifest is not present after loading", image))]
    Missing { image: String },

    #[snafu(display("failed to tag {} as {}: {}", source_image, target, source))]
    Tag {
        source_image: String,
        target: String,
        source: runtime::Error,
    },

    #[snafu(display("failed to log in to {}: {}", registry, source))]
    Login {
        registry: String,
        source: runtime::Error,
    },

    #[snafu(display("failed to push {}: {}", image, source))]
    Push {
        image: String,
        source: runtime::Error,
    },
}

impl Error {
    /// Condition reason recorded on the package for this failure.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::ReadPackage { .. } | Error::ChecksumMismatch { .. } => "ErrPkgChecksum",
            Error::WorkDir { .. } | Error::Extract { .. } => "ErrPkgExtract",
            Error::ReadManifest { .. } | Error::ParseManifest { .. } => "ErrPkgManifest",
            Error::Load { .. } | Error::Missing { .. } => "ErrImageLoad",
            Error::Tag { .. } | Error::Login { .. } | Error::Push { .. } => "ErrImagePush",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    images: Vec<ManifestImage>,
}

#[derive(Debug, Deserialize)]
struct ManifestImage {
    /// Image archive, relative to the extraction directory.
    file: String,

    /// Reference the archive is expected to contain.
    #[serde(default)]
    image: Option<String>,
}

impl ManifestImage {
    /// Resource-fork files and anything that is not a tarball are skipped.
    fn is_image_archive(&self) -> bool {
        let name = Path::new(&self.file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        !name.starts_with("._") && (name.ends_with(".tgz") || name.ends_with(".tar"))
    }
}

/// Where an archive was extracted and whether a previous run finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub dir: PathBuf,
    pub completed: bool,
}

/// Registry images are pushed to.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    /// `domain[/namespace]` prefix of every pushed reference.
    pub repository: String,
    pub domain: String,
    pub username: String,
    pub password: String,
}

/// Rewrites `source` under `repository`, keeping the last path segment and
/// the tag (`latest` when absent).
pub fn retag(source: &str, repository: &str) -> String {
    let last = source.rsplit('/').next().unwrap_or(source);
    let (name, tag) = match last.split_once(':') {
        Some((name, tag)) if !tag.is_empty() => (name, tag),
        Some((name, _)) => (name, "latest"),
        None => (last, "latest"),
    };
    format!("{repository}/{name}:{tag}")
}

/// Lowercase hex SHA-256 of a file, read in chunks.
async fn sha256_file(path: &Path) -> Result<String, Error> {
    let mut file = tokio::fs::File::open(path)
        .await
        .context(ReadPackageSnafu { path })?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .await
            .context(ReadPackageSnafu { path })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

#[derive(Clone)]
pub struct Pipeline {
    work_dir: PathBuf,
    runtime: Arc<dyn ImageRuntime>,
    extractor: Arc<dyn Extractor>,
}

impl Pipeline {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        runtime: Arc<dyn ImageRuntime>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            runtime,
            extractor,
        }
    }

    /// Extraction directory for `archive`: its file name without the
    /// archive extension, under the work directory.
    pub fn target_dir(&self, archive: &Path) -> PathBuf {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = [".tar.gz", ".tgz", ".tar"]
            .iter()
            .find_map(|ext| name.strip_suffix(ext))
            .unwrap_or(name.as_str());
        self.work_dir.join(stem)
    }

    /// Verifies the archive and extracts it, unless a previous run already
    /// did.
    pub async fn extract(&self, archive: &Path, sha256: Option<&str>) -> Result<Extracted, Error> {
        let dir = self.target_dir(archive);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            let completed = tokio::fs::try_exists(dir.join(COMPLETED_MARKER))
                .await
                .unwrap_or(false);
            debug!(dir = %dir.display(), completed, "package already extracted");
            return Ok(Extracted { dir, completed });
        }

        if let Some(expected) = sha256.filter(|s| !s.is_empty()) {
            let actual = sha256_file(archive).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return ChecksumMismatchSnafu {
                    expected: expected.to_owned(),
                    actual,
                }
                .fail();
            }
        }

        // Extract beside the target and rename, so an interrupted run never
        // leaves a half-filled target behind.
        let mut staging = dir.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        if tokio::fs::try_exists(&staging).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&staging)
                .await
                .context(WorkDirSnafu { path: &staging })?;
        }
        tokio::fs::create_dir_all(&staging)
            .await
            .context(WorkDirSnafu { path: &staging })?;

        info!(archive = %archive.display(), dest = %dir.display(), "extracting package");
        self.extractor
            .extract(archive, &staging)
            .await
            .context(ExtractSnafu)?;
        tokio::fs::rename(&staging, &dir)
            .await
            .context(WorkDirSnafu { path: &dir })?;

        Ok(Extracted {
            dir,
            completed: false,
        })
    }

    /// Loads every image archive listed in the manifest, returning the
    /// loaded references in manifest order.
    pub async fn load(&self, dir: &Path) -> Result<Vec<String>, Error> {
        let path = dir.join(MANIFEST);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .context(ReadManifestSnafu { path: &path })?;
        let manifest: Manifest =
            serde_yaml_ng::from_str(&raw).context(ParseManifestSnafu { path: &path })?;

        let mut loaded = Vec::new();
        for entry in manifest.images.iter().filter(|e| e.is_image_archive()) {
            let images = self
                .runtime
                .load(&dir.join(&entry.file))
                .await
                .context(LoadSnafu { file: &entry.file })?;

            match &entry.image {
                Some(image) => {
                    let present = self
                        .runtime
                        .list(image)
                        .await
                        .context(LoadSnafu { file: &entry.file })?;
                    if present.is_empty() {
                        return MissingSnafu { image }.fail();
                    }
                    loaded.push(image.clone());
                }
                None => loaded.extend(images),
            }
        }

        info!(count = loaded.len(), "images loaded");
        Ok(loaded)
    }

    /// Retags and pushes `images` to `dest`, returning the pushed references.
    pub async fn push(&self, images: &[String], dest: &Destination) -> Result<Vec<String>, Error> {
        if !dest.username.is_empty() {
            self.runtime
                .login(&dest.domain, &dest.username, &dest.password)
                .await
                .context(LoginSnafu {
                    registry: &dest.domain,
                })?;
        }

        let mut pushed = Vec::with_capacity(images.len());
        for image in images {
            let target = retag(image, &dest.repository);
            self.runtime
                .tag(image, &target)
                .await
                .context(TagSnafu {
                    source_image: image,
                    target: &target,
                })?;
            self.runtime
                .push(&target)
                .await
                .context(PushSnafu { image: &target })?;
            debug!(%target, "image pushed");
            pushed.push(target);
        }
        Ok(pushed)
    }

    /// Marks the extraction as fully processed.
    pub async fn finish(&self, dir: &Path) -> Result<(), Error> {
        let marker = dir.join(COMPLETED_MARKER);
        tokio::fs::write(&marker, b"")
            .await
            .context(WorkDirSnafu { path: marker })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::{archive, runtime};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every call; `load` answers with the archive's file stem.
    #[derive(Default)]
    pub struct FakeRuntime {
        pub calls: Mutex<Vec<String>>,
        pub fail_push: bool,
    }

    impl FakeRuntime {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl runtime::ImageRuntime for FakeRuntime {
        async fn load(&self, archive: &Path) -> Result<Vec<String>, runtime::Error> {
            self.record(format!("load {}", archive.display()));
            let stem = archive.file_stem().unwrap().to_string_lossy();
            Ok(vec![format!("docker.io/library/{stem}:v1")])
        }

        async fn tag(&self, source: &str, target: &str) -> Result<(), runtime::Error> {
            self.record(format!("tag {source} {target}"));
            Ok(())
        }

        async fn login(
            &self,
            registry: &str,
            username: &str,
            _password: &str,
        ) -> Result<(), runtime::Error> {
            self.record(format!("login {registry} {username}"));
            Ok(())
        }

        async fn push(&self, image: &str) -> Result<(), runtime::Error> {
            self.record(format!("push {image}"));
            if self.fail_push {
                return Err(runtime::Error::Exit {
                    command: "docker push".to_string(),
                    code: 1,
                    stderr: "denied".to_string(),
                });
            }
            Ok(())
        }

        async fn list(&self, reference: &str) -> Result<Vec<String>, runtime::Error> {
            Ok(vec![reference.to_string()])
        }
    }

    /// Writes a manifest naming `images` instead of unpacking anything.
    #[derive(Default)]
    pub struct FakeExtractor {
        pub images: Vec<String>,
        pub runs: AtomicUsize,
    }

    impl FakeExtractor {
        pub fn with_images(images: &[&str]) -> Self {
            Self {
                images: images.iter().map(|s| s.to_string()).collect(),
                runs: AtomicUsize::new(0),
            }
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl archive::Extractor for FakeExtractor {
        async fn extract(&self, _archive: &Path, dest: &Path) -> Result<(), archive::Error> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let mut manifest = String::from("images:\n");
            for image in &self.images {
                manifest.push_str(&format!("  - file: {image}\n"));
            }
            tokio::fs::write(dest.join("manifest.yaml"), manifest)
                .await
                .unwrap();
            Ok(())
        }
    }
}
