// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory layout.
//!
//! Plan the directory tree a bundle expects to exist, then create it. The
//! plan is plain data so it can be shown to the user or inspected in tests
//! without touching the filesystem.

use crate::{context::EnvironmentContext, resolve::Resolution};

use nix::unistd::{chown, Gid, Uid};
use std::{
    fs::metadata,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Media subdirectories, fixed by convention.
pub const MEDIA_SUBDIRS: [&str; 9] = [
    "downloads/incomplete",
    "downloads/complete",
    "movies",
    "tv",
    "music",
    "books",
    "comics",
    "podcasts",
    "audiobooks",
];

/// Planned directory tree of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    directories: Vec<PathBuf>,
    uid: u32,
    gid: u32,
}

impl DirectoryLayout {
    /// Plan directories for resolved selection.
    ///
    /// Directories come in a fixed order: docker directory, media directory,
    /// compose directory, media subdirectories, then the host side of every
    /// volume mount that lives under the docker directory.
    pub fn plan(context: &EnvironmentContext, resolution: &Resolution) -> Self {
        let docker_dir = context.docker_dir();
        let media_dir = context.media_dir();

        let mut directories = vec![
            docker_dir.to_path_buf(),
            media_dir.to_path_buf(),
            context.compose_dir().to_path_buf(),
        ];
        directories.extend(MEDIA_SUBDIRS.iter().map(|subdir| media_dir.join(subdir)));

        let mounts = resolution
            .services()
            .iter()
            .flat_map(|service| service.volumes.iter())
            .filter_map(|volume| volume.split_once(':').map(|(host, _)| PathBuf::from(host)))
            .filter(|host| host.starts_with(docker_dir));

        for mount in mounts {
            if !directories.contains(&mount) {
                directories.push(mount);
            }
        }

        Self {
            directories,
            uid: context.uid(),
            gid: context.gid(),
        }
    }

    /// Planned directories in order.
    pub fn directories(&self) -> &[PathBuf] {
        self.directories.as_slice()
    }

    /// Create every missing directory, then hand ownership to the configured
    /// user.
    ///
    /// Ownership is best-effort. Failing to change it is logged as a warning,
    /// since the bundle is still usable by adjusting ownership by hand.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError::Create`] if a directory cannot be created.
    #[instrument(skip(self), level = "debug")]
    pub fn create(&self) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for directory in &self.directories {
            if directory.is_dir() {
                debug!("directory {:?} already exists", directory.display());
                continue;
            }

            mkdirp::mkdirp(directory).map_err(|err| LayoutError::Create {
                source: err,
                path: directory.clone(),
            })?;
            info!("create {:?}", directory.display());
            created.push(directory.clone());
        }

        self.apply_ownership();

        Ok(created)
    }

    fn apply_ownership(&self) {
        for directory in &self.directories {
            if self.is_owned(directory) {
                continue;
            }

            if let Err(errno) = chown(
                directory.as_path(),
                Some(Uid::from_raw(self.uid)),
                Some(Gid::from_raw(self.gid)),
            ) {
                warn!(
                    "cannot hand {:?} to {}:{}: {errno}",
                    directory.display(),
                    self.uid,
                    self.gid
                );
                warn!(
                    "fix ownership by hand with `sudo chown -R {}:{} <directory>`",
                    self.uid, self.gid
                );
                return;
            }
        }
    }

    fn is_owned(&self, path: &Path) -> bool {
        metadata(path).is_ok_and(|meta| meta.uid() == self.uid && meta.gid() == self.gid)
    }
}

/// Directory layout error types.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    Create {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = LayoutError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Catalog, resolve::resolve, selection::SelectionSet};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn context(root: &Path) -> anyhow::Result<EnvironmentContext> {
        Ok(EnvironmentContext::builder()
            .uid(i64::from(nix::unistd::getuid().as_raw()).max(1))
            .gid(i64::from(nix::unistd::getgid().as_raw()).max(1))
            .docker_dir(root.join("docker"))
            .media_dir(root.join("media"))
            .timezone("UTC")
            .build()?)
    }

    #[test]
    fn plan_directories_in_order() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let context = context(Path::new("/data"))?;
        let selection = SelectionSet::validate(&catalog, ["audiobookshelf"], false)?;
        let resolution = resolve(&catalog, &selection, &context)?;
        let layout = DirectoryLayout::plan(&context, &resolution);

        let expect: Vec<PathBuf> = [
            "/data/docker",
            "/data/media",
            "/data/docker/compose",
            "/data/media/downloads/incomplete",
            "/data/media/downloads/complete",
            "/data/media/movies",
            "/data/media/tv",
            "/data/media/music",
            "/data/media/books",
            "/data/media/comics",
            "/data/media/podcasts",
            "/data/media/audiobooks",
            "/data/docker/audiobookshelf/config",
            "/data/docker/audiobookshelf/metadata",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(layout.directories(), expect.as_slice());

        Ok(())
    }

    #[sealed_test]
    fn create_is_idempotent() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let context = context(&std::env::current_dir()?)?;
        let selection = SelectionSet::validate(&catalog, ["radarr", "homarr"], false)?;
        let context = EnvironmentContext::builder()
            .uid(i64::from(context.uid()))
            .gid(i64::from(context.gid()))
            .docker_dir(context.docker_dir())
            .media_dir(context.media_dir())
            .timezone("UTC")
            .encryption_key("0123456789abcdef0123456789abcdef")
            .build()?;
        let resolution = resolve(&catalog, &selection, &context)?;
        let layout = DirectoryLayout::plan(&context, &resolution);

        let created = layout.create()?;
        assert_eq!(created.len(), layout.directories().len());
        for directory in layout.directories() {
            assert!(directory.is_dir());
        }
        assert!(!layout
            .directories()
            .iter()
            .any(|directory| directory.ends_with("docker.sock")));

        assert!(layout.create()?.is_empty());

        Ok(())
    }
}
