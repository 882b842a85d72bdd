// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bundle rendering.
//!
//! A __bundle__ is the set of artifacts produced by one run:
//!
//! 1. A compose file describing every selected container.
//! 2. An environment file of flat key-value pairs operators can edit without
//!    touching the compose file.
//! 3. A setup guide walking through first time configuration of each service.
//!
//! Rendering is deterministic. Identical inputs give byte-identical artifacts,
//! and services always appear in catalog order. No validation happens here:
//! everything reaching the renderer was already checked upstream.

mod compose;
mod env;
mod guide;

use crate::{context::EnvironmentContext, resolve::Resolution};

use std::{
    fs::write,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// File name of compose file.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// File name of environment file.
pub const ENV_FILE: &str = ".env";

/// File name of setup guide.
pub const GUIDE_FILE: &str = "SETUP_GUIDE.md";

/// Name of compose project.
pub const PROJECT_NAME: &str = "mediaserver";

/// Name of shared bridge network.
pub const NETWORK_NAME: &str = "media-network";

/// Rendered artifacts of one run.
///
/// Never mutated after rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    compose: String,
    environment: Vec<(String, String)>,
    env_file: String,
    guide: String,
}

impl Bundle {
    /// Render bundle from resolved selection.
    ///
    /// # Panics
    ///
    /// - Will panic if the compose document cannot be serialized, or if a
    ///   built-in guide template is malformed. Both are programming errors.
    #[instrument(skip(resolution, context), level = "debug")]
    pub fn render(resolution: &Resolution, context: &EnvironmentContext) -> Self {
        let environment = env::environment(resolution, context);

        Self {
            compose: compose::render(resolution),
            env_file: env::render(&environment, context),
            environment,
            guide: guide::render(resolution, context),
        }
    }

    /// Compose file contents.
    pub fn compose(&self) -> &str {
        self.compose.as_str()
    }

    /// Flat environment mapping in file order.
    pub fn environment(&self) -> &[(String, String)] {
        self.environment.as_slice()
    }

    /// Environment file contents.
    pub fn env_file(&self) -> &str {
        self.env_file.as_str()
    }

    /// Setup guide contents.
    pub fn guide(&self) -> &str {
        self.guide.as_str()
    }

    /// Write every artifact into directory.
    ///
    /// Directory is created if absent. Files are written one after the
    /// other, so a failure leaves earlier files in place.
    ///
    /// # Errors
    ///
    /// - Return [`WriteError::CreateDir`] if directory cannot be created.
    /// - Return [`WriteError::WriteFile`] if a file cannot be written.
    #[instrument(skip(self, dir), level = "debug")]
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        mkdirp::mkdirp(dir).map_err(|err| WriteError::CreateDir {
            source: err,
            path: dir.to_path_buf(),
        })?;

        let mut written = Vec::with_capacity(3);
        for (name, contents) in [
            (COMPOSE_FILE, &self.compose),
            (ENV_FILE, &self.env_file),
            (GUIDE_FILE, &self.guide),
        ] {
            let path = dir.join(name);
            write(&path, contents).map_err(|err| WriteError::WriteFile {
                source: err,
                path: path.clone(),
            })?;
            info!("write {:?}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

/// Bundle writing error types.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Output directory cannot be created.
    #[error("failed to create output directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Artifact cannot be written.
    #[error("failed to write {:?}", path.display())]
    WriteFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = WriteError> = std::result::Result<T, E>;
