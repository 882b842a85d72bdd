// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration resolution engine.
//!
//! Drive one run from collected values to files on disk:
//!
//! 1. Build the environment context. Malformed values abort here, before the
//!    selection is even looked at.
//! 2. Validate the selection into a dependency-closed set.
//! 3. Resolve cross-service parameters.
//! 4. Render the bundle.
//! 5. Create the directory layout, then write the bundle.
//!
//! Every stage is pure except the last, so a failed run never leaves a half
//! rendered bundle behind. Files written before a write failure stay.

use crate::{
    catalog::{Catalog, CatalogError},
    collect::{CollectError, Collected, Collector},
    context::{ContextError, EnvironmentContext},
    layout::{DirectoryLayout, LayoutError},
    render::{Bundle, WriteError},
    resolve::{resolve, Resolution, ResolveError},
    selection::{Advisory, SelectionError, SelectionSet},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{debug, info, instrument};

/// Run configuration.
#[derive(Debug, Clone, Copy)]
pub struct Engine<'c> {
    catalog: &'c Catalog,
    create_directories: bool,
    dry_run: bool,
}

impl<'c> Engine<'c> {
    /// Construct engine over catalog.
    ///
    /// Creates directories and writes files unless told otherwise.
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            create_directories: true,
            dry_run: false,
        }
    }

    /// Toggle creation of the directory layout.
    pub fn create_directories(mut self, create: bool) -> Self {
        self.create_directories = create;
        self
    }

    /// Toggle dry run, rendering without touching the filesystem.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Collect values, then generate.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Collect`] if collector fails or is cancelled.
    /// - Return any error of [`Engine::generate`].
    pub fn run(&self, collector: &dyn Collector) -> Result<Outcome> {
        let collected = collector.collect(self.catalog)?;
        self.generate(collected)
    }

    /// Generate bundle from collected values.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Context`] if environment values are invalid.
    /// - Return [`EngineError::Selection`] if selection is invalid.
    /// - Return [`EngineError::Resolve`] if parameters cannot be resolved.
    /// - Return [`EngineError::Layout`] if a directory cannot be created.
    /// - Return [`EngineError::Write`] if the bundle cannot be written.
    #[instrument(skip(self, collected), level = "debug")]
    pub fn generate(&self, collected: Collected) -> Result<Outcome> {
        let Collected { services, context } = collected;

        // INVARIANT: Context is built before the selection is validated.
        let context = context.build()?;
        let prepared = self.prepare(&services, &context)?;

        if self.dry_run {
            info!("dry run, nothing written");
            return Ok(Outcome {
                context,
                prepared,
                created: Vec::new(),
                written: Vec::new(),
            });
        }

        let created = if self.create_directories {
            prepared.layout.create()?
        } else {
            debug!("skip directory creation");
            Vec::new()
        };
        let written = prepared.bundle.write(context.compose_dir())?;

        Ok(Outcome {
            context,
            prepared,
            created,
            written,
        })
    }

    /// Validate, resolve, and render without touching the filesystem.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Selection`] if selection is invalid.
    /// - Return [`EngineError::Resolve`] if parameters cannot be resolved.
    #[instrument(skip(self, requested, context), level = "debug")]
    pub fn prepare<I, S>(&self, requested: I, context: &EnvironmentContext) -> Result<Prepared>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selection = SelectionSet::validate(self.catalog, requested, context.vpn_enabled())?;
        let advisories = selection.advisories(self.catalog);
        let resolution = resolve(self.catalog, &selection, context)?;
        let bundle = Bundle::render(&resolution, context);
        let layout = DirectoryLayout::plan(context, &resolution);

        info!("prepared {} services", selection.len());

        Ok(Prepared {
            selection,
            advisories,
            resolution,
            bundle,
            layout,
        })
    }
}

/// Validated and rendered run, not yet written.
#[derive(Debug, Clone)]
pub struct Prepared {
    selection: SelectionSet,
    advisories: Vec<Advisory>,
    resolution: Resolution,
    bundle: Bundle,
    layout: DirectoryLayout,
}

impl Prepared {
    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Advisories raised by validation, never fatal.
    pub fn advisories(&self) -> &[Advisory] {
        self.advisories.as_slice()
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Context the run used.
    pub context: EnvironmentContext,

    /// Rendered run.
    pub prepared: Prepared,

    /// Directories that did not exist before.
    pub created: Vec<PathBuf>,

    /// Files written, in write order.
    pub written: Vec<PathBuf>,
}

/// Coarse classification of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Service identifier not in catalog.
    UnknownService,

    /// Nothing selected.
    EmptySelection,

    /// Two mutually exclusive services selected.
    ConflictingServices,

    /// Hard requirement of a service disabled elsewhere.
    UnsatisfiedDependency,

    /// Malformed identity, path, timezone, or VPN value.
    InvalidEnvironment,

    /// Catalog cannot be loaded.
    Catalog,

    /// Template needs a value the context lacks.
    MissingParameter,

    /// User cancelled.
    Cancelled,

    /// Filesystem or terminal failure.
    Io,
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::UnknownService => "unknown service",
            Self::EmptySelection => "empty selection",
            Self::ConflictingServices => "conflicting services",
            Self::UnsatisfiedDependency => "unsatisfied dependency",
            Self::InvalidEnvironment => "invalid environment",
            Self::Catalog => "catalog",
            Self::MissingParameter => "missing parameter",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        })
    }
}

/// Engine error types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl EngineError {
    /// Classify error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Catalog(CatalogError::UnknownService { .. }) => ErrorKind::UnknownService,
            Self::Catalog(_) => ErrorKind::Catalog,
            Self::Collect(CollectError::Cancelled) => ErrorKind::Cancelled,
            Self::Collect(CollectError::Answers(_)) => ErrorKind::InvalidEnvironment,
            Self::Collect(_) => ErrorKind::Io,
            Self::Context(_) => ErrorKind::InvalidEnvironment,
            Self::Selection(SelectionError::Empty) => ErrorKind::EmptySelection,
            Self::Selection(SelectionError::UnknownService { .. }) => ErrorKind::UnknownService,
            Self::Selection(SelectionError::ConflictingServices { .. }) => {
                ErrorKind::ConflictingServices
            }
            Self::Selection(
                SelectionError::UnsatisfiedDependency { .. } | SelectionError::TunnelWithoutVpn { .. },
            ) => ErrorKind::UnsatisfiedDependency,
            Self::Resolve(ResolveError::MissingParameter { .. }) => ErrorKind::MissingParameter,
            Self::Resolve(_) => ErrorKind::UnsatisfiedDependency,
            Self::Layout(_) | Self::Write(_) => ErrorKind::Io,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VpnChoices;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn collected(services: &[&str], uid: i64) -> Collected {
        Collected {
            services: services.iter().map(|id| id.to_string()).collect(),
            context: EnvironmentContext::builder()
                .uid(uid)
                .gid(1000)
                .docker_dir("/opt/docker")
                .media_dir("/srv/media")
                .timezone("UTC"),
        }
    }

    #[test_case(&["sonarr"], -1, ErrorKind::InvalidEnvironment; "bad uid wins over selection")]
    #[test_case(&["not-a-service"], -1, ErrorKind::InvalidEnvironment; "bad uid wins over unknown")]
    #[test_case(&["not-a-service"], 1000, ErrorKind::UnknownService; "unknown service")]
    #[test_case(&[], 1000, ErrorKind::EmptySelection; "empty")]
    #[test_case(&["jellyfin", "emby"], 1000, ErrorKind::ConflictingServices; "conflict")]
    #[test_case(&["gluetun"], 1000, ErrorKind::UnsatisfiedDependency; "tunnel without vpn")]
    #[test_case(&["homarr"], 1000, ErrorKind::MissingParameter; "no encryption key")]
    #[test]
    fn classify_failures(services: &[&str], uid: i64, expect: ErrorKind) -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let engine = Engine::new(&catalog).dry_run(true);
        let result = engine.generate(collected(services, uid));
        pretty_assertions::assert_eq!(result.err().map(|error| error.kind()), Some(expect));

        Ok(())
    }

    #[test]
    fn dry_run_writes_nothing() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let engine = Engine::new(&catalog).dry_run(true);
        let outcome = engine.generate(collected(&["jellyfin", "plex"], 1000))?;

        assert!(outcome.written.is_empty());
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.prepared.advisories().len(), 1);
        assert!(outcome.prepared.bundle().compose().contains("jellyfin:"));
        assert!(outcome.prepared.bundle().compose().contains("plex:"));

        Ok(())
    }

    #[test]
    fn prepare_routes_clients_through_tunnel() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let context = EnvironmentContext::builder()
            .uid(1000)
            .gid(1000)
            .docker_dir("/opt/docker")
            .media_dir("/srv/media")
            .timezone("UTC")
            .vpn(VpnChoices {
                provider: "custom".into(),
                ..Default::default()
            })
            .build()?;
        let prepared = Engine::new(&catalog).prepare(["qbittorrent"], &context)?;

        assert!(prepared.selection().contains("gluetun"));
        assert_eq!(prepared.resolution().tunnel(), Some("gluetun"));
        assert!(prepared
            .bundle()
            .environment()
            .contains(&("QBITTORRENT_HOST".to_string(), "gluetun".to_string())));

        Ok(())
    }
}
