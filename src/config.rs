// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that automatorr uses to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.
//!
//! There are two configuration files:
//!
//! 1. The __catalog definition__, listing every service automatorr knows how
//!    to deploy. A built-in catalog ships with the binary.
//! 2. The __answers file__, recording the choices that the interactive setup
//!    would otherwise prompt for. It allows unattended runs.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Catalog definition layout.
///
/// A catalog definition is a flat listing of service definitions. The order
/// of the listing is significant: it is the order every generated artifact
/// presents services in.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct CatalogDefinition {
    /// Service listing in declaration order.
    #[serde(rename = "service", default)]
    pub services: Vec<ServiceDefinition>,
}

impl FromStr for CatalogDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

/// Service definition layout.
///
/// Fields holding templates are kept as raw text here. They are parsed when
/// the catalog is loaded.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ServiceDefinition {
    /// Unique identifier, also used as container name.
    pub id: String,

    /// Human readable name.
    pub name: String,

    /// One sentence description.
    pub description: String,

    /// Category of service.
    pub category: Category,

    /// Image reference.
    pub image: String,

    /// Port of the web interface, if any.
    pub port: Option<u16>,

    /// Port mappings as "host:container[/protocol]".
    #[serde(default)]
    pub ports: Vec<String>,

    /// Volume mount templates as "host:container".
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Environment variable keys with default value templates.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Identifiers of services this service needs to function.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Identifiers of services this service cannot coexist with.
    #[serde(default)]
    pub conflicts_with: Vec<String>,

    /// Extra container capabilities.
    #[serde(default)]
    pub cap_add: Vec<String>,

    /// Device mappings.
    #[serde(default)]
    pub devices: Vec<String>,

    /// Template of URL to open for first time setup.
    pub setup_url: Option<String>,

    /// Templates of first time setup steps.
    #[serde(default)]
    pub setup_steps: Vec<String>,

    /// Configuration notes shown in the setup guide.
    #[serde(default)]
    pub notes: Vec<String>,

    /// Warnings shown in the setup guide.
    #[serde(default)]
    pub warnings: Vec<String>,

    /// Recommended pick of its category.
    #[serde(default)]
    pub recommended: bool,

    /// Include service in every bundle.
    #[serde(default)]
    pub always: bool,
}

/// Category of a service.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Tunnel that other containers route their traffic through.
    Vpn,

    /// Torrent and usenet clients.
    DownloadClient,

    /// Indexer managers and proxies.
    Indexer,

    /// Library managers that grab content, i.e., the *arr apps.
    MediaManager,

    /// Media servers and players.
    MediaServer,

    /// Helpers that support other services.
    #[default]
    Companion,

    /// Dashboards.
    Dashboard,
}

impl Category {
    /// Heading used when presenting services by category.
    pub fn heading(self) -> &'static str {
        match self {
            Self::Vpn => "VPN",
            Self::DownloadClient => "Download Clients",
            Self::Indexer => "Indexers",
            Self::MediaManager => "Media Managers",
            Self::MediaServer => "Media Servers",
            Self::Companion => "Companions",
            Self::Dashboard => "Dashboards",
        }
    }

    /// One line of guidance shown when choosing services of this category.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Vpn => "Routes download traffic through a VPN provider.",
            Self::DownloadClient => "Clients that download content. qBittorrent is recommended.",
            Self::Indexer => "Tools to find content. Choose Prowlarr (recommended) or Jackett.",
            Self::MediaManager => "Automatically grab and organize movies, shows, music and comics.",
            Self::MediaServer => "Stream your library. One is usually enough.",
            Self::Companion => "Helpers for subtitles, requests, statistics and captchas.",
            Self::Dashboard => "A start page linking all of your services.",
        }
    }
}

impl Display for Category {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Vpn => "vpn",
            Self::DownloadClient => "download-client",
            Self::Indexer => "indexer",
            Self::MediaManager => "media-manager",
            Self::MediaServer => "media-server",
            Self::Companion => "companion",
            Self::Dashboard => "dashboard",
        })
    }
}

/// Answers file layout.
///
/// Records every choice of a setup run so it can be repeated without
/// prompts. Directory paths are shell expanded on parse.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SetupAnswers {
    /// Identifiers of requested services.
    pub services: Vec<String>,

    /// Identity containers run as.
    pub user: UserAnswers,

    /// Base directories.
    pub directories: DirectoryAnswers,

    /// System values, detected when absent.
    #[serde(default)]
    pub system: SystemAnswers,

    /// VPN tunnel choices, absent when VPN tunneling is disabled.
    pub vpn: Option<VpnChoices>,
}

impl FromStr for SetupAnswers {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut answers: SetupAnswers =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every directory field.
        answers.directories.docker = expand_path(&answers.directories.docker)?;
        answers.directories.media = expand_path(&answers.directories.media)?;
        if let Some(compose) = &answers.directories.compose {
            answers.directories.compose = Some(expand_path(compose)?);
        }

        Ok(answers)
    }
}

impl Display for SetupAnswers {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Identity answers.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct UserAnswers {
    /// User name, only used for display.
    pub name: Option<String>,

    /// User identifier.
    pub uid: i64,

    /// Group identifier.
    pub gid: i64,
}

/// Directory answers.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DirectoryAnswers {
    /// Base directory of container configuration.
    pub docker: PathBuf,

    /// Base directory of media files.
    pub media: PathBuf,

    /// Output directory of generated files, defaults to "<docker>/compose".
    pub compose: Option<PathBuf>,
}

/// System answers.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SystemAnswers {
    /// Timezone in "Area/Location" form.
    pub timezone: Option<String>,

    /// Address used in service URLs.
    pub host_ip: Option<String>,

    /// Secret key for services that encrypt their data.
    pub encryption_key: Option<String>,
}

/// VPN tunnel choices.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct VpnChoices {
    /// Provider key, or "custom" for manual configuration.
    pub provider: String,

    /// Protocol, defaults to the provider's preferred protocol.
    pub protocol: Option<String>,

    /// Comma separated list of server countries.
    pub server_countries: Option<String>,

    /// Docker subnet the firewall must allow outbound traffic to.
    pub firewall_subnet: Option<String>,

    /// Credential fields by name.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

/// Perform shell expansion on path.
pub(crate) fn expand_path(path: &std::path::Path) -> Result<PathBuf, ConfigError> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}
