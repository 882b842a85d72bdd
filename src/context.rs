// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment context.
//!
//! The __environment context__ holds the run-wide values every service
//! shares: the identity containers run as, base directories, timezone, and
//! VPN tunnel settings. It is built once per run through [`ContextBuilder`],
//! which rejects malformed values before anything downstream sees them.
//! Once built it is never mutated.

use crate::{
    config::VpnChoices,
    vpn::{VpnError, VpnSettings},
};

use std::path::{Path, PathBuf};

/// Address used in service URLs when none is given.
pub const DEFAULT_HOST: &str = "localhost";

/// Name of compose directory under docker directory.
pub const COMPOSE_DIR_NAME: &str = "compose";

/// Minimum length of encryption key.
pub const MIN_KEY_LEN: usize = 32;

/// Validated run-wide values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    user_name: Option<String>,
    uid: u32,
    gid: u32,
    docker_dir: PathBuf,
    media_dir: PathBuf,
    compose_dir: PathBuf,
    timezone: String,
    host_ip: String,
    vpn: Option<VpnSettings>,
    encryption_key: Option<String>,
}

impl EnvironmentContext {
    /// Start building a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn docker_dir(&self) -> &Path {
        self.docker_dir.as_path()
    }

    pub fn media_dir(&self) -> &Path {
        self.media_dir.as_path()
    }

    /// Directory that generated files are written to.
    pub fn compose_dir(&self) -> &Path {
        self.compose_dir.as_path()
    }

    /// Configuration directory of a service.
    pub fn config_dir(&self, service: &str) -> PathBuf {
        self.docker_dir.join(service)
    }

    pub fn timezone(&self) -> &str {
        self.timezone.as_str()
    }

    pub fn host_ip(&self) -> &str {
        self.host_ip.as_str()
    }

    /// VPN tunnel settings, `None` when tunneling is disabled.
    pub fn vpn(&self) -> Option<&VpnSettings> {
        self.vpn.as_ref()
    }

    pub fn vpn_enabled(&self) -> bool {
        self.vpn.is_some()
    }

    pub fn encryption_key(&self) -> Option<&str> {
        self.encryption_key.as_deref()
    }
}

/// Builder of [`EnvironmentContext`].
///
/// Identifiers are taken as signed integers so that invalid input can be
/// reported instead of silently wrapping.
#[derive(Debug, Default, Clone)]
pub struct ContextBuilder {
    user_name: Option<String>,
    uid: Option<i64>,
    gid: Option<i64>,
    docker_dir: Option<PathBuf>,
    media_dir: Option<PathBuf>,
    compose_dir: Option<PathBuf>,
    timezone: Option<String>,
    host_ip: Option<String>,
    vpn: Option<VpnChoices>,
    encryption_key: Option<String>,
}

impl ContextBuilder {
    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn uid(mut self, uid: i64) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn gid(mut self, gid: i64) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn docker_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.docker_dir = Some(path.into());
        self
    }

    pub fn media_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(path.into());
        self
    }

    /// Set output directory, defaults to "<docker_dir>/compose".
    pub fn compose_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.compose_dir = Some(path.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Set address used in URLs, defaults to [`DEFAULT_HOST`].
    pub fn host_ip(mut self, host: impl Into<String>) -> Self {
        self.host_ip = Some(host.into());
        self
    }

    /// Enable VPN tunneling with choices.
    pub fn vpn(mut self, choices: VpnChoices) -> Self {
        self.vpn = Some(choices);
        self
    }

    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Check if an encryption key was given.
    pub fn has_encryption_key(&self) -> bool {
        self.encryption_key.is_some()
    }

    /// Validate values and build context.
    ///
    /// # Errors
    ///
    /// - Return [`ContextError::Missing`] if a required value was never set.
    /// - Return [`ContextError::InvalidId`] if uid or gid is not positive or
    ///   does not fit a 32-bit identifier.
    /// - Return [`ContextError::RelativePath`] if a directory is not absolute.
    /// - Return [`ContextError::InvalidTimezone`] for a malformed timezone.
    /// - Return [`ContextError::InvalidHost`] for a malformed host address.
    /// - Return [`ContextError::InvalidUserName`] for a blank user name.
    /// - Return [`ContextError::InvalidEncryptionKey`] for a weak key.
    /// - Return [`ContextError::Vpn`] if VPN choices are invalid.
    pub fn build(self) -> Result<EnvironmentContext> {
        let uid = check_id("uid", self.uid.ok_or(ContextError::Missing { field: "uid" })?)?;
        let gid = check_id("gid", self.gid.ok_or(ContextError::Missing { field: "gid" })?)?;

        if let Some(name) = &self.user_name {
            if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ContextError::InvalidUserName { name: name.clone() });
            }
        }

        let docker_dir = check_dir(
            "docker directory",
            self.docker_dir.ok_or(ContextError::Missing {
                field: "docker directory",
            })?,
        )?;
        let media_dir = check_dir(
            "media directory",
            self.media_dir.ok_or(ContextError::Missing {
                field: "media directory",
            })?,
        )?;
        let compose_dir = match self.compose_dir {
            Some(path) => check_dir("compose directory", path)?,
            None => docker_dir.join(COMPOSE_DIR_NAME),
        };

        let timezone = self.timezone.ok_or(ContextError::Missing { field: "timezone" })?;
        if !is_valid_timezone(&timezone) {
            return Err(ContextError::InvalidTimezone { timezone });
        }

        let host_ip = self.host_ip.unwrap_or_else(|| DEFAULT_HOST.into());
        if host_ip.is_empty()
            || !host_ip
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | ':' | '[' | ']'))
        {
            return Err(ContextError::InvalidHost { host: host_ip });
        }

        if let Some(key) = &self.encryption_key {
            if key.len() < MIN_KEY_LEN || !key.chars().all(|ch| ch.is_ascii_alphanumeric()) {
                return Err(ContextError::InvalidEncryptionKey);
            }
        }

        let vpn = self.vpn.as_ref().map(VpnSettings::from_choices).transpose()?;

        Ok(EnvironmentContext {
            user_name: self.user_name,
            uid,
            gid,
            docker_dir,
            media_dir,
            compose_dir,
            timezone,
            host_ip,
            vpn,
            encryption_key: self.encryption_key,
        })
    }
}

fn check_id(field: &'static str, value: i64) -> Result<u32> {
    match u32::try_from(value) {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ContextError::InvalidId { field, value }),
    }
}

fn check_dir(field: &'static str, path: PathBuf) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(ContextError::RelativePath { field, path });
    }

    Ok(path)
}

/// Check timezone is "UTC"-like or written as "Area/Location".
fn is_valid_timezone(timezone: &str) -> bool {
    !timezone.is_empty()
        && timezone.split('/').all(|part| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '+'))
        })
}

/// Environment context error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Required value never set.
    #[error("missing {field}")]
    Missing { field: &'static str },

    /// Identifier is not positive or out of range.
    #[error("invalid {field} {value}, expected a positive 32-bit identifier")]
    InvalidId { field: &'static str, value: i64 },

    /// Directory is not absolute.
    #[error("{field} {:?} must be an absolute path", path.display())]
    RelativePath { field: &'static str, path: PathBuf },

    /// Timezone is malformed.
    #[error("invalid timezone {timezone:?}, expected a name like Europe/Berlin or UTC")]
    InvalidTimezone { timezone: String },

    /// Host address is malformed.
    #[error("invalid host address {host:?}")]
    InvalidHost { host: String },

    /// User name is blank or has whitespace.
    #[error("invalid user name {name:?}")]
    InvalidUserName { name: String },

    /// Encryption key is too short or not alphanumeric.
    #[error("encryption key must be at least {MIN_KEY_LEN} alphanumeric characters")]
    InvalidEncryptionKey,

    /// VPN choices are invalid.
    #[error(transparent)]
    Vpn(#[from] VpnError),
}

/// Friendly result alias :3
pub type Result<T, E = ContextError> = std::result::Result<T, E>;
