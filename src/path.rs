// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where automatorr looks for files the user may keep around
//! between runs.

use std::path::PathBuf;

/// Determine default absolute path to a user catalog.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/automatorr/catalog.toml`.
/// Does not check if the path returned actually exists. When it does, it
/// replaces the built-in catalog.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_catalog_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("automatorr").join("catalog.toml"))
        .ok_or(NoConfigDir)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;
