// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host detection.
//!
//! Best guesses for values a collector can offer as defaults. Nothing here
//! fails on a missing file or variable, it just falls back.

use nix::unistd::{getgid, getuid, User};
use std::{env, fs::read_to_string, path::Path};
use tracing::debug;
use uuid::Uuid;

/// Timezone used when nothing else can be detected.
pub const FALLBACK_TIMEZONE: &str = "UTC";

/// Host used when not connected over SSH.
pub const FALLBACK_HOST: &str = "localhost";

/// Identity of user running the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Detect system timezone.
///
/// Reads "/etc/timezone" first, then the `TZ` variable, and falls back to
/// [`FALLBACK_TIMEZONE`].
pub fn timezone() -> String {
    let from_file = read_to_string(Path::new("/etc/timezone")).ok();
    let timezone = choose_timezone(from_file.as_deref(), env::var("TZ").ok().as_deref());
    debug!("detected timezone {timezone:?}");
    timezone
}

fn choose_timezone(from_file: Option<&str>, from_env: Option<&str>) -> String {
    [from_file, from_env]
        .into_iter()
        .flatten()
        .map(str::trim)
        // INVARIANT: POSIX strings like ":Europe/Paris" drop the leading colon.
        .map(|zone| zone.trim_start_matches(':'))
        .find(|zone| !zone.is_empty())
        .unwrap_or(FALLBACK_TIMEZONE)
        .to_string()
}

/// Detect user running the process.
///
/// # Errors
///
/// - Return [`DetectError::UserLookup`] if the user database cannot be read.
/// - Return [`DetectError::UnknownUser`] if no entry matches the current uid.
pub fn current_user() -> Result<CurrentUser> {
    let uid = getuid();
    let user = User::from_uid(uid)?.ok_or(DetectError::UnknownUser { uid: uid.as_raw() })?;

    Ok(CurrentUser {
        name: user.name,
        uid: uid.as_raw(),
        gid: getgid().as_raw(),
    })
}

/// Detect address other machines use to reach this host.
///
/// Over SSH the server side address of `SSH_CONNECTION` is the one the
/// operator already reached us on. Otherwise [`FALLBACK_HOST`].
pub fn host_address() -> String {
    host_from_ssh(env::var("SSH_CONNECTION").ok().as_deref())
}

fn host_from_ssh(connection: Option<&str>) -> String {
    // INVARIANT: SSH_CONNECTION is "<client ip> <client port> <server ip> <server port>".
    connection
        .and_then(|value| value.split_whitespace().nth(2))
        .unwrap_or(FALLBACK_HOST)
        .to_string()
}

/// Generate random encryption key of 32 hex characters.
pub fn encryption_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Detection error types.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// User database cannot be read.
    #[error("failed to look up current user")]
    UserLookup(#[from] nix::errno::Errno),

    /// No user entry for uid.
    #[error("no user entry for uid {uid}")]
    UnknownUser { uid: u32 },
}

/// Friendly result alias :3
pub type Result<T, E = DetectError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MIN_KEY_LEN;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[test_case(Some("Europe/Berlin\n"), Some("Asia/Tokyo"), "Europe/Berlin"; "file wins")]
    #[test_case(Some("  \n"), Some(":America/Denver"), "America/Denver"; "blank file falls to env")]
    #[test_case(None, Some("Asia/Tokyo"), "Asia/Tokyo"; "env only")]
    #[test_case(None, None, "UTC"; "fallback")]
    #[test]
    fn choose_timezone_in_order(file: Option<&str>, env: Option<&str>, expect: &str) {
        pretty_assertions::assert_eq!(choose_timezone(file, env), expect);
    }

    #[test_case(Some("10.0.0.5 52144 192.168.1.20 22"), "192.168.1.20"; "server address")]
    #[test_case(Some("garbage"), "localhost"; "malformed")]
    #[test_case(None, "localhost"; "not over ssh")]
    #[test]
    fn host_from_ssh_connection(connection: Option<&str>, expect: &str) {
        pretty_assertions::assert_eq!(host_from_ssh(connection), expect);
    }

    #[sealed_test(env = [("SSH_CONNECTION", "10.0.0.5 52144 192.168.1.20 22")])]
    fn host_address_reads_ssh_connection() {
        assert_eq!(host_address(), "192.168.1.20");
    }

    #[test]
    fn encryption_key_is_long_enough() {
        let key = encryption_key();
        assert_eq!(key.len(), MIN_KEY_LEN);
        assert!(key.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(key, encryption_key());
    }
}
