// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::PROJECT_NAME;
use crate::{
    context::EnvironmentContext,
    resolve::{Resolution, DOCKER_DIR_KEY, GID_KEY, MEDIA_DIR_KEY, TIMEZONE_KEY, UID_KEY},
    vpn::DEFAULT_SUBNET,
};

use std::{borrow::Cow, fmt::Write};

/// Build flat environment mapping.
///
/// Base values come first, followed by the host parameter of every download
/// client in catalog order. The compose file refers to each of them as
/// `${KEY}`.
pub(super) fn environment(
    resolution: &Resolution,
    context: &EnvironmentContext,
) -> Vec<(String, String)> {
    let mut environment = vec![
        ("COMPOSE_PROJECT_NAME".to_string(), PROJECT_NAME.to_string()),
        (UID_KEY.into(), context.uid().to_string()),
        (GID_KEY.into(), context.gid().to_string()),
        (TIMEZONE_KEY.into(), context.timezone().to_string()),
        (DOCKER_DIR_KEY.into(), context.docker_dir().display().to_string()),
        (MEDIA_DIR_KEY.into(), context.media_dir().display().to_string()),
    ];

    environment.extend(
        resolution
            .parameters()
            .iter()
            .map(|parameter| (parameter.key.clone(), parameter.value.clone())),
    );

    environment
}

/// Render environment file.
pub(super) fn render(environment: &[(String, String)], context: &EnvironmentContext) -> String {
    let mut out = String::from("# Environment variables for docker compose, generated by automatorr.\n");
    for (key, value) in environment {
        let _ = writeln!(out, "{key}={}", quote(value));
    }

    let subnet = context
        .vpn()
        .map_or(DEFAULT_SUBNET, |vpn| vpn.firewall_subnet());
    let _ = write!(
        out,
        "\n# Uncomment and modify these if needed:\n# DOCKER_SUBNET={subnet}\n# PLEX_CLAIM=claim-xxxxxxxxxx\n"
    );

    out
}

/// Single quote value containing `$`, which compose would interpolate
/// otherwise.
fn quote(value: &str) -> Cow<'_, str> {
    if value.contains('$') {
        Cow::Owned(format!("'{value}'"))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Catalog, config::VpnChoices, resolve::resolve, selection::SelectionSet};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_env_file_with_tunnel() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let context = EnvironmentContext::builder()
            .uid(1000)
            .gid(100)
            .docker_dir("/opt/docker")
            .media_dir("/srv/media")
            .timezone("Europe/London")
            .vpn(VpnChoices {
                provider: "custom".into(),
                firewall_subnet: Some("172.18.0.0/16".into()),
                ..Default::default()
            })
            .build()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent", "sabnzbd"], true)?;
        let resolution = resolve(&catalog, &selection, &context)?;

        let result = render(&environment(&resolution, &context), &context);
        let expect = indoc! {"
            # Environment variables for docker compose, generated by automatorr.
            COMPOSE_PROJECT_NAME=mediaserver
            PUID=1000
            PGID=100
            TZ=Europe/London
            DOCKER_DIR=/opt/docker
            MEDIA_DIR=/srv/media
            QBITTORRENT_HOST=gluetun
            SABNZBD_HOST=gluetun

            # Uncomment and modify these if needed:
            # DOCKER_SUBNET=172.18.0.0/16
            # PLEX_CLAIM=claim-xxxxxxxxxx
        "};
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn quote_values_compose_would_interpolate() -> anyhow::Result<()> {
        let context = EnvironmentContext::builder()
            .uid(1000)
            .gid(1000)
            .docker_dir("/opt/$docker")
            .media_dir("/srv/media")
            .timezone("UTC")
            .build()?;
        let environment = vec![
            (DOCKER_DIR_KEY.to_string(), "/opt/$docker".to_string()),
            (MEDIA_DIR_KEY.to_string(), "/srv/media".to_string()),
        ];

        let result = render(&environment, &context);
        assert!(result.contains("\nDOCKER_DIR='/opt/$docker'\n"));
        assert!(result.contains("\nMEDIA_DIR=/srv/media\n"));

        Ok(())
    }

    #[test]
    fn host_parameter_names_client_without_tunnel() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let context = EnvironmentContext::builder()
            .uid(1000)
            .gid(1000)
            .docker_dir("/opt/docker")
            .media_dir("/srv/media")
            .timezone("UTC")
            .build()?;
        let selection = SelectionSet::validate(&catalog, ["nzbget"], false)?;
        let resolution = resolve(&catalog, &selection, &context)?;
        let environment = environment(&resolution, &context);

        assert_eq!(
            environment.last(),
            Some(&("NZBGET_HOST".to_string(), "nzbget".to_string()))
        );

        Ok(())
    }
}
