// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::Category,
    context::EnvironmentContext,
    layout::MEDIA_SUBDIRS,
    resolve::{NetworkMode, ResolvedService, Resolution},
    template::{Template, Variable},
    vpn::VpnSettings,
};

use std::{
    borrow::Cow,
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult, Write},
    path::Path,
};

const HEADER: &str = include_str!("../../templates/guide-header.md");
const FOOTER: &str = include_str!("../../templates/guide-footer.md");
const GLUETUN_WIKI: &str = "https://github.com/qdm12/gluetun-wiki/tree/main/setup/providers";

/// Placeholders available to guide header and footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideVar {
    User,
    Uid,
    Gid,
    DockerDir,
    MediaDir,
    ComposeDir,
    Timezone,
    HostIp,
    ServiceTable,
    DirectoryTree,
}

impl Variable for GuideVar {
    fn parse(name: &str, argument: Option<&str>) -> Option<Self> {
        if argument.is_some() {
            return None;
        }

        let variable = match name {
            "user" => Self::User,
            "uid" => Self::Uid,
            "gid" => Self::Gid,
            "docker_dir" => Self::DockerDir,
            "media_dir" => Self::MediaDir,
            "compose_dir" => Self::ComposeDir,
            "timezone" => Self::Timezone,
            "host_ip" => Self::HostIp,
            "service_table" => Self::ServiceTable,
            "directory_tree" => Self::DirectoryTree,
            _ => return None,
        };

        Some(variable)
    }
}

impl Display for GuideVar {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::User => "user",
            Self::Uid => "uid",
            Self::Gid => "gid",
            Self::DockerDir => "docker_dir",
            Self::MediaDir => "media_dir",
            Self::ComposeDir => "compose_dir",
            Self::Timezone => "timezone",
            Self::HostIp => "host_ip",
            Self::ServiceTable => "service_table",
            Self::DirectoryTree => "directory_tree",
        })
    }
}

/// Render setup guide.
///
/// # Panics
///
/// - Will panic if a built-in guide template is malformed.
pub(super) fn render(resolution: &Resolution, context: &EnvironmentContext) -> String {
    let mut out = String::new();

    out.push_str(&fill(HEADER, resolution, context));
    out.push_str("## Service Configuration\n\n");
    out.push_str("Configure each service in the order shown below for best results.\n\n");
    for (number, service) in resolution.services().iter().enumerate() {
        write_service(&mut out, number + 1, service, context);
    }

    if let Some(tunnel) = resolution.tunnel() {
        write_vpn(&mut out, tunnel, resolution, context.vpn());
    }

    write_troubleshooting(&mut out, resolution, context);
    out.push_str(&fill(FOOTER, resolution, context));

    out
}

fn fill(template: &str, resolution: &Resolution, context: &EnvironmentContext) -> String {
    let template = Template::<GuideVar>::parse(template).expect("built-in guide template is valid");
    let user = match context.user_name() {
        Some(name) => name.to_string(),
        None => format!("uid {}", context.uid()),
    };

    template
        .render(|variable| {
            let value = match variable {
                GuideVar::User => Cow::Borrowed(user.as_str()),
                GuideVar::Uid => Cow::Owned(context.uid().to_string()),
                GuideVar::Gid => Cow::Owned(context.gid().to_string()),
                GuideVar::DockerDir => Cow::Owned(context.docker_dir().display().to_string()),
                GuideVar::MediaDir => Cow::Owned(context.media_dir().display().to_string()),
                GuideVar::ComposeDir => Cow::Owned(context.compose_dir().display().to_string()),
                GuideVar::Timezone => Cow::Borrowed(context.timezone()),
                GuideVar::HostIp => Cow::Borrowed(context.host_ip()),
                GuideVar::ServiceTable => Cow::Owned(service_table(resolution, context)),
                GuideVar::DirectoryTree => Cow::Owned(directory_tree(resolution, context)),
            };
            Some(value)
        })
        .expect("every guide placeholder has a value")
}

fn address(service: &ResolvedService, context: &EnvironmentContext) -> Option<String> {
    match (&service.setup_url, service.port) {
        (Some(url), _) => Some(url.clone()),
        (None, Some(port)) => Some(format!("http://{}:{port}", context.host_ip())),
        (None, None) => None,
    }
}

fn port(service: &ResolvedService) -> String {
    match (&service.network, service.port) {
        (NetworkMode::Service(owner), Some(port)) => format!("{port} (via {owner})"),
        (NetworkMode::Bridge, Some(port)) => port.to_string(),
        (_, None) => "none".into(),
    }
}

fn service_table(resolution: &Resolution, context: &EnvironmentContext) -> String {
    let mut out = String::from("| Service | Category | Address | Port |\n| --- | --- | --- | --- |");
    for service in resolution.services() {
        let address = address(service, context).unwrap_or_else(|| "no web interface".into());
        let _ = write!(
            out,
            "\n| {} | {} | {address} | {} |",
            service.name,
            service.category,
            port(service)
        );
    }

    out
}

fn directory_tree(resolution: &Resolution, context: &EnvironmentContext) -> String {
    let docker_dir = context.docker_dir();
    let compose_dir = context.compose_dir();
    let mut lines = vec![docker_dir.display().to_string()];

    let nested_compose = compose_dir.parent() == Some(docker_dir);
    if nested_compose {
        lines.push(entry(1, &file_name(compose_dir), "generated files"));
    }

    for service in resolution.services() {
        let config_dir = context.config_dir(&service.id);
        let mounted = service
            .volumes
            .iter()
            .filter_map(|volume| volume.split_once(':'))
            .any(|(host, _)| Path::new(host).starts_with(&config_dir));
        if mounted {
            lines.push(entry(1, &service.id, &format!("{} configuration", service.name)));
        }
    }

    if !nested_compose {
        lines.push(entry(0, &compose_dir.display().to_string(), "generated files"));
    }

    lines.push(context.media_dir().display().to_string());
    let mut seen = BTreeSet::new();
    for subdir in MEDIA_SUBDIRS {
        let mut prefix = String::new();
        for (depth, component) in subdir.split('/').enumerate() {
            prefix.push_str(component);
            prefix.push('/');
            if seen.insert(prefix.clone()) {
                lines.push(entry(depth + 1, component, ""));
            }
        }
    }

    lines.join("\n")
}

fn entry(depth: usize, name: &str, comment: &str) -> String {
    let name = format!("{}{name}/", "  ".repeat(depth));
    if comment.is_empty() {
        name
    } else {
        format!("{name:<24}{comment}")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    let _ = writeln!(out, "**{heading}:**\n");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
    out.push('\n');
}

fn write_service(out: &mut String, number: usize, service: &ResolvedService, context: &EnvironmentContext) {
    let _ = writeln!(out, "### {number}. {}\n", service.name);
    let _ = writeln!(out, "{}.\n", service.description);

    match address(service, context) {
        Some(address) => {
            let _ = writeln!(out, "- **Access URL:** {address}");
            let _ = writeln!(out, "- **Port:** {}\n", port(service));
        }
        None => out.push_str("- Runs in the background without a web interface.\n\n"),
    }

    if !service.setup_steps.is_empty() {
        out.push_str("**Setup Steps:**\n\n");
        for (step, text) in service.setup_steps.iter().enumerate() {
            let _ = writeln!(out, "{}. {text}", step + 1);
        }
        out.push('\n');
    }

    write_list(out, "Configuration Notes", &service.notes);
    write_list(out, "Important", &service.warnings);
    out.push_str("---\n\n");
}

fn write_vpn(out: &mut String, tunnel: &str, resolution: &Resolution, vpn: Option<&VpnSettings>) {
    out.push_str("## VPN Configuration\n\n");
    let _ = writeln!(out, "Download traffic is routed through the `{tunnel}` container.\n");

    let routed = resolution
        .services()
        .iter()
        .filter(|service| service.is_routed())
        .collect::<Vec<_>>();

    match vpn.and_then(|vpn| vpn.provider().map(|provider| (vpn, provider))) {
        Some((vpn, provider)) => {
            let _ = writeln!(out, "- **Provider:** {}", provider.name);
            let _ = writeln!(out, "- **Protocol:** {}", vpn.protocol().to_string().to_uppercase());
            if let Some(countries) = vpn.server_countries() {
                let _ = writeln!(out, "- **Server Countries:** {countries}");
            }
            let _ = writeln!(out, "- **Firewall Subnet:** {}", vpn.firewall_subnet());
            let _ = writeln!(out, "- **Credentials:** {}\n", provider.credentials_url(vpn.protocol()));
        }
        None => {
            let _ = writeln!(
                out,
                "The tunnel is left for manual configuration. Add the settings of your provider to the \
                 `{tunnel}` environment in docker-compose.yml, see {GLUETUN_WIKI}.\n"
            );
        }
    }

    if !routed.is_empty() {
        out.push_str("**Routed Services:**\n\n");
        for service in &routed {
            let _ = writeln!(
                out,
                "- {} is reached at `{tunnel}` by other containers, and its web interface is published on `{tunnel}`",
                service.name
            );
        }
        out.push('\n');
    }

    out.push_str("**Testing the Tunnel:**\n\n```bash\n");
    let _ = writeln!(out, "# Public address seen through the tunnel\ndocker exec {tunnel} wget -qO- ifconfig.me\n");
    let _ = writeln!(out, "# Tunnel logs\ndocker logs {tunnel}");
    out.push_str("```\n\n");
}

fn write_troubleshooting(out: &mut String, resolution: &Resolution, context: &EnvironmentContext) {
    let has = |category: Category| {
        resolution
            .services()
            .iter()
            .any(|service| service.category == category)
    };

    out.push_str("## Troubleshooting\n\n### Common Issues\n\n");
    out.push_str("**Cannot access web interfaces:**\n\n");
    out.push_str("1. Check containers are running: `docker compose ps`\n");
    out.push_str("2. Check firewall settings\n");
    let _ = writeln!(out, "3. Try the server address `{}` instead of localhost\n", context.host_ip());

    if !resolution.parameters().is_empty() {
        let hosts = resolution
            .parameters()
            .iter()
            .map(|parameter| {
                let name = resolution
                    .service(&parameter.service)
                    .map_or(parameter.service.as_str(), |service| service.name.as_str());
                format!("{name} is reached at host `{}` ({} in .env)", parameter.value, parameter.key)
            })
            .collect::<Vec<_>>();
        write_list(out, "Download Client Issues", &hosts);
    }

    if has(Category::MediaManager) {
        write_list(
            out,
            "*arr App Issues",
            &[
                "Use container names as hosts, never localhost".into(),
                "Check indexer connectivity under Settings > Indexers".into(),
            ],
        );
    }

    if let Some(tunnel) = resolution.tunnel() {
        write_list(
            out,
            "VPN Issues",
            &[
                format!("Check logs: `docker logs {tunnel}`"),
                "Verify credentials in docker-compose.yml".into(),
                format!("Test the connection: `docker exec {tunnel} wget -qO- ifconfig.me`"),
            ],
        );
    }

    out.push_str("### General Debugging\n\n");
    for (heading, command) in [
        ("Check container status", "docker compose ps"),
        ("View logs", "docker compose logs -f <service>"),
        ("Restart a service", "docker compose restart <service>"),
    ] {
        let _ = writeln!(out, "**{heading}:**\n\n```bash\n{command}\n```\n");
    }
}
