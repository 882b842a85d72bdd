// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reference resolution.
//!
//! Some values cannot be known by looking at a service in isolation. The
//! host that other containers use to reach a download client depends on
//! whether a VPN tunnel is part of the selection: when it is, the client
//! joins the tunnel's network namespace, so it is reached through the
//! tunnel's container name instead of its own. This module resolves every
//! such cross-service reference and renders each service template against
//! the environment context.
//!
//! Every template is rendered twice. The literal form holds actual values for
//! the guide and the directory layout. The interpolated form is what the
//! compose file gets: values carried by the environment mapping become
//! `${KEY}` references to it, so editing `.env` takes effect, and any other
//! `$` is escaped so compose passes it through untouched.

use crate::{
    catalog::{Catalog, ServiceDescriptor, ServiceTemplate, ServiceVar},
    config::Category,
    context::EnvironmentContext,
    selection::SelectionSet,
    template::MissingValue,
};

use std::{borrow::Cow, collections::BTreeMap};
use tracing::{debug, instrument};

/// Environment mapping key of the user identifier.
pub const UID_KEY: &str = "PUID";

/// Environment mapping key of the group identifier.
pub const GID_KEY: &str = "PGID";

/// Environment mapping key of the timezone.
pub const TIMEZONE_KEY: &str = "TZ";

/// Environment mapping key of the docker directory.
pub const DOCKER_DIR_KEY: &str = "DOCKER_DIR";

/// Environment mapping key of the media directory.
pub const MEDIA_DIR_KEY: &str = "MEDIA_DIR";

/// Compose reference to environment mapping key.
pub fn reference(key: &str) -> String {
    format!("${{{key}}}")
}

/// Escape `$` so compose does not interpolate it.
pub fn escape(text: &str) -> Cow<'_, str> {
    if text.contains('$') {
        Cow::Owned(text.replace('$', "$$"))
    } else {
        Cow::Borrowed(text)
    }
}

/// How a container joins the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// Member of the shared bridge network.
    Bridge,

    /// Shares the network namespace of another service.
    Service(String),
}

/// Value computed from knowledge of the entire selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameter {
    /// Service that owns the parameter.
    pub service: String,

    /// Environment mapping key.
    pub key: String,

    pub value: String,
}

/// Environment and volumes as written to the compose file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpolated {
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<String>,
}

/// Service with every template rendered and every reference resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub image: String,
    pub port: Option<u16>,
    pub network: NetworkMode,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
    pub cap_add: Vec<String>,
    pub devices: Vec<String>,
    pub setup_url: Option<String>,
    pub setup_steps: Vec<String>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub interpolated: Interpolated,
}

impl ResolvedService {
    /// Check if service routes its traffic through another service.
    pub fn is_routed(&self) -> bool {
        matches!(self.network, NetworkMode::Service(_))
    }
}

/// Outcome of resolving a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    services: Vec<ResolvedService>,
    parameters: Vec<ResolvedParameter>,
    tunnel: Option<String>,
}

impl Resolution {
    /// Resolved services in catalog order.
    pub fn services(&self) -> &[ResolvedService] {
        self.services.as_slice()
    }

    /// Get resolved service by identifier.
    pub fn service(&self, id: &str) -> Option<&ResolvedService> {
        self.services.iter().find(|service| service.id == id)
    }

    /// Cross-service parameters in catalog order of their owners.
    pub fn parameters(&self) -> &[ResolvedParameter] {
        self.parameters.as_slice()
    }

    /// Identifier of tunnel service, if selected.
    pub fn tunnel(&self) -> Option<&str> {
        self.tunnel.as_deref()
    }
}

/// Resolve every reference of a validated selection.
///
/// Each download client gets a host parameter. When the selection contains
/// the tunnel, download clients share its network namespace, their published
/// ports move onto the tunnel, and their host parameter resolves to the
/// tunnel. Otherwise the host parameter resolves to the client itself. Media
/// managers receive every host parameter in their environment.
///
/// # Errors
///
/// - Return [`ResolveError::TunnelDisabled`] if the selection contains the
///   tunnel while VPN tunneling is disabled.
/// - Return [`ResolveError::TunnelMissing`] if VPN tunneling is enabled and
///   the selection has a download client, but no tunnel.
/// - Return [`ResolveError::MissingParameter`] if a template needs a value
///   the context does not have.
#[instrument(skip(catalog, selection, context), level = "debug")]
pub fn resolve(
    catalog: &Catalog,
    selection: &SelectionSet,
    context: &EnvironmentContext,
) -> Result<Resolution> {
    let tunnel = selection.tunnel(catalog);
    match (tunnel, context.vpn_enabled()) {
        (Some(tunnel), false) => {
            let requirer = selection
                .services(catalog)
                .find(|service| service.depends_on.contains(&tunnel.id))
                .map_or_else(|| tunnel.id.clone(), |service| service.id.clone());
            return Err(ResolveError::TunnelDisabled {
                service: requirer,
                tunnel: tunnel.id.clone(),
            });
        }
        (None, true) if selection.services(catalog).any(ServiceDescriptor::is_download_client) => {
            return Err(ResolveError::TunnelMissing)
        }
        _ => {}
    }

    let hosts = HostTable {
        catalog,
        selection,
        tunnel,
    };
    let mut services = Vec::with_capacity(selection.len());
    let mut parameters = Vec::new();
    let mut tunnel_ports = Vec::new();

    for descriptor in selection.services(catalog) {
        let mut service = resolve_service(descriptor, context, &hosts)?;

        if descriptor.is_download_client() {
            let parameter = ResolvedParameter {
                service: descriptor.id.clone(),
                key: descriptor.host_key(),
                value: hosts.host(&descriptor.id).into_owned(),
            };
            debug!("resolve {}={}", parameter.key, parameter.value);
            parameters.push(parameter);

            if let Some(tunnel) = tunnel {
                service.network = NetworkMode::Service(tunnel.id.clone());
                tunnel_ports.append(&mut service.ports);
                if !service.depends_on.contains(&tunnel.id) {
                    service.depends_on.insert(0, tunnel.id.clone());
                }
            }
        }

        services.push(service);
    }

    if let Some(tunnel) = tunnel {
        if let Some(service) = services.iter_mut().find(|service| service.id == tunnel.id) {
            service.ports.append(&mut tunnel_ports);
            if let Some(vpn) = context.vpn() {
                let environment = vpn.environment();
                service.interpolated.environment.extend(
                    environment
                        .iter()
                        .map(|(key, value)| (key.clone(), escape(value).into_owned())),
                );
                service.environment.extend(environment);
            }
        }
    }

    for service in services
        .iter_mut()
        .filter(|service| service.category == Category::MediaManager)
    {
        for parameter in &parameters {
            service.environment.insert(parameter.key.clone(), parameter.value.clone());
            service
                .interpolated
                .environment
                .insert(parameter.key.clone(), reference(&parameter.key));
        }
    }

    Ok(Resolution {
        services,
        parameters,
        tunnel: tunnel.map(|tunnel| tunnel.id.clone()),
    })
}

/// Host other containers reach a service through.
struct HostTable<'c> {
    catalog: &'c Catalog,
    selection: &'c SelectionSet,
    tunnel: Option<&'c ServiceDescriptor>,
}

impl<'c> HostTable<'c> {
    fn host<'a>(&self, id: &'a str) -> Cow<'a, str> {
        let routed = self
            .catalog
            .get(id)
            .is_some_and(ServiceDescriptor::is_download_client);

        match self.tunnel {
            Some(tunnel) if routed => Cow::Owned(tunnel.id.clone()),
            _ => Cow::Borrowed(id),
        }
    }

    /// Host in compose form.
    ///
    /// Only selected download clients have a host parameter to refer to.
    fn interpolated(&self, id: &str) -> String {
        match self.catalog.get(id) {
            Some(service) if service.is_download_client() && self.selection.contains(id) => {
                reference(&service.host_key())
            }
            _ => escape(&self.host(id)).into_owned(),
        }
    }
}

fn resolve_service(
    descriptor: &ServiceDescriptor,
    context: &EnvironmentContext,
    hosts: &HostTable<'_>,
) -> Result<ResolvedService> {
    let uid = context.uid().to_string();
    let gid = context.gid().to_string();
    let docker_dir = context.docker_dir().display().to_string();
    let media_dir = context.media_dir().display().to_string();
    let config_dir = context.config_dir(&descriptor.id).display().to_string();

    let render = |key: &str, template: &ServiceTemplate| -> Result<String> {
        template
            .render(|variable| match variable {
                ServiceVar::Uid => Some(Cow::Borrowed(uid.as_str())),
                ServiceVar::Gid => Some(Cow::Borrowed(gid.as_str())),
                ServiceVar::Timezone => Some(Cow::Borrowed(context.timezone())),
                ServiceVar::DockerDir => Some(Cow::Borrowed(docker_dir.as_str())),
                ServiceVar::MediaDir => Some(Cow::Borrowed(media_dir.as_str())),
                ServiceVar::ConfigDir => Some(Cow::Borrowed(config_dir.as_str())),
                ServiceVar::Service => Some(Cow::Borrowed(descriptor.id.as_str())),
                ServiceVar::HostIp => Some(Cow::Borrowed(context.host_ip())),
                ServiceVar::Secret => context.encryption_key().map(Cow::Borrowed),
                ServiceVar::Host(id) => Some(Cow::Owned(hosts.host(id).into_owned())),
            })
            .map_err(|missing| missing_parameter(descriptor, key, missing))
    };

    let interpolate = |key: &str, template: &ServiceTemplate| -> Result<String> {
        template
            .render_with(escape, |variable| match variable {
                ServiceVar::Uid => Some(Cow::Owned(reference(UID_KEY))),
                ServiceVar::Gid => Some(Cow::Owned(reference(GID_KEY))),
                ServiceVar::Timezone => Some(Cow::Owned(reference(TIMEZONE_KEY))),
                ServiceVar::DockerDir => Some(Cow::Owned(reference(DOCKER_DIR_KEY))),
                ServiceVar::MediaDir => Some(Cow::Owned(reference(MEDIA_DIR_KEY))),
                ServiceVar::ConfigDir => Some(Cow::Owned(format!(
                    "{}/{}",
                    reference(DOCKER_DIR_KEY),
                    escape(&descriptor.id)
                ))),
                ServiceVar::Service => Some(escape(&descriptor.id)),
                ServiceVar::HostIp => Some(escape(context.host_ip())),
                ServiceVar::Secret => context.encryption_key().map(escape),
                ServiceVar::Host(id) => Some(Cow::Owned(hosts.interpolated(id))),
            })
            .map_err(|missing| missing_parameter(descriptor, key, missing))
    };

    let mut environment = BTreeMap::new();
    let mut volumes = Vec::with_capacity(descriptor.volumes.len());
    let mut interpolated = Interpolated::default();
    for (key, template) in &descriptor.environment {
        environment.insert(key.clone(), render(key.as_str(), template)?);
        interpolated
            .environment
            .insert(key.clone(), interpolate(key.as_str(), template)?);
    }
    for template in &descriptor.volumes {
        volumes.push(render("volumes", template)?);
        interpolated.volumes.push(interpolate("volumes", template)?);
    }

    let setup_url = descriptor
        .setup_url
        .as_ref()
        .map(|template| render("setup_url", template))
        .transpose()?;
    let setup_steps = descriptor
        .setup_steps
        .iter()
        .map(|template| render("setup_steps", template))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedService {
        id: descriptor.id.clone(),
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        category: descriptor.category,
        image: descriptor.image.clone(),
        port: descriptor.port,
        network: NetworkMode::Bridge,
        ports: descriptor.ports.clone(),
        volumes,
        environment,
        depends_on: descriptor.depends_on.iter().cloned().collect(),
        cap_add: descriptor.cap_add.clone(),
        devices: descriptor.devices.clone(),
        setup_url,
        setup_steps,
        notes: descriptor.notes.clone(),
        warnings: descriptor.warnings.clone(),
        interpolated,
    })
}

fn missing_parameter(descriptor: &ServiceDescriptor, key: &str, missing: MissingValue) -> ResolveError {
    ResolveError::MissingParameter {
        service: descriptor.id.clone(),
        key: key.to_string(),
        placeholder: missing.placeholder,
    }
}

/// Reference resolution error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Selection contains tunnel, but VPN tunneling is disabled.
    #[error("service {service:?} requires {tunnel:?}, but vpn tunneling is disabled")]
    TunnelDisabled { service: String, tunnel: String },

    /// VPN tunneling is enabled, but download clients have no tunnel to
    /// route through.
    #[error("vpn tunneling is enabled, but no tunnel service is selected")]
    TunnelMissing,

    /// Template needs value the context does not have.
    #[error("service {service:?} cannot resolve {key}: no value for {{{placeholder}}}")]
    MissingParameter {
        service: String,
        key: String,
        placeholder: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VpnChoices;
    use pretty_assertions::assert_eq;

    fn context(vpn: bool) -> anyhow::Result<EnvironmentContext> {
        let mut builder = EnvironmentContext::builder()
            .uid(1000)
            .gid(1001)
            .docker_dir("/opt/docker")
            .media_dir("/srv/media")
            .timezone("Europe/Berlin")
            .host_ip("192.168.1.10");
        if vpn {
            builder = builder.vpn(VpnChoices {
                provider: "protonvpn".into(),
                protocol: Some("wireguard".into()),
                server_countries: Some("Switzerland".into()),
                firewall_subnet: None,
                credentials: [("WIREGUARD_PRIVATE_KEY".to_string(), "private".to_string())].into(),
            });
        }

        Ok(builder.build()?)
    }

    fn host_parameter<'r>(resolution: &'r Resolution, service: &str) -> Option<&'r str> {
        resolution
            .parameters()
            .iter()
            .find(|parameter| parameter.service == service)
            .map(|parameter| parameter.value.as_str())
    }

    #[test]
    fn download_client_resolves_to_itself_without_tunnel() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent", "radarr"], false)?;
        let resolution = resolve(&catalog, &selection, &context(false)?)?;

        assert_eq!(host_parameter(&resolution, "qbittorrent"), Some("qbittorrent"));
        assert_eq!(resolution.tunnel(), None);

        let client = resolution.service("qbittorrent").ok_or(anyhow::anyhow!("no client"))?;
        assert_eq!(client.network, NetworkMode::Bridge);
        assert_eq!(client.ports, vec!["8081:8081", "6881:6881", "6881:6881/udp"]);
        assert_eq!(
            client.volumes,
            vec!["/opt/docker/qbittorrent/config:/config", "/srv/media/downloads:/downloads"]
        );
        assert_eq!(client.environment.get("PGID").map(String::as_str), Some("1001"));

        let manager = resolution.service("radarr").ok_or(anyhow::anyhow!("no manager"))?;
        assert!(manager.setup_steps.iter().any(|step| step.contains("host `qbittorrent`")));
        assert_eq!(manager.setup_url.as_deref(), Some("http://192.168.1.10:7878"));

        Ok(())
    }

    #[test]
    fn download_client_routes_through_tunnel() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent", "nzbget", "radarr"], true)?;
        let resolution = resolve(&catalog, &selection, &context(true)?)?;

        assert_eq!(resolution.tunnel(), Some("gluetun"));
        for parameter in resolution.parameters() {
            assert_eq!(parameter.value, "gluetun");
        }
        assert_eq!(
            resolution.parameters().iter().map(|parameter| parameter.key.as_str()).collect::<Vec<_>>(),
            vec!["QBITTORRENT_HOST", "NZBGET_HOST"]
        );

        let client = resolution.service("qbittorrent").ok_or(anyhow::anyhow!("no client"))?;
        assert_eq!(client.network, NetworkMode::Service("gluetun".into()));
        assert_eq!(client.depends_on, vec!["gluetun"]);
        assert!(client.ports.is_empty());

        let tunnel = resolution.service("gluetun").ok_or(anyhow::anyhow!("no tunnel"))?;
        assert_eq!(
            tunnel.ports,
            vec![
                "8888:8888/tcp",
                "8388:8388/tcp",
                "8388:8388/udp",
                "8081:8081",
                "6881:6881",
                "6881:6881/udp",
                "6789:6789",
            ]
        );
        assert_eq!(tunnel.environment.get("VPN_SERVICE_PROVIDER").map(String::as_str), Some("protonvpn"));
        assert_eq!(tunnel.environment.get("SERVER_COUNTRIES").map(String::as_str), Some("Switzerland"));

        let manager = resolution.service("radarr").ok_or(anyhow::anyhow!("no manager"))?;
        assert!(manager.setup_steps.iter().any(|step| step.contains("host `gluetun`")));

        Ok(())
    }

    #[test]
    fn tunnel_container_ports_are_distinct() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent", "sabnzbd"], true)?;
        let resolution = resolve(&catalog, &selection, &context(true)?)?;

        let tunnel = resolution.service("gluetun").ok_or(anyhow::anyhow!("no tunnel"))?;
        let mut container_ports = tunnel
            .ports
            .iter()
            .map(|mapping| match mapping.split_once('/') {
                Some((ports, protocol)) => (ports, protocol),
                None => (mapping.as_str(), "tcp"),
            })
            .filter_map(|(ports, protocol)| ports.split_once(':').map(|(_, container)| (container, protocol)))
            .collect::<Vec<_>>();
        let published = container_ports.len();
        container_ports.sort_unstable();
        container_ports.dedup();

        assert_eq!(published, tunnel.ports.len());
        assert_eq!(container_ports.len(), published);
        assert_eq!(
            tunnel.ports.iter().filter(|mapping| mapping.ends_with(":8080")).count(),
            1
        );

        Ok(())
    }

    #[test]
    fn interpolated_form_refers_to_environment_mapping() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent", "radarr"], false)?;
        let resolution = resolve(&catalog, &selection, &context(false)?)?;

        let client = resolution.service("qbittorrent").ok_or(anyhow::anyhow!("no client"))?;
        assert_eq!(
            client.interpolated.volumes,
            vec!["${DOCKER_DIR}/qbittorrent/config:/config", "${MEDIA_DIR}/downloads:/downloads"]
        );
        assert_eq!(client.interpolated.environment.get("PUID").map(String::as_str), Some("${PUID}"));
        assert_eq!(client.interpolated.environment.get("WEBUI_PORT").map(String::as_str), Some("8081"));

        let manager = resolution.service("radarr").ok_or(anyhow::anyhow!("no manager"))?;
        assert_eq!(
            manager.environment.get("QBITTORRENT_HOST").map(String::as_str),
            Some("qbittorrent")
        );
        assert_eq!(
            manager.interpolated.environment.get("QBITTORRENT_HOST").map(String::as_str),
            Some("${QBITTORRENT_HOST}")
        );

        Ok(())
    }

    #[test]
    fn escape_literal_dollar() {
        assert!(matches!(escape("plain"), Cow::Borrowed("plain")));
        assert_eq!(escape("a$b${c}").as_ref(), "a$$b$${c}");
        assert_eq!(reference("PUID").as_str(), "${PUID}");
    }

    #[test]
    fn vpn_without_download_client_needs_no_tunnel() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["sonarr"], true)?;
        let resolution = resolve(&catalog, &selection, &context(true)?)?;

        assert_eq!(resolution.tunnel(), None);
        assert!(resolution.parameters().is_empty());

        Ok(())
    }

    #[test]
    fn missing_secret_names_service_and_key() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["homarr"], false)?;
        let result = resolve(&catalog, &selection, &context(false)?);

        assert_eq!(
            result,
            Err(ResolveError::MissingParameter {
                service: "homarr".into(),
                key: "SECRET_ENCRYPTION_KEY".into(),
                placeholder: "secret".into(),
            })
        );

        Ok(())
    }

    #[test]
    fn reject_tunnel_when_vpn_disabled() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent"], true)?;
        let result = resolve(&catalog, &selection, &context(false)?);

        assert_eq!(
            result,
            Err(ResolveError::TunnelDisabled {
                service: "gluetun".into(),
                tunnel: "gluetun".into(),
            })
        );

        Ok(())
    }

    #[test]
    fn reject_missing_tunnel_when_vpn_enabled() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent"], false)?;
        let result = resolve(&catalog, &selection, &context(true)?);
        assert_eq!(result, Err(ResolveError::TunnelMissing));

        Ok(())
    }
}
