// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Service catalog.
//!
//! The __catalog__ is the static registry of every service automatorr can
//! deploy. It is loaded once at process start and is read-only afterwards.
//!
//! # Catalog Order
//!
//! The order in which services are declared is significant. Every generated
//! artifact lists services in catalog order, which keeps output stable across
//! runs no matter what order the user picked services in.
//!
//! # Load-Time Validation
//!
//! A catalog is validated as a whole when loaded. Identifiers must be unique,
//! dependencies and conflicts must name known services, templates must only
//! use known placeholders, at most one service may act as the VPN tunnel, and
//! two services publishing the same host port must declare a conflict.
//! Download clients share the network namespace of the tunnel, so they and
//! the tunnel must listen on distinct container ports unless they conflict.
//! Thus, the rest of automatorr can treat the catalog as trustworthy data.

use crate::{
    config::{CatalogDefinition, Category, ConfigError, ServiceDefinition},
    template::{Template, TemplateError, Variable},
};

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Built-in catalog definition.
pub const BUILTIN_CATALOG: &str = include_str!("../templates/catalog.toml");

/// Placeholders available to service templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceVar {
    /// `{uid}`: user identifier.
    Uid,

    /// `{gid}`: group identifier.
    Gid,

    /// `{timezone}`: timezone.
    Timezone,

    /// `{docker_dir}`: base directory of container configuration.
    DockerDir,

    /// `{media_dir}`: base directory of media files.
    MediaDir,

    /// `{config_dir}`: configuration directory of the service itself.
    ConfigDir,

    /// `{service}`: identifier of the service itself.
    Service,

    /// `{host_ip}`: address used in URLs.
    HostIp,

    /// `{secret}`: encryption key.
    Secret,

    /// `{host:<id>}`: host other containers reach service `<id>` through.
    Host(String),
}

impl Variable for ServiceVar {
    fn parse(name: &str, argument: Option<&str>) -> Option<Self> {
        let variable = match (name, argument) {
            ("uid", None) => Self::Uid,
            ("gid", None) => Self::Gid,
            ("timezone", None) => Self::Timezone,
            ("docker_dir", None) => Self::DockerDir,
            ("media_dir", None) => Self::MediaDir,
            ("config_dir", None) => Self::ConfigDir,
            ("service", None) => Self::Service,
            ("host_ip", None) => Self::HostIp,
            ("secret", None) => Self::Secret,
            ("host", Some(id)) if !id.is_empty() => Self::Host(id.to_string()),
            _ => return None,
        };

        Some(variable)
    }
}

impl Display for ServiceVar {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Uid => fmt.write_str("uid"),
            Self::Gid => fmt.write_str("gid"),
            Self::Timezone => fmt.write_str("timezone"),
            Self::DockerDir => fmt.write_str("docker_dir"),
            Self::MediaDir => fmt.write_str("media_dir"),
            Self::ConfigDir => fmt.write_str("config_dir"),
            Self::Service => fmt.write_str("service"),
            Self::HostIp => fmt.write_str("host_ip"),
            Self::Secret => fmt.write_str("secret"),
            Self::Host(id) => write!(fmt, "host:{id}"),
        }
    }
}

/// Template over service placeholders.
pub type ServiceTemplate = Template<ServiceVar>;

/// Description of a deployable service.
///
/// Immutable once its catalog is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub image: String,
    pub port: Option<u16>,
    pub ports: Vec<String>,
    pub volumes: Vec<ServiceTemplate>,
    pub environment: BTreeMap<String, ServiceTemplate>,
    pub depends_on: BTreeSet<String>,
    pub conflicts_with: BTreeSet<String>,
    pub cap_add: Vec<String>,
    pub devices: Vec<String>,
    pub setup_url: Option<ServiceTemplate>,
    pub setup_steps: Vec<ServiceTemplate>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub recommended: bool,
    pub always: bool,
}

impl ServiceDescriptor {
    /// Check if service is a download client.
    pub fn is_download_client(&self) -> bool {
        self.category == Category::DownloadClient
    }

    /// Check if service is a VPN tunnel.
    pub fn is_tunnel(&self) -> bool {
        self.category == Category::Vpn
    }

    /// Check if either service declares a conflict with the other.
    pub fn conflicts(&self, other: &ServiceDescriptor) -> bool {
        self.conflicts_with.contains(&other.id) || other.conflicts_with.contains(&self.id)
    }

    /// Environment mapping key exporting the host of this service.
    pub fn host_key(&self) -> String {
        format!("{}_HOST", self.id.to_uppercase().replace('-', "_"))
    }

    /// Check if any template of service needs the encryption key.
    pub fn needs_secret(&self) -> bool {
        self.templates()
            .any(|template| template.variables().any(|variable| *variable == ServiceVar::Secret))
    }

    fn templates(&self) -> impl Iterator<Item = &ServiceTemplate> {
        self.volumes
            .iter()
            .chain(self.environment.values())
            .chain(self.setup_url.iter())
            .chain(self.setup_steps.iter())
    }

    fn try_from_definition(definition: ServiceDefinition) -> Result<Self> {
        let id = definition.id;
        let parse = |text: String| {
            ServiceTemplate::parse(text).map_err(|source| CatalogError::Template {
                service: id.clone(),
                source,
            })
        };

        let volumes = definition
            .volumes
            .into_iter()
            .map(parse)
            .collect::<Result<Vec<_>>>()?;
        let environment = definition
            .environment
            .into_iter()
            .map(|(key, value)| parse(value).map(|template| (key, template)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let setup_url = definition.setup_url.map(parse).transpose()?;
        let setup_steps = definition
            .setup_steps
            .into_iter()
            .map(parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            name: definition.name,
            description: definition.description,
            category: definition.category,
            image: definition.image,
            port: definition.port,
            ports: definition.ports,
            volumes,
            environment,
            depends_on: definition.depends_on.into_iter().collect(),
            conflicts_with: definition.conflicts_with.into_iter().collect(),
            cap_add: definition.cap_add,
            devices: definition.devices,
            setup_url,
            setup_steps,
            notes: definition.notes,
            warnings: definition.warnings,
            recommended: definition.recommended,
            always: definition.always,
        })
    }
}

/// Registry of deployable services in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    services: Vec<ServiceDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Load built-in catalog.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError`] if built-in catalog is invalid.
    pub fn builtin() -> Result<Self> {
        BUILTIN_CATALOG.parse()
    }

    /// Load catalog from file.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::Read`] if file cannot be read.
    /// - Return [`CatalogError`] if catalog is invalid.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        debug!("load catalog from {:?}", path.as_ref().display());
        let data = read_to_string(path.as_ref()).map_err(|err| CatalogError::Read {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        data.parse()
    }

    /// Construct catalog from its definition.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError`] if definition fails load-time validation.
    pub fn from_definition(definition: CatalogDefinition) -> Result<Self> {
        let mut services = Vec::with_capacity(definition.services.len());
        let mut index = HashMap::new();
        for service in definition.services {
            let service = ServiceDescriptor::try_from_definition(service)?;
            if index.insert(service.id.clone(), services.len()).is_some() {
                return Err(CatalogError::DuplicateService { id: service.id });
            }
            services.push(service);
        }

        let catalog = Self { services, index };
        catalog.check_references()?;
        catalog.check_tunnels()?;
        catalog.check_port_clashes()?;
        catalog.check_tunnel_ports()?;

        Ok(catalog)
    }

    /// Lookup service by identifier.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::UnknownService`] if no service has `id`.
    pub fn lookup(&self, id: &str) -> Result<&ServiceDescriptor> {
        self.get(id).ok_or_else(|| CatalogError::UnknownService { id: id.into() })
    }

    /// Get service by identifier.
    pub fn get(&self, id: &str) -> Option<&ServiceDescriptor> {
        self.position(id).map(|position| &self.services[position])
    }

    /// Position of service in catalog order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All services in catalog order.
    pub fn all(&self) -> &[ServiceDescriptor] {
        self.services.as_slice()
    }

    /// Service acting as VPN tunnel, if catalog has one.
    pub fn tunnel(&self) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|service| service.is_tunnel())
    }

    /// Group services by category.
    ///
    /// Categories appear in order of their first service in the catalog.
    pub fn by_category(&self) -> Vec<(Category, Vec<&ServiceDescriptor>)> {
        let mut groups: Vec<(Category, Vec<&ServiceDescriptor>)> = Vec::new();
        for service in &self.services {
            match groups.iter_mut().find(|(category, _)| *category == service.category) {
                Some((_, members)) => members.push(service),
                None => groups.push((service.category, vec![service])),
            }
        }

        groups
    }

    fn check_references(&self) -> Result<()> {
        for service in &self.services {
            if service.depends_on.contains(&service.id) {
                return Err(CatalogError::SelfReference {
                    service: service.id.clone(),
                });
            }

            let hosts = service.templates().flat_map(|template| {
                template.variables().filter_map(|variable| match variable {
                    ServiceVar::Host(id) => Some(id),
                    _ => None,
                })
            });

            for reference in service
                .depends_on
                .iter()
                .chain(service.conflicts_with.iter())
                .chain(hosts)
            {
                if !self.index.contains_key(reference) {
                    return Err(CatalogError::DanglingReference {
                        service: service.id.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    fn check_tunnels(&self) -> Result<()> {
        let mut tunnels = self.services.iter().filter(|service| service.is_tunnel());
        if let (Some(first), Some(second)) = (tunnels.next(), tunnels.next()) {
            return Err(CatalogError::MultipleTunnels {
                first: first.id.clone(),
                second: second.id.clone(),
            });
        }

        Ok(())
    }

    fn check_port_clashes(&self) -> Result<()> {
        let mut owners: HashMap<(String, String), &ServiceDescriptor> = HashMap::new();
        for service in &self.services {
            for mapping in &service.ports {
                let binding = parse_mapping(mapping)
                    .map(|(host, _, protocol)| (host, protocol))
                    .ok_or_else(|| CatalogError::InvalidPort {
                        service: service.id.clone(),
                        mapping: mapping.clone(),
                    })?;

                if let Some(owner) = owners.get(&binding) {
                    if !owner.conflicts(service) {
                        return Err(CatalogError::PortClash {
                            first: owner.id.clone(),
                            second: service.id.clone(),
                            port: binding.0,
                        });
                    }
                    continue;
                }
                owners.insert(binding, service);
            }
        }

        Ok(())
    }

    // INVARIANT: Ports are well-formed, since host ports were checked first.
    fn check_tunnel_ports(&self) -> Result<()> {
        let namespace = self
            .services
            .iter()
            .filter(|service| service.is_tunnel() || service.is_download_client());

        let mut owners: HashMap<(String, String), &ServiceDescriptor> = HashMap::new();
        for service in namespace {
            let bindings = service
                .ports
                .iter()
                .filter_map(|mapping| parse_mapping(mapping))
                .map(|(_, container, protocol)| (container, protocol));

            for binding in bindings {
                if let Some(owner) = owners.get(&binding) {
                    if owner.id != service.id && !owner.conflicts(service) {
                        return Err(CatalogError::TunnelPortClash {
                            first: owner.id.clone(),
                            second: service.id.clone(),
                            port: binding.0,
                        });
                    }
                    continue;
                }
                owners.insert(binding, service);
            }
        }

        Ok(())
    }
}

impl FromStr for Catalog {
    type Err = CatalogError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::from_definition(data.parse()?)
    }
}

/// Split "host:container[/protocol]" into host port, container port and
/// protocol.
fn parse_mapping(mapping: &str) -> Option<(String, String, String)> {
    let (ports, protocol) = match mapping.split_once('/') {
        Some((ports, protocol)) => (ports, protocol),
        None => (mapping, "tcp"),
    };
    let (host, container) = ports.split_once(':')?;
    host.parse::<u16>().ok()?;
    container.parse::<u16>().ok()?;

    Some((host.to_string(), container.to_string(), protocol.to_string()))
}

/// Catalog error types.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No service with identifier.
    #[error("unknown service {id:?}")]
    UnknownService { id: String },

    /// Catalog file cannot be read.
    #[error("failed to read catalog at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Catalog definition cannot be parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Two services share one identifier.
    #[error("service {id:?} declared more than once")]
    DuplicateService { id: String },

    /// Dependency, conflict or host placeholder names unknown service.
    #[error("service {service:?} references unknown service {reference:?}")]
    DanglingReference { service: String, reference: String },

    /// Service depends on itself.
    #[error("service {service:?} depends on itself")]
    SelfReference { service: String },

    /// Template of service is malformed.
    #[error("service {service:?} has an invalid template")]
    Template {
        service: String,
        #[source]
        source: TemplateError,
    },

    /// More than one service acts as VPN tunnel.
    #[error("services {first:?} and {second:?} are both vpn tunnels")]
    MultipleTunnels { first: String, second: String },

    /// Port mapping is malformed.
    #[error("service {service:?} has invalid port mapping {mapping:?}")]
    InvalidPort { service: String, mapping: String },

    /// Services publish same host port without declaring a conflict.
    #[error("services {first:?} and {second:?} both publish host port {port} without declaring a conflict")]
    PortClash {
        first: String,
        second: String,
        port: String,
    },

    /// Services sharing the tunnel's network namespace listen on the same
    /// container port without declaring a conflict.
    #[error("services {first:?} and {second:?} both listen on container port {port} behind the vpn tunnel")]
    TunnelPortClash {
        first: String,
        second: String,
        port: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test]
    fn builtin_catalog_loads() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;

        assert_eq!(catalog.tunnel().map(|service| service.id.as_str()), Some("gluetun"));
        assert!(catalog.get("watchtower").is_some_and(|service| service.always));
        assert!(catalog
            .lookup("emby")?
            .conflicts(catalog.lookup("jellyfin")?));
        assert!(!catalog
            .lookup("plex")?
            .conflicts(catalog.lookup("jellyfin")?));

        Ok(())
    }

    #[test]
    fn lookup_unknown_service() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let result = catalog.lookup("unknown-service-id");
        assert!(matches!(
            result,
            Err(CatalogError::UnknownService { id }) if id == "unknown-service-id"
        ));

        Ok(())
    }

    #[test]
    fn all_keeps_declaration_order() -> anyhow::Result<()> {
        let catalog: Catalog = indoc! {r#"
            [[service]]
            id = "zeta"
            name = "Zeta"
            description = "last letter"
            category = "companion"
            image = "zeta:latest"

            [[service]]
            id = "alpha"
            name = "Alpha"
            description = "first letter"
            category = "companion"
            image = "alpha:latest"

            [[service]]
            id = "vpn"
            name = "Tunnel"
            description = "tunnel"
            category = "vpn"
            image = "tunnel:latest"
        "#}
        .parse()?;

        let ids = catalog.all().iter().map(|service| service.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["zeta", "alpha", "vpn"]);

        let groups = catalog
            .by_category()
            .into_iter()
            .map(|(category, members)| (category, members.len()))
            .collect::<Vec<_>>();
        assert_eq!(groups, vec![(Category::Companion, 2), (Category::Vpn, 1)]);

        Ok(())
    }

    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"

            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"
        "#};
        "duplicate identifier"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"
            depends_on = ["b"]
        "#};
        "unknown dependency"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"
            depends_on = ["a"]
        "#};
        "self dependency"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"
            setup_steps = ["connect to {host:nowhere}"]
        "#};
        "unknown host reference"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"
            volumes = ["{confg_dir}:/config"]
        "#};
        "unknown placeholder"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "vpn"
            image = "a"

            [[service]]
            id = "b"
            name = "B"
            description = "b"
            category = "vpn"
            image = "b"
        "#};
        "two tunnels"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"
            ports = ["8080:8080"]

            [[service]]
            id = "b"
            name = "B"
            description = "b"
            category = "companion"
            image = "b"
            ports = ["8080:80"]
        "#};
        "undeclared port clash"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "companion"
            image = "a"
            ports = ["eighty"]
        "#};
        "malformed port"
    )]
    #[test_case(
        indoc! {r#"
            [[service]]
            id = "vpn"
            name = "Tunnel"
            description = "tunnel"
            category = "vpn"
            image = "vpn"

            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "download-client"
            image = "a"
            ports = ["8080:8080"]

            [[service]]
            id = "b"
            name = "B"
            description = "b"
            category = "download-client"
            image = "b"
            ports = ["8085:8080"]
        "#};
        "container port clash behind tunnel"
    )]
    #[test]
    fn reject_invalid_catalog(data: &str) {
        assert!(data.parse::<Catalog>().is_err());
    }

    #[test]
    fn declared_conflict_allows_shared_port() -> anyhow::Result<()> {
        let catalog: Catalog = indoc! {r#"
            [[service]]
            id = "a"
            name = "A"
            description = "a"
            category = "media-server"
            image = "a"
            ports = ["8096:8096"]

            [[service]]
            id = "b"
            name = "B"
            description = "b"
            category = "media-server"
            image = "b"
            ports = ["8096:8096", "8096:8096/udp"]
            conflicts_with = ["a"]
        "#}
        .parse()?;

        assert!(catalog.lookup("a")?.conflicts(catalog.lookup("b")?));

        Ok(())
    }

    #[test]
    fn builtin_tunnel_ports_are_distinct() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let mut seen = BTreeSet::new();
        for service in catalog
            .all()
            .iter()
            .filter(|service| service.is_tunnel() || service.is_download_client())
        {
            for mapping in &service.ports {
                let (_, container, protocol) =
                    parse_mapping(mapping).ok_or(anyhow::anyhow!("bad mapping {mapping}"))?;
                assert!(seen.insert((container, protocol)), "{} reuses {mapping}", service.id);
            }
        }

        Ok(())
    }

    #[test]
    fn tunnel_port_clash_names_both_services() {
        let result = indoc! {r#"
            [[service]]
            id = "vpn"
            name = "Tunnel"
            description = "tunnel"
            category = "vpn"
            image = "vpn"
            ports = ["8888:8888"]

            [[service]]
            id = "proxy-client"
            name = "Proxy Client"
            description = "listens where the tunnel proxy does"
            category = "download-client"
            image = "client"
            ports = ["9999:8888"]
        "#}
        .parse::<Catalog>();

        assert!(matches!(
            result,
            Err(CatalogError::TunnelPortClash { first, second, port })
                if first == "vpn" && second == "proxy-client" && port == "8888"
        ));
    }

    #[test]
    fn host_key_is_shell_friendly() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        assert_eq!(catalog.lookup("qbittorrent")?.host_key(), "QBITTORRENT_HOST");

        Ok(())
    }
}
