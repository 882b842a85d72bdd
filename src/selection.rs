// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Selection validation.
//!
//! Turn a raw request of service identifiers into a __selection set__: the
//! dependency-closed, conflict-free set of services that will actually be
//! deployed. Missing dependencies are added rather than rejected. The catalog
//! decides what depends on what, so this module holds no knowledge of
//! specific services.

use crate::{
    catalog::{Catalog, ServiceDescriptor},
    config::Category,
};

use std::{
    collections::{HashMap, VecDeque},
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::{debug, info, instrument, warn};

/// Dependency-closed and conflict-free set of services.
///
/// Services are kept in catalog order. Can only be obtained through
/// [`SelectionSet::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    services: Vec<String>,
    vpn_enabled: bool,
}

impl SelectionSet {
    /// Validate requested services against catalog.
    ///
    /// Dependencies are added transitively, as are services flagged `always`.
    /// With VPN tunneling enabled the catalog's tunnel is added too, as long as
    /// the closure has a download client to route through it. Validating an
    /// already validated set yields the same set.
    ///
    /// # Errors
    ///
    /// - Return [`SelectionError::Empty`] if nothing was requested.
    /// - Return [`SelectionError::UnknownService`] for an identifier the
    ///   catalog does not have.
    /// - Return [`SelectionError::TunnelWithoutVpn`] if the tunnel was
    ///   requested while VPN tunneling is disabled.
    /// - Return [`SelectionError::UnsatisfiedDependency`] if a service needs
    ///   the tunnel while VPN tunneling is disabled.
    /// - Return [`SelectionError::ConflictingServices`] if two services of
    ///   the closure conflict with each other.
    #[instrument(skip(catalog, requested), level = "debug")]
    pub fn validate<I, S>(catalog: &Catalog, requested: I, vpn_enabled: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // INVARIANT: Map every service of the closure to whatever pulled it in.
        // Requested services map to `None`.
        let mut required_by: HashMap<&str, Option<&str>> = HashMap::new();
        let mut queue: VecDeque<(&ServiceDescriptor, Option<&str>)> = VecDeque::new();

        for id in requested {
            let id = id.as_ref();
            let service = catalog.get(id).ok_or_else(|| SelectionError::UnknownService {
                id: id.to_string(),
            })?;
            queue.push_back((service, None));
        }

        if queue.is_empty() {
            return Err(SelectionError::Empty);
        }

        for service in catalog.all().iter().filter(|service| service.always) {
            queue.push_back((service, None));
        }

        // INVARIANT: Consider the tunnel only after the request is closed, so
        // download clients pulled in as dependencies count too.
        let mut tunnel_considered = !vpn_enabled;
        loop {
            while let Some((service, requirer)) = queue.pop_front() {
                if required_by.contains_key(service.id.as_str()) {
                    continue;
                }

                if let Some(requirer) = requirer {
                    info!("add {} required by {requirer}", service.id);
                }
                required_by.insert(service.id.as_str(), requirer);

                for dependency in &service.depends_on {
                    let dependency = catalog.lookup(dependency).map_err(|_| {
                        SelectionError::UnknownService {
                            id: dependency.clone(),
                        }
                    })?;
                    queue.push_back((dependency, Some(service.id.as_str())));
                }
            }

            if tunnel_considered {
                break;
            }
            tunnel_considered = true;

            let routes_traffic = required_by
                .keys()
                .filter_map(|id| catalog.get(id))
                .any(ServiceDescriptor::is_download_client);
            match catalog.tunnel() {
                Some(tunnel) if routes_traffic => queue.push_back((tunnel, None)),
                Some(_) => debug!("no download client selected, leave out tunnel"),
                None => warn!("vpn tunneling enabled, but catalog has no tunnel service"),
            }
        }

        if !vpn_enabled {
            if let Some(tunnel) = catalog.tunnel() {
                match required_by.get(tunnel.id.as_str()) {
                    Some(Some(requirer)) => {
                        return Err(SelectionError::UnsatisfiedDependency {
                            service: requirer.to_string(),
                            dependency: tunnel.id.clone(),
                        })
                    }
                    Some(None) => {
                        return Err(SelectionError::TunnelWithoutVpn {
                            tunnel: tunnel.id.clone(),
                        })
                    }
                    None => {}
                }
            }
        }

        let closure = catalog
            .all()
            .iter()
            .filter(|service| required_by.contains_key(service.id.as_str()))
            .collect::<Vec<_>>();

        for (index, first) in closure.iter().enumerate() {
            if let Some(second) = closure[index + 1..].iter().find(|other| first.conflicts(other)) {
                return Err(SelectionError::ConflictingServices {
                    first: first.id.clone(),
                    second: second.id.clone(),
                });
            }
        }

        let selection = Self {
            services: closure.iter().map(|service| service.id.clone()).collect(),
            vpn_enabled,
        };
        debug!("selection closed over {:?}", selection.services);

        for advisory in selection.advisories(catalog) {
            warn!("{advisory}");
        }

        Ok(selection)
    }

    /// Check if service is part of selection.
    pub fn contains(&self, id: &str) -> bool {
        self.services.iter().any(|service| service == id)
    }

    /// Service identifiers in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(String::as_str)
    }

    /// Selected services in catalog order.
    ///
    /// # Panics
    ///
    /// - Will panic if selection was validated against another catalog.
    pub fn services<'c>(&'c self, catalog: &'c Catalog) -> impl Iterator<Item = &'c ServiceDescriptor> {
        self.services.iter().map(move |id| {
            catalog
                .get(id)
                .unwrap_or_else(|| panic!("service {id:?} is not part of catalog"))
        })
    }

    /// Tunnel service of selection, if any.
    pub fn tunnel<'c>(&self, catalog: &'c Catalog) -> Option<&'c ServiceDescriptor> {
        catalog.tunnel().filter(|tunnel| self.contains(&tunnel.id))
    }

    /// Number of selected services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if selection has no services.
    ///
    /// Validation rejects empty requests, so a validated selection is never
    /// empty.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Advisories about the selection.
    ///
    /// Advisories never invalidate a selection.
    pub fn advisories(&self, catalog: &Catalog) -> Vec<Advisory> {
        let mut advisories = [Category::MediaServer, Category::Indexer]
            .into_iter()
            .filter_map(|category| {
                let services = self
                    .services(catalog)
                    .filter(|service| service.category == category)
                    .map(|service| service.id.clone())
                    .collect::<Vec<_>>();

                (services.len() > 1).then_some(Advisory::SeveralInCategory { category, services })
            })
            .collect::<Vec<_>>();

        if self.vpn_enabled && !self.services(catalog).any(ServiceDescriptor::is_download_client) {
            advisories.push(Advisory::NothingToRoute);
        }

        advisories
    }
}

/// Non-fatal remark about a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// More than one service of a category where one usually suffices.
    SeveralInCategory {
        category: Category,
        services: Vec<String>,
    },

    /// VPN tunneling enabled without a download client to route through it.
    NothingToRoute,
}

impl Display for Advisory {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::SeveralInCategory { category, services } => write!(
                fmt,
                "{} {category} services selected ({}), one is usually enough",
                services.len(),
                services.join(", ")
            ),
            Self::NothingToRoute => {
                fmt.write_str("vpn tunneling enabled, but no download client selected to route through it")
            }
        }
    }
}

/// Selection validation error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Nothing was requested.
    #[error("no services selected")]
    Empty,

    /// Catalog has no service with identifier.
    #[error("unknown service {id:?}")]
    UnknownService { id: String },

    /// Two services of the closure cannot coexist.
    #[error("services {first:?} and {second:?} conflict with each other")]
    ConflictingServices { first: String, second: String },

    /// Service needs tunnel while VPN tunneling is disabled.
    #[error("service {service:?} requires {dependency:?}, but vpn tunneling is disabled")]
    UnsatisfiedDependency { service: String, dependency: String },

    /// Tunnel requested while VPN tunneling is disabled.
    #[error("service {tunnel:?} selected, but vpn tunneling is disabled")]
    TunnelWithoutVpn { tunnel: String },
}

/// Friendly result alias :3
pub type Result<T, E = SelectionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn ids(selection: &SelectionSet) -> Vec<&str> {
        selection.ids().collect()
    }

    fn routed_catalog() -> anyhow::Result<Catalog> {
        Ok(indoc! {r#"
            [[service]]
            id = "tunnel"
            name = "Tunnel"
            description = "vpn tunnel"
            category = "vpn"
            image = "tunnel"

            [[service]]
            id = "private-client"
            name = "Private Client"
            description = "only ever runs behind the tunnel"
            category = "download-client"
            image = "client"
            depends_on = ["tunnel"]

            [[service]]
            id = "dashboard"
            name = "Dashboard"
            description = "start page"
            category = "dashboard"
            image = "dashboard"
        "#}
        .parse()?)
    }

    #[test]
    fn keep_catalog_order() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["jellyfin", "radarr", "qbittorrent"], false)?;
        assert_eq!(ids(&selection), vec!["qbittorrent", "radarr", "jellyfin", "watchtower"]);

        Ok(())
    }

    #[test]
    fn add_dependencies_transitively() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["tautulli"], false)?;
        assert_eq!(ids(&selection), vec!["plex", "tautulli", "watchtower"]);

        for service in selection.services(&catalog) {
            for dependency in &service.depends_on {
                assert!(selection.contains(dependency));
            }
        }

        Ok(())
    }

    #[test]
    fn add_tunnel_when_vpn_enabled() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["qbittorrent"], true)?;
        assert_eq!(ids(&selection), vec!["gluetun", "qbittorrent", "watchtower"]);
        assert_eq!(selection.tunnel(&catalog).map(|tunnel| tunnel.id.as_str()), Some("gluetun"));

        let selection = SelectionSet::validate(&catalog, ["qbittorrent"], false)?;
        assert!(selection.tunnel(&catalog).is_none());

        Ok(())
    }

    #[test]
    fn leave_out_tunnel_without_download_client() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["sonarr", "jellyfin"], true)?;

        assert_eq!(ids(&selection), vec!["sonarr", "jellyfin", "watchtower"]);
        assert!(selection.tunnel(&catalog).is_none());
        assert_eq!(selection.advisories(&catalog), vec![Advisory::NothingToRoute]);
        assert!(!selection.is_empty());

        let selection = SelectionSet::validate(&catalog, ["sonarr", "jellyfin"], false)?;
        assert!(selection.advisories(&catalog).is_empty());

        Ok(())
    }

    #[test_case(&["qbittorrent"], false; "without vpn")]
    #[test_case(&["qbittorrent", "radarr", "tautulli"], true; "with vpn")]
    #[test_case(&["jellyfin", "plex", "prowlarr", "jackett"], false; "with advisories")]
    #[test_case(&["sonarr"], true; "with vpn and nothing to route")]
    #[test]
    fn validation_is_idempotent(requested: &[&str], vpn_enabled: bool) -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let first = SelectionSet::validate(&catalog, requested, vpn_enabled)?;
        let second = SelectionSet::validate(&catalog, first.ids(), vpn_enabled)?;
        pretty_assertions::assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn several_media_servers_are_advisory() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let selection = SelectionSet::validate(&catalog, ["jellyfin", "plex"], false)?;

        assert_eq!(ids(&selection), vec!["jellyfin", "plex", "watchtower"]);
        assert_eq!(
            selection.advisories(&catalog),
            vec![Advisory::SeveralInCategory {
                category: Category::MediaServer,
                services: vec!["jellyfin".into(), "plex".into()],
            }]
        );

        Ok(())
    }

    #[test]
    fn reject_unknown_service() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let result = SelectionSet::validate(&catalog, ["radarr", "unknown-service-id"], false);
        assert_eq!(
            result,
            Err(SelectionError::UnknownService {
                id: "unknown-service-id".into()
            })
        );

        Ok(())
    }

    #[test]
    fn reject_empty_request() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let result = SelectionSet::validate(&catalog, Vec::<String>::new(), false);
        assert_eq!(result, Err(SelectionError::Empty));

        Ok(())
    }

    #[test_case(&["jellyfin", "emby"]; "declared by second")]
    #[test_case(&["emby", "jellyfin"]; "request order irrelevant")]
    #[test]
    fn reject_conflicting_services(requested: &[&str]) -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let result = SelectionSet::validate(&catalog, requested, false);
        pretty_assertions::assert_eq!(
            result,
            Err(SelectionError::ConflictingServices {
                first: "jellyfin".into(),
                second: "emby".into(),
            })
        );

        Ok(())
    }

    #[test]
    fn reject_vpn_dependent_service_without_vpn() -> anyhow::Result<()> {
        let catalog = routed_catalog()?;
        let result = SelectionSet::validate(&catalog, ["private-client"], false);
        assert_eq!(
            result,
            Err(SelectionError::UnsatisfiedDependency {
                service: "private-client".into(),
                dependency: "tunnel".into(),
            })
        );

        let selection = SelectionSet::validate(&catalog, ["private-client"], true)?;
        assert_eq!(ids(&selection), vec!["tunnel", "private-client"]);

        Ok(())
    }

    #[test]
    fn reject_tunnel_without_vpn() -> anyhow::Result<()> {
        let catalog = routed_catalog()?;
        let result = SelectionSet::validate(&catalog, ["dashboard", "tunnel"], false);
        assert_eq!(
            result,
            Err(SelectionError::TunnelWithoutVpn {
                tunnel: "tunnel".into()
            })
        );

        Ok(())
    }
}
