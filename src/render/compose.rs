// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::NETWORK_NAME;
use crate::resolve::{NetworkMode, ResolvedService, Resolution};

use serde::{ser::SerializeMap, Serialize, Serializer};
use std::collections::BTreeMap;

const HEADER: &str = "# Generated by automatorr. ${...} values are read from .env next to this file.\n";

#[derive(Serialize)]
struct ComposeDocument<'a> {
    services: Services<'a>,
    networks: BTreeMap<&'static str, Network>,
}

#[derive(Serialize)]
struct Network {
    driver: &'static str,
}

// INVARIANT: Services are serialized in resolution order, i.e., catalog order.
struct Services<'a>(&'a [ResolvedService]);

impl Serialize for Services<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for service in self.0 {
            map.serialize_entry(service.id.as_str(), &ServiceBlock::from(service))?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct ServiceBlock<'a> {
    image: &'a str,
    container_name: &'a str,
    restart: &'static str,

    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    cap_add: &'a [String],

    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    devices: &'a [String],

    #[serde(skip_serializing_if = "Option::is_none")]
    network_mode: Option<String>,

    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    depends_on: &'a [String],

    #[serde(skip_serializing_if = "Vec::is_empty")]
    environment: Vec<String>,

    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    volumes: &'a [String],

    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    ports: &'a [String],

    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<&'static str>,
}

impl<'a> From<&'a ResolvedService> for ServiceBlock<'a> {
    fn from(service: &'a ResolvedService) -> Self {
        let (network_mode, networks) = match &service.network {
            NetworkMode::Bridge => (None, vec![NETWORK_NAME]),
            NetworkMode::Service(owner) => (Some(format!("service:{owner}")), Vec::new()),
        };

        Self {
            image: service.image.as_str(),
            container_name: service.id.as_str(),
            restart: "unless-stopped",
            cap_add: service.cap_add.as_slice(),
            devices: service.devices.as_slice(),
            network_mode,
            depends_on: service.depends_on.as_slice(),
            environment: service
                .interpolated
                .environment
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect(),
            volumes: service.interpolated.volumes.as_slice(),
            ports: service.ports.as_slice(),
            networks,
        }
    }
}

/// Render compose file.
///
/// # Panics
///
/// - Will panic if document cannot be serialized, which only happens on a
///   serializer bug since every value is a plain string.
pub(super) fn render(resolution: &Resolution) -> String {
    let document = ComposeDocument {
        services: Services(resolution.services()),
        networks: BTreeMap::from([(NETWORK_NAME, Network { driver: "bridge" })]),
    };

    let body = serde_yaml::to_string(&document).expect("compose document serializes to yaml");
    format!("{HEADER}{body}")
}
