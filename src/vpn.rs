// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! VPN tunnel settings.
//!
//! Download clients can route their traffic through a VPN tunnel container.
//! The tunnel needs to know which provider to connect to, over which
//! protocol, and with what credentials. This module holds the table of
//! supported providers and validates user choices against it.
//!
//! The "custom" provider is an escape hatch for providers missing from the
//! table. It emits no VPN variables, leaving the tunnel to be configured by
//! hand after setup.

use crate::config::VpnChoices;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Provider key for manual configuration.
pub const CUSTOM_PROVIDER: &str = "custom";

/// Subnet the tunnel firewall lets outbound traffic through by default.
pub const DEFAULT_SUBNET: &str = "172.17.0.0/16";

/// Credential fields that may be left empty.
pub const OPTIONAL_FIELDS: [&str; 2] = ["OPENVPN_PASSWORD", "WIREGUARD_PRESHARED_KEY"];

/// Supported VPN provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provider {
    /// Lookup key.
    pub key: &'static str,

    /// Human readable name.
    pub name: &'static str,

    /// Name the tunnel container knows the provider by.
    pub provider_name: &'static str,

    /// Credential fields for OpenVPN, empty if unsupported.
    pub openvpn_fields: &'static [&'static str],

    /// Credential fields for WireGuard, empty if unsupported.
    pub wireguard_fields: &'static [&'static str],

    /// Where to obtain credentials.
    pub credentials_url: &'static str,

    /// Where to obtain WireGuard credentials if different.
    pub wireguard_url: Option<&'static str>,

    /// Hint about which credentials to use.
    pub note: &'static str,
}

impl Provider {
    /// Check if provider supports protocol.
    pub fn supports(&self, protocol: Protocol) -> bool {
        !self.fields(protocol).is_empty()
    }

    /// Credential fields of protocol.
    pub fn fields(&self, protocol: Protocol) -> &'static [&'static str] {
        match protocol {
            Protocol::OpenVpn => self.openvpn_fields,
            Protocol::WireGuard => self.wireguard_fields,
        }
    }

    /// Preferred protocol, WireGuard if supported.
    pub fn preferred_protocol(&self) -> Protocol {
        if self.supports(Protocol::WireGuard) {
            Protocol::WireGuard
        } else {
            Protocol::OpenVpn
        }
    }

    /// Where to obtain credentials for protocol.
    pub fn credentials_url(&self, protocol: Protocol) -> &'static str {
        match (protocol, self.wireguard_url) {
            (Protocol::WireGuard, Some(url)) => url,
            _ => self.credentials_url,
        }
    }
}

/// Table of supported providers.
pub const PROVIDERS: &[Provider] = &[
    Provider {
        key: "nordvpn",
        name: "NordVPN",
        provider_name: "nordvpn",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &["WIREGUARD_PRIVATE_KEY"],
        credentials_url: "https://my.nordaccount.com/dashboard/nordvpn/manual-configuration/service-credentials/",
        wireguard_url: None,
        note: "Use your service credentials, not your email and password.",
    },
    Provider {
        key: "mullvad",
        name: "Mullvad",
        provider_name: "mullvad",
        openvpn_fields: &["OPENVPN_USER"],
        wireguard_fields: &["WIREGUARD_PRIVATE_KEY", "WIREGUARD_ADDRESSES"],
        credentials_url: "https://mullvad.net/en/account/#/wireguard-config",
        wireguard_url: None,
        note: "OpenVPN uses your account number. WireGuard needs the key and address of a generated config.",
    },
    Provider {
        key: "protonvpn",
        name: "ProtonVPN",
        provider_name: "protonvpn",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &["WIREGUARD_PRIVATE_KEY"],
        credentials_url: "https://account.proton.me/u/0/vpn/OpenVpnIKEv2",
        wireguard_url: Some("https://account.proton.me/u/0/vpn/WireGuard"),
        note: "Use your OpenVPN/IKEv2 credentials, not your Proton account password.",
    },
    Provider {
        key: "surfshark",
        name: "Surfshark",
        provider_name: "surfshark",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &["WIREGUARD_PRIVATE_KEY", "WIREGUARD_ADDRESSES"],
        credentials_url: "https://my.surfshark.com/vpn/manual-setup/main",
        wireguard_url: None,
        note: "Find credentials under VPN > Manual setup.",
    },
    Provider {
        key: "private internet access",
        name: "Private Internet Access (PIA)",
        provider_name: "private internet access",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &[],
        credentials_url: "https://www.privateinternetaccess.com/account/client-control-panel",
        wireguard_url: None,
        note: "Use your PIA username and password.",
    },
    Provider {
        key: "expressvpn",
        name: "ExpressVPN",
        provider_name: "expressvpn",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &[],
        credentials_url: "https://www.expressvpn.com/setup",
        wireguard_url: None,
        note: "Use the manual configuration credentials from the setup page.",
    },
    Provider {
        key: "ivpn",
        name: "IVPN",
        provider_name: "ivpn",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &["WIREGUARD_PRIVATE_KEY"],
        credentials_url: "https://www.ivpn.net/account/login",
        wireguard_url: None,
        note: "Use your IVPN account credentials.",
    },
    Provider {
        key: "windscribe",
        name: "Windscribe",
        provider_name: "windscribe",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &[
            "WIREGUARD_PRIVATE_KEY",
            "WIREGUARD_ADDRESSES",
            "WIREGUARD_PRESHARED_KEY",
        ],
        credentials_url: "https://windscribe.com/getconfig/openvpn",
        wireguard_url: Some("https://windscribe.com/getconfig/wireguard"),
        note: "Generate a config file to obtain credentials.",
    },
    Provider {
        key: "cyberghost",
        name: "CyberGhost",
        provider_name: "cyberghost",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &[],
        credentials_url: "https://my.cyberghostvpn.com/",
        wireguard_url: None,
        note: "Use the credentials of a manually configured OpenVPN device.",
    },
    Provider {
        key: "torguard",
        name: "TorGuard",
        provider_name: "torguard",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &["WIREGUARD_PRIVATE_KEY", "WIREGUARD_ADDRESSES"],
        credentials_url: "https://torguard.net/clientarea.php",
        wireguard_url: None,
        note: "Use your VPN credentials, not your client area login.",
    },
    Provider {
        key: "vyprvpn",
        name: "VyprVPN",
        provider_name: "vyprvpn",
        openvpn_fields: &["OPENVPN_USER", "OPENVPN_PASSWORD"],
        wireguard_fields: &[],
        credentials_url: "https://www.vyprvpn.com/",
        wireguard_url: None,
        note: "Use your VyprVPN account credentials.",
    },
];

/// Find provider by key.
pub fn provider(key: &str) -> Option<&'static Provider> {
    PROVIDERS.iter().find(|provider| provider.key == key)
}

/// VPN protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OpenVpn,
    WireGuard,
}

impl FromStr for Protocol {
    type Err = VpnError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data.to_ascii_lowercase().as_str() {
            "openvpn" => Ok(Self::OpenVpn),
            "wireguard" => Ok(Self::WireGuard),
            _ => Err(VpnError::UnknownProtocol {
                protocol: data.into(),
            }),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::OpenVpn => fmt.write_str("openvpn"),
            Self::WireGuard => fmt.write_str("wireguard"),
        }
    }
}

/// Validated VPN tunnel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnSettings {
    provider: Option<&'static Provider>,
    protocol: Protocol,
    credentials: BTreeMap<String, String>,
    server_countries: Option<String>,
    firewall_subnet: String,
}

impl VpnSettings {
    /// Validate VPN choices.
    ///
    /// Protocol defaults to the provider's preferred protocol, and firewall
    /// subnet defaults to [`DEFAULT_SUBNET`].
    ///
    /// # Errors
    ///
    /// - Return [`VpnError::UnknownProvider`] if provider is not in the table.
    /// - Return [`VpnError::UnsupportedProtocol`] if provider lacks protocol.
    /// - Return [`VpnError::MissingCredential`] if a required credential is
    ///   absent or blank.
    /// - Return [`VpnError::UnexpectedCredential`] if a credential does not
    ///   belong to the chosen protocol.
    /// - Return [`VpnError::InvalidSubnet`] if firewall subnet is malformed.
    pub fn from_choices(choices: &VpnChoices) -> Result<Self> {
        let firewall_subnet = match choices.firewall_subnet.as_deref().map(str::trim) {
            Some(subnet) if !subnet.is_empty() => subnet.to_string(),
            _ => DEFAULT_SUBNET.to_string(),
        };
        if !is_valid_subnet(&firewall_subnet) {
            return Err(VpnError::InvalidSubnet {
                subnet: firewall_subnet,
            });
        }

        let server_countries = choices
            .server_countries
            .as_deref()
            .map(str::trim)
            .filter(|countries| !countries.is_empty())
            .map(String::from);

        if choices.provider == CUSTOM_PROVIDER {
            let protocol = match choices.protocol.as_deref() {
                Some(protocol) => protocol.parse()?,
                None => Protocol::OpenVpn,
            };

            return Ok(Self {
                provider: None,
                protocol,
                credentials: BTreeMap::new(),
                server_countries,
                firewall_subnet,
            });
        }

        let provider = provider(&choices.provider).ok_or_else(|| VpnError::UnknownProvider {
            provider: choices.provider.clone(),
        })?;

        let protocol = match choices.protocol.as_deref() {
            Some(protocol) => protocol.parse()?,
            None => provider.preferred_protocol(),
        };
        if !provider.supports(protocol) {
            return Err(VpnError::UnsupportedProtocol {
                provider: provider.name.into(),
                protocol,
            });
        }

        let fields = provider.fields(protocol);
        if let Some(field) = choices.credentials.keys().find(|key| !fields.contains(&key.as_str())) {
            return Err(VpnError::UnexpectedCredential {
                field: field.clone(),
                protocol,
            });
        }

        let mut credentials = BTreeMap::new();
        for field in fields {
            let value = choices
                .credentials
                .get(*field)
                .map(|value| value.trim())
                .unwrap_or_default();

            if value.is_empty() {
                if OPTIONAL_FIELDS.contains(field) {
                    continue;
                }
                return Err(VpnError::MissingCredential {
                    field: field.to_string(),
                });
            }

            credentials.insert(field.to_string(), value.to_string());
        }

        Ok(Self {
            provider: Some(provider),
            protocol,
            credentials,
            server_countries,
            firewall_subnet,
        })
    }

    /// Provider, `None` for manual configuration.
    pub fn provider(&self) -> Option<&'static Provider> {
        self.provider
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn server_countries(&self) -> Option<&str> {
        self.server_countries.as_deref()
    }

    pub fn firewall_subnet(&self) -> &str {
        self.firewall_subnet.as_str()
    }

    /// Check if tunnel is left for manual configuration.
    pub fn is_custom(&self) -> bool {
        self.provider.is_none()
    }

    /// Environment variables configuring the tunnel container.
    ///
    /// Empty for manual configuration.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let Some(provider) = self.provider else {
            return BTreeMap::new();
        };

        let mut environment = BTreeMap::new();
        environment.insert("VPN_SERVICE_PROVIDER".into(), provider.provider_name.into());
        environment.insert("VPN_TYPE".into(), self.protocol.to_string());
        environment.extend(self.credentials.clone());
        if let Some(countries) = &self.server_countries {
            environment.insert("SERVER_COUNTRIES".into(), countries.clone());
        }
        environment.insert("FIREWALL_OUTBOUND_SUBNETS".into(), self.firewall_subnet.clone());

        environment
    }
}

/// Check that subnet is written as "a.b.c.d/n".
pub fn is_valid_subnet(subnet: &str) -> bool {
    let Some((address, prefix)) = subnet.split_once('/') else {
        return false;
    };

    let octets = address.split('.').collect::<Vec<_>>();
    octets.len() == 4
        && octets.iter().all(|octet| is_decimal(octet) && octet.parse::<u8>().is_ok())
        && is_decimal(prefix)
        && prefix.parse::<u8>().is_ok_and(|prefix| prefix <= 32)
}

fn is_decimal(text: &str) -> bool {
    !text.is_empty() && text.len() <= 3 && text.bytes().all(|byte| byte.is_ascii_digit())
}

/// VPN settings error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VpnError {
    /// Provider is not in the table.
    #[error("unknown vpn provider {provider:?}")]
    UnknownProvider { provider: String },

    /// Protocol name is not recognized.
    #[error("unknown vpn protocol {protocol:?}, expected openvpn or wireguard")]
    UnknownProtocol { protocol: String },

    /// Provider does not support protocol.
    #[error("{provider} does not support {protocol}")]
    UnsupportedProtocol { provider: String, protocol: Protocol },

    /// Required credential absent.
    #[error("missing vpn credential {field}")]
    MissingCredential { field: String },

    /// Credential not used by protocol.
    #[error("vpn credential {field} is not used by {protocol}")]
    UnexpectedCredential { field: String, protocol: Protocol },

    /// Firewall subnet is malformed.
    #[error("invalid subnet {subnet:?}, expected a.b.c.d/n")]
    InvalidSubnet { subnet: String },
}

/// Friendly result alias :3
pub type Result<T, E = VpnError> = std::result::Result<T, E>;
