// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{CollectError, Collected, Collector, Result};
use crate::{
    catalog::{Catalog, ServiceDescriptor},
    config::{Category, VpnChoices},
    context::{ContextBuilder, EnvironmentContext},
    detect,
    vpn::{is_valid_subnet, Protocol, CUSTOM_PROVIDER, DEFAULT_SUBNET, OPTIONAL_FIELDS, PROVIDERS},
};

use inquire::{validator::Validation, Confirm, CustomType, MultiSelect, Password, Select, Text};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{instrument, warn};

/// Default base directory of container configuration.
pub const DEFAULT_DOCKER_DIR: &str = "/opt/docker";

/// Default base directory of media files.
pub const DEFAULT_MEDIA_DIR: &str = "/srv/media";

const FALLBACK_ID: i64 = 1000;
const MANUAL_PROVIDER: &str = "Other (configure the tunnel by hand)";

/// Collect values by prompting on the terminal.
///
/// Pressing escape or Ctrl-C at any prompt cancels the run before anything
/// is written.
#[derive(Debug, Default, Clone)]
pub struct InteractivePrompt;

impl InteractivePrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for InteractivePrompt {
    #[instrument(skip(self, catalog), level = "debug")]
    fn collect(&self, catalog: &Catalog) -> Result<Collected> {
        println!("\nautomatorr will generate a docker compose setup for your media server.\n");

        let mut context = prompt_identity(EnvironmentContext::builder())?;

        let docker_dir = prompt_dir("Docker configuration directory", DEFAULT_DOCKER_DIR)?;
        let media_dir = prompt_dir("Media directory", DEFAULT_MEDIA_DIR)?;
        context = context.docker_dir(&docker_dir).media_dir(&media_dir);

        let timezone = Text::new("Timezone")
            .with_default(&detect::timezone())
            .with_help_message("Area/Location, e.g. Europe/Berlin")
            .prompt()?;
        let host_ip = Text::new("Address of this machine")
            .with_default(&detect::host_address())
            .with_help_message("Used in service URLs of the setup guide")
            .prompt()?;
        context = context.timezone(timezone).host_ip(host_ip);

        let services = prompt_services(catalog)?;

        let routes_traffic = catalog.tunnel().is_some()
            && services
                .iter()
                .filter_map(|id| catalog.get(id))
                .any(ServiceDescriptor::is_download_client);
        let vpn = if routes_traffic { prompt_vpn()? } else { None };

        println!("\n{}", summary(catalog, &services, &docker_dir, &media_dir, vpn.as_ref()));
        if !Confirm::new("Generate files with these settings?")
            .with_default(true)
            .prompt()?
        {
            return Err(CollectError::Cancelled);
        }

        if let Some(choices) = vpn {
            context = context.vpn(choices);
        }

        context = context.encryption_key(detect::encryption_key());

        Ok(Collected { services, context })
    }
}

fn prompt_identity(context: ContextBuilder) -> Result<ContextBuilder> {
    match detect::current_user() {
        // INVARIANT: Containers never run as root, so uid 0 always asks.
        Ok(user) if user.uid != 0 => {
            let question = format!(
                "Run containers as {} (uid {}, gid {})?",
                user.name, user.uid, user.gid
            );
            if Confirm::new(&question).with_default(true).prompt()? {
                return Ok(context
                    .user_name(user.name)
                    .uid(i64::from(user.uid))
                    .gid(i64::from(user.gid)));
            }
        }
        Ok(_) => warn!("running as root, pick the user containers should run as"),
        Err(error) => warn!("{error}, pick the user containers should run as"),
    }

    let uid = CustomType::<i64>::new("User id (PUID)")
        .with_default(FALLBACK_ID)
        .with_error_message("enter a whole number")
        .prompt()?;
    let gid = CustomType::<i64>::new("Group id (PGID)")
        .with_default(FALLBACK_ID)
        .with_error_message("enter a whole number")
        .prompt()?;

    Ok(context.uid(uid).gid(gid))
}

fn prompt_dir(message: &str, default: &str) -> Result<PathBuf> {
    let answer = Text::new(message).with_default(default).prompt()?;
    Ok(crate::config::expand_path(Path::new(&answer))?)
}

fn prompt_services(catalog: &Catalog) -> Result<Vec<String>> {
    let mut services = Vec::new();
    for (category, members) in catalog.by_category() {
        if category == Category::Vpn {
            continue;
        }

        // INVARIANT: Services flagged always are added by validation anyway.
        let offered: Vec<&ServiceDescriptor> =
            members.into_iter().filter(|service| !service.always).collect();
        if offered.is_empty() {
            continue;
        }

        let labels: Vec<String> = offered.iter().map(|service| label(service)).collect();
        let defaults = recommended(&offered);
        let picked = MultiSelect::new(category.heading(), labels)
            .with_default(&defaults)
            .with_help_message(category.guidance())
            .raw_prompt()?;

        services.extend(picked.into_iter().map(|option| offered[option.index].id.clone()));
    }

    Ok(services)
}

fn label(service: &ServiceDescriptor) -> String {
    format!("{} - {}", service.name, service.description)
}

fn recommended(services: &[&ServiceDescriptor]) -> Vec<usize> {
    services
        .iter()
        .enumerate()
        .filter(|(_, service)| service.recommended)
        .map(|(index, _)| index)
        .collect()
}

fn prompt_vpn() -> Result<Option<VpnChoices>> {
    let wanted = Confirm::new("Route download clients through a VPN?")
        .with_default(false)
        .with_help_message("Needs an account with a VPN provider")
        .prompt()?;
    if !wanted {
        return Ok(None);
    }

    let mut labels: Vec<String> = PROVIDERS.iter().map(|provider| provider.name.into()).collect();
    labels.push(MANUAL_PROVIDER.into());
    let picked = Select::new("VPN provider", labels).raw_prompt()?;

    let Some(provider) = PROVIDERS.get(picked.index) else {
        return Ok(Some(VpnChoices {
            provider: CUSTOM_PROVIDER.into(),
            firewall_subnet: Some(prompt_subnet()?),
            ..Default::default()
        }));
    };

    let protocol =
        if provider.supports(Protocol::WireGuard) && provider.supports(Protocol::OpenVpn) {
            let options = vec![Protocol::WireGuard, Protocol::OpenVpn];
            Select::new("VPN protocol", options).prompt()?
        } else {
            provider.preferred_protocol()
        };

    println!("\n{}", provider.note);
    println!("Credentials: {}\n", provider.credentials_url(protocol));

    let mut credentials = BTreeMap::new();
    for field in provider.fields(protocol) {
        let optional = OPTIONAL_FIELDS.contains(field);
        let help = if optional { "Optional, leave empty to skip" } else { "Required" };
        let value = if is_secret_field(field) {
            Password::new(field)
                .without_confirmation()
                .with_help_message(help)
                .prompt()?
        } else {
            Text::new(field).with_help_message(help).prompt()?
        };

        if !value.trim().is_empty() {
            credentials.insert(field.to_string(), value.trim().to_string());
        }
    }

    let countries = Text::new("Server countries")
        .with_help_message("Comma separated, e.g. Netherlands,Switzerland. Empty for any")
        .prompt()?;

    Ok(Some(VpnChoices {
        provider: provider.key.into(),
        protocol: Some(protocol.to_string()),
        server_countries: Some(countries),
        firewall_subnet: Some(prompt_subnet()?),
        credentials,
    }))
}

fn prompt_subnet() -> Result<String> {
    Ok(Text::new("Docker subnet the tunnel firewall should allow")
        .with_default(DEFAULT_SUBNET)
        .with_validator(|input: &str| {
            if is_valid_subnet(input.trim()) {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("expected a.b.c.d/n".into()))
            }
        })
        .prompt()?)
}

fn is_secret_field(field: &str) -> bool {
    field.contains("PASSWORD") || field.contains("KEY")
}

fn summary(
    catalog: &Catalog,
    services: &[String],
    docker_dir: &Path,
    media_dir: &Path,
    vpn: Option<&VpnChoices>,
) -> String {
    let names: Vec<&str> = services
        .iter()
        .filter_map(|id| catalog.get(id))
        .map(|service| service.name.as_str())
        .collect();
    let vpn = match vpn {
        Some(choices) if choices.provider == CUSTOM_PROVIDER => "manual configuration".into(),
        Some(choices) => crate::vpn::provider(&choices.provider)
            .map_or_else(|| choices.provider.clone(), |provider| provider.name.to_string()),
        None => "disabled".into(),
    };

    format!(
        "Services:  {}\nDocker:    {}\nMedia:     {}\nVPN:       {vpn}",
        if names.is_empty() { "none".into() } else { names.join(", ") },
        docker_dir.display(),
        media_dir.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("WIREGUARD_PRIVATE_KEY", true; "private key")]
    #[test_case("OPENVPN_PASSWORD", true; "password")]
    #[test_case("OPENVPN_USER", false; "user")]
    #[test_case("WIREGUARD_ADDRESSES", false; "addresses")]
    #[test]
    fn secret_fields_are_masked(field: &str, expect: bool) {
        pretty_assertions::assert_eq!(is_secret_field(field), expect);
    }

    #[test]
    fn recommended_services_are_preselected() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        for (_, members) in catalog.by_category() {
            let picks = recommended(&members);
            for (index, service) in members.iter().enumerate() {
                assert_eq!(picks.contains(&index), service.recommended);
            }
        }

        Ok(())
    }

    #[test]
    fn summary_lists_names() -> anyhow::Result<()> {
        let catalog = Catalog::builtin()?;
        let vpn = VpnChoices {
            provider: "mullvad".into(),
            ..Default::default()
        };
        let result = summary(
            &catalog,
            &["sonarr".into(), "qbittorrent".into()],
            Path::new("/opt/docker"),
            Path::new("/srv/media"),
            Some(&vpn),
        );

        assert_eq!(
            result,
            "Services:  Sonarr, qBittorrent\nDocker:    /opt/docker\nMedia:     /srv/media\nVPN:       Mullvad"
        );

        Ok(())
    }
}
