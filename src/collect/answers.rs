// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{CollectError, Collected, Collector, Result};
use crate::{catalog::Catalog, config::SetupAnswers, context::EnvironmentContext, detect};

use std::{fs::read_to_string, path::PathBuf};
use tracing::{debug, instrument, warn};

/// Collect values from an answers file.
///
/// Values missing from the `[system]` table are detected from the host. A
/// missing encryption key is generated, which means repeated runs differ in
/// that one value unless the key is recorded.
#[derive(Debug, Clone)]
pub struct AnswersFile {
    source: Source,
}

#[derive(Debug, Clone)]
enum Source {
    Path(PathBuf),
    Parsed(SetupAnswers),
}

impl AnswersFile {
    /// Read answers from file at path when collecting.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Path(path.into()),
        }
    }

    /// Use answers already in memory.
    pub fn from_answers(answers: SetupAnswers) -> Self {
        Self {
            source: Source::Parsed(answers),
        }
    }

    fn answers(&self) -> Result<SetupAnswers> {
        match &self.source {
            Source::Parsed(answers) => Ok(answers.clone()),
            Source::Path(path) => {
                debug!("read answers file {:?}", path.display());
                let data = read_to_string(path).map_err(|err| CollectError::Read {
                    source: err,
                    path: path.clone(),
                })?;
                Ok(data.parse()?)
            }
        }
    }
}

impl Collector for AnswersFile {
    #[instrument(skip(self, catalog), level = "debug")]
    fn collect(&self, catalog: &Catalog) -> Result<Collected> {
        let SetupAnswers {
            services,
            user,
            directories,
            system,
            vpn,
        } = self.answers()?;

        let mut context = EnvironmentContext::builder()
            .uid(user.uid)
            .gid(user.gid)
            .docker_dir(directories.docker)
            .media_dir(directories.media)
            .timezone(system.timezone.unwrap_or_else(detect::timezone))
            .host_ip(system.host_ip.unwrap_or_else(detect::host_address));

        if let Some(name) = user.name {
            context = context.user_name(name);
        }

        if let Some(compose) = directories.compose {
            context = context.compose_dir(compose);
        }

        if let Some(choices) = vpn {
            context = context.vpn(choices);
        }

        context = match system.encryption_key {
            Some(key) => context.encryption_key(key),
            None => {
                let needy = services
                    .iter()
                    .filter_map(|id| catalog.get(id))
                    .find(|service| service.needs_secret());
                if let Some(service) = needy {
                    warn!(
                        "generated encryption key for {}, record it as `encryption_key` under \
                         [system] to keep it stable between runs",
                        service.name
                    );
                }
                context.encryption_key(detect::encryption_key())
            }
        };

        Ok(Collected { services, context })
    }
}
