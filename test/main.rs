// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::Result;
use automatorr::{
    collect::AnswersFile,
    config::{DirectoryAnswers, SetupAnswers, SystemAnswers, UserAnswers, VpnChoices},
};
use std::{
    fs::write,
    path::{Path, PathBuf},
};

pub(crate) const KEY: &str = "0123456789abcdef0123456789abcdef";

/// Answers rooted in a scratch directory.
#[derive(Debug, Clone)]
pub(crate) struct SetupFixture {
    root: PathBuf,
    answers: SetupAnswers,
}

impl SetupFixture {
    pub(crate) fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();

        // INVARIANT: Always use ids of the running user.
        //   - Directory ownership can then be handed over without privileges.
        //   - Root is bumped to 1, since containers never run as root.
        let uid = i64::from(nix::unistd::getuid().as_raw()).max(1);
        let gid = i64::from(nix::unistd::getgid().as_raw()).max(1);

        let answers = SetupAnswers {
            services: Vec::new(),
            user: UserAnswers {
                name: Some("media".into()),
                uid,
                gid,
            },
            directories: DirectoryAnswers {
                docker: root.join("docker"),
                media: root.join("media"),
                compose: None,
            },
            system: SystemAnswers {
                timezone: Some("Europe/Berlin".into()),
                host_ip: Some("192.168.1.20".into()),
                encryption_key: Some(KEY.into()),
            },
            vpn: None,
        };

        Self { root, answers }
    }

    pub(crate) fn services(mut self, services: &[&str]) -> Self {
        self.answers.services = services.iter().map(|id| id.to_string()).collect();
        self
    }

    pub(crate) fn uid(mut self, uid: i64) -> Self {
        self.answers.user.uid = uid;
        self
    }

    pub(crate) fn vpn(mut self, choices: VpnChoices) -> Self {
        self.answers.vpn = Some(choices);
        self
    }

    pub(crate) fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub(crate) fn compose_path(&self) -> PathBuf {
        self.root.join("docker").join("compose")
    }

    pub(crate) fn collector(&self) -> AnswersFile {
        AnswersFile::from_answers(self.answers.clone())
    }

    pub(crate) fn write(&self, filename: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.root.join(filename);
        write(&path, self.answers.to_string())?;
        Ok(path)
    }
}

pub(crate) fn mullvad() -> VpnChoices {
    VpnChoices {
        provider: "mullvad".into(),
        protocol: Some("wireguard".into()),
        server_countries: Some("Sweden".into()),
        firewall_subnet: None,
        credentials: [
            ("WIREGUARD_PRIVATE_KEY".to_string(), "privatekey".to_string()),
            ("WIREGUARD_ADDRESSES".to_string(), "10.64.0.1/32".to_string()),
        ]
        .into_iter()
        .collect(),
    }
}
