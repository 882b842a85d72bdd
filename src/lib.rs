// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Media server compose generator.
//!
//! Turn a selection of self-hosted services plus a handful of host values
//! into a ready to run docker compose setup: a compose file, an environment
//! file, and a setup guide.
//!
//! # Pipeline
//!
//! 1. A [`Catalog`] lists every deployable service, its dependencies,
//!    conflicts, and templated settings.
//! 2. A [`Collector`] gathers the requested services and host values.
//! 3. The [`Engine`] validates the selection into a dependency-closed
//!    [`SelectionSet`], resolves cross-service values such as which host a
//!    download client is reached through, then renders a [`Bundle`].
//!
//! Download clients can be routed through a VPN tunnel container. When they
//! are, they share its network namespace and other services reach them
//! through the tunnel's host name.

pub mod catalog;
pub mod collect;
pub mod config;
pub mod context;
pub mod detect;
pub mod engine;
pub mod layout;
pub mod path;
pub mod render;
pub mod resolve;
pub mod selection;
pub mod template;
pub mod vpn;

pub use catalog::Catalog;
pub use collect::{AnswersFile, Collector, InteractivePrompt};
pub use context::EnvironmentContext;
pub use engine::{Engine, EngineError, ErrorKind};
pub use render::Bundle;
pub use selection::SelectionSet;
