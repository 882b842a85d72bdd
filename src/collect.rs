// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Input collection.
//!
//! A __collector__ gathers the raw selection and the values of the
//! environment context, either from an answers file or by prompting. The
//! engine never looks at where values came from, so validation behaves the
//! same for both.

mod answers;
mod interactive;

pub use answers::AnswersFile;
pub use interactive::InteractivePrompt;

use crate::{
    catalog::Catalog, config::ConfigError, context::ContextBuilder, detect::DetectError,
};

use std::path::PathBuf;

/// Values gathered by a collector.
///
/// Nothing in here is validated yet.
#[derive(Debug, Clone)]
pub struct Collected {
    /// Requested service identifiers, as given.
    pub services: Vec<String>,

    /// Unbuilt environment context.
    pub context: ContextBuilder,
}

/// Source of raw selection and environment values.
pub trait Collector {
    /// Gather values, offering services from catalog.
    ///
    /// # Errors
    ///
    /// - Return [`CollectError`] if values cannot be gathered, or if the user
    ///   cancelled.
    fn collect(&self, catalog: &Catalog) -> Result<Collected>;
}

/// Collection error types.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Answers file cannot be read.
    #[error("failed to read answers file {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Answers file is malformed.
    #[error("malformed answers file")]
    Answers(#[from] ConfigError),

    /// Host detection failed.
    #[error(transparent)]
    Detect(#[from] DetectError),

    /// Prompt failed for a reason other than cancellation.
    #[error("prompt failed")]
    Prompt(#[source] inquire::InquireError),

    /// User cancelled.
    #[error("setup cancelled, nothing was written")]
    Cancelled,
}

impl From<inquire::InquireError> for CollectError {
    fn from(error: inquire::InquireError) -> Self {
        match error {
            inquire::InquireError::OperationCanceled
            | inquire::InquireError::OperationInterrupted => Self::Cancelled,
            error => Self::Prompt(error),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = CollectError> = std::result::Result<T, E>;
