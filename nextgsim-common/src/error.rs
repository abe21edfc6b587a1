//! Error type of the common crate

use thiserror::Error;

/// Failures of configuration parsing and logging setup.
#[derive(Debug, Error)]
pub enum Error {
    /// The document does not describe a gNB configuration
    #[error("invalid configuration document: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// The tracing subscriber could not be installed
    #[error("cannot install log subscriber: {0}")]
    Logging(String),
}
