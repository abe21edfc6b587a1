//! gNB Application Module
//!
//! This module handles:
//! - Configuration loading and validation
//! - Building and spawning the tasks of a validated configuration
//! - Waiting for the run to complete and collecting the final metrics

mod config_loader;
mod runtime;

pub use config_loader::{
    load_and_validate_gnb_config, load_gnb_config, load_gnb_config_from_str, validate_gnb_config,
    ConfigError, ConfigValidationError,
};

pub use runtime::{AppError, GnbApp};
