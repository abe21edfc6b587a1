//! Configuration Loading for the gNB scheduler host
//!
//! Wraps the `GnbConfig` from `nextgsim-common` with the validation the host
//! needs before spawning tasks: every cell must yield a valid
//! `CellConfiguration` and the loopback simulation parameters must be usable.
//!
//! # Example
//!
//! ```rust,ignore
//! use nextgsim_gnb::app::{load_gnb_config, validate_gnb_config};
//!
//! let config = load_gnb_config("config/gnb-sched.yaml")?;
//! validate_gnb_config(&config)?;
//! ```

use std::collections::HashSet;
use std::path::Path;

use nextgsim_common::config::GnbConfig;
use nextgsim_common::CellIndex;
use nextgsim_sched::{CellConfigError, CellConfiguration};
use thiserror::Error;

/// Largest CQI index (TS 38.214 Table 5.2.2.1-2).
const MAX_CQI: u8 = 15;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// No cell configured
    #[error("No cell configured: at least one cell must be specified")]
    NoCellConfigured,

    /// More cells than a `CellIndex` can address
    #[error("Too many cells: {0} (at most 256)")]
    TooManyCells(usize),

    /// Two cells share a PCI
    #[error("Duplicate PCI {0}")]
    DuplicatePci(u16),

    /// A cell failed scheduler validation
    #[error("Invalid cell {cell}: {source}")]
    InvalidCell {
        /// Cell
        cell: CellIndex,
        /// Reason
        #[source]
        source: CellConfigError,
    },

    /// Loopback simulation parameter out of range
    #[error("Invalid simulation parameter: {0}")]
    InvalidSimulation(String),
}

/// Loads a gNB configuration from a YAML file.
///
/// Missing sections take their defaults. Call `validate_gnb_config` after
/// loading, or use `load_and_validate_gnb_config`.
pub fn load_gnb_config<P: AsRef<Path>>(path: P) -> Result<GnbConfig, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    load_gnb_config_from_str(&contents)
}

/// Loads a gNB configuration from a YAML string.
pub fn load_gnb_config_from_str(yaml: &str) -> Result<GnbConfig, ConfigError> {
    GnbConfig::from_yaml_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Validates a gNB configuration.
///
/// # Validation Rules
///
/// - At least one and at most 256 cells, with distinct PCIs
/// - Every cell, together with the scheduler parameters, passes
///   `CellConfiguration::new`
/// - BLER and RACH probabilities lie in [0, 1], CQI in 0..=15
/// - `max_ues` is non-zero
pub fn validate_gnb_config(config: &GnbConfig) -> Result<(), ConfigValidationError> {
    if config.cells.is_empty() {
        return Err(ConfigValidationError::NoCellConfigured);
    }
    if config.cells.len() > u8::MAX as usize + 1 {
        return Err(ConfigValidationError::TooManyCells(config.cells.len()));
    }

    let mut pcis = HashSet::new();
    for (i, cell) in config.cells.iter().enumerate() {
        if !pcis.insert(cell.pci) {
            return Err(ConfigValidationError::DuplicatePci(cell.pci));
        }
        let index = CellIndex(i as u8);
        CellConfiguration::new(index, cell, &config.scheduler)
            .map_err(|source| ConfigValidationError::InvalidCell { cell: index, source })?;
    }

    validate_simulation(config)
}

fn validate_simulation(config: &GnbConfig) -> Result<(), ConfigValidationError> {
    let sim = &config.simulation;
    for (name, value) in [
        ("dl_bler", sim.dl_bler),
        ("ul_bler", sim.ul_bler),
        ("rach_probability", sim.rach_probability),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigValidationError::InvalidSimulation(format!(
                "{name} {value} must be between 0 and 1"
            )));
        }
    }
    if sim.cqi > MAX_CQI {
        return Err(ConfigValidationError::InvalidSimulation(format!(
            "cqi {} exceeds {MAX_CQI}",
            sim.cqi
        )));
    }
    if sim.max_ues == 0 {
        return Err(ConfigValidationError::InvalidSimulation(
            "max_ues must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Loads and validates a gNB configuration in one step.
pub fn load_and_validate_gnb_config<P: AsRef<Path>>(path: P) -> Result<GnbConfig, ConfigError> {
    let config = load_gnb_config(path)?;
    validate_gnb_config(&config)?;
    Ok(config)
}
