//! Helpers shared by the cean crates.
//!
//! - `format`: byte sizes and timestamps for status surfaces
//! - `validation`: e-mail and ORCID validators
//! - `config`: JSON-backed form configuration

pub mod config;
pub mod format;
pub mod validation;

pub use config::{CONFIG_PATH_ENV, ConfigError, FormConfig, default_config_path, expand_tilde, load_config, load_config_from_path};
pub use format::{format_local_datetime, human_size, parse_timestamp};
pub use validation::{validate_email, validate_orcid};
