//! Filesystem path constants.

/// Default config file, relative to the user's home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".kutex/config.yaml";
