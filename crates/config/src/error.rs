//! Errors produced while loading configuration.

/// Errors produced while loading or validating the configuration file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration file could not be opened.
    #[error("Failed to open configuration file: {0}")]
    ConfigOpen(#[from] std::io::Error),
    /// The configuration file's TOML could not be parsed.
    #[error("Failed to parse configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// A `{{ env.VAR }}` placeholder could not be substituted.
    #[error("At {path} failed substituing environment variable: {reason}")]
    EnvVarSubstitution {
        /// The TOML path where the substitution failed.
        path: String,
        /// Why the substitution failed.
        reason: String,
    },
}
