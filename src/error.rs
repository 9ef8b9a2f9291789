use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemedyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid check definition: {0}")]
    InvalidCheck(String),

    #[error("Unknown check '{0}'. Run 'remedyctl checks' to list available checks")]
    UnknownCheck(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),
}

pub type Result<T> = std::result::Result<T, RemedyError>;
