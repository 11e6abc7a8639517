use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "config file not found. Looked in:\n\
        - current directory: converge.local.yaml, converge.yaml\n\
        - ./.converge/ directory\n\
        - ~/.config/converge/converge.yaml\n\
        Set CONVERGE_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
