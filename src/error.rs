use thiserror::Error;

use crate::config::parser::ConfigError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address '{0}'")]
    ListenAddress(String),

    #[error("cannot bind {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("no server block defines a listen address")]
    NoListeners,
}

pub type Result<T> = std::result::Result<T, ServerError>;
