use std::error::Error;
use std::fmt;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone)]
pub enum ProviderError {
    InvalidConfig(String),
    UnsupportedPath(String),
    Other(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            ProviderError::UnsupportedPath(path) => write!(f, "unsupported path: {path}"),
            ProviderError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for ProviderError {}
