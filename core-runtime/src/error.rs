use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config document error: {0}")]
    Document(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
