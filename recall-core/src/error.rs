use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Connection Error - {0}")]
    Connection(String),

    #[error("Redis Error - {0}")]
    Redis(String),

    #[error("Store Error - {0}")]
    Store(String),

    /// An explicitly supplied converter rejected the stored bytes.
    #[error("Conversion Error - {0}")]
    Conversion(String),

    #[error("Serialization Error - {0}")]
    Serialization(String),

    #[error("Fetch Error - {0}")]
    Fetch(String),

    #[error("ParseConfig Error - {0}")]
    ParseConfig(String),
}
