use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Connection Error - {0}")]
    Connection(String),

    #[error("Mongo Error - {0}")]
    Mongo(String),

    #[error("Store Error - {0}")]
    Store(String),

    #[error("DuplicateKey Error - {0}")]
    DuplicateKey(String),

    #[error("InvalidDocument Error - {0}")]
    InvalidDocument(String),
}
