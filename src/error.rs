//! Startup and serving errors.
//!
//! Request-level problems never show up here: a bad `Range` header becomes
//! a 416 and a bad `If-Range` a full 200.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
