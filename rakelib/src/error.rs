use std::{io, result};
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The executable could not be found or the OS refused to launch it.
    #[error("{0}")]
    Spawn(#[from] io::Error),
    #[error("output not {encoding}: {reason}")]
    Decode { encoding: String, reason: String },
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    #[error("invalid result pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("process supervisor exited")]
    SupervisorExited,
}

pub type Result<T> = result::Result<T, Error>;
