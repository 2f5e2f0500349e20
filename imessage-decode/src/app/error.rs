/*!
Errors that can happen during the application's runtime
*/

use std::{
    fmt::{Display, Formatter, Result},
    io::Error as IoError,
    path::PathBuf,
};

use imessage_archive::error::{decode::DecodeError, table::TableError};

/// Errors that can happen during the application's runtime
#[derive(Debug)]
pub enum RuntimeError {
    InvalidOptions(String),
    CreateError(IoError, PathBuf),
    DiskError(IoError),
    DatabaseError(TableError),
    DecodeError(DecodeError),
}

impl Display for RuntimeError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            RuntimeError::InvalidOptions(why) => write!(fmt, "Invalid options!\n{why}"),
            RuntimeError::CreateError(why, path) => write!(fmt, "{why}: {path:?}"),
            RuntimeError::DiskError(why) => write!(fmt, "{why}"),
            RuntimeError::DatabaseError(why) => write!(fmt, "{why}"),
            RuntimeError::DecodeError(why) => write!(fmt, "Unable to decode input: {why}"),
        }
    }
}
