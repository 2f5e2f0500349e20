use std::io::Write;

use crate::app::{error::RuntimeError, runtime::Config};

/// Defines behavior for iterating over messages from the iMessage database and writing decoded output
pub trait Exporter<'a> {
    /// Create a new exporter with a reference to the application state
    fn new(config: &'a Config) -> Result<Self, RuntimeError>
    where
        Self: Sized;
    /// Begin iterating over the messages table
    fn iter_messages(&mut self) -> Result<(), RuntimeError>;
    /// Get the handle to write decoded lines to
    fn get_or_create_file(&mut self) -> &mut dyn Write;
}
