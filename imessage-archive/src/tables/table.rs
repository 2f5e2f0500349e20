/*!
 This module defines traits and constants shared by table readers.
*/

use std::path::Path;

use rusqlite::{Connection, Error, OpenFlags, Result, Row, Statement};

use crate::error::table::TableError;

/// Defines behavior for SQL Table data
pub trait Table {
    /// Deserializes a single row of data into an instance of the struct that implements this Trait
    fn from_row(row: &Row) -> Result<Self>
    where
        Self: Sized;
    /// Gets a statement we can execute to iterate over the data in the table
    fn get(db: &Connection) -> Result<Statement, TableError>;

    /// Extract valid row data while handling both types of query errors
    fn extract(item: Result<Result<Self, Error>, Error>) -> Result<Self, TableError>
    where
        Self: Sized;
}

/// Get a read-only connection to the chat database
///
/// # Example:
///
/// ```no_run
/// use std::path::PathBuf;
/// use imessage_archive::tables::table::get_connection;
///
/// let db_path = PathBuf::from("chat.db");
/// let connection = get_connection(&db_path);
/// ```
pub fn get_connection(path: &Path) -> Result<Connection, TableError> {
    if !path.exists() {
        return Err(TableError::CannotConnect(format!(
            "Database not found at {}",
            path.display()
        )));
    }

    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|err| {
        TableError::CannotConnect(format!(
            "Unable to read from chat database: {err}\nEnsure full disk access is enabled for your terminal emulator in System Settings > Security and Privacy > Full Disk Access"
        ))
    })
}

// Table names
/// Message table name
pub const MESSAGE: &str = "message";

// Column names
/// Plain text body of a message
pub const TEXT: &str = "text";
/// `typedstream` archived `NSAttributedString` body of a message
pub const ATTRIBUTED_BODY: &str = "attributedBody";
/// Keyed archive holding app and balloon data for a message
pub const PAYLOAD_DATA: &str = "payload_data";
