/*!
 This module represents the blob columns of the `message` table.
*/

use rusqlite::{Connection, Error, Result, Row, Statement};

use crate::{
    error::{decode::DecodeError, table::TableError},
    tables::table::{Table, ATTRIBUTED_BODY, MESSAGE, PAYLOAD_DATA, TEXT},
    util::{
        keyed_archive::{models::KeyedValue, resolver::unarchive},
        streamtyped::extract,
    },
};

/// Represents a single row in the `message` table, limited to the columns that hold message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub rowid: i32,
    /// The unique identifier for the message
    pub guid: String,
    /// The plain text body, often empty on newer databases
    pub text: Option<String>,
    /// `typedstream` archived `NSAttributedString`
    pub attributed_body: Option<Vec<u8>>,
    /// Keyed archive for app messages and rich links
    pub payload_data: Option<Vec<u8>>,
}

impl Table for Message {
    fn from_row(row: &Row) -> Result<Message> {
        Ok(Message {
            rowid: row.get("rowid")?,
            guid: row.get("guid")?,
            text: row.get(TEXT).unwrap_or(None),
            attributed_body: row.get(ATTRIBUTED_BODY).unwrap_or(None),
            payload_data: row.get(PAYLOAD_DATA).unwrap_or(None),
        })
    }

    fn get(db: &Connection) -> Result<Statement, TableError> {
        db.prepare(&format!(
            "SELECT ROWID AS rowid, guid, {TEXT}, {ATTRIBUTED_BODY}, {PAYLOAD_DATA} FROM {MESSAGE} ORDER BY ROWID"
        ))
        .map_err(TableError::Messages)
    }

    fn extract(message: Result<Result<Self, Error>, Error>) -> Result<Self, TableError> {
        match message {
            Ok(Ok(message)) => Ok(message),
            Err(why) | Ok(Err(why)) => Err(TableError::Messages(why)),
        }
    }
}

impl Message {
    /// Get the text of the message
    ///
    /// Prefers the `text` column and falls back to the archived attributed string.
    pub fn body(&self) -> Result<Option<String>, DecodeError> {
        if let Some(text) = self.text.as_ref().filter(|text| !text.is_empty()) {
            return Ok(Some(text.clone()));
        }
        match &self.attributed_body {
            Some(body) => extract(body),
            None => Ok(None),
        }
    }

    /// Resolve the keyed archive stored in `payload_data`, if there is one
    pub fn payload(&self) -> Result<Option<KeyedValue>, DecodeError> {
        self.payload_data.as_deref().map(unarchive).transpose()
    }

    /// Get a statement that iterates over every message in `ROWID` order
    pub fn stream_rows(db: &Connection) -> Result<Statement, TableError> {
        Self::get(db)
    }

    /// Get the number of messages in the database
    pub fn get_count(db: &Connection) -> Result<u64, TableError> {
        let mut statement = db
            .prepare(&format!("SELECT COUNT(*) FROM {MESSAGE}"))
            .map_err(TableError::Messages)?;
        let count: i64 = statement
            .query_row([], |row| row.get(0))
            .map_err(TableError::Messages)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
