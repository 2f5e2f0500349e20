/*!
 SQL scalar functions that expose the blob decoders inside queries.

 The decoders are registered on a connection the caller passes in; nothing is installed globally.
*/

use rusqlite::{
    functions::{Context, FunctionFlags},
    types::ValueRef,
    Connection,
};

use crate::{
    error::{decode::DecodeError, table::TableError},
    util::{json::keyed_to_json, keyed_archive::resolver::unarchive, streamtyped::extract},
};

/// Resolves a `payload_data` style keyed archive into JSON text
pub const UNARCHIVE_KEYED: &str = "unarchive_keyed";
/// Reads the text out of an `attributedBody` style `typedstream`
pub const UNARCHIVE_STRING: &str = "unarchive_string";

/// Get the bytes of the single function argument; `NULL` and numbers have none
fn blob_argument<'a>(ctx: &'a Context<'_>) -> Option<&'a [u8]> {
    match ctx.get_raw(0) {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(bytes),
        _ => None,
    }
}

/// Log a decode failure; the caller returns `NULL` for the row
fn report(function: &str, why: &DecodeError) {
    if !matches!(why, DecodeError::NotABplist) {
        eprintln!("{function}: {why}");
    }
}

/// Install `unarchive_keyed(blob)` and `unarchive_string(blob)` on `db`
///
/// Both functions are deterministic and return `NULL` instead of failing the query when a blob
/// cannot be decoded.
///
/// # Example:
///
/// ```
/// use rusqlite::Connection;
/// use imessage_archive::tables::functions::register_decoders;
///
/// let db = Connection::open_in_memory().unwrap();
/// register_decoders(&db).unwrap();
///
/// let text: Option<String> = db
///     .query_row("SELECT unarchive_string(NULL)", [], |row| row.get(0))
///     .unwrap();
/// assert_eq!(text, None);
/// ```
pub fn register_decoders(db: &Connection) -> Result<(), TableError> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    db.create_scalar_function(UNARCHIVE_KEYED, 1, flags, |ctx| {
        Ok(blob_argument(ctx).and_then(|stream| match unarchive(stream) {
            Ok(value) => Some(keyed_to_json(&value).dump()),
            Err(why) => {
                report(UNARCHIVE_KEYED, &why);
                None
            }
        }))
    })
    .map_err(TableError::Functions)?;

    db.create_scalar_function(UNARCHIVE_STRING, 1, flags, |ctx| {
        Ok(blob_argument(ctx).and_then(|stream| match extract(stream) {
            Ok(text) => text,
            Err(why) => {
                report(UNARCHIVE_STRING, &why);
                None
            }
        }))
    })
    .map_err(TableError::Functions)?;

    Ok(())
}
