use std::{
    fs::read,
    io::{stdin, Read},
};

use json::JsonValue;
use rusqlite::Connection;

use imessage_archive::{
    tables::table::get_connection,
    util::{
        bplist::parser::parse_bplist,
        json::{bplist_to_json, keyed_to_json},
        keyed_archive::resolver::unarchive,
        streamtyped::extract,
    },
};

use crate::{
    app::{
        error::RuntimeError,
        options::{DecodeFormat, Options},
    },
    exporters::{exporter::Exporter, ndjson::NDJSON},
};

/// Stores the application state and handles application lifecycle
pub struct Config {
    /// App configuration options
    pub options: Options,
    /// Connection to the chat database in batch mode
    pub db: Option<Connection>,
}

impl Config {
    /// Create a new instance of the application
    ///
    /// Batch mode opens the database up front so connection errors surface before any output.
    pub fn new(options: Options) -> Result<Config, RuntimeError> {
        let db = match &options.db_path {
            Some(path) => {
                eprintln!("Opening {}...", path.display());
                Some(get_connection(path).map_err(RuntimeError::DatabaseError)?)
            }
            None => None,
        };
        Ok(Config { options, db })
    }

    /// Read the blob to decode from the input file or stdin
    fn read_input(&self) -> Result<Vec<u8>, RuntimeError> {
        let raw = match &self.options.input {
            Some(path) => {
                read(path).map_err(|why| RuntimeError::CreateError(why, path.to_owned()))?
            }
            None => {
                let mut buffer = vec![];
                stdin()
                    .read_to_end(&mut buffer)
                    .map_err(RuntimeError::DiskError)?;
                buffer
            }
        };
        if self.options.hex {
            decode_hex(&raw)
        } else {
            Ok(raw)
        }
    }

    /// Run the selected decoder on a single blob
    ///
    /// Returns [`None`] when a text blob holds no readable string.
    pub fn decode(&self, blob: &[u8]) -> Result<Option<String>, RuntimeError> {
        let json = match self.options.format {
            DecodeFormat::Archive => {
                keyed_to_json(&unarchive(blob).map_err(RuntimeError::DecodeError)?)
            }
            DecodeFormat::Bplist => {
                bplist_to_json(&parse_bplist(blob).map_err(RuntimeError::DecodeError)?)
            }
            DecodeFormat::Text => {
                return extract(blob).map_err(RuntimeError::DecodeError);
            }
        };
        Ok(Some(self.render(json)))
    }

    fn render(&self, json: JsonValue) -> String {
        if self.options.pretty {
            json.pretty(4)
        } else {
            json.dump()
        }
    }

    /// Handles the program lifecycle
    pub fn start(&self) -> Result<(), RuntimeError> {
        if self.options.is_batch() {
            NDJSON::new(self)?.iter_messages()?;
            eprintln!("Done!");
        } else {
            let blob = self.read_input()?;
            match self.decode(&blob)? {
                Some(output) => println!("{output}"),
                None => eprintln!("No text found in input"),
            }
        }
        Ok(())
    }
}

/// Decode hex text, ignoring surrounding whitespace and an `X'...'` SQL blob literal wrapper
fn decode_hex(raw: &[u8]) -> Result<Vec<u8>, RuntimeError> {
    let text = String::from_utf8_lossy(raw);
    let mut text = text.trim();
    if let Some(literal) = text
        .strip_prefix("X'")
        .or_else(|| text.strip_prefix("x'"))
        .and_then(|literal| literal.strip_suffix('\''))
    {
        text = literal;
    }
    hex::decode(text)
        .map_err(|why| RuntimeError::InvalidOptions(format!("Input is not valid hex: {why}")))
}
