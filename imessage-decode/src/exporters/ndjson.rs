use std::{
    collections::HashSet,
    fs::File,
    io::{stdout, BufWriter, Write},
};

use json::{object, JsonValue};

use imessage_archive::{
    error::{decode::DecodeError, table::TableError},
    tables::{messages::Message, table::Table},
    util::json::keyed_to_json,
};

use crate::{
    app::{error::RuntimeError, progress::build_progress_bar_export, runtime::Config},
    exporters::exporter::Exporter,
};

pub struct NDJSON<'a> {
    /// Data that is setup from the application's runtime
    pub config: &'a Config,
    /// Buffered handle to the export file or stdout
    pub file: BufWriter<Box<dyn Write>>,
}

impl<'a> Exporter<'a> for NDJSON<'a> {
    fn new(config: &'a Config) -> Result<Self, RuntimeError> {
        let file: Box<dyn Write> = match &config.options.export_path {
            Some(path) => Box::new(
                File::options()
                    .append(true)
                    .create(true)
                    .open(path)
                    .map_err(|why| RuntimeError::CreateError(why, path.to_owned()))?,
            ),
            None => Box::new(stdout()),
        };

        Ok(NDJSON {
            config,
            file: BufWriter::new(file),
        })
    }

    fn iter_messages(&mut self) -> Result<(), RuntimeError> {
        let config = self.config;
        let db = config.db.as_ref().ok_or_else(|| {
            RuntimeError::InvalidOptions("No database connection for batch decoding".to_string())
        })?;

        // Tell the user what we are doing
        match &config.options.export_path {
            Some(path) => eprintln!("Decoding messages to {} as ndjson...", path.display()),
            None => eprintln!("Decoding messages as ndjson..."),
        }

        // Keep track of GUIDs we already wrote
        let mut seen_guids: HashSet<String> = HashSet::new();

        // Set up progress bar
        let mut current_message = 0;
        let total_messages = Message::get_count(db).map_err(RuntimeError::DatabaseError)?;
        let pb = build_progress_bar_export(total_messages);

        let mut statement = Message::stream_rows(db).map_err(RuntimeError::DatabaseError)?;

        let messages = statement
            .query_map([], |row| Ok(Message::from_row(row)))
            .map_err(|err| RuntimeError::DatabaseError(TableError::Messages(err)))?;

        for message in messages {
            let msg = Message::extract(message).map_err(RuntimeError::DatabaseError)?;
            current_message += 1;

            // The same message can appear in more than one row
            if !seen_guids.insert(msg.guid.clone()) {
                continue;
            }

            let line = self.format_message(&msg);
            NDJSON::write_to_file(self.get_or_create_file(), line)?;

            if current_message % 99 == 0 {
                pb.set_position(current_message);
            }
        }
        pb.finish();

        self.file.flush().map_err(RuntimeError::DiskError)
    }

    fn get_or_create_file(&mut self) -> &mut dyn Write {
        &mut self.file
    }
}

impl<'a> NDJSON<'a> {
    /// Log a decode failure for a message; Digital Touch payloads are skipped quietly
    fn report(msg: &Message, why: &DecodeError) {
        if !matches!(why, DecodeError::NotABplist) {
            eprintln!("Unable to decode message {}: {why}", msg.guid);
        }
    }

    /// Build the JSON line for a message, with `null` in place of anything that failed to decode
    pub fn format_message(&self, msg: &Message) -> JsonValue {
        let text = match msg.body() {
            Ok(Some(text)) => JsonValue::from(text),
            Ok(None) => JsonValue::Null,
            Err(why) => {
                NDJSON::report(msg, &why);
                JsonValue::Null
            }
        };
        let payload = match msg.payload() {
            Ok(Some(payload)) => keyed_to_json(&payload),
            Ok(None) => JsonValue::Null,
            Err(why) => {
                NDJSON::report(msg, &why);
                JsonValue::Null
            }
        };

        object! {
            guid: msg.guid.as_str(),
            text: text,
            payload: payload,
        }
    }

    fn write_to_file(file: &mut dyn Write, text: JsonValue) -> Result<(), RuntimeError> {
        file.write_all((text.dump() + "\n").as_bytes())
            .map_err(RuntimeError::DiskError)
    }
}
