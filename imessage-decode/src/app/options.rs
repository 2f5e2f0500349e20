use std::path::PathBuf;

use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::app::error::RuntimeError;

// CLI Arg Names
pub const OPTION_FORMAT: &str = "format";
pub const OPTION_INPUT: &str = "input";
pub const OPTION_HEX: &str = "hex";
pub const OPTION_DB_PATH: &str = "db-path";
pub const OPTION_EXPORT_PATH: &str = "export-path";
pub const OPTION_PRETTY: &str = "pretty";

// Valid formats
pub const SUPPORTED_FORMATS: [&str; 3] = ["archive", "bplist", "text"];
pub const ABOUT: &str = concat!(
    "The `imessage-decode` binary decodes the binary property list, keyed archive,\n",
    "and typedstream blobs stored in an iMessage database into JSON or text."
);

/// Decoder to run on a single blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFormat {
    /// Resolve a keyed archive, as stored in `payload_data`
    Archive,
    /// Decode a binary property list without resolving references
    Bplist,
    /// Extract the text of an attributed string, as stored in `attributedBody`
    Text,
}

impl DecodeFormat {
    pub fn from_cli(format: &str) -> Option<Self> {
        match format.to_lowercase().as_str() {
            "archive" => Some(Self::Archive),
            "bplist" => Some(Self::Bplist),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Represents the CLI options passed to the program
#[derive(Debug, PartialEq, Eq)]
pub struct Options {
    /// Decoder used for a single blob
    pub format: DecodeFormat,
    /// Blob file to read; stdin when [`None`]
    pub input: Option<PathBuf>,
    /// If true, the input is hex text rather than raw bytes
    pub hex: bool,
    /// Chat database to decode in batch mode
    pub db_path: Option<PathBuf>,
    /// NDJSON file written in batch mode; stdout when [`None`]
    pub export_path: Option<PathBuf>,
    /// If true, pretty print single blob JSON output
    pub pretty: bool,
}

impl Options {
    pub fn from_args(args: &ArgMatches) -> Result<Self, RuntimeError> {
        let format = args
            .get_one::<String>(OPTION_FORMAT)
            .map(String::as_str)
            .unwrap_or(SUPPORTED_FORMATS[0]);
        let input = args.get_one::<PathBuf>(OPTION_INPUT).cloned();
        let hex = args.get_flag(OPTION_HEX);
        let db_path = args.get_one::<PathBuf>(OPTION_DB_PATH).cloned();
        let export_path = args.get_one::<PathBuf>(OPTION_EXPORT_PATH).cloned();
        let pretty = args.get_flag(OPTION_PRETTY);

        // Validation layer
        let format = DecodeFormat::from_cli(format).ok_or_else(|| {
            RuntimeError::InvalidOptions(format!(
                "{format} is not a valid decode format! Must be one of <{}>",
                SUPPORTED_FORMATS.join("|")
            ))
        })?;

        if db_path.is_some() {
            if input.is_some() {
                return Err(RuntimeError::InvalidOptions(format!(
                    "Option --{OPTION_INPUT} is not allowed with --{OPTION_DB_PATH}"
                )));
            }
            if hex {
                return Err(RuntimeError::InvalidOptions(format!(
                    "Option --{OPTION_HEX} is not allowed with --{OPTION_DB_PATH}"
                )));
            }
        } else if export_path.is_some() {
            return Err(RuntimeError::InvalidOptions(format!(
                "Option --{OPTION_EXPORT_PATH} is only valid with --{OPTION_DB_PATH}"
            )));
        }

        Ok(Options {
            format,
            input,
            hex,
            db_path,
            export_path,
            pretty,
        })
    }

    /// If true, decode every message in a database instead of a single blob
    pub fn is_batch(&self) -> bool {
        self.db_path.is_some()
    }
}

/// Build the command line argument parser
pub fn get_command() -> Command {
    Command::new("iMessage Decoder")
        .version(crate_version!())
        .about(ABOUT)
        .arg_required_else_help(false)
        .arg(
            Arg::new(OPTION_FORMAT)
                .short('f')
                .long(OPTION_FORMAT)
                .help("Specify which decoder to run on the input blob\n")
                .action(ArgAction::Set)
                .value_parser(SUPPORTED_FORMATS)
                .default_value(SUPPORTED_FORMATS[0])
                .display_order(0)
                .value_name("archive|bplist|text"),
        )
        .arg(
            Arg::new(OPTION_INPUT)
                .short('i')
                .long(OPTION_INPUT)
                .help("Specify a file containing the blob to decode\nIf omitted, the blob is read from stdin\n")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .display_order(1)
                .value_name("path/to/blob"),
        )
        .arg(
            Arg::new(OPTION_HEX)
                .short('x')
                .long(OPTION_HEX)
                .help("Treat the input as hex text, such as the output of `SELECT hex(payload_data)`\n")
                .action(ArgAction::SetTrue)
                .display_order(2),
        )
        .arg(
            Arg::new(OPTION_DB_PATH)
                .short('p')
                .long(OPTION_DB_PATH)
                .help("Decode every message in the specified chat database as NDJSON\n")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .display_order(3)
                .value_name("path/to/chat.db"),
        )
        .arg(
            Arg::new(OPTION_EXPORT_PATH)
                .short('o')
                .long(OPTION_EXPORT_PATH)
                .help("Specify a file to write NDJSON to when decoding a database\nIf omitted, lines are written to stdout\n")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .display_order(4)
                .value_name("path/to/output.ndjson"),
        )
        .arg(
            Arg::new(OPTION_PRETTY)
                .long(OPTION_PRETTY)
                .help("Pretty print the JSON output for a single blob\n")
                .action(ArgAction::SetTrue)
                .display_order(5),
        )
}
