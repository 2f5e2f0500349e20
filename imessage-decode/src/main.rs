#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]
mod app;
mod exporters;

use app::{
    options::{get_command, Options},
    runtime::Config,
};

fn main() {
    // Get args from command line
    let args = get_command().get_matches();
    // Create application options
    let options = Options::from_args(&args);

    // Create app state and start
    if let Err(why) = &options {
        eprintln!("{why}");
        std::process::exit(1);
    } else if let Ok(options) = options {
        match Config::new(options) {
            Ok(app) => {
                if let Err(why) = app.start() {
                    eprintln!("Unable to decode: {why}");
                    std::process::exit(1);
                }
            }
            Err(why) => {
                eprintln!("Unable to launch: {why}");
                std::process::exit(1);
            }
        }
    }
}
