pub mod error;
pub mod options;
pub mod progress;
pub mod runtime;
