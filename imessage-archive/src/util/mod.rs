/*!
 Decoders for the blob formats stored in the chat database, and helpers for their output.
*/

pub mod bplist;
pub mod dates;
pub mod json;
pub mod keyed_archive;
pub mod streamtyped;
