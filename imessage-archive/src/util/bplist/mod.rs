/*!
 Contains logic and data structures used to decode binary property lists.

 ## Overview

 A `bplist00` stream is an 8 byte magic, a table of tagged objects, a table of object offsets,
 and a 32 byte trailer describing the widths and positions of the other sections. Containers
 refer to their children by object number, so the same object can be shared by several parents.

 ## Features

 - Objects are decoded lazily from the root and memoized by byte offset
 - Every read is bounds checked against the stream
 - Reference cycles and runaway nesting are reported as errors
*/

pub mod models;
pub mod parser;
#[cfg(test)]
pub(crate) mod tests;
