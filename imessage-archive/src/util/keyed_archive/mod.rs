/*!
 Contains logic and data structures used to rebuild [`NSKeyedArchiver`](https://developer.apple.com/documentation/foundation/nskeyedarchiver) object graphs.

 Message payloads such as rich links and app balloons are stored as keyed archives in the
 `payload_data` column. This module dereferences the archive's object table and collapses
 collection and URL classes into plain values that serialize cleanly.
*/

pub mod models;
pub mod resolver;
