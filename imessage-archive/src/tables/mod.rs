/*!
 This module contains the tables and SQL functions used to read archived blobs from the chat database.
*/

pub mod functions;
pub mod messages;
pub mod table;
