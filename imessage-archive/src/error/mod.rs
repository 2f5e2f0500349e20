/*!
 Errors that can happen while decoding archived data or reading it from the database.
*/

pub mod decode;
pub mod table;
