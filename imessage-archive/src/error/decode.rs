/*!
 Errors that can happen when decoding binary plist, keyed archive, or legacy `typedstream` data.
*/

use std::{
    error,
    fmt::{Display, Formatter, Result},
};

/// Errors that can happen when decoding archived message data
///
/// Every variant carries enough context to be logged without parsing the source blob again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream does not start with the expected magic or header bytes
    MalformedHeader,
    /// The stream is too short to contain a header and trailer; holds the stream length
    Truncated(usize),
    /// The trailer contains sizes or indexes that cannot describe a valid object table
    InvalidTrailer(String),
    /// A read of `len` bytes at `offset` would leave the stream
    OutOfBounds { offset: usize, len: usize },
    /// A marker byte that does not describe any supported object
    UnknownMarker { byte: u8, offset: usize },
    /// A real number whose payload is not 4 or 8 bytes wide
    InvalidRealSize(usize),
    /// An object reference that is not inside the object table
    InvalidReferenceIndex { index: u64, count: u64 },
    /// An object that contains itself somewhere in its own subtree
    CyclicReference { index: u64 },
    /// Nesting or reference chains exceeded the recursion limit
    MaxRecursionDepth,
    /// The keyed archive is missing a required key or has the wrong shape; holds the key
    InvalidArchiveStructure(String),
    /// The data is a known payload variant that is not a binary plist
    NotABplist,
    /// The `typedstream` signature is neither `streamtyped` nor `typedstream`
    InvalidSignature(Vec<u8>),
}

impl Display for DecodeError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            DecodeError::MalformedHeader => write!(fmt, "Invalid header!"),
            DecodeError::Truncated(len) => {
                write!(fmt, "Stream of {len} bytes is too short to decode!")
            }
            DecodeError::InvalidTrailer(why) => write!(fmt, "Invalid trailer: {why}"),
            DecodeError::OutOfBounds { offset, len } => {
                write!(fmt, "Read of {len:x} bytes at {offset:x} is out of bounds!")
            }
            DecodeError::UnknownMarker { byte, offset } => {
                write!(fmt, "Unknown marker {byte:#04x} at {offset:x}")
            }
            DecodeError::InvalidRealSize(size) => write!(fmt, "Invalid real size: {size}"),
            DecodeError::InvalidReferenceIndex { index, count } => {
                write!(fmt, "Object reference {index} is outside table of {count} objects")
            }
            DecodeError::CyclicReference { index } => {
                write!(fmt, "Object {index} references itself")
            }
            DecodeError::MaxRecursionDepth => write!(fmt, "Maximum recursion depth exceeded"),
            DecodeError::InvalidArchiveStructure(key) => {
                write!(fmt, "Invalid keyed archive: bad or missing {key}")
            }
            DecodeError::NotABplist => write!(fmt, "Data is not a binary plist"),
            DecodeError::InvalidSignature(signature) => write!(
                fmt,
                "Invalid typedstream signature: {}",
                String::from_utf8_lossy(signature)
            ),
        }
    }
}

impl error::Error for DecodeError {}
