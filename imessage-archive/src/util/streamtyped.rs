/*!
 Contains logic to pull the plain text out of a `typedstream` archived [NSAttributedString](https://developer.apple.com/documentation/foundation/nsattributedstring).

 This is a targeted pattern match on the layout Apple's archiver writes for the string part of an
 attributed string, not a general `typedstream` object graph decoder.

 Tag values referenced from [`typedstream.h`](https://opensource.apple.com/source/gcc/gcc-1493/libobjc/objc/typedstream.h.auto.html).
*/

use crate::error::decode::DecodeError;

/// The only supported streamer version
const STREAMER_VERSION: u8 = 4;
/// Length of both supported signatures
const SIGNATURE_LENGTH: usize = 11;
/// Signature of streams written with little endian integers
const SIGNATURE_LITTLE_ENDIAN: &[u8; SIGNATURE_LENGTH] = b"streamtyped";
/// Signature of streams written with big endian integers
const SIGNATURE_BIG_ENDIAN: &[u8; SIGNATURE_LENGTH] = b"typedstream";
/// Class name that precedes the archived text
const STRING_CLASS: &[u8] = b"NSString";
/// Type encoding for a C string, which introduces the text bytes
const STRING_LITERAL: u8 = 0x2B;
/// Indicates an [`i16`] length follows; `-127` as a signed byte
const I_16: u8 = 0x81;
/// Indicates an [`i32`] length follows; `-126` as a signed byte
const I_32: u8 = 0x82;

/// Byte order of multi-byte integers, fixed by the stream signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Contains logic and data used to read the text of an attributed string
#[derive(Debug)]
pub struct AttributedStringReader<'a> {
    /// The `typedstream` we want to read
    stream: &'a [u8],
    /// The current index we are at in the stream
    idx: usize,
    /// Byte order declared by the signature
    byte_order: ByteOrder,
}

impl<'a> AttributedStringReader<'a> {
    /// Validate the header and determine the byte order of the stream
    ///
    /// The header is the streamer version, the signature length, and the signature.
    pub fn new(stream: &'a [u8]) -> Result<Self, DecodeError> {
        let mut reader = Self {
            stream,
            idx: 0,
            byte_order: ByteOrder::Little,
        };

        let version = reader.read_byte().ok_or(DecodeError::MalformedHeader)?;
        let signature_length = reader.read_byte().ok_or(DecodeError::MalformedHeader)?;
        if version != STREAMER_VERSION || signature_length as usize != SIGNATURE_LENGTH {
            return Err(DecodeError::MalformedHeader);
        }

        let signature = reader
            .read_exact_bytes(SIGNATURE_LENGTH)
            .ok_or(DecodeError::MalformedHeader)?;
        reader.byte_order = match signature {
            s if s == SIGNATURE_LITTLE_ENDIAN => ByteOrder::Little,
            s if s == SIGNATURE_BIG_ENDIAN => ByteOrder::Big,
            other => return Err(DecodeError::InvalidSignature(other.to_vec())),
        };

        Ok(reader)
    }

    /// The byte order declared by the stream signature
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Read the current byte and advance
    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.stream.get(self.idx)?;
        self.idx += 1;
        Some(byte)
    }

    /// Read exactly `n` bytes from the stream
    fn read_exact_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let stream = self.stream;
        let range = stream.get(self.idx..self.idx.checked_add(n)?)?;
        self.idx += n;
        Some(range)
    }

    /// Read the length of the string that follows the literal marker
    ///
    /// Small lengths are stored in a single byte; larger ones are tagged and stored in 2 or 4 bytes.
    fn read_length(&mut self) -> Option<usize> {
        match self.read_byte()? {
            I_16 => {
                let bytes: [u8; 2] = self.read_exact_bytes(2)?.try_into().ok()?;
                Some(match self.byte_order {
                    ByteOrder::Little => u16::from_le_bytes(bytes),
                    ByteOrder::Big => u16::from_be_bytes(bytes),
                } as usize)
            }
            I_32 => {
                let bytes: [u8; 4] = self.read_exact_bytes(4)?.try_into().ok()?;
                let length = match self.byte_order {
                    ByteOrder::Little => i32::from_le_bytes(bytes),
                    ByteOrder::Big => i32::from_be_bytes(bytes),
                };
                usize::try_from(length).ok()
            }
            // Other negative values are reserved tags, not lengths
            byte if byte > 127 => None,
            byte => Some(byte as usize),
        }
    }

    /// Find the text archived after the string class declaration
    pub fn read_text(&mut self) -> Option<String> {
        let class_start = find(&self.stream[self.idx..], STRING_CLASS)? + self.idx;
        self.idx = class_start + STRING_CLASS.len();

        while self.read_byte()? != STRING_LITERAL {}

        let length = self.read_length().filter(|length| *length > 0)?;
        let text = self.read_exact_bytes(length)?;
        String::from_utf8(text.to_vec()).ok()
    }
}

/// Position of the first occurrence of `needle` in `haystack`
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Extract the plain text from a `typedstream` archived attributed string
///
/// Returns `Ok(None)` if the stream has a valid header but holds no readable string.
///
/// # Example:
///
/// ```
/// use imessage_archive::util::streamtyped::extract;
///
/// let mut stream = vec![0x04, 0x0B];
/// stream.extend_from_slice(b"streamtyped");
/// stream.extend_from_slice(&[0x81, 0xE8, 0x03, 0x84, 0x01, 0x40, 0x84, 0x84, 0x84]);
/// stream.extend_from_slice(b"NSString");
/// stream.extend_from_slice(&[0x01, 0x94, 0x84, 0x01, 0x2B, 0x05]);
/// stream.extend_from_slice(b"hello");
///
/// assert_eq!(extract(&stream).unwrap().as_deref(), Some("hello"));
/// ```
pub fn extract(stream: &[u8]) -> Result<Option<String>, DecodeError> {
    Ok(AttributedStringReader::new(stream)?.read_text())
}
