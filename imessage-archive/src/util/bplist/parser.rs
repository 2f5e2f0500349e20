/*!
 Contains logic to decode Apple's binary property list (`bplist00`) container format into a [`Bplist`] arena.

 Layout referenced from [`CFBinaryPList.c`](https://opensource.apple.com/source/CF/CF-855.17/CFBinaryPList.c).
*/

use std::collections::{HashMap, HashSet};

use crate::{
    error::decode::DecodeError,
    util::{
        bplist::models::{Bplist, BplistValue, ObjectRef, Trailer, HEADER_LEN, TRAILER_LEN},
        dates::APPLE_EPOCH_OFFSET,
    },
};

/// Magic bytes at the start of every supported stream
pub const MAGIC: &[u8; HEADER_LEN] = b"bplist00";
/// Deepest chain of nested containers we will follow
pub const MAX_DEPTH: usize = 1000;

/// `null`, `false`, `true`
const SIMPLE: u8 = 0x0;
/// Integer, `2^n` bytes
const INT: u8 = 0x1;
/// Real, `2^n` bytes
const REAL: u8 = 0x2;
/// Date, always marker `0x33`
const DATE: u8 = 0x3;
/// Raw bytes
const DATA: u8 = 0x4;
/// ASCII string
const ASCII_STRING: u8 = 0x5;
/// Big endian UTF-16 string
const UTF16_STRING: u8 = 0x6;
/// Keyed archive reference, `n + 1` bytes
const UID: u8 = 0x8;
/// Ordered object references
const ARRAY: u8 = 0xA;
/// Unordered object references
const SET: u8 = 0xC;
/// Key references followed by value references
const DICT: u8 = 0xD;

/// The only valid date marker
const DATE_MARKER: u8 = 0x33;
/// Low nibble indicating the count is stored in a following integer object
const EXTENDED_COUNT: u8 = 0xF;

/// Contains logic and data used to decode a binary plist
#[derive(Debug)]
pub struct BplistReader<'a> {
    /// The binary plist we want to decode
    stream: &'a [u8],
    /// Sizes and positions read from the end of the stream
    trailer: Trailer,
    /// Byte offset of each object, indexed by object number
    offsets: Vec<usize>,
    /// Arena of decoded objects
    objects: Vec<BplistValue>,
    /// Byte offsets that have already been decoded, mapped to their arena slot
    parsed: HashMap<usize, ObjectRef>,
    /// Byte offsets of the containers whose children are still being decoded
    in_progress: HashSet<usize>,
}

/// A container whose children are still being decoded
#[derive(Debug)]
struct Pending {
    /// Byte offset of the container's marker
    offset: usize,
    /// High nibble of the container's marker
    kind: u8,
    /// Object numbers of the children in decode order; dictionaries alternate key and value
    refs: Vec<u64>,
    /// Children decoded so far
    children: Vec<ObjectRef>,
}

impl<'a> BplistReader<'a> {
    /// Validate the header and trailer and read the offset table
    pub fn new(stream: &'a [u8]) -> Result<Self, DecodeError> {
        let magic_len = stream.len().min(HEADER_LEN);
        if stream[..magic_len] != MAGIC[..magic_len] {
            return Err(DecodeError::MalformedHeader);
        }
        if stream.len() < HEADER_LEN + TRAILER_LEN {
            return Err(DecodeError::Truncated(stream.len()));
        }

        let mut trailer_bytes = [0; TRAILER_LEN];
        trailer_bytes.copy_from_slice(&stream[stream.len() - TRAILER_LEN..]);
        let trailer = Trailer::from_bytes(&trailer_bytes);
        Self::validate_trailer(&trailer)?;

        let mut reader = Self {
            stream,
            trailer,
            offsets: vec![],
            objects: vec![],
            parsed: HashMap::new(),
            in_progress: HashSet::new(),
        };
        reader.offsets = reader.read_offset_table()?;
        Ok(reader)
    }

    fn validate_trailer(trailer: &Trailer) -> Result<(), DecodeError> {
        if !(1..=8).contains(&trailer.offset_int_size) {
            return Err(DecodeError::InvalidTrailer(format!(
                "offset size {}",
                trailer.offset_int_size
            )));
        }
        if !(1..=8).contains(&trailer.objref_size) {
            return Err(DecodeError::InvalidTrailer(format!(
                "object reference size {}",
                trailer.objref_size
            )));
        }
        if trailer.num_objects < 1 {
            return Err(DecodeError::InvalidTrailer("no objects".to_string()));
        }
        if trailer.root_object_index >= trailer.num_objects {
            return Err(DecodeError::InvalidTrailer(format!(
                "root {} not in {} objects",
                trailer.root_object_index, trailer.num_objects
            )));
        }
        Ok(())
    }

    /// Read the table of object byte offsets
    fn read_offset_table(&self) -> Result<Vec<usize>, DecodeError> {
        let width = self.trailer.offset_int_size as usize;
        let start = to_usize(self.trailer.offset_table_pos, 0)?;
        let len = to_usize(self.trailer.num_objects, start)?
            .checked_mul(width)
            .ok_or(DecodeError::OutOfBounds {
                offset: start,
                len: usize::MAX,
            })?;

        self.read_exact_bytes(start, len)?
            .chunks_exact(width)
            .map(|entry| to_usize(read_be_uint(entry), 0))
            .collect()
    }

    /// Get `n` bytes starting at `offset`, if they are within the bounds of the stream
    fn read_exact_bytes(&self, offset: usize, n: usize) -> Result<&'a [u8], DecodeError> {
        let stream = self.stream;
        offset
            .checked_add(n)
            .and_then(|end| stream.get(offset..end))
            .ok_or(DecodeError::OutOfBounds { offset, len: n })
    }

    /// Get the byte at a given offset
    fn get_byte(&self, offset: usize) -> Result<u8, DecodeError> {
        self.stream
            .get(offset)
            .copied()
            .ok_or(DecodeError::OutOfBounds { offset, len: 1 })
    }

    /// Read the object count that follows a marker
    ///
    /// Counts below 15 live in the low nibble; otherwise an integer object follows the marker.
    /// Returns the count and the offset of the first payload byte.
    fn read_count(&self, offset: usize, low: u8) -> Result<(usize, usize), DecodeError> {
        if low != EXTENDED_COUNT {
            return Ok((low as usize, offset + 1));
        }

        let int_offset = offset + 1;
        let int_marker = self.get_byte(int_offset)?;
        let exponent = int_marker & 0x0F;
        if int_marker >> 4 != INT || exponent > 3 {
            return Err(DecodeError::UnknownMarker {
                byte: int_marker,
                offset: int_offset,
            });
        }

        let size = 1 << exponent;
        let count = read_be_uint(self.read_exact_bytes(int_offset + 1, size)?);
        Ok((to_usize(count, int_offset)?, int_offset + 1 + size))
    }

    /// Read `count` object references of the trailer's reference width
    fn read_refs(&self, start: usize, count: usize) -> Result<Vec<u64>, DecodeError> {
        let width = self.trailer.objref_size as usize;
        let len = count
            .checked_mul(width)
            .ok_or(DecodeError::OutOfBounds {
                offset: start,
                len: usize::MAX,
            })?;
        Ok(self
            .read_exact_bytes(start, len)?
            .chunks_exact(width)
            .map(read_be_uint)
            .collect())
    }

    /// Decode the object at `index` in the offset table and everything it contains
    ///
    /// Containers wait on an explicit stack while their children are decoded, so nesting depth
    /// is bounded by [`MAX_DEPTH`] rather than by the thread's stack.
    fn read_object(&mut self, index: u64) -> Result<ObjectRef, DecodeError> {
        let mut pending: Vec<Pending> = vec![];
        let mut finished = self.open(index, &mut pending)?;

        while let Some(parent) = pending.last_mut() {
            if let Some(object) = finished.take() {
                parent.children.push(object);
            }
            finished = match parent.refs.get(parent.children.len()).copied() {
                Some(child) => self.open(child, &mut pending)?,
                None => pending.pop().map(|container| self.close(container)),
            };
        }

        finished.ok_or(DecodeError::InvalidReferenceIndex {
            index,
            count: self.trailer.num_objects,
        })
    }

    /// Start decoding the object at `index`
    ///
    /// Scalars and already-decoded objects are returned immediately. Containers are pushed onto
    /// `pending` and yield [`None`] until their children are done.
    fn open(
        &mut self,
        index: u64,
        pending: &mut Vec<Pending>,
    ) -> Result<Option<ObjectRef>, DecodeError> {
        let offset = usize::try_from(index)
            .ok()
            .and_then(|idx| self.offsets.get(idx))
            .copied()
            .ok_or(DecodeError::InvalidReferenceIndex {
                index,
                count: self.trailer.num_objects,
            })?;

        if let Some(object) = self.parsed.get(&offset) {
            return Ok(Some(*object));
        }
        if pending.len() >= MAX_DEPTH {
            return Err(DecodeError::MaxRecursionDepth);
        }
        if self.in_progress.contains(&offset) {
            return Err(DecodeError::CyclicReference { index });
        }

        let marker = self.get_byte(offset)?;
        let low = marker & 0x0F;
        let refs = match marker >> 4 {
            ARRAY | SET => {
                let (count, start) = self.read_count(offset, low)?;
                self.read_refs(start, count)?
            }
            DICT => {
                let (count, start) = self.read_count(offset, low)?;
                let refs = self.read_refs(start, count.saturating_mul(2))?;
                let (keys, values) = refs.split_at(count);
                keys.iter()
                    .zip(values)
                    .flat_map(|(key, value)| [*key, *value])
                    .collect()
            }
            _ => {
                let value = self.read_value(offset)?;
                return Ok(Some(self.store(offset, value)));
            }
        };

        self.in_progress.insert(offset);
        pending.push(Pending {
            offset,
            kind: marker >> 4,
            children: Vec::with_capacity(refs.len()),
            refs,
        });
        Ok(None)
    }

    /// Build a container once all of its children are decoded
    fn close(&mut self, container: Pending) -> ObjectRef {
        self.in_progress.remove(&container.offset);
        let value = match container.kind {
            ARRAY => BplistValue::Array(container.children),
            SET => {
                let mut members: Vec<ObjectRef> = Vec::with_capacity(container.children.len());
                for member in container.children {
                    if !members.iter().any(|seen| self.same_value(*seen, member)) {
                        members.push(member);
                    }
                }
                BplistValue::Set(members)
            }
            _ => BplistValue::Dictionary(
                container
                    .children
                    .chunks_exact(2)
                    .map(|pair| (pair[0], pair[1]))
                    .collect(),
            ),
        };
        self.store(container.offset, value)
    }

    /// Add a decoded object to the arena and remember its offset
    fn store(&mut self, offset: usize, value: BplistValue) -> ObjectRef {
        let object = ObjectRef(self.objects.len());
        self.objects.push(value);
        self.parsed.insert(offset, object);
        object
    }

    /// Decode the scalar object whose marker byte is at `offset`
    fn read_value(&self, offset: usize) -> Result<BplistValue, DecodeError> {
        let marker = self.get_byte(offset)?;
        let unknown = DecodeError::UnknownMarker {
            byte: marker,
            offset,
        };
        let low = marker & 0x0F;

        match marker >> 4 {
            SIMPLE => match marker {
                0x00 => Ok(BplistValue::Null),
                0x08 => Ok(BplistValue::Boolean(false)),
                0x09 => Ok(BplistValue::Boolean(true)),
                _ => Err(unknown),
            },
            INT => {
                if low > 4 {
                    return Err(unknown);
                }
                let bytes = self.read_exact_bytes(offset + 1, 1 << low)?;
                Ok(BplistValue::Integer(read_integer(bytes)))
            }
            REAL => {
                let size = 1usize << low;
                match size {
                    4 => {
                        let mut value = [0; 4];
                        value.copy_from_slice(self.read_exact_bytes(offset + 1, 4)?);
                        Ok(BplistValue::Float(f32::from_be_bytes(value)))
                    }
                    8 => Ok(BplistValue::Double(self.read_double(offset + 1)?)),
                    _ => Err(DecodeError::InvalidRealSize(size)),
                }
            }
            DATE => {
                if marker != DATE_MARKER {
                    return Err(unknown);
                }
                Ok(BplistValue::Date(
                    self.read_double(offset + 1)? + APPLE_EPOCH_OFFSET,
                ))
            }
            DATA => {
                let (count, start) = self.read_count(offset, low)?;
                Ok(BplistValue::Data(self.read_exact_bytes(start, count)?.to_vec()))
            }
            ASCII_STRING => {
                let (count, start) = self.read_count(offset, low)?;
                let bytes = self.read_exact_bytes(start, count)?;
                if bytes.is_ascii() {
                    // ASCII is always valid UTF-8
                    Ok(BplistValue::String(
                        String::from_utf8_lossy(bytes).into_owned(),
                    ))
                } else {
                    Ok(BplistValue::RawString(bytes.to_vec()))
                }
            }
            UTF16_STRING => {
                let (count, start) = self.read_count(offset, low)?;
                let len = count.checked_mul(2).ok_or(DecodeError::OutOfBounds {
                    offset: start,
                    len: usize::MAX,
                })?;
                let bytes = self.read_exact_bytes(start, len)?;
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|unit| u16::from_be_bytes([unit[0], unit[1]]))
                    .collect();
                match String::from_utf16(&units) {
                    Ok(text) => Ok(BplistValue::String(text)),
                    Err(_) => Ok(BplistValue::RawString(bytes.to_vec())),
                }
            }
            UID => {
                let size = low as usize + 1;
                if size > 8 {
                    return Err(unknown);
                }
                let bytes = self.read_exact_bytes(offset + 1, size)?;
                Ok(BplistValue::Uid(read_be_uint(bytes)))
            }
            _ => Err(unknown),
        }
    }

    /// Read a big endian double at `offset`
    fn read_double(&self, offset: usize) -> Result<f64, DecodeError> {
        let mut value = [0; 8];
        value.copy_from_slice(self.read_exact_bytes(offset, 8)?);
        Ok(f64::from_be_bytes(value))
    }

    /// Structural equality over the objects decoded so far
    fn same_value(&self, left: ObjectRef, right: ObjectRef) -> bool {
        same_value_in(&self.objects, left, right)
    }

    /// Decode the object graph reachable from the root object
    pub fn parse(mut self) -> Result<Bplist, DecodeError> {
        let root = self.read_object(self.trailer.root_object_index)?;
        Ok(Bplist {
            objects: self.objects,
            root,
        })
    }

    /// Sizes and positions read from the trailer
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }
}

/// Decode a binary plist
///
/// # Example:
///
/// ```
/// use imessage_archive::util::bplist::{models::BplistValue, parser::parse_bplist};
///
/// let mut stream = b"bplist00".to_vec();
/// stream.push(0x09); // true, at offset 8
/// stream.push(8); // offset table
/// stream.extend_from_slice(&[0, 0, 0, 0, 0, 0, 1, 1]);
/// stream.extend_from_slice(&1u64.to_be_bytes());
/// stream.extend_from_slice(&0u64.to_be_bytes());
/// stream.extend_from_slice(&9u64.to_be_bytes());
///
/// let plist = parse_bplist(&stream).unwrap();
/// assert_eq!(plist.root(), &BplistValue::Boolean(true));
/// ```
pub fn parse_bplist(stream: &[u8]) -> Result<Bplist, DecodeError> {
    BplistReader::new(stream)?.parse()
}

/// Structural equality of two arena slots
pub(crate) fn same_value_in(objects: &[BplistValue], left: ObjectRef, right: ObjectRef) -> bool {
    let mut unchecked = vec![(left, right)];
    while let Some((left, right)) = unchecked.pop() {
        if left == right {
            continue;
        }
        match (objects.get(left.0), objects.get(right.0)) {
            (Some(BplistValue::Array(a)), Some(BplistValue::Array(b)))
            | (Some(BplistValue::Set(a)), Some(BplistValue::Set(b))) => {
                if a.len() != b.len() {
                    return false;
                }
                unchecked.extend(a.iter().copied().zip(b.iter().copied()));
            }
            (Some(BplistValue::Dictionary(a)), Some(BplistValue::Dictionary(b))) => {
                if a.len() != b.len() {
                    return false;
                }
                for ((a_key, a_value), (b_key, b_value)) in a.iter().zip(b) {
                    unchecked.push((*a_key, *b_key));
                    unchecked.push((*a_value, *b_value));
                }
            }
            (Some(a), Some(b)) if a == b => {}
            _ => return false,
        }
    }
    true
}

/// Interpret up to 8 big endian bytes as an unsigned integer
fn read_be_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// 1, 2, and 4 byte integers are unsigned; 8 and 16 byte integers are two's complement
fn read_integer(bytes: &[u8]) -> i128 {
    match bytes.len() {
        8 => {
            let mut value = [0; 8];
            value.copy_from_slice(bytes);
            i128::from(i64::from_be_bytes(value))
        }
        16 => {
            let mut value = [0; 16];
            value.copy_from_slice(bytes);
            i128::from_be_bytes(value)
        }
        _ => i128::from(read_be_uint(bytes)),
    }
}

/// Convert a value read from the stream into a position, reporting values that cannot address memory
fn to_usize(value: u64, offset: usize) -> Result<usize, DecodeError> {
    usize::try_from(value).map_err(|_| DecodeError::OutOfBounds {
        offset,
        len: usize::MAX,
    })
}
