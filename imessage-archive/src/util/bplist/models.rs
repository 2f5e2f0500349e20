/*!
 Data structures produced when decoding a binary property list.

 The object graph is stored as an arena: every decoded object lives in [`Bplist::objects`]
 and containers refer to their children with [`ObjectRef`] indexes into that arena.
*/

use crate::util::bplist::parser::same_value_in;

/// Length of the `bplist00` magic at the start of the stream
pub const HEADER_LEN: usize = 8;
/// Length of the trailer at the end of the stream
pub const TRAILER_LEN: usize = 32;

/// Index of a decoded object inside a [`Bplist`] arena
///
/// Two object table entries that point at the same byte offset share a single [`ObjectRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub(crate) usize);

impl ObjectRef {
    /// The position of the referenced object in [`Bplist::objects`]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The fixed-layout block at the end of a binary plist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Width in bytes of each entry in the offset table
    pub offset_int_size: u8,
    /// Width in bytes of each object reference inside arrays, sets, and dictionaries
    pub objref_size: u8,
    /// Number of entries in the offset table
    pub num_objects: u64,
    /// Offset table entry of the top level object
    pub root_object_index: u64,
    /// Byte position of the offset table
    pub offset_table_pos: u64,
}

impl Trailer {
    /// Read the trailer fields from the last [`TRAILER_LEN`] bytes of a stream
    pub(crate) fn from_bytes(bytes: &[u8; TRAILER_LEN]) -> Self {
        let read_u64 = |start: usize| {
            let mut field = [0; 8];
            field.copy_from_slice(&bytes[start..start + 8]);
            u64::from_be_bytes(field)
        };
        Self {
            offset_int_size: bytes[6],
            objref_size: bytes[7],
            num_objects: read_u64(8),
            root_object_index: read_u64(16),
            offset_table_pos: read_u64(24),
        }
    }
}

/// A single object decoded from a binary plist
#[derive(Debug, Clone, PartialEq)]
pub enum BplistValue {
    /// `0x00`
    Null,
    /// `0x08` and `0x09`
    Boolean(bool),
    /// 1, 2, and 4 byte integers are unsigned; 8 and 16 byte integers are two's complement
    Integer(i128),
    /// Single precision real
    Float(f32),
    /// Double precision real
    Double(f64),
    /// Seconds since the Unix epoch, already shifted from the Apple epoch
    Date(f64),
    /// Opaque bytes
    Data(Vec<u8>),
    /// Text from an ASCII or UTF-16 string object
    String(String),
    /// String object bytes that are not valid in their declared encoding
    RawString(Vec<u8>),
    /// A keyed archive reference, never conflated with [`BplistValue::Integer`]
    Uid(u64),
    /// Ordered children
    Array(Vec<ObjectRef>),
    /// Children with duplicates removed
    Set(Vec<ObjectRef>),
    /// Ordered key and value pairs
    Dictionary(Vec<(ObjectRef, ObjectRef)>),
}

impl BplistValue {
    /// Borrow the text of a [`BplistValue::String`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BplistValue::String(text) => Some(text),
            _ => None,
        }
    }
}

/// A decoded binary plist
#[derive(Debug, Clone, PartialEq)]
pub struct Bplist {
    /// Every distinct object reachable from the root, children before their parents
    pub(crate) objects: Vec<BplistValue>,
    /// The top level object
    pub(crate) root: ObjectRef,
}

impl Bplist {
    /// All decoded objects in the arena
    pub fn objects(&self) -> &[BplistValue] {
        &self.objects
    }

    /// Reference to the top level object
    pub fn root_ref(&self) -> ObjectRef {
        self.root
    }

    /// The top level object
    pub fn root(&self) -> &BplistValue {
        &self.objects[self.root.0]
    }

    /// Get an object from the arena
    pub fn get(&self, object: ObjectRef) -> Option<&BplistValue> {
        self.objects.get(object.0)
    }

    /// Look up the value stored under a string key in a [`BplistValue::Dictionary`]
    pub fn dictionary_get(&self, dictionary: &BplistValue, key: &str) -> Option<&BplistValue> {
        match dictionary {
            BplistValue::Dictionary(pairs) => pairs
                .iter()
                .find(|(k, _)| self.get(*k).and_then(BplistValue::as_str) == Some(key))
                .and_then(|(_, v)| self.get(*v)),
            _ => None,
        }
    }

    /// Structural equality of two objects in this arena
    ///
    /// Objects that came from the same byte offset share a reference and compare equal immediately.
    pub fn same_value(&self, left: ObjectRef, right: ObjectRef) -> bool {
        same_value_in(&self.objects, left, right)
    }
}
