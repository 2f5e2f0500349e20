/*!
 Data structures produced when resolving an [`NSKeyedArchiver`](https://developer.apple.com/documentation/foundation/nskeyedarchiver) object graph.
*/

/// A number stored in the archive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer types are coerced into this container
    Integer(i128),
    /// Single and double precision floats are coerced into this container
    Real(f64),
}

/// A value reconstructed from a keyed archive
#[derive(Debug, Clone, PartialEq)]
pub enum KeyedValue {
    /// `$null` or a plist null
    Null,
    Bool(bool),
    Number(Number),
    /// Seconds since the Unix epoch
    Date(f64),
    /// Valid text
    Str(String),
    /// Archived bytes, or string bytes that are not valid text
    Binary(Vec<u8>),
    Array(Vec<KeyedValue>),
    /// String keys in archive order
    Object(Vec<(String, KeyedValue)>),
}

impl KeyedValue {
    /// Look up the value stored under `key` in a [`KeyedValue::Object`]
    pub fn get(&self, key: &str) -> Option<&KeyedValue> {
        match self {
            KeyedValue::Object(entries) => entries
                .iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Borrow the text of a [`KeyedValue::Str`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyedValue::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Text used when this value is a dictionary key
    ///
    /// Only scalars can be keys; containers return [`None`].
    pub(crate) fn as_key(&self) -> Option<String> {
        match self {
            KeyedValue::Str(text) => Some(text.clone()),
            KeyedValue::Number(Number::Integer(int)) => Some(int.to_string()),
            KeyedValue::Number(Number::Real(real)) => Some(real.to_string()),
            KeyedValue::Bool(value) => Some(value.to_string()),
            KeyedValue::Null => Some(String::from("null")),
            _ => None,
        }
    }
}

/// Classes whose archived representation is collapsed into a simpler value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveClass {
    /// `NSArray`, `NSMutableArray`, `NSSet`, `NSMutableSet`; keeps `NS.objects`
    Array,
    /// `NSDictionary`, `NSMutableDictionary`; zips `NS.keys` with `NS.objects`
    Dictionary,
    /// `NSURL`; a URL without a base becomes its `NS.relative` string
    Url,
    /// Any other class is kept as a plain map
    Other,
}

impl ArchiveClass {
    pub fn from_name(name: &str) -> Self {
        match name {
            "NSArray" | "NSMutableArray" | "NSSet" | "NSMutableSet" => Self::Array,
            "NSDictionary" | "NSMutableDictionary" => Self::Dictionary,
            "NSURL" => Self::Url,
            _ => Self::Other,
        }
    }
}
