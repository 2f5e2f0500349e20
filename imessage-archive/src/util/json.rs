/*!
 Converts decoded archives and property lists into [`JsonValue`]s for output.
*/

use base64::{prelude::BASE64_STANDARD, Engine};
use json::{object::Object, JsonValue};

use crate::util::{
    bplist::models::{Bplist, BplistValue, ObjectRef},
    dates::format_unix_seconds,
    keyed_archive::{
        models::{KeyedValue, Number},
        resolver::CF_UID,
    },
};

/// Integers that fit in 64 bits stay numbers; anything wider becomes a decimal string
fn integer(value: i128) -> JsonValue {
    if let Ok(value) = i64::try_from(value) {
        JsonValue::from(value)
    } else if let Ok(value) = u64::try_from(value) {
        JsonValue::from(value)
    } else {
        JsonValue::from(value.to_string())
    }
}

/// JSON has no representation for `NaN` or infinities
fn real(value: f64) -> JsonValue {
    if value.is_finite() {
        JsonValue::from(value)
    } else {
        JsonValue::Null
    }
}

/// Dates outside the representable range keep their raw seconds
fn date(seconds: f64) -> JsonValue {
    match format_unix_seconds(seconds) {
        Some(timestamp) => JsonValue::from(timestamp),
        None => real(seconds),
    }
}

fn binary(bytes: &[u8]) -> JsonValue {
    JsonValue::from(BASE64_STANDARD.encode(bytes))
}

/// Convert a resolved keyed archive value
///
/// # Example:
///
/// ```
/// use imessage_archive::util::{
///     json::keyed_to_json,
///     keyed_archive::models::{KeyedValue, Number},
/// };
///
/// let value = KeyedValue::Object(vec![
///     ("b".to_string(), KeyedValue::Number(Number::Integer(1))),
///     ("a".to_string(), KeyedValue::Binary(vec![0, 1, 2])),
/// ]);
/// assert_eq!(keyed_to_json(&value).dump(), r#"{"b":1,"a":"AAEC"}"#);
/// ```
pub fn keyed_to_json(value: &KeyedValue) -> JsonValue {
    match value {
        KeyedValue::Null => JsonValue::Null,
        KeyedValue::Bool(value) => JsonValue::Boolean(*value),
        KeyedValue::Number(Number::Integer(value)) => integer(*value),
        KeyedValue::Number(Number::Real(value)) => real(*value),
        KeyedValue::Date(seconds) => date(*seconds),
        KeyedValue::Str(text) => JsonValue::from(text.as_str()),
        KeyedValue::Binary(bytes) => binary(bytes),
        KeyedValue::Array(items) => JsonValue::Array(items.iter().map(keyed_to_json).collect()),
        KeyedValue::Object(entries) => {
            let mut object = Object::with_capacity(entries.len());
            for (key, value) in entries {
                object.insert(key, keyed_to_json(value));
            }
            JsonValue::Object(object)
        }
    }
}

/// Convert a decoded binary plist, starting at its root object
pub fn bplist_to_json(plist: &Bplist) -> JsonValue {
    bplist_object_to_json(plist, plist.root_ref())
}

/// Convert a single object of a decoded binary plist and everything it contains
pub fn bplist_object_to_json(plist: &Bplist, object: ObjectRef) -> JsonValue {
    let Some(value) = plist.get(object) else {
        return JsonValue::Null;
    };
    match value {
        BplistValue::Null => JsonValue::Null,
        BplistValue::Boolean(value) => JsonValue::Boolean(*value),
        BplistValue::Integer(value) => integer(*value),
        BplistValue::Float(value) => real(f64::from(*value)),
        BplistValue::Double(value) => real(*value),
        BplistValue::Date(seconds) => date(*seconds),
        BplistValue::Data(bytes) | BplistValue::RawString(bytes) => binary(bytes),
        BplistValue::String(text) => JsonValue::from(text.as_str()),
        BplistValue::Uid(uid) => {
            let mut reference = Object::with_capacity(1);
            reference.insert(CF_UID, JsonValue::from(*uid));
            JsonValue::Object(reference)
        }
        BplistValue::Array(items) | BplistValue::Set(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| bplist_object_to_json(plist, *item))
                .collect(),
        ),
        BplistValue::Dictionary(pairs) => {
            let mut object = Object::with_capacity(pairs.len());
            for (key, value) in pairs {
                // Non-string keys are rare; use their JSON text
                let key = match plist.get(*key).and_then(BplistValue::as_str) {
                    Some(key) => key.to_string(),
                    None => bplist_object_to_json(plist, *key).dump(),
                };
                object.insert(&key, bplist_object_to_json(plist, *value));
            }
            JsonValue::Object(object)
        }
    }
}
