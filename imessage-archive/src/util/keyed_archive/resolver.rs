/*!
 Contains logic to rebuild the object graph stored in a keyed archive.

 An archive is a binary plist whose top level dictionary holds `$objects`, a flat table of every
 archived object, and `$top`, whose `root` entry references the entry point. Objects reference
 each other by index into `$objects`, either with a native UID or with a `{"CF$UID": n}` dictionary.
*/

use std::collections::HashSet;

use crate::{
    error::decode::DecodeError,
    util::{
        bplist::{
            models::{Bplist, BplistValue, ObjectRef},
            parser::{parse_bplist, MAX_DEPTH},
        },
        keyed_archive::models::{ArchiveClass, KeyedValue, Number},
    },
};

/// Key of the single-entry dictionary form of an object reference
pub const CF_UID: &str = "CF$UID";
/// String the archiver stores in place of `nil`
pub const NULL_MARKER: &str = "$null";
/// Prefix of `DigitalTouchBalloonProvider` payloads, which use a different format
pub const DIGITAL_TOUCH_PREFIX: [u8; 4] = [0x08, 0x08, 0x11, 0x00];

/// Contains logic and data used to resolve a keyed archive
#[derive(Debug)]
pub struct KeyedArchiveResolver<'a> {
    /// The decoded binary plist holding the archive
    plist: &'a Bplist,
    /// The value stored at `$top.root`
    root: &'a BplistValue,
    /// The `$objects` table
    objects: &'a [ObjectRef],
    /// Archive indexes on the current resolution path
    visited: HashSet<u64>,
}

impl<'a> KeyedArchiveResolver<'a> {
    /// Locate `$top.root` and `$objects` in a decoded plist
    pub fn new(plist: &'a Bplist) -> Result<Self, DecodeError> {
        let top_level = plist.root();

        let top = plist
            .dictionary_get(top_level, "$top")
            .filter(|top| matches!(top, BplistValue::Dictionary(_)))
            .ok_or_else(|| DecodeError::InvalidArchiveStructure("$top".to_string()))?;
        let root = plist
            .dictionary_get(top, "root")
            .ok_or_else(|| DecodeError::InvalidArchiveStructure("root".to_string()))?;
        let objects = match plist.dictionary_get(top_level, "$objects") {
            Some(BplistValue::Array(objects)) => objects,
            _ => return Err(DecodeError::InvalidArchiveStructure("$objects".to_string())),
        };

        Ok(Self {
            plist,
            root,
            objects,
            visited: HashSet::new(),
        })
    }

    /// Rebuild the archived root object
    ///
    /// Work is kept on an explicit stack, so nesting depth is bounded by [`MAX_DEPTH`] rather than
    /// by the thread's stack.
    pub fn resolve(&mut self) -> Result<KeyedValue, DecodeError> {
        self.visited.clear();
        let mut work = vec![Step::Value(self.root, 0)];
        let mut results: Vec<KeyedValue> = vec![];
        let mut keys: Vec<String> = vec![];

        while let Some(step) = work.pop() {
            match step {
                Step::Value(value, depth) => {
                    self.resolve_value(value, depth, &mut work, &mut results)?;
                }
                Step::Ref(object, depth) => work.push(Step::Value(self.lookup(object)?, depth)),
                Step::Leave(uid) => {
                    self.visited.remove(&uid);
                }
                Step::Collect(count) => {
                    let items = pop_n(&mut results, count)?;
                    results.push(KeyedValue::Array(items));
                }
                Step::Classify(pairs, depth) => {
                    let class = pop(&mut results)?
                        .get("$classname")
                        .and_then(KeyedValue::as_str)
                        .map(ArchiveClass::from_name)
                        .unwrap_or(ArchiveClass::Other);
                    self.classify(class, pairs, depth, &mut work);
                }
                Step::Array(pairs, depth) => match pop(&mut results)? {
                    objects @ KeyedValue::Array(_) => results.push(objects),
                    _ => work.push(Step::Map(pairs, depth)),
                },
                Step::Dictionary(pairs, depth) => {
                    let values = pop(&mut results)?;
                    match (pop(&mut results)?, values) {
                        (KeyedValue::Array(names), KeyedValue::Array(values)) => {
                            results.push(zip_dictionary(names, values)?);
                        }
                        _ => work.push(Step::Map(pairs, depth)),
                    }
                }
                Step::Url(pairs, depth) => {
                    let relative = pop(&mut results)?;
                    let base = pop(&mut results)?;
                    if base == KeyedValue::Null && relative != KeyedValue::Null {
                        results.push(relative);
                    } else {
                        work.push(Step::Map(pairs, depth));
                    }
                }
                Step::Map(pairs, depth) => {
                    work.push(Step::Assemble(pairs.len()));
                    for (key, value) in pairs.iter().rev() {
                        work.push(Step::Ref(*value, depth + 1));
                        work.push(Step::Key);
                        work.push(Step::Ref(*key, depth + 1));
                    }
                }
                Step::Key => {
                    let key = pop(&mut results)?.as_key().ok_or_else(|| {
                        DecodeError::InvalidArchiveStructure("dictionary key".to_string())
                    })?;
                    keys.push(key);
                }
                Step::Assemble(count) => {
                    let values = pop_n(&mut results, count)?;
                    let names = pop_n(&mut keys, count)?;
                    results.push(KeyedValue::Object(names.into_iter().zip(values).collect()));
                }
            }
        }

        pop(&mut results)
    }

    /// If `value` is a reference into `$objects`, get its index
    fn reference(&self, value: &BplistValue) -> Option<u64> {
        match value {
            BplistValue::Uid(uid) => Some(*uid),
            BplistValue::Dictionary(pairs) if pairs.len() == 1 => {
                let (key, value) = pairs[0];
                if self.plist.get(key)?.as_str()? != CF_UID {
                    return None;
                }
                match self.plist.get(value)? {
                    BplistValue::Integer(uid) => u64::try_from(*uid).ok(),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Queue the entry at `uid` in `$objects`
    fn follow(
        &mut self,
        uid: u64,
        depth: usize,
        work: &mut Vec<Step<'a>>,
    ) -> Result<(), DecodeError> {
        let object = usize::try_from(uid)
            .ok()
            .and_then(|idx| self.objects.get(idx))
            .copied()
            .ok_or(DecodeError::InvalidReferenceIndex {
                index: uid,
                count: self.objects.len() as u64,
            })?;

        // Reuse at different positions is fine; reuse inside its own subtree is a cycle
        if !self.visited.insert(uid) {
            return Err(DecodeError::MaxRecursionDepth);
        }
        work.push(Step::Leave(uid));
        work.push(Step::Ref(object, depth + 1));
        Ok(())
    }

    fn lookup(&self, object: ObjectRef) -> Result<&'a BplistValue, DecodeError> {
        let plist: &'a Bplist = self.plist;
        plist
            .get(object)
            .ok_or(DecodeError::InvalidReferenceIndex {
                index: object.index() as u64,
                count: plist.objects().len() as u64,
            })
    }

    /// Push scalars straight onto `results`; queue the children of anything else
    fn resolve_value(
        &mut self,
        value: &'a BplistValue,
        depth: usize,
        work: &mut Vec<Step<'a>>,
        results: &mut Vec<KeyedValue>,
    ) -> Result<(), DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::MaxRecursionDepth);
        }
        if let Some(uid) = self.reference(value) {
            return self.follow(uid, depth, work);
        }

        let resolved = match value {
            BplistValue::Null => KeyedValue::Null,
            BplistValue::Boolean(value) => KeyedValue::Bool(*value),
            BplistValue::Integer(value) => KeyedValue::Number(Number::Integer(*value)),
            BplistValue::Float(value) => KeyedValue::Number(Number::Real(f64::from(*value))),
            BplistValue::Double(value) => KeyedValue::Number(Number::Real(*value)),
            BplistValue::Date(seconds) => KeyedValue::Date(*seconds),
            BplistValue::Data(bytes) | BplistValue::RawString(bytes) => {
                KeyedValue::Binary(bytes.clone())
            }
            BplistValue::String(text) if text == NULL_MARKER => KeyedValue::Null,
            BplistValue::String(text) => KeyedValue::Str(text.clone()),
            BplistValue::Uid(uid) => return self.follow(*uid, depth, work),
            BplistValue::Array(items) | BplistValue::Set(items) => {
                work.push(Step::Collect(items.len()));
                work.extend(items.iter().rev().map(|item| Step::Ref(*item, depth + 1)));
                return Ok(());
            }
            BplistValue::Dictionary(pairs) => {
                match self.entry(pairs, "$class") {
                    Some(class) => {
                        work.push(Step::Classify(pairs, depth));
                        work.push(Step::Value(class, depth + 1));
                    }
                    None => work.push(Step::Map(pairs, depth)),
                }
                return Ok(());
            }
        };
        results.push(resolved);
        Ok(())
    }

    /// Get the value stored under a string key in a dictionary's pairs
    fn entry(&self, pairs: &'a [(ObjectRef, ObjectRef)], key: &str) -> Option<&'a BplistValue> {
        let plist: &'a Bplist = self.plist;
        pairs
            .iter()
            .find(|(k, _)| plist.get(*k).and_then(BplistValue::as_str) == Some(key))
            .and_then(|(_, v)| plist.get(*v))
    }

    /// Queue the transform for an archived object's class, falling back to a plain map
    fn classify(
        &self,
        class: ArchiveClass,
        pairs: &'a [(ObjectRef, ObjectRef)],
        depth: usize,
        work: &mut Vec<Step<'a>>,
    ) {
        match class {
            ArchiveClass::Array => {
                if let Some(objects) = self.entry(pairs, "NS.objects") {
                    work.push(Step::Array(pairs, depth));
                    work.push(Step::Value(objects, depth + 1));
                    return;
                }
            }
            ArchiveClass::Dictionary => {
                if let (Some(keys), Some(values)) =
                    (self.entry(pairs, "NS.keys"), self.entry(pairs, "NS.objects"))
                {
                    work.push(Step::Dictionary(pairs, depth));
                    work.push(Step::Value(values, depth + 1));
                    work.push(Step::Value(keys, depth + 1));
                    return;
                }
            }
            ArchiveClass::Url => {
                if let (Some(base), Some(relative)) =
                    (self.entry(pairs, "NS.base"), self.entry(pairs, "NS.relative"))
                {
                    work.push(Step::Url(pairs, depth));
                    work.push(Step::Value(relative, depth + 1));
                    work.push(Step::Value(base, depth + 1));
                    return;
                }
            }
            ArchiveClass::Other => {}
        }
        work.push(Step::Map(pairs, depth));
    }
}

/// Pending work while resolving an archive
#[derive(Debug)]
enum Step<'a> {
    /// Resolve a value at a nesting depth
    Value(&'a BplistValue, usize),
    /// Resolve the arena slot holding a value
    Ref(ObjectRef, usize),
    /// An archive index is no longer on the current path
    Leave(u64),
    /// Gather the last `n` results into an array
    Collect(usize),
    /// The `$class` of a dictionary is the last result
    Classify(&'a [(ObjectRef, ObjectRef)], usize),
    /// `NS.objects` is the last result
    Array(&'a [(ObjectRef, ObjectRef)], usize),
    /// `NS.keys` and `NS.objects` are the last two results
    Dictionary(&'a [(ObjectRef, ObjectRef)], usize),
    /// `NS.base` and `NS.relative` are the last two results
    Url(&'a [(ObjectRef, ObjectRef)], usize),
    /// Resolve every key and value of a dictionary
    Map(&'a [(ObjectRef, ObjectRef)], usize),
    /// The last result is a dictionary key
    Key,
    /// Gather the last `n` keys and values into an object
    Assemble(usize),
}

fn pop(results: &mut Vec<KeyedValue>) -> Result<KeyedValue, DecodeError> {
    results
        .pop()
        .ok_or_else(|| DecodeError::InvalidArchiveStructure("object graph".to_string()))
}

fn pop_n<T>(stack: &mut Vec<T>, count: usize) -> Result<Vec<T>, DecodeError> {
    let start = stack
        .len()
        .checked_sub(count)
        .ok_or_else(|| DecodeError::InvalidArchiveStructure("object graph".to_string()))?;
    Ok(stack.split_off(start))
}

/// Build an object from parallel `NS.keys` and `NS.objects` arrays; missing values become null
fn zip_dictionary(
    keys: Vec<KeyedValue>,
    values: Vec<KeyedValue>,
) -> Result<KeyedValue, DecodeError> {
    let mut values = values.into_iter();
    keys.into_iter()
        .map(|key| {
            let key = key
                .as_key()
                .ok_or_else(|| DecodeError::InvalidArchiveStructure("NS.keys".to_string()))?;
            Ok((key, values.next().unwrap_or(KeyedValue::Null)))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(KeyedValue::Object)
}

/// Decode a keyed archive stored as a binary plist
///
/// `DigitalTouchBalloonProvider` payloads are not binary plists and yield [`DecodeError::NotABplist`]
/// so callers can skip them quietly.
pub fn unarchive(stream: &[u8]) -> Result<KeyedValue, DecodeError> {
    if stream.starts_with(&DIGITAL_TOUCH_PREFIX) {
        return Err(DecodeError::NotABplist);
    }
    let plist = parse_bplist(stream)?;
    KeyedArchiveResolver::new(&plist)?.resolve()
}
