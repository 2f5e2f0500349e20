mod test_parser;

/// Assemble a `bplist00` stream from encoded objects, using 2 byte offsets
///
/// Object `n` in `objects` becomes object number `n` in the offset table.
#[cfg(test)]
pub(crate) fn assemble(objects: &[Vec<u8>], root: u64, objref_size: u8) -> Vec<u8> {
    let mut stream = b"bplist00".to_vec();
    let mut offsets = vec![];
    for object in objects {
        offsets.push(stream.len() as u64);
        stream.extend_from_slice(object);
    }
    finish(stream, &offsets, root, objref_size)
}

/// Append an offset table and trailer to a stream that already holds the header and objects
#[cfg(test)]
pub(crate) fn finish(mut stream: Vec<u8>, offsets: &[u64], root: u64, objref_size: u8) -> Vec<u8> {
    let table_pos = stream.len() as u64;
    for offset in offsets {
        stream.extend_from_slice(&(*offset as u16).to_be_bytes());
    }
    stream.extend_from_slice(&[0; 6]);
    stream.push(2);
    stream.push(objref_size);
    stream.extend_from_slice(&(offsets.len() as u64).to_be_bytes());
    stream.extend_from_slice(&root.to_be_bytes());
    stream.extend_from_slice(&table_pos.to_be_bytes());
    stream
}
