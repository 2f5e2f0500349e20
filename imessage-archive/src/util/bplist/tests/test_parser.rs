#[cfg(test)]
mod parser_tests {
    use crate::{
        error::decode::DecodeError,
        util::bplist::{
            models::{BplistValue, ObjectRef},
            parser::{parse_bplist, BplistReader, MAX_DEPTH},
            tests::{assemble, finish},
        },
    };

    /// Decode a single object stored as the root
    fn decode_one(object: &[u8]) -> Result<BplistValue, DecodeError> {
        let stream = assemble(&[object.to_vec()], 0, 1);
        parse_bplist(&stream).map(|plist| plist.root().clone())
    }

    #[test]
    fn can_parse_simple_markers() {
        assert_eq!(decode_one(&[0x00]).unwrap(), BplistValue::Null);
        assert_eq!(decode_one(&[0x08]).unwrap(), BplistValue::Boolean(false));
        assert_eq!(decode_one(&[0x09]).unwrap(), BplistValue::Boolean(true));
    }

    #[test]
    fn cant_parse_fill_byte() {
        assert_eq!(
            decode_one(&[0x0F]),
            Err(DecodeError::UnknownMarker {
                byte: 0x0F,
                offset: 8
            })
        );
    }

    #[test]
    fn can_parse_small_ints_unsigned() {
        assert_eq!(decode_one(&[0x10, 0xFF]).unwrap(), BplistValue::Integer(255));
        assert_eq!(
            decode_one(&[0x11, 0xFF, 0xFE]).unwrap(),
            BplistValue::Integer(65534)
        );
        assert_eq!(
            decode_one(&[0x12, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            BplistValue::Integer(4_294_967_295)
        );
    }

    #[test]
    fn can_parse_8_byte_all_ones_as_negative_one() {
        let mut object = vec![0x13];
        object.extend_from_slice(&[0xFF; 8]);
        assert_eq!(decode_one(&object).unwrap(), BplistValue::Integer(-1));
    }

    #[test]
    fn can_parse_8_byte_positive() {
        let mut object = vec![0x13];
        object.extend_from_slice(&0x7FFF_FFFF_FFFF_FFFFi64.to_be_bytes());
        assert_eq!(
            decode_one(&object).unwrap(),
            BplistValue::Integer(i64::MAX as i128)
        );
    }

    #[test]
    fn can_parse_16_byte_signed() {
        let mut object = vec![0x14];
        object.extend_from_slice(&[0xFF; 8]);
        object.extend_from_slice(&0xFFFF_FFFF_FFFF_FFFEu64.to_be_bytes());
        assert_eq!(decode_one(&object).unwrap(), BplistValue::Integer(-2));
    }

    #[test]
    fn can_parse_16_byte_large() {
        let mut object = vec![0x14];
        object.extend_from_slice(&1u64.to_be_bytes());
        object.extend_from_slice(&5u64.to_be_bytes());
        assert_eq!(
            decode_one(&object).unwrap(),
            BplistValue::Integer((1i128 << 64) | 5)
        );
    }

    #[test]
    fn cant_parse_32_byte_int() {
        assert_eq!(
            decode_one(&[0x15, 0x00]),
            Err(DecodeError::UnknownMarker {
                byte: 0x15,
                offset: 8
            })
        );
    }

    #[test]
    fn can_parse_reals() {
        let mut float = vec![0x22];
        float.extend_from_slice(&1.5f32.to_be_bytes());
        assert_eq!(decode_one(&float).unwrap(), BplistValue::Float(1.5));

        let mut double = vec![0x23];
        double.extend_from_slice(&(-0.25f64).to_be_bytes());
        assert_eq!(decode_one(&double).unwrap(), BplistValue::Double(-0.25));
    }

    #[test]
    fn cant_parse_2_byte_real() {
        assert_eq!(
            decode_one(&[0x21, 0x00, 0x00]),
            Err(DecodeError::InvalidRealSize(2))
        );
    }

    #[test]
    fn can_parse_date_from_apple_epoch() {
        let mut object = vec![0x33];
        object.extend_from_slice(&60.0f64.to_be_bytes());
        assert_eq!(
            decode_one(&object).unwrap(),
            BplistValue::Date(978_307_260.0)
        );
    }

    #[test]
    fn cant_parse_bad_date_marker() {
        let mut object = vec![0x34];
        object.extend_from_slice(&0.0f64.to_be_bytes());
        assert_eq!(
            decode_one(&object),
            Err(DecodeError::UnknownMarker {
                byte: 0x34,
                offset: 8
            })
        );
    }

    #[test]
    fn can_parse_data_with_extended_count() {
        let mut object = vec![0x4F, 0x10, 0x10];
        object.extend(0..16u8);
        assert_eq!(
            decode_one(&object).unwrap(),
            BplistValue::Data((0..16u8).collect())
        );
    }

    #[test]
    fn cant_parse_extended_count_without_int_marker() {
        assert_eq!(
            decode_one(&[0x4F, 0x50, 0x00]),
            Err(DecodeError::UnknownMarker {
                byte: 0x50,
                offset: 9
            })
        );
    }

    #[test]
    fn can_parse_ascii_string() {
        let mut object = vec![0x55];
        object.extend_from_slice(b"hello");
        assert_eq!(
            decode_one(&object).unwrap(),
            BplistValue::String("hello".to_string())
        );
    }

    #[test]
    fn can_keep_non_ascii_bytes_raw() {
        assert_eq!(
            decode_one(&[0x52, 0x68, 0xE9]).unwrap(),
            BplistValue::RawString(vec![0x68, 0xE9])
        );
    }

    #[test]
    fn can_parse_utf16_string() {
        assert_eq!(
            decode_one(&[0x62, 0x00, 0x68, 0x00, 0xEF]).unwrap(),
            BplistValue::String("hï".to_string())
        );
    }

    #[test]
    fn can_keep_lone_surrogate_raw() {
        assert_eq!(
            decode_one(&[0x61, 0xD8, 0x00]).unwrap(),
            BplistValue::RawString(vec![0xD8, 0x00])
        );
    }

    #[test]
    fn can_parse_uid_distinct_from_int() {
        let uid = decode_one(&[0x80, 0x05]).unwrap();
        assert_eq!(uid, BplistValue::Uid(5));
        assert_ne!(uid, BplistValue::Integer(5));

        assert_eq!(
            decode_one(&[0x81, 0x01, 0x00]).unwrap(),
            BplistValue::Uid(256)
        );
    }

    #[test]
    fn can_parse_array() {
        let stream = assemble(&[vec![0xA2, 0x01, 0x02], vec![0x10, 0x01], vec![0x09]], 0, 1);
        let plist = parse_bplist(&stream).unwrap();

        let BplistValue::Array(items) = plist.root() else {
            panic!("expected array, got {:?}", plist.root());
        };
        let items: Vec<_> = items.iter().map(|item| plist.get(*item).unwrap()).collect();
        assert_eq!(
            items,
            vec![&BplistValue::Integer(1), &BplistValue::Boolean(true)]
        );
    }

    #[test]
    fn can_parse_dictionary_in_order() {
        let stream = assemble(
            &[
                vec![0xD2, 0x01, 0x02, 0x03, 0x04],
                vec![0x51, b'b'],
                vec![0x51, b'a'],
                vec![0x10, 0x02],
                vec![0x10, 0x01],
            ],
            0,
            1,
        );
        let plist = parse_bplist(&stream).unwrap();

        let BplistValue::Dictionary(pairs) = plist.root() else {
            panic!("expected dictionary, got {:?}", plist.root());
        };
        let keys: Vec<_> = pairs
            .iter()
            .map(|(k, _)| plist.get(*k).and_then(BplistValue::as_str).unwrap())
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(
            plist.dictionary_get(plist.root(), "a"),
            Some(&BplistValue::Integer(1))
        );
        assert_eq!(plist.dictionary_get(plist.root(), "c"), None);
    }

    #[test]
    fn can_deduplicate_set_by_value() {
        let stream = assemble(
            &[
                vec![0xC3, 0x01, 0x02, 0x03],
                vec![0x51, b'a'],
                vec![0x51, b'a'],
                vec![0x51, b'b'],
            ],
            0,
            1,
        );
        let plist = parse_bplist(&stream).unwrap();

        let BplistValue::Set(members) = plist.root() else {
            panic!("expected set, got {:?}", plist.root());
        };
        assert_eq!(members.len(), 2);
        assert_eq!(
            plist.get(members[1]),
            Some(&BplistValue::String("b".to_string()))
        );
    }

    #[test]
    fn can_share_objects_with_same_offset() {
        // Objects 1 and 2 both point at the integer at offset 11
        let mut stream = b"bplist00".to_vec();
        stream.extend_from_slice(&[0xA2, 0x01, 0x02]);
        stream.extend_from_slice(&[0x10, 0x07]);
        let stream = finish(stream, &[8, 11, 11], 0, 1);

        let plist = parse_bplist(&stream).unwrap();

        // One integer and one array, never the integer twice
        assert_eq!(plist.objects().len(), 2);
        let BplistValue::Array(items) = plist.root() else {
            panic!("expected array, got {:?}", plist.root());
        };
        assert_eq!(items[0], items[1]);
        assert!(plist.same_value(items[0], items[1]));
        assert_eq!(plist.get(items[0]), Some(&BplistValue::Integer(7)));
    }

    #[test]
    fn can_compare_equal_values_at_different_offsets() {
        let stream = assemble(
            &[
                vec![0xA2, 0x01, 0x02],
                vec![0xA1, 0x03],
                vec![0xA1, 0x04],
                vec![0x10, 0x01],
                vec![0x10, 0x01],
            ],
            0,
            1,
        );
        let plist = parse_bplist(&stream).unwrap();
        let BplistValue::Array(items) = plist.root() else {
            panic!("expected array, got {:?}", plist.root());
        };
        assert_ne!(items[0], items[1]);
        assert!(plist.same_value(items[0], items[1]));
        assert!(!plist.same_value(items[0], plist.root_ref()));
    }

    #[test]
    fn cant_follow_invalid_reference() {
        let stream = assemble(&[vec![0xA1, 0x09], vec![0x00]], 0, 1);
        assert_eq!(
            parse_bplist(&stream),
            Err(DecodeError::InvalidReferenceIndex { index: 9, count: 2 })
        );
    }

    #[test]
    fn cant_parse_self_referencing_array() {
        let stream = assemble(&[vec![0xA1, 0x00]], 0, 1);
        assert_eq!(
            parse_bplist(&stream),
            Err(DecodeError::CyclicReference { index: 0 })
        );
    }

    #[test]
    fn cant_parse_indirect_cycle() {
        let stream = assemble(&[vec![0xA1, 0x01], vec![0xD1, 0x02, 0x00], vec![0x51, b'k']], 0, 1);
        assert_eq!(
            parse_bplist(&stream),
            Err(DecodeError::CyclicReference { index: 0 })
        );
    }

    #[test]
    fn can_reuse_object_in_siblings() {
        // Not a cycle: the same child appears twice under one parent
        let stream = assemble(&[vec![0xA2, 0x01, 0x01], vec![0xA0]], 0, 1);
        let plist = parse_bplist(&stream).unwrap();
        assert_eq!(plist.objects().len(), 2);
    }

    /// Each object is an array holding the next; the last is null
    fn nested_arrays(depth: usize) -> Vec<u8> {
        let mut objects: Vec<Vec<u8>> = (1..depth as u16)
            .map(|next| {
                let mut array = vec![0xA1];
                array.extend_from_slice(&next.to_be_bytes());
                array
            })
            .collect();
        objects.push(vec![0x00]);
        assemble(&objects, 0, 2)
    }

    #[test]
    fn can_parse_deep_nesting_under_limit() {
        // Default worker thread stack size
        let result = std::thread::spawn(|| {
            parse_bplist(&nested_arrays(MAX_DEPTH)).map(|plist| plist.objects().len())
        })
        .join()
        .unwrap();
        assert_eq!(result, Ok(MAX_DEPTH));
    }

    #[test]
    fn cant_parse_nesting_over_limit() {
        let result = std::thread::spawn(|| parse_bplist(&nested_arrays(MAX_DEPTH + 1)).map(|_| ()))
            .join()
            .unwrap();
        assert_eq!(result, Err(DecodeError::MaxRecursionDepth));
    }

    #[test]
    fn can_compare_deeply_nested_sets() {
        // Two identical chains of nested arrays inside a set collapse into one member
        let chain = MAX_DEPTH as u16 - 2;
        let mut objects: Vec<Vec<u8>> = vec![];
        let mut set = vec![0xC2];
        set.extend_from_slice(&1u16.to_be_bytes());
        set.extend_from_slice(&(chain + 1).to_be_bytes());
        objects.push(set);
        for start in [1, chain + 1] {
            for next in start + 1..start + chain {
                let mut array = vec![0xA1];
                array.extend_from_slice(&next.to_be_bytes());
                objects.push(array);
            }
            objects.push(vec![0x09]);
        }
        let stream = assemble(&objects, 0, 2);

        let members = std::thread::spawn(move || match parse_bplist(&stream) {
            Ok(plist) => match plist.root() {
                BplistValue::Set(members) => Ok(members.len()),
                other => Err(format!("{other:?}")),
            },
            Err(why) => Err(why.to_string()),
        })
        .join()
        .unwrap();
        assert_eq!(members, Ok(1));
    }

    #[test]
    fn cant_parse_bad_magic() {
        let mut stream = assemble(&[vec![0x00]], 0, 1);
        stream[7] = b'1';
        assert_eq!(parse_bplist(&stream), Err(DecodeError::MalformedHeader));
        assert_eq!(
            parse_bplist(b"not a plist at all"),
            Err(DecodeError::MalformedHeader)
        );
    }

    #[test]
    fn cant_parse_short_stream() {
        assert_eq!(parse_bplist(b""), Err(DecodeError::Truncated(0)));
        assert_eq!(parse_bplist(b"bpl"), Err(DecodeError::Truncated(3)));
        assert_eq!(parse_bplist(b"bplist00"), Err(DecodeError::Truncated(8)));
    }

    #[test]
    fn cant_parse_zero_objref_size() {
        let stream = assemble(&[vec![0x00]], 0, 0);
        assert!(matches!(
            parse_bplist(&stream),
            Err(DecodeError::InvalidTrailer(_))
        ));
    }

    #[test]
    fn cant_parse_root_outside_table() {
        let stream = assemble(&[vec![0x00]], 1, 1);
        assert!(matches!(
            parse_bplist(&stream),
            Err(DecodeError::InvalidTrailer(_))
        ));
    }

    #[test]
    fn can_read_trailer() {
        let stream = assemble(&[vec![0x00], vec![0x09]], 1, 1);
        let reader = BplistReader::new(&stream).unwrap();
        let trailer = reader.trailer();
        assert_eq!(trailer.offset_int_size, 2);
        assert_eq!(trailer.objref_size, 1);
        assert_eq!(trailer.num_objects, 2);
        assert_eq!(trailer.root_object_index, 1);
        assert_eq!(trailer.offset_table_pos, 10);
    }

    #[test]
    fn cant_parse_offset_past_end() {
        let mut stream = b"bplist00".to_vec();
        stream.push(0x00);
        let stream = finish(stream, &[0x7FFF], 0, 1);
        assert_eq!(
            parse_bplist(&stream),
            Err(DecodeError::OutOfBounds {
                offset: 0x7FFF,
                len: 1
            })
        );
    }

    #[test]
    fn cant_parse_offset_table_past_end() {
        let mut stream = assemble(&[vec![0x00]], 0, 1);
        let len = stream.len();
        // Claim far more objects than the offset table holds
        stream[len - 24..len - 16].copy_from_slice(&1000u64.to_be_bytes());
        assert!(matches!(
            parse_bplist(&stream),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn cant_parse_huge_extended_count() {
        let mut object = vec![0xAF, 0x13];
        object.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(
            decode_one(&object),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn can_survive_every_truncation() {
        let stream = assemble(
            &[
                vec![0xD2, 0x01, 0x02, 0x03, 0x04],
                vec![0x54, b'n', b'a', b'm', b'e'],
                vec![0x51, b'k'],
                vec![0xA2, 0x05, 0x06],
                vec![0x62, 0x00, 0x68, 0x00, 0x69],
                vec![0x23, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0],
                vec![0x80, 0x02],
            ],
            0,
            1,
        );
        let full = parse_bplist(&stream).unwrap();

        for len in 0..=stream.len() {
            match parse_bplist(&stream[..len]) {
                Ok(plist) => assert_eq!(plist, full, "prefix of {len} bytes"),
                Err(why) => assert!(
                    matches!(
                        why,
                        DecodeError::Truncated(_)
                            | DecodeError::OutOfBounds { .. }
                            | DecodeError::InvalidTrailer(_)
                            | DecodeError::UnknownMarker { .. }
                    ),
                    "prefix of {len} bytes: {why:?}"
                ),
            }
        }
    }

    #[test]
    fn can_report_unknown_high_nibble() {
        let stream = assemble(&[vec![0xA1, 0x01], vec![0x70]], 0, 1);
        assert_eq!(
            parse_bplist(&stream),
            Err(DecodeError::UnknownMarker {
                byte: 0x70,
                offset: 10
            })
        );
    }

    #[test]
    fn can_expose_object_indexes() {
        let stream = assemble(&[vec![0xA1, 0x01], vec![0x09]], 0, 1);
        let plist = parse_bplist(&stream).unwrap();
        assert_eq!(plist.root_ref(), ObjectRef(1));
        assert_eq!(plist.root_ref().index(), 1);
    }
}
