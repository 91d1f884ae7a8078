use super::*;
use bytes::Bytes;
use std::collections::BTreeMap;

#[test]
fn test_decode_integer() {
    assert_eq!(decode(b"i42e").unwrap().as_integer(), Some(42));
    assert_eq!(decode(b"i0e").unwrap().as_integer(), Some(0));
    assert_eq!(decode(b"i-17e").unwrap().as_integer(), Some(-17));
}

#[test]
fn test_decode_integer_rejects_malformed() {
    assert!(matches!(decode(b"ie"), Err(BencodeError::InvalidInteger(_))));
    assert!(matches!(
        decode(b"i007e"),
        Err(BencodeError::InvalidInteger(_))
    ));
    assert!(matches!(
        decode(b"i-0e"),
        Err(BencodeError::InvalidInteger(_))
    ));
    assert!(matches!(decode(b"i42"), Err(BencodeError::UnexpectedEof)));
}

#[test]
fn test_decode_byte_string() {
    let v = decode(b"4:spam").unwrap();
    assert_eq!(v.as_str(), Some("spam"));

    let v = decode(b"0:").unwrap();
    assert_eq!(v.as_bytes().map(|b| b.len()), Some(0));
}

#[test]
fn test_decode_byte_string_truncated() {
    assert!(matches!(decode(b"5:spam"), Err(BencodeError::UnexpectedEof)));
    assert!(matches!(
        decode(b"4x:spam"),
        Err(BencodeError::InvalidStringLength)
    ));
}

#[test]
fn test_decode_list() {
    let v = decode(b"l4:spami42ee").unwrap();
    let list = v.as_list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].as_str(), Some("spam"));
    assert_eq!(list[1].as_integer(), Some(42));
}

#[test]
fn test_decode_dict() {
    let v = decode(b"d3:bar4:spam3:fooi42ee").unwrap();
    assert_eq!(v.get(b"bar").and_then(|v| v.as_str()), Some("spam"));
    assert_eq!(v.get(b"foo").and_then(|v| v.as_integer()), Some(42));
    assert_eq!(v.get(b"baz"), None);
}

#[test]
fn test_decode_dict_key_must_be_string() {
    assert!(matches!(
        decode(b"di1e4:spame"),
        Err(BencodeError::UnexpectedChar(_))
    ));
}

#[test]
fn test_decode_trailing_data() {
    assert!(matches!(
        decode(b"i42eextra"),
        Err(BencodeError::TrailingData)
    ));
}

#[test]
fn test_decode_nesting_limit() {
    let mut data = Vec::new();
    data.extend(std::iter::repeat(b'l').take(100));
    data.extend(std::iter::repeat(b'e').take(100));
    assert!(matches!(
        decode(&data),
        Err(BencodeError::NestingTooDeep)
    ));
}

#[test]
fn test_encode_round_trip() {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"name"), Value::from("example"));
    dict.insert(Bytes::from_static(b"size"), Value::from(1024i64));
    dict.insert(
        Bytes::from_static(b"tags"),
        Value::List(vec![Value::from("a"), Value::from("b")]),
    );
    let value = Value::Dict(dict);

    let encoded = encode(&value);
    let decoded = decode(&encoded).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn test_canonical_encoding_is_stable() {
    // Keys come back sorted regardless of their order in the source bytes,
    // and a canonically encoded input survives a parse/serialize cycle.
    let canonical = b"d3:agei30e4:name5:Alicee";
    let decoded = decode(canonical).unwrap();
    assert_eq!(encode(&decoded), canonical.to_vec());
}

#[test]
fn test_encode_negative_integer() {
    assert_eq!(encode(&Value::from(-42i64)), b"i-42e".to_vec());
}

#[test]
fn test_binary_byte_string_round_trip() {
    let raw: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
    let value = Value::Bytes(Bytes::from(raw.clone()));
    let decoded = decode(&encode(&value)).unwrap();
    assert_eq!(decoded.as_bytes().map(|b| b.to_vec()), Some(raw));
}
