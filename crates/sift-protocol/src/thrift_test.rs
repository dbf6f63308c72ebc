//! Thrift reader/writer tests

use super::*;

#[test]
fn round_trip_string_field() {
    let mut w = ThriftWriter::new();
    w.write_string_field(100, "203.0.113.9");
    let bytes = w.finish();

    let mut r = ThriftReader::new(&bytes);
    let (ttype, id) = r.read_field_header().unwrap().unwrap();
    assert_eq!(ttype, TType::String);
    assert_eq!(id, 100);
    assert_eq!(r.read_string("ip").unwrap(), "203.0.113.9");
    assert!(r.read_field_header().unwrap().is_none());
}

#[test]
fn round_trip_i64_field() {
    let mut w = ThriftWriter::new();
    w.write_i64_field(200, 1_700_000_000_000);
    let bytes = w.finish();

    let mut r = ThriftReader::new(&bytes);
    let (ttype, id) = r.read_field_header().unwrap().unwrap();
    assert_eq!(ttype, TType::I64);
    assert_eq!(id, 200);
    assert_eq!(r.read_i64().unwrap(), 1_700_000_000_000);
}

#[test]
fn round_trip_string_list() {
    let headers = vec!["Accept: */*".to_string(), "Host: c.example.com".to_string()];
    let mut w = ThriftWriter::new();
    w.write_string_list_field(410, &headers);
    let bytes = w.finish();

    let mut r = ThriftReader::new(&bytes);
    let (ttype, id) = r.read_field_header().unwrap().unwrap();
    assert_eq!(ttype, TType::List);
    assert_eq!(id, 410);
    let (elem, count) = r.read_list_header().unwrap();
    assert_eq!(elem, TType::String);
    assert_eq!(count, 2);
    assert_eq!(r.read_string("h").unwrap(), headers[0]);
    assert_eq!(r.read_string("h").unwrap(), headers[1]);
}

#[test]
fn skip_unknown_fields() {
    let mut w = ThriftWriter::new();
    w.write_string_field(999, "future field");
    w.write_i64_field(998, 42);
    w.write_string_field(100, "keep me");
    let bytes = w.finish();

    let mut r = ThriftReader::new(&bytes);
    let mut kept = None;
    while let Some((ttype, id)) = r.read_field_header().unwrap() {
        if id == 100 {
            kept = Some(r.read_string("f").unwrap());
        } else {
            r.skip(ttype).unwrap();
        }
    }
    assert_eq!(kept.as_deref(), Some("keep me"));
}

#[test]
fn truncated_buffer_is_an_error() {
    let mut w = ThriftWriter::new();
    w.write_string_field(100, "some value");
    let mut bytes = w.finish();
    bytes.truncate(5); // cut inside the length-prefixed string

    let mut r = ThriftReader::new(&bytes);
    let _ = r.read_field_header().unwrap().unwrap();
    assert!(matches!(
        r.read_string("f"),
        Err(ProtocolError::Truncated { .. })
    ));
}

#[test]
fn negative_length_is_an_error() {
    // field header: type=string id=1, then length -1
    let bytes = [11u8, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF];
    let mut r = ThriftReader::new(&bytes);
    let _ = r.read_field_header().unwrap().unwrap();
    assert!(matches!(
        r.read_bytes(),
        Err(ProtocolError::InvalidLength { .. })
    ));
}

#[test]
fn garbage_type_byte_is_an_error() {
    let bytes = [7u8, 0, 1];
    let mut r = ThriftReader::new(&bytes);
    assert!(matches!(
        r.read_field_header(),
        Err(ProtocolError::UnknownWireType(7))
    ));
}
