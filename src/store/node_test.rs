use super::*;

fn new_record(name: &[u8]) -> NodeRecord {
    let mut rec = NodeRecord::tombstone();
    rec.id = 42;
    rec.kind = NodeType::Pattern;
    rec.set_name(name).unwrap();
    rec.confidence = 0.75;
    rec.timestamp = 1234;
    rec
}

#[test]
fn test_record_encode_decode_roundtrip() {
    let mut rec = new_record(b"PATTERN_foo");
    rec.set_payload(&Payload::Text(b"hello".to_vec())).unwrap();
    rec.parent_id = 7;
    assert!(rec.add_child(100));
    assert!(rec.add_child(101));

    let mut buf = [0u8; RECORD_SIZE];
    rec.encode(&mut buf);
    let decoded = NodeRecord::decode(&buf).unwrap();

    assert_eq!(decoded.id, 42);
    assert_eq!(decoded.kind, NodeType::Pattern);
    assert_eq!(decoded.name_bytes(), b"PATTERN_foo");
    assert_eq!(decoded.payload(), Payload::Text(b"hello".to_vec()));
    assert_eq!(decoded.parent_id, 7);
    assert_eq!(decoded.child_count, 2);
    assert_eq!(decoded.children[0], 100);
    assert_eq!(decoded.children[1], 101);
    assert_eq!(decoded.confidence, 0.75);
    assert_eq!(decoded.timestamp, 1234);
}

#[test]
fn test_binary_payload_roundtrip_all_byte_values() {
    let bytes: Vec<u8> = (0..=255u8).collect();
    let mut rec = new_record(b"PRIM_blob");
    rec.set_payload(&Payload::Binary { bytes: bytes.clone(), compression_tag: None }).unwrap();

    let mut buf = [0u8; RECORD_SIZE];
    rec.encode(&mut buf);
    let decoded = NodeRecord::decode(&buf).unwrap();
    assert_eq!(decoded.payload(), Payload::Binary { bytes, compression_tag: None });
}

#[test]
fn test_binary_payload_with_compression_tag() {
    let mut rec = new_record(b"PRIM_c");
    let bytes = vec![1, 2, 3, 4];
    rec.set_payload(&Payload::Binary { bytes: bytes.clone(), compression_tag: Some(9) }).unwrap();

    let mut buf = [0u8; RECORD_SIZE];
    rec.encode(&mut buf);
    let decoded = NodeRecord::decode(&buf).unwrap();
    assert_eq!(decoded.payload(), Payload::Binary { bytes, compression_tag: Some(9) });
}

#[test]
fn test_name_at_max_length_accepted_one_longer_rejected() {
    let mut rec = NodeRecord::tombstone();
    let max_name = vec![b'a'; NAME_LEN];
    rec.set_name(&max_name).unwrap();
    assert_eq!(rec.name_bytes().len(), NAME_LEN);

    let too_long = vec![b'a'; NAME_LEN + 1];
    assert!(rec.set_name(&too_long).is_err());
}

#[test]
fn test_tombstone_has_zero_name() {
    let rec = NodeRecord::tombstone();
    assert!(rec.is_tombstone());
}

#[test]
fn test_scenario_binary_read_via_text_truncates_at_first_nul() {
    let bytes = vec![0xFF, 0x00, 0x01, 0xFE, 0x00];
    let mut rec = new_record(b"SIDECAR_bin");
    rec.set_payload(&Payload::Binary { bytes: bytes.clone(), compression_tag: None }).unwrap();

    match rec.payload() {
        Payload::Binary { bytes: got, .. } => assert_eq!(got, bytes),
        _ => panic!("expected binary payload"),
    }

    let text = Payload::decode_text(&rec.data);
    assert_eq!(text, Payload::Text(vec![0xFF]));
}

#[test]
fn test_add_child_caps_at_max_children() {
    let mut rec = NodeRecord::tombstone();
    for i in 0..MAX_CHILDREN as u64 {
        assert!(rec.add_child(i));
    }
    assert!(!rec.add_child(999));
    assert_eq!(rec.child_count as usize, MAX_CHILDREN);
}
