use super::*;

#[test]
fn test_encode_decode_roundtrip() {
    let entry = Entry::new(7, OpCode::UpdateNode, 0x1122_3344, b"hello wal".to_vec());
    let mut buf = vec![];
    entry.encode(&mut buf).unwrap();
    assert_eq!(buf.len(), entry.encoded_len());

    let (decoded, consumed) = Entry::decode(&buf).unwrap().unwrap();
    assert_eq!(consumed, buf.len());
    assert_eq!(decoded.sequence, 7);
    assert_eq!(decoded.op, OpCode::UpdateNode);
    assert_eq!(decoded.node_id, 0x1122_3344);
    assert_eq!(decoded.payload, b"hello wal");
}

#[test]
fn test_decode_short_buffer_returns_none() {
    let entry = Entry::new(1, OpCode::AddNode, 1, vec![1, 2, 3, 4, 5]);
    let mut buf = vec![];
    entry.encode(&mut buf).unwrap();

    buf.truncate(buf.len() - 2);
    assert!(Entry::decode(&buf).unwrap().is_none());

    let tiny = &buf[..4];
    assert!(Entry::decode(tiny).unwrap().is_none());
}

#[test]
fn test_decode_unknown_opcode_fails() {
    let mut buf = vec![];
    buf.extend_from_slice(&1u64.to_le_bytes());
    buf.extend_from_slice(&99u32.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());

    match Entry::decode(&buf) {
        Err(crate::Error::DecodeFail(_)) => (),
        other => panic!("expected DecodeFail, got {:?}", other),
    }
}
