use std::collections::HashMap;

use super::*;

fn plan_and_materialize(data: &[u8]) -> (HeaderInfo, HashMap<String, Vec<u8>>) {
    let plan = plan("BLOB_big", 7, data);
    let header = HeaderInfo::decode_payload(&plan.header_payload).unwrap();

    let mut table = HashMap::new();
    for (name, payload) in plan.chunks {
        match payload {
            Payload::Binary { bytes, .. } => {
                table.insert(name, bytes);
            }
            Payload::Text(_) => unreachable!(),
        }
    }
    (header, table)
}

#[test]
fn test_header_name_and_chunk_name_conventions() {
    assert_eq!(header_name("BLOB_x"), "CHUNKED:BLOB_x");
    assert_eq!(chunk_name(7, 0, 3), "CHUNK:7:0:3");
}

#[test]
fn test_roundtrip_lengths_1_512_513_100000() {
    for &len in &[1usize, 512, 513, 100_000] {
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        let (header, table) = plan_and_materialize(&data);

        let reassembled = reassemble(&header, 7, |name| table.get(name).cloned()).unwrap();
        assert_eq!(reassembled, data, "length {} failed to roundtrip", len);
    }
}

#[test]
fn test_reassemble_missing_chunk_fails() {
    let data = vec![1u8; CHUNK_CAPACITY * 2 + 5];
    let (header, mut table) = plan_and_materialize(&data);
    let first_key = table.keys().next().cloned().unwrap();
    table.remove(&first_key);

    match reassemble(&header, 7, |name| table.get(name).cloned()) {
        Err(crate::Error::NotFound(_)) => (),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_header_info_encode_decode_roundtrip_with_hints() {
    let info = HeaderInfo { total_len: 4096, chunk_count: 8, hint_ids: vec![1, 2, 3] };
    let payload = info.encode_payload();
    let decoded = HeaderInfo::decode_payload(&payload).unwrap();
    assert_eq!(decoded, info);
}
