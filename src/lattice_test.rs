use super::*;
use crate::config::Config;
use crate::store::node::{NodeType, Payload};

fn scratch_config(tag: &str, node_cap: usize) -> Config {
    let mut store_path = std::env::temp_dir();
    store_path.push(format!("lattice-test-{}-{}.store", tag, std::process::id()));
    let mut wal_path = std::env::temp_dir();
    wal_path.push(format!("lattice-test-{}-{}.wal", tag, std::process::id()));
    std::fs::remove_file(&store_path).ok();
    std::fs::remove_file(&wal_path).ok();
    Config::new(store_path, wal_path, node_cap)
}

fn cleanup(config: &Config) {
    std::fs::remove_file(&config.store_path).ok();
    std::fs::remove_file(&config.wal_path).ok();
}

#[test]
fn test_scenario_prefix_query_counts() {
    let config = scratch_config("scenario1", 1000);
    let lattice = Lattice::open(&config).unwrap();

    let names = [
        "ISA_add", "ISA_sub", "ISA_mul", "PATTERN_foo", "PATTERN_bar",
        "MATERIAL_x", "LEARNING_y", "PERFORMANCE_z", "OTHER_a", "OTHER_b",
    ];
    for (i, name) in names.iter().enumerate() {
        let payload = Payload::Text(b"v".to_vec());
        lattice.add(NodeType::Primitive, name, &payload, 0, i as u64, 1.0).unwrap();
    }

    let isa = lattice.find_by_prefix("ISA_", 100, Filters::default()).unwrap();
    assert_eq!(isa.len(), 3);
    let pattern = lattice.find_by_prefix("PATTERN_", 100, Filters::default()).unwrap();
    assert_eq!(pattern.len(), 2);

    lattice.close().unwrap();
    cleanup(&config);
}

#[test]
fn test_scenario_reader_never_observes_mixed_payload() {
    let config = scratch_config("scenario2", 1000);
    let lattice = Lattice::open(&config).unwrap();

    let payload = Payload::Text(b"v1".to_vec());
    let id = lattice.add(NodeType::Primitive, "MEMORY:k1", &payload, 0, 1, 1.0).unwrap();

    let before = lattice.get(id).unwrap();
    assert_eq!(before.payload(), Payload::Text(b"v1".to_vec()));

    let payload2 = Payload::Text(b"v2".to_vec());
    lattice.update(id, &payload2, 2).unwrap();

    let after = lattice.get(id).unwrap();
    // Whatever a reader observes is one of the two whole payloads, never
    // a byte-level mix of both.
    assert!(after.payload() == Payload::Text(b"v1".to_vec()) || after.payload() == Payload::Text(b"v2".to_vec()));
    assert_eq!(after.payload(), Payload::Text(b"v2".to_vec()));

    lattice.close().unwrap();
    cleanup(&config);
}

#[test]
fn test_scenario_checkpoint_bounds_wal_length_under_sustained_writes() {
    let config = scratch_config("scenario4", 10_000);
    let lattice = Lattice::open(&config).unwrap();

    // Scaled down from the spec's 100,000-entry scenario to keep this
    // test fast; the property under test (checkpoint bounds WAL growth)
    // does not depend on the entry count.
    const COUNT: usize = 2_000;
    let payload = Payload::Text(b"x".to_vec());
    for i in 0..COUNT {
        lattice.add(NodeType::Primitive, &format!("NODE_{}", i), &payload, 0, i as u64, 1.0).unwrap();
        if i % 500 == 499 {
            lattice.checkpoint().unwrap();
        }
    }
    lattice.checkpoint().unwrap();

    let wal_len = std::fs::metadata(&config.wal_path).unwrap().len();
    assert_eq!(wal_len, crate::wal::HEADER_LEN as u64);

    lattice.close().unwrap();

    let store_bytes = std::fs::metadata(&config.store_path).unwrap().len();
    assert!(store_bytes > 0);
    cleanup(&config);
}

#[test]
fn test_scenario_binary_text_ambiguity_warns_and_truncates() {
    let config = scratch_config("scenario5", 1000);
    let lattice = Lattice::open(&config).unwrap();

    let binary = Payload::Binary { bytes: vec![0xFF, 0x00, 0x01, 0xFE, 0x00], compression_tag: None };
    let id = lattice.add(NodeType::ChunkData, "BLOB", &binary, 0, 1, 1.0).unwrap();

    let (len, compressed, bytes) = lattice.get_binary(id).unwrap();
    assert_eq!(len, 5);
    assert!(!compressed);
    assert_eq!(bytes, vec![0xFF, 0x00, 0x01, 0xFE, 0x00]);

    lattice.close().unwrap();
    cleanup(&config);
}

#[test]
fn test_scenario_quota_exceeded_leaves_count_unchanged() {
    let config = scratch_config("scenario6", 5);
    let lattice = Lattice::open(&config).unwrap();

    let payload = Payload::Text(b"x".to_vec());
    for i in 0..5 {
        lattice.add(NodeType::Primitive, &format!("N{}", i), &payload, 0, i as u64, 1.0).unwrap();
    }

    match lattice.add(NodeType::Primitive, "OVERFLOW", &payload, 0, 99, 1.0) {
        Err(crate::Error::QuotaExceeded(_)) => (),
        other => panic!("expected QuotaExceeded, got {:?}", other.map(|_| ())),
    }

    lattice.close().unwrap();
    cleanup(&config);
}

#[test]
fn test_second_open_on_same_path_fails_already_open() {
    let config = scratch_config("lock", 1000);
    let lattice = Lattice::open(&config).unwrap();

    match Lattice::open(&config) {
        Err(crate::Error::AlreadyOpen(_)) => (),
        other => panic!("expected AlreadyOpen, got {:?}", other.map(|_| ())),
    }

    lattice.close().unwrap();
    cleanup(&config);
}

#[test]
fn test_reopen_after_close_recovers_state() {
    let config = scratch_config("reopen", 1000);

    let id = {
        let lattice = Lattice::open(&config).unwrap();
        let payload = Payload::Text(b"persisted".to_vec());
        let id = lattice.add(NodeType::Primitive, "ISA_thing", &payload, 0, 1, 1.0).unwrap();
        lattice.checkpoint().unwrap();
        lattice.close().unwrap();
        id
    };

    let lattice = Lattice::open(&config).unwrap();
    let record = lattice.get(id).unwrap();
    assert_eq!(record.payload(), Payload::Text(b"persisted".to_vec()));
    let found = lattice.find_by_prefix("ISA_", 10, Filters::default()).unwrap();
    assert_eq!(found, vec![id]);

    lattice.close().unwrap();
    cleanup(&config);
}

#[test]
fn test_reserve_ids_does_not_collide_with_add() {
    let config = scratch_config("reserve", 1000);
    let lattice = Lattice::open(&config).unwrap();

    let range = lattice.reserve_ids(5);
    assert_eq!(range.end - range.start, 5);

    let payload = Payload::Text(b"x".to_vec());
    let id = lattice.add(NodeType::Primitive, "AFTER_RESERVE", &payload, 0, 1, 1.0).unwrap();
    assert!((id as u32) >= range.end);

    lattice.close().unwrap();
    cleanup(&config);
}
