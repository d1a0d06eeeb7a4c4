use super::*;

fn scratch_path(tag: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("lattice-platform-test-{}-{}.data", tag, std::process::id()));
    dir
}

#[test]
fn test_open_extend_map_sync() {
    let path = scratch_path("open");
    std::fs::remove_file(&path).ok();

    let file = file_open_rw_create(&path, 4096).unwrap();
    assert_eq!(file.metadata().unwrap().len(), 4096);

    file_extend(&file, 8192).unwrap();
    assert_eq!(file.metadata().unwrap().len(), 8192);

    let mut mapping = map_region(&file, 8192, true).unwrap();
    mapping[0] = 0xAB;
    durable_sync(&mapping, &file).unwrap();
    drop(mapping);

    truncate_and_finalize(&file, 4096).unwrap();
    assert_eq!(file.metadata().unwrap().len(), 4096);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_try_lock_exclusive_rejects_second_handle() {
    let path = scratch_path("lock");
    std::fs::remove_file(&path).ok();

    let file1 = file_open_rw_create(&path, 4096).unwrap();
    try_lock_exclusive(&file1).unwrap();

    let file2 = std::fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
    match try_lock_exclusive(&file2) {
        Err(crate::Error::AlreadyOpen(_)) => (),
        other => panic!("expected AlreadyOpen, got {:?}", other),
    }

    std::fs::remove_file(&path).ok();
}
