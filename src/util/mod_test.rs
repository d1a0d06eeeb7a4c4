use super::*;

#[test]
fn test_sync_write_reports_bytes_written() {
    let mut path = std::env::temp_dir();
    path.push(format!("lattice-util-test-{}.data", std::process::id()));

    let mut fd = fs::OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
    let n = sync_write(&mut fd, b"hello world").unwrap();
    assert_eq!(n, 11);

    use std::io::{Read, Seek, SeekFrom};
    fd.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = Vec::new();
    fd.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"hello world");

    std::fs::remove_file(&path).ok();
}
