//! 跨会话的端到端场景，站在桥接层的位置驱动整套生命周期。

use std::sync::Arc;

use cloud_fs::backends::{DirBucket, MemoryStore};
use cloud_fs_fuse::selftest;
use cloud_fs_fuse::session::Session;

#[test]
fn selftest_suite_is_green() {
    let session = Session::with_stores(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        64,
    )
    .unwrap();

    let mut root = session.root().unwrap();
    assert_eq!(selftest::run_all(&mut root), 0);
    session.finish().unwrap();
}

#[test]
fn tiny_cache_still_roundtrips() {
    let bucket = MemoryStore::new();
    let table = MemoryStore::new();
    let data: Vec<u8> = (0..120 * 1024).map(|i| (i % 253) as u8).collect();

    // 容量 1 的缓存：几乎每次块写入都会把前一块挤进桶
    let session = Session::with_stores(Arc::new(bucket.clone()), Arc::new(table), 1).unwrap();
    let mut root = session.root().unwrap();
    let (_, mut handle) = root.create("churn.bin").unwrap();
    handle.write(&data, 0).unwrap();
    handle.release().unwrap();

    assert!(!bucket.is_empty());
    let file = root.lookup("churn.bin").unwrap().into_file().unwrap();
    assert_eq!(file.open().read(0, data.len() as u64).unwrap(), data);
    session.finish().unwrap();
}

#[test]
fn dir_bucket_survives_two_sessions() {
    let dir = std::env::temp_dir().join(format!("cloud-fs-scenario-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let data: Vec<u8> = (0..50_000).map(|i| (i % 241) as u8).collect();

    {
        let session =
            Session::with_stores(Arc::new(DirBucket::new(&dir)), Arc::new(MemoryStore::new()), 16)
                .unwrap();
        let mut root = session.root().unwrap();
        let (_, mut handle) = root.create("kept.bin").unwrap();
        handle.write(&data, 0).unwrap();
        handle.release().unwrap();
        session.finish().unwrap();
    }

    // 全新的进程内表、同一个桶目录：文件必须原样还在
    {
        let session =
            Session::with_stores(Arc::new(DirBucket::new(&dir)), Arc::new(MemoryStore::new()), 16)
                .unwrap();
        let root = session.root().unwrap();
        let file = root.lookup("kept.bin").unwrap().into_file().unwrap();
        assert_eq!(file.open().read(0, data.len() as u64).unwrap(), data);
        session.finish().unwrap();
    }

    let _ = std::fs::remove_dir_all(&dir);
}
