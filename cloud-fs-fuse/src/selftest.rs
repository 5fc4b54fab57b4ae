//! 挂载后的自检套件，对应命令行的 `test` 字面量。
//!
//! 失败只记录、不中止也不改变退出码：中途退出反而会把
//! 桶和表留在半途。三档写入测试分别覆盖内联缓冲、
//! 直接索引与一级间接索引。

use log::{error, info};

use cloud_fs::{Dir, IntStream};

/// 跑完整套自检，返回失败数
pub fn run_all(root: &mut Dir) -> usize {
    let cases: [(&str, fn(&mut Dir) -> Result<(), String>); 5] = [
        ("streamTest", |_| stream_test()),
        ("mkdirTest", mkdir_test),
        // 239 字节：整个住在 inode 的内联缓冲里
        ("smallWriteTest", |root| write_test(root, "smallFile.txt", 239)),
        // 120 KiB：铺开到若干直接块
        ("mediumWriteTest", |root| {
            write_test(root, "mediumFile.txt", 120 * 1024)
        }),
        // 420 KiB：溢进一级间接索引
        ("largeWriteTest", |root| {
            write_test(root, "largeFile.txt", 420 * 1024)
        }),
    ];

    let mut failures = 0;
    for (name, case) in cases {
        match case(root) {
            Ok(()) => info!("{name} passed"),
            Err(why) => {
                failures += 1;
                error!("{name} failed: {why}");
            }
        }
    }
    if failures == 0 {
        info!("all tests completed");
    } else {
        error!("{failures} test(s) failed");
    }
    failures
}

/// 编号流的端到端：next、压缩复原、归还复用
fn stream_test() -> Result<(), String> {
    let mut stream = IntStream::new();
    if stream.next() != 2 {
        return Err("first next() was not 2".into());
    }

    let compressed = stream.compress();
    stream.decompress(100u64.to_le_bytes());
    stream.decompress(compressed);

    stream.put(29);
    let stack = stream.serialize_stack();
    let mut stream = IntStream::new();
    stream.decompress(compressed);
    stream
        .deserialize_stack(&stack)
        .map_err(|e| e.to_string())?;

    if stream.next() != 29 {
        return Err("recycled number was not served first".into());
    }
    if stream.next() != 3 {
        return Err("counter did not resume after the stack drained".into());
    }
    Ok(())
}

/// 根下建目录、确认可见、删掉、确认消失
fn mkdir_test(root: &mut Dir) -> Result<(), String> {
    root.mkdir("testDir").map_err(|e| e.to_string())?;
    if !contains(root, "testDir")? {
        return Err("testDir missing from readdir".into());
    }
    root.remove("testDir", true).map_err(|e| e.to_string())?;
    if contains(root, "testDir")? {
        return Err("testDir still present after remove".into());
    }
    Ok(())
}

/// 写入-关闭-重开-读回-删除一个指定大小的文件
fn write_test(root: &mut Dir, name: &str, len: usize) -> Result<(), String> {
    let data: Vec<u8> = (0..len).map(|i| (i * 131 % 251) as u8).collect();

    let (_, mut handle) = root.create(name).map_err(|e| e.to_string())?;
    handle.write(&data, 0).map_err(|e| e.to_string())?;
    handle.release().map_err(|e| e.to_string())?;

    let file = root
        .lookup(name)
        .map_err(|e| e.to_string())?
        .into_file()
        .ok_or_else(|| "expected a file".to_owned())?;
    let read = file
        .open()
        .read(0, len as u64)
        .map_err(|e| e.to_string())?;
    if read != data {
        return Err(format!("{len} bytes came back different"));
    }

    root.remove(name, false).map_err(|e| e.to_string())?;
    Ok(())
}

fn contains(dir: &Dir, name: &str) -> Result<bool, String> {
    let entries = dir
        .open()
        .and_then(|h| h.readdir())
        .map_err(|e| e.to_string())?;
    Ok(entries.iter().any(|(n, _)| n == name))
}
