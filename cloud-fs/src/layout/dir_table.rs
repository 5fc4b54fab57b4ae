//! 目录表：文件名到 inode 编号的映射。
//!
//! 序列化后的表就是目录 inode 的全部内容。编码用 JSON：
//! 自描述、键唯一、往返精确，表缩短后由上层调用
//! `update_size` 把 inode 大小收敛到实际字节数。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirTable {
    table: HashMap<String, u64>,
}

impl DirTable {
    /// 新目录生来带两个目录项：`.` 指自己，`..` 指父目录
    pub fn init(parent: u64, this: u64) -> Self {
        let mut table = Self::default();
        table.add("..", parent);
        table.add(".", this);
        table
    }

    pub fn add(&mut self, name: &str, inode_num: u64) {
        self.table.insert(name.to_owned(), inode_num);
    }

    pub fn delete(&mut self, name: &str) {
        self.table.remove(name);
    }

    /// 缺失的名字返回 0，上层把它译为"不存在"
    #[inline]
    pub fn lookup(&self, name: &str) -> u64 {
        self.table.get(name).copied().unwrap_or(0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.table.iter().map(|(name, &num)| (name.as_str(), num))
    }

    pub fn to_bytes(&self) -> FsResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| FsError::corrupt(format!("dir table encode: {e}")))
    }

    /// 空字节解码为空表；其余一切解码失败都视为存储损坏
    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes).map_err(|e| FsError::corrupt(format!("dir table: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_seeds_dot_entries() {
        let table = DirTable::init(1, 27);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("."), 27);
        assert_eq!(table.lookup(".."), 1);
    }

    #[test]
    fn roundtrip_is_exact() {
        let mut table = DirTable::init(1, 27);
        table.add("testFile", 5);
        table.add("目录", 9);

        let restored = DirTable::from_bytes(&table.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, table);
        assert_eq!(restored.lookup("testFile"), 5);
        assert_eq!(restored.lookup("目录"), 9);
    }

    #[test]
    fn delete_and_missing_lookup() {
        let mut table = DirTable::init(1, 2);
        table.add("gone", 8);
        table.delete("gone");
        assert_eq!(table.lookup("gone"), 0);
        assert_eq!(table.lookup("never"), 0);
    }

    #[test]
    fn empty_bytes_decode_to_empty_table() {
        assert!(DirTable::from_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            DirTable::from_bytes(b"\xff\xfe"),
            Err(FsError::Corrupt(_))
        ));
    }
}
