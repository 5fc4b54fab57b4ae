/* cloud-fs 的整体架构，自上而下 */

// 索引节点层：目录与文件的创建、查找、读写、删除
mod vfs;
pub use vfs::{Dir, DirHandle, File, FileHandle, Node, NodeAttr, NodeKind};

// 文件系统管理层：挂载/卸载协议，持有分配器与根 inode
mod cfs;
pub use cfs::CloudFileSystem;

// 存储布局层：inode、目录表、超级块的持久化编码
mod layout;
pub use layout::{INODE_BUFFER_SIZE, NUM_DATA_BLOCKS};

// 整数流分配器：inode 编号与数据块编号的来源
mod stream;
pub use stream::IntStream;

// 块存储层：编号到远端键的映射，所有块 I/O 的入口
mod block_store;

// 写回缓存层：快表与慢桶之间的 LRU 调度
mod block_cache;

// 远端存储接口层：对象桶与键值表的契约
mod store;
pub use store::{KvTable, ObjectStore, StoreError};

// 内置后端：内存与本地目录实现，用于测试与宿主工具
pub mod backends;

mod error;
pub use error::{FsError, FsResult};

/// 块大小，必须是 8 与 [`INODE_SIZE`] 的正倍数
pub const BLOCK_SIZE: usize = 32768;
/// inode 记录的定长，不小于其定长字段总和 139 字节
pub const INODE_SIZE: usize = 512;
/// 每个间接索引块容纳的块编号数
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 8;
/// 每个 inode 块容纳的 inode 数
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// 根目录的 inode 编号；0 保留为"不存在"
pub const ROOT_INODE: u64 = 1;

const _: () = {
    assert!(BLOCK_SIZE % 8 == 0);
    assert!(BLOCK_SIZE % INODE_SIZE == 0);
    assert!(INODE_SIZE >= 139);
};

/// 所有远端 I/O 的单位：定长字节块
#[derive(Clone)]
pub struct DataBlock(Box<[u8; BLOCK_SIZE]>);

impl DataBlock {
    /// 零填充块，亦是读取缺失块时的默认值
    pub fn zeroed() -> Self {
        Self(vec![0u8; BLOCK_SIZE].into_boxed_slice().try_into().unwrap())
    }

    /// 远端字节必须恰好为一个块，否则视为损坏
    pub fn from_bytes(bytes: Vec<u8>) -> FsResult<Self> {
        let boxed: Box<[u8; BLOCK_SIZE]> = bytes
            .into_boxed_slice()
            .try_into()
            .map_err(|b: Box<[u8]>| FsError::Corrupt(format!("block of {} bytes", b.len())))?;
        Ok(Self(boxed))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// 读取间接索引块的第 `slot` 个块编号
    #[inline]
    pub fn ptr_at(&self, slot: usize) -> u64 {
        let at = slot * 8;
        u64::from_le_bytes(self.0[at..at + 8].try_into().unwrap())
    }

    /// 写入间接索引块的第 `slot` 个块编号
    #[inline]
    pub fn set_ptr_at(&mut self, slot: usize, num: u64) {
        let at = slot * 8;
        self.0[at..at + 8].copy_from_slice(&num.to_le_bytes());
    }
}

impl core::ops::Deref for DataBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl core::ops::DerefMut for DataBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }
}
