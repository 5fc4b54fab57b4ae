//! # 块存储层
//!
//! 把数据块编号 / inode 块编号改写为远端键并转发给缓存，
//! 自身不持有状态。键形如 `7f3a-data42`、`09c1-inodeBlock3`：
//! 前缀是标识串哈希的前两个字节的十六进制，用来把键打散到
//! 对象桶的不同分区上以换取吞吐，并无安全含义。哈希只需
//! 跨进程稳定，FNV-1a 足够。

use std::sync::Arc;

use spin::Mutex;

use crate::block_cache::BlockCache;
use crate::error::{FsError, FsResult};
use crate::store::{KvTable, ObjectStore};
use crate::DataBlock;

pub struct BlockStore {
    bucket: Arc<dyn ObjectStore>,
    cache: Mutex<BlockCache>,
}

impl BlockStore {
    pub fn new(
        bucket: Arc<dyn ObjectStore>,
        table: Arc<dyn KvTable>,
        cache_capacity: usize,
    ) -> Self {
        let cache = BlockCache::new(cache_capacity, table, bucket.clone());
        Self {
            bucket,
            cache: Mutex::new(cache),
        }
    }

    /// 读数据块。`Ok(None)` 表示尚未分配，调用者以零填充块继续。
    pub fn get_data(&self, num: u64) -> FsResult<Option<DataBlock>> {
        if num == 0 {
            return Ok(None);
        }
        self.get_by_key(&data_key(num))
    }

    pub fn put_data(&self, num: u64, block: &DataBlock) -> FsResult<()> {
        self.put_by_key(&data_key(num), block)
    }

    /// 读第 `num` 个 inode 块（一个块装下多个 inode）
    pub fn get_inode_block(&self, num: u64) -> FsResult<Option<DataBlock>> {
        self.get_by_key(&inode_block_key(num))
    }

    pub fn put_inode_block(&self, num: u64, block: &DataBlock) -> FsResult<()> {
        self.put_by_key(&inode_block_key(num), block)
    }

    /// 从缓存与桶两边删除数据块。缓存侧的"未追踪"只说明该块
    /// 不在缓存里，桶侧删过即可；两边都失败才算失败。
    pub fn delete_block(&self, num: u64) -> FsResult<()> {
        let key = data_key(num);
        let cached = self.cache.lock().delete_block(&key);
        let bucketed = self.bucket.delete(&key).map_err(FsError::from);
        if let (Err(_), Err(e)) = (cached, bucketed) {
            return Err(e);
        }
        Ok(())
    }

    /// 读策略：先问缓存；未中再问桶，桶里有就顺手填缓存
    /// （可能触发淘汰）；桶也没有就把缺失原样传出去，
    /// 马上要写的调用者可以少跑一趟。
    pub fn get_by_key(&self, key: &str) -> FsResult<Option<DataBlock>> {
        let mut cache = self.cache.lock();
        if let Some(block) = cache.get_block(key)? {
            return Ok(Some(block));
        }
        let Some(bytes) = self.bucket.get(key)? else {
            return Ok(None);
        };
        let block = DataBlock::from_bytes(bytes)?;
        cache.add_block(key, &block)?;
        Ok(Some(block))
    }

    /// 写路径只经过缓存，桶要等淘汰才见到块
    pub fn put_by_key(&self, key: &str, block: &DataBlock) -> FsResult<()> {
        self.cache.lock().add_block(key, block)
    }

    /// 停机时清空缓存，把所有追踪中的块送进桶
    pub fn flush(&self) -> FsResult<()> {
        self.cache.lock().empty()
    }
}

/// 数据块编号对应的远端键
pub fn data_key(num: u64) -> String {
    mangle(&format!("data{num}"))
}

/// inode 块编号对应的远端键
pub fn inode_block_key(num: u64) -> String {
    mangle(&format!("inodeBlock{num}"))
}

fn mangle(ident: &str) -> String {
    let h = fnv1a(ident.as_bytes());
    // 取哈希的前两个字节做前缀
    format!("{:04x}-{ident}", (h >> 48) as u16)
}

/// FNV-1a 64 位。键要跨重启复现，哈希必须与进程无关。
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
