//! # 写回缓存层
//!
//! 固定容量的 LRU，队首最久未用。被追踪的键，其字节都躺在快的
//! 键值表里；淘汰才会把块写进慢的对象桶。换言之，桶只在淘汰时
//! 见到块：一个块可以在缓存里被反复改写而迟迟不落桶，直到容量
//! 压力或停机把它挤出去。
//!
//! 次序规则：`add`/`get` 都算一次触碰，删除不算；
//! 一个键绝不会在队列中出现两次。

use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::store::{KvTable, ObjectStore};
use crate::DataBlock;

pub struct BlockCache {
    /// 追踪键数的上限，必须为正
    capacity: usize,
    /// 队首为最久未用。容量不大，线性查找足矣。
    queue: Vec<String>,
    table: Arc<dyn KvTable>,
    bucket: Arc<dyn ObjectStore>,
}

impl BlockCache {
    pub fn new(capacity: usize, table: Arc<dyn KvTable>, bucket: Arc<dyn ObjectStore>) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self {
            capacity,
            queue: Vec::with_capacity(capacity),
            table,
            bucket,
        }
    }

    /// 把块写进快表并触碰其键；新键可能触发队首淘汰
    pub fn add_block(&mut self, key: &str, block: &DataBlock) -> FsResult<()> {
        self.table.put(key, block.as_bytes())?;

        if let Some(at) = self.queue.iter().position(|k| k == key) {
            // 命中，移到最新端即可
            let key = self.queue.remove(at);
            self.queue.push(key);
            return Ok(());
        }

        if self.queue.len() == self.capacity {
            let victim = self.queue.remove(0);
            self.evict(&victim)?;
        }
        self.queue.push(key.to_owned());
        Ok(())
    }

    /// 未追踪的键直接返回 `None`，不碰任何远端
    pub fn get_block(&mut self, key: &str) -> FsResult<Option<DataBlock>> {
        let Some(at) = self.queue.iter().position(|k| k == key) else {
            return Ok(None);
        };

        let Some(bytes) = self.table.get(key)? else {
            // 追踪中的键在快表里必须有值
            return Err(FsError::corrupt(format!("cached key {key} lost by table")));
        };

        let key = self.queue.remove(at);
        self.queue.push(key);
        Ok(Some(DataBlock::from_bytes(bytes)?))
    }

    /// 取消追踪并从快表删除，不写回桶。
    /// 未追踪的键报 [`FsError::NotFound`]，调用者以此判断
    /// 是否还需要一次桶级删除。
    pub fn delete_block(&mut self, key: &str) -> FsResult<()> {
        let Some(at) = self.queue.iter().position(|k| k == key) else {
            return Err(FsError::not_found(key));
        };
        self.queue.remove(at);
        self.table.delete(key)?;
        Ok(())
    }

    /// 按当前次序淘汰所有键，仅在停机时调用
    pub fn empty(&mut self) -> FsResult<()> {
        while !self.queue.is_empty() {
            let victim = self.queue.remove(0);
            self.evict(&victim)?;
        }
        Ok(())
    }

    /// 淘汰 = 快表读出、写进桶、从快表删除
    fn evict(&mut self, key: &str) -> FsResult<()> {
        let Some(bytes) = self.table.get(key)? else {
            return Err(FsError::corrupt(format!("evicting key {key} lost by table")));
        };
        self.bucket.put(key, &bytes)?;
        self.table.delete(key)?;
        Ok(())
    }
}
