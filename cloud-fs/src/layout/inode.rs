//! inode 的编码与数据遍历。
//!
//! 一条 inode 记录按小端依次存放：
//!
//! | 偏移 | 宽度 | 字段 |
//! |---|---|---|
//! | 0 | 8 | `size`，内容字节数 |
//! | 8 | 2 | `link_count`，目录项引用数 |
//! | 10 | 8 | `unix_time`，最近修改秒数 |
//! | 18 | 1 | `is_dir` |
//! | 19 | `INODE_SIZE - 139` | 内联缓冲，内容的开头直接住在 inode 里 |
//! | 末尾 | 15 × 8 | 索引槽：12 个直接块编号，加一/二/三级间接块编号 |
//!
//! ## 地址换算
//!
//! 绝对偏移先吃内联缓冲；剩余部分依次落在直接块、一级、二级、
//! 三级间接索引覆盖的区间内。索引槽为 0 表示"尚未分配"，
//! 读到它得零，写到它时才向数据块编号流要新编号。

use std::time::{SystemTime, UNIX_EPOCH};

use spin::Mutex;

use crate::block_store::BlockStore;
use crate::error::{FsError, FsResult};
use crate::stream::IntStream;
use crate::{DataBlock, BLOCK_SIZE, INODES_PER_BLOCK, INODE_SIZE, PTRS_PER_BLOCK};

/// 定长字段合计 139 字节，其余空间全归内联缓冲
const INODE_FIXED_SIZE: usize = 139;
/// 内联缓冲的字节数
pub const INODE_BUFFER_SIZE: usize = INODE_SIZE - INODE_FIXED_SIZE;
/// 直接索引槽数
pub const NUM_DATA_BLOCKS: usize = 12;

const SINGLY_SLOT: usize = NUM_DATA_BLOCKS;
const DOUBLY_SLOT: usize = NUM_DATA_BLOCKS + 1;
const TRIPLY_SLOT: usize = NUM_DATA_BLOCKS + 2;
const EXTENT_SLOTS: usize = NUM_DATA_BLOCKS + 3;
/// 索引槽区占据记录的最后 15 × 8 字节
const EXTENTS_AT: usize = INODE_SIZE - EXTENT_SLOTS * 8;

/// `level` 级索引块覆盖的字节数；0 级即数据块本身
#[inline]
fn level_cap(level: u32) -> u64 {
    BLOCK_SIZE as u64 * (PTRS_PER_BLOCK as u64).pow(level)
}

/// 当前的 Unix 秒
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct Inode {
    pub size: u64,
    pub link_count: u16,
    pub unix_time: u64,
    pub is_dir: bool,
    inline: [u8; INODE_BUFFER_SIZE],
    extents: [u64; EXTENT_SLOTS],
}

impl Inode {
    pub fn new(is_dir: bool) -> Self {
        Self {
            size: 0,
            link_count: 0,
            unix_time: unix_now(),
            is_dir,
            inline: [0; INODE_BUFFER_SIZE],
            extents: [0; EXTENT_SLOTS],
        }
    }

    /// 目录 inode 播种自身的目录表（`.` 与 `..`），链接数置 1
    pub fn init(
        &mut self,
        parent: u64,
        this: u64,
        store: &BlockStore,
        data_stream: &Mutex<IntStream>,
    ) -> FsResult<()> {
        if self.is_dir {
            let table = super::DirTable::init(parent, this);
            let bytes = table.to_bytes()?;
            self.write(&bytes, 0, store, data_stream)?;
            self.update_size(bytes.len() as u64);
        }
        self.link_count = 1;
        Ok(())
    }

    /// 显式改写大小。普通写入走 [`write`](Self::write) 里的
    /// max 规则；目录表缩短后要靠它把大小收回来。
    pub fn update_size(&mut self, new_size: u64) {
        self.size = new_size;
        self.unix_time = unix_now();
    }

    pub fn encode(&self) -> [u8; INODE_SIZE] {
        let mut out = [0u8; INODE_SIZE];
        out[0..8].copy_from_slice(&self.size.to_le_bytes());
        out[8..10].copy_from_slice(&self.link_count.to_le_bytes());
        out[10..18].copy_from_slice(&self.unix_time.to_le_bytes());
        out[18] = self.is_dir as u8;
        out[19..19 + INODE_BUFFER_SIZE].copy_from_slice(&self.inline);
        for (slot, num) in self.extents.iter().enumerate() {
            let at = EXTENTS_AT + slot * 8;
            out[at..at + 8].copy_from_slice(&num.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> FsResult<Self> {
        if bytes.len() != INODE_SIZE {
            return Err(FsError::corrupt(format!("inode of {} bytes", bytes.len())));
        }
        let is_dir = match bytes[18] {
            0 => false,
            1 => true,
            b => return Err(FsError::corrupt(format!("inode kind byte {b}"))),
        };

        let mut inline = [0u8; INODE_BUFFER_SIZE];
        inline.copy_from_slice(&bytes[19..19 + INODE_BUFFER_SIZE]);
        let mut extents = [0u64; EXTENT_SLOTS];
        for (slot, num) in extents.iter_mut().enumerate() {
            let at = EXTENTS_AT + slot * 8;
            *num = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
        }

        Ok(Self {
            size: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            link_count: u16::from_le_bytes(bytes[8..10].try_into().unwrap()),
            unix_time: u64::from_le_bytes(bytes[10..18].try_into().unwrap()),
            is_dir,
            inline,
            extents,
        })
    }

    /// 把 `data` 写到绝对偏移 `offset`。大小取
    /// `max(旧大小, offset + len)`，修改时间无条件刷新；
    /// 上层的属性设置路径从不会来，所以这一步是承重的。
    pub fn write(
        &mut self,
        data: &[u8],
        offset: u64,
        store: &BlockStore,
        data_stream: &Mutex<IntStream>,
    ) -> FsResult<()> {
        self.size = self.size.max(offset + data.len() as u64);
        self.unix_time = unix_now();

        let mut data = data;
        let mut offset = offset;
        if offset < INODE_BUFFER_SIZE as u64 {
            let at = offset as usize;
            let take = data.len().min(INODE_BUFFER_SIZE - at);
            self.inline[at..at + take].copy_from_slice(&data[..take]);
            data = &data[take..];
            offset = 0;
        } else {
            offset -= INODE_BUFFER_SIZE as u64;
        }

        if data.is_empty() {
            return Ok(());
        }
        self.write_blocks(data, offset, store, data_stream)
    }

    /// 读绝对偏移 `offset` 起至多 `size` 字节；
    /// 在文件末尾处做短读，缺失的块读出零。
    pub fn read(&self, offset: u64, size: u64, store: &BlockStore) -> FsResult<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        if offset >= self.size {
            return Err(FsError::OffsetPastEnd);
        }

        let mut remaining = size.min(self.size - offset);
        let mut out = Vec::with_capacity(remaining as usize);
        let mut offset = offset;
        if offset < INODE_BUFFER_SIZE as u64 {
            let at = offset as usize;
            let take = (remaining as usize).min(INODE_BUFFER_SIZE - at);
            out.extend_from_slice(&self.inline[at..at + take]);
            remaining -= take as u64;
            offset = 0;
        } else {
            offset -= INODE_BUFFER_SIZE as u64;
        }

        if remaining > 0 {
            self.read_blocks(&mut out, offset, remaining, store)?;
        }
        Ok(out)
    }

    /// 归还 inode 名下的所有数据块与索引块。
    /// 应删块数由大小推出，叶子块逐个计数；三级索引走完仍有
    /// 剩余说明地址换算有缺陷，必须响亮地失败。
    pub fn delete_all_data(
        &mut self,
        store: &BlockStore,
        data_stream: &Mutex<IntStream>,
    ) -> FsResult<()> {
        let mut remaining = if self.size <= INODE_BUFFER_SIZE as u64 {
            0
        } else {
            (self.size - INODE_BUFFER_SIZE as u64).div_ceil(BLOCK_SIZE as u64)
        };

        for slot in 0..NUM_DATA_BLOCKS {
            if remaining == 0 {
                break;
            }
            let num = self.extents[slot];
            if num != 0 {
                store.delete_block(num)?;
                data_stream.lock().put(num);
            }
            self.extents[slot] = 0;
            remaining -= 1;
        }

        for (slot, level) in [(SINGLY_SLOT, 1), (DOUBLY_SLOT, 2), (TRIPLY_SLOT, 3)] {
            if remaining == 0 {
                break;
            }
            remaining = Self::delete_level(self.extents[slot], level, remaining, store, data_stream)?;
            self.extents[slot] = 0;
        }

        if remaining > 0 {
            return Err(FsError::Exhausted);
        }
        Ok(())
    }

    /// 内联缓冲之外的写入，`offset` 已不含缓冲
    fn write_blocks(
        &mut self,
        mut data: &[u8],
        mut offset: u64,
        store: &BlockStore,
        data_stream: &Mutex<IntStream>,
    ) -> FsResult<()> {
        for slot in 0..NUM_DATA_BLOCKS {
            if data.is_empty() {
                return Ok(());
            }
            if offset >= BLOCK_SIZE as u64 {
                offset -= BLOCK_SIZE as u64;
                continue;
            }
            let (num, took) =
                Self::write_level(data, offset, self.extents[slot], 0, store, data_stream)?;
            self.extents[slot] = num;
            data = &data[took..];
            offset = 0;
        }

        for (slot, level) in [(SINGLY_SLOT, 1), (DOUBLY_SLOT, 2), (TRIPLY_SLOT, 3)] {
            if data.is_empty() {
                return Ok(());
            }
            let cap = level_cap(level);
            if offset >= cap {
                offset -= cap;
                continue;
            }
            let (num, took) =
                Self::write_level(data, offset, self.extents[slot], level, store, data_stream)?;
            self.extents[slot] = num;
            data = &data[took..];
            offset = 0;
        }

        if data.is_empty() {
            Ok(())
        } else {
            // 写穿了三级索引的地址空间
            Err(FsError::Exhausted)
        }
    }

    /// 向 `level` 级块（0 级即数据块）写入，缺失则向编号流
    /// 要新块。子块先落，承载它们编号的本块后落。
    /// 返回（可能更新过的）块编号与写掉的字节数。
    fn write_level(
        data: &[u8],
        offset: u64,
        num: u64,
        level: u32,
        store: &BlockStore,
        data_stream: &Mutex<IntStream>,
    ) -> FsResult<(u64, usize)> {
        let (num, mut block) = match store.get_data(num)? {
            Some(block) => (num, block),
            None if num == 0 => (data_stream.lock().next(), DataBlock::zeroed()),
            None => (num, DataBlock::zeroed()),
        };

        if level == 0 {
            let at = offset as usize;
            let take = data.len().min(BLOCK_SIZE - at);
            block[at..at + take].copy_from_slice(&data[..take]);
            store.put_data(num, &block)?;
            return Ok((num, take));
        }

        let child_cap = level_cap(level - 1);
        let mut consumed = 0;
        let mut offset = offset;
        for slot in 0..PTRS_PER_BLOCK {
            if consumed == data.len() {
                break;
            }
            if offset >= child_cap {
                offset -= child_cap;
                continue;
            }
            let child = block.ptr_at(slot);
            let (child, took) =
                Self::write_level(&data[consumed..], offset, child, level - 1, store, data_stream)?;
            block.set_ptr_at(slot, child);
            consumed += took;
            offset = 0;
        }

        store.put_data(num, &block)?;
        Ok((num, consumed))
    }

    fn read_blocks(
        &self,
        out: &mut Vec<u8>,
        mut offset: u64,
        mut remaining: u64,
        store: &BlockStore,
    ) -> FsResult<()> {
        for slot in 0..NUM_DATA_BLOCKS {
            if remaining == 0 {
                return Ok(());
            }
            if offset >= BLOCK_SIZE as u64 {
                offset -= BLOCK_SIZE as u64;
                continue;
            }
            remaining -= Self::read_level(out, offset, remaining, self.extents[slot], 0, store)?;
            offset = 0;
        }

        for (slot, level) in [(SINGLY_SLOT, 1), (DOUBLY_SLOT, 2), (TRIPLY_SLOT, 3)] {
            if remaining == 0 {
                return Ok(());
            }
            let cap = level_cap(level);
            if offset >= cap {
                offset -= cap;
                continue;
            }
            remaining -= Self::read_level(out, offset, remaining, self.extents[slot], level, store)?;
            offset = 0;
        }

        if remaining > 0 {
            return Err(FsError::Exhausted);
        }
        Ok(())
    }

    /// 从 `level` 级块读出至多 `remaining` 字节追加到 `out`，
    /// 整棵缺失的子树读出零。返回读到的字节数。
    fn read_level(
        out: &mut Vec<u8>,
        offset: u64,
        remaining: u64,
        num: u64,
        level: u32,
        store: &BlockStore,
    ) -> FsResult<u64> {
        let block = store.get_data(num)?.unwrap_or_else(DataBlock::zeroed);

        if level == 0 {
            let at = offset as usize;
            let take = remaining.min((BLOCK_SIZE - at) as u64);
            out.extend_from_slice(&block[at..at + take as usize]);
            return Ok(take);
        }

        let child_cap = level_cap(level - 1);
        let mut taken = 0;
        let mut offset = offset;
        for slot in 0..PTRS_PER_BLOCK {
            if taken == remaining {
                break;
            }
            let child = block.ptr_at(slot);
            if offset >= child_cap {
                offset -= child_cap;
                continue;
            }
            taken += Self::read_level(out, offset, remaining - taken, child, level - 1, store)?;
            offset = 0;
        }
        Ok(taken)
    }

    /// 叶子块先归还，随后是承载它们的索引块自身
    fn delete_level(
        num: u64,
        level: u32,
        mut remaining: u64,
        store: &BlockStore,
        data_stream: &Mutex<IntStream>,
    ) -> FsResult<u64> {
        let block = store.get_data(num)?.unwrap_or_else(DataBlock::zeroed);

        for slot in 0..PTRS_PER_BLOCK {
            if remaining == 0 {
                break;
            }
            let child = block.ptr_at(slot);
            if level == 1 {
                if child != 0 {
                    store.delete_block(child)?;
                    data_stream.lock().put(child);
                }
                remaining -= 1;
            } else {
                remaining = Self::delete_level(child, level - 1, remaining, store, data_stream)?;
            }
        }

        if num != 0 {
            store.delete_block(num)?;
            data_stream.lock().put(num);
        }
        Ok(remaining)
    }
}

/// 取出编号为 `num` 的 inode：定位所在 inode 块，切出子区间解码
pub fn get_inode(num: u64, store: &BlockStore) -> FsResult<Inode> {
    let block_num = num / INODES_PER_BLOCK as u64;
    let Some(block) = store.get_inode_block(block_num)? else {
        return Err(FsError::not_found(format!("inode {num}")));
    };
    let at = (num % INODES_PER_BLOCK as u64) as usize * INODE_SIZE;
    Inode::decode(&block[at..at + INODE_SIZE])
}

/// 写回编号为 `num` 的 inode：取出（或新建）所在块，
/// 拼接进正确的子区间再写回
pub fn put_inode(num: u64, inode: &Inode, store: &BlockStore) -> FsResult<()> {
    let block_num = num / INODES_PER_BLOCK as u64;
    let mut block = store
        .get_inode_block(block_num)?
        .unwrap_or_else(DataBlock::zeroed);
    let at = (num % INODES_PER_BLOCK as u64) as usize * INODE_SIZE;
    block[at..at + INODE_SIZE].copy_from_slice(&inode.encode());
    store.put_inode_block(block_num, &block)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backends::MemoryStore;

    fn test_store(capacity: usize) -> (BlockStore, MemoryStore, MemoryStore) {
        let table = MemoryStore::new();
        let bucket = MemoryStore::new();
        let store = BlockStore::new(
            Arc::new(bucket.clone()),
            Arc::new(table.clone()),
            capacity,
        );
        (store, table, bucket)
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut inode = Inode::new(true);
        inode.size = 98765;
        inode.link_count = 3;
        inode.unix_time = 1_700_000_000;
        inode.inline[0] = 0xAB;
        inode.inline[INODE_BUFFER_SIZE - 1] = 0xCD;
        inode.extents[0] = 42;
        inode.extents[TRIPLY_SLOT] = 7;

        let decoded = Inode::decode(&inode.encode()).unwrap();
        assert_eq!(decoded.size, 98765);
        assert_eq!(decoded.link_count, 3);
        assert_eq!(decoded.unix_time, 1_700_000_000);
        assert!(decoded.is_dir);
        assert_eq!(decoded.inline[0], 0xAB);
        assert_eq!(decoded.inline[INODE_BUFFER_SIZE - 1], 0xCD);
        assert_eq!(decoded.extents[0], 42);
        assert_eq!(decoded.extents[TRIPLY_SLOT], 7);
    }

    #[test]
    fn bad_kind_byte_is_corrupt() {
        let mut bytes = Inode::new(false).encode();
        bytes[18] = 9;
        assert!(matches!(
            Inode::decode(&bytes),
            Err(FsError::Corrupt(_))
        ));
    }

    #[test]
    fn inline_write_never_touches_stores() {
        let (store, table, bucket) = test_store(4);
        let data_stream = Mutex::new(IntStream::new());

        let mut inode = Inode::new(false);
        let data = patterned(239);
        inode.write(&data, 0, &store, &data_stream).unwrap();

        assert_eq!(inode.read(0, 239, &store).unwrap(), data);
        assert!(table.is_empty());
        assert!(bucket.is_empty());
    }

    #[test]
    fn fresh_inode_read_edges() {
        let (store, _, _) = test_store(4);
        let inode = Inode::new(false);

        assert!(inode.read(0, 0, &store).unwrap().is_empty());
        assert!(matches!(
            inode.read(0, 1, &store),
            Err(FsError::OffsetPastEnd)
        ));
    }

    #[test]
    fn read_is_clamped_at_eof() {
        let (store, _, _) = test_store(4);
        let data_stream = Mutex::new(IntStream::new());

        let mut inode = Inode::new(false);
        inode.write(b"hello", 0, &store, &data_stream).unwrap();

        assert_eq!(inode.read(3, 100, &store).unwrap(), b"lo");
        assert!(matches!(
            inode.read(5, 1, &store),
            Err(FsError::OffsetPastEnd)
        ));
    }

    #[test]
    fn direct_extent_roundtrip() {
        let (store, _, _) = test_store(64);
        let data_stream = Mutex::new(IntStream::new());

        // 120 KiB：越过内联缓冲，落进若干直接块
        let data = patterned(120 * 1024);
        let mut inode = Inode::new(false);
        inode.write(&data, 0, &store, &data_stream).unwrap();

        assert_eq!(inode.read(0, data.len() as u64, &store).unwrap(), data);
        assert!(inode.extents[0] != 0);
        assert_eq!(inode.extents[SINGLY_SLOT], 0);
    }

    #[test]
    fn singly_indirect_roundtrip() {
        let (store, _, _) = test_store(64);
        let data_stream = Mutex::new(IntStream::new());

        // 420 KiB：写满 12 个直接块后溢进一级索引
        let data = patterned(420 * 1024);
        let mut inode = Inode::new(false);
        inode.write(&data, 0, &store, &data_stream).unwrap();

        assert!(inode.extents[SINGLY_SLOT] != 0);
        assert_eq!(inode.read(0, data.len() as u64, &store).unwrap(), data);
    }

    #[test]
    fn chunked_writes_reassemble_exactly() {
        let (store, _, _) = test_store(64);
        let data_stream = Mutex::new(IntStream::new());

        let data = patterned(100_000);
        let mut inode = Inode::new(false);
        // 奇数步长的分片写，专戳块边界
        for (i, chunk) in data.chunks(7_321).enumerate() {
            let offset = (i * 7_321) as u64;
            inode.write(chunk, offset, &store, &data_stream).unwrap();
        }

        assert_eq!(inode.size, data.len() as u64);
        assert_eq!(inode.read(0, data.len() as u64, &store).unwrap(), data);
    }

    #[test]
    fn overwrite_keeps_size_at_max() {
        let (store, _, _) = test_store(16);
        let data_stream = Mutex::new(IntStream::new());

        let mut inode = Inode::new(false);
        inode.write(&patterned(1000), 0, &store, &data_stream).unwrap();
        inode.write(b"xy", 10, &store, &data_stream).unwrap();

        assert_eq!(inode.size, 1000);
        let read = inode.read(0, 1000, &store).unwrap();
        assert_eq!(&read[10..12], b"xy");
    }

    #[test]
    fn hole_reads_back_zeroes() {
        let (store, _, _) = test_store(64);
        let data_stream = Mutex::new(IntStream::new());

        let mut inode = Inode::new(false);
        // 跳过前面的地址区间直写一级索引深处
        let offset = 500_000u64;
        inode.write(b"deep", offset, &store, &data_stream).unwrap();

        let read = inode.read(0, offset + 4, &store).unwrap();
        assert!(read[..offset as usize].iter().all(|&b| b == 0));
        assert_eq!(&read[offset as usize..], b"deep");
    }

    #[test]
    fn delete_returns_blocks_to_stream() {
        let (store, table, bucket) = test_store(64);
        let data_stream = Mutex::new(IntStream::new());

        let data = patterned(420 * 1024);
        let mut inode = Inode::new(false);
        inode.write(&data, 0, &store, &data_stream).unwrap();
        let allocated_after_write = {
            let mut guard = data_stream.lock();
            let probe = guard.next();
            guard.put(probe);
            probe - 1
        };
        assert!(allocated_after_write >= 13);

        inode.delete_all_data(&store, &data_stream).unwrap();

        // 所有键都应从两边消失
        assert!(table.is_empty());
        assert!(bucket.is_empty());
        // 归还的编号会被优先复用
        let reused = data_stream.lock().next();
        assert!(reused <= allocated_after_write);
        assert!(inode.extents.iter().all(|&n| n == 0));
    }

    #[test]
    fn inode_block_splicing_preserves_neighbours() {
        let (store, _, _) = test_store(8);

        let mut first = Inode::new(false);
        first.size = 111;
        let mut second = Inode::new(true);
        second.size = 222;

        // 同一个 inode 块内的两个编号
        put_inode(2, &first, &store).unwrap();
        put_inode(3, &second, &store).unwrap();

        assert_eq!(get_inode(2, &store).unwrap().size, 111);
        let got = get_inode(3, &store).unwrap();
        assert_eq!(got.size, 222);
        assert!(got.is_dir);
    }

    #[test]
    fn missing_inode_block_is_not_found() {
        let (store, _, _) = test_store(4);
        assert!(matches!(
            get_inode(99, &store),
            Err(FsError::NotFound(_))
        ));
    }
}
