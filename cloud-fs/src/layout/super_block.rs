//! 超级块：分配器状态与 inode 回收栈的落盘形态。
//!
//! 首块开头 32 字节是头部：两条编号流的 `last`、根 inode 编号、
//! 回收栈的字节长度；其后紧跟栈字节，装不下就溢出到
//! `super1, super2, …` 继续。回收栈可以长到任意大小，
//! 这是超级块唯一的变长部分。

use crate::error::{FsError, FsResult};
use crate::{DataBlock, BLOCK_SIZE};

/// 首块内头部占用的字节数
const HEADER_SIZE: usize = 32;

pub struct SuperBlock {
    /// inode 编号流的 `last`，按 [`IntStream::compress`](crate::IntStream::compress) 的形态
    pub inode_last: [u8; 8],
    /// 数据块编号流的 `last`
    pub data_last: [u8; 8],
    pub root_inode: u64,
    /// inode 编号流的回收栈，序列化形态
    pub free_stack: Vec<u8>,
}

impl SuperBlock {
    /// 打包为 `super0..superN` 的块序列
    pub fn pack(&self) -> Vec<DataBlock> {
        let mut first = DataBlock::zeroed();
        first[0..8].copy_from_slice(&self.inode_last);
        first[8..16].copy_from_slice(&self.data_last);
        first[16..24].copy_from_slice(&self.root_inode.to_le_bytes());
        first[24..32].copy_from_slice(&(self.free_stack.len() as u64).to_le_bytes());

        let head_take = self.free_stack.len().min(BLOCK_SIZE - HEADER_SIZE);
        first[HEADER_SIZE..HEADER_SIZE + head_take].copy_from_slice(&self.free_stack[..head_take]);

        let mut blocks = vec![first];
        for chunk in self.free_stack[head_take..].chunks(BLOCK_SIZE) {
            let mut block = DataBlock::zeroed();
            block[..chunk.len()].copy_from_slice(chunk);
            blocks.push(block);
        }
        blocks
    }

    /// 从首块读出回收栈的总字节数
    pub fn stack_len(first: &DataBlock) -> u64 {
        u64::from_le_bytes(first[24..32].try_into().unwrap())
    }

    /// 这么长的栈需要几个续块
    pub fn continuation_blocks(stack_len: u64) -> u64 {
        stack_len
            .saturating_sub((BLOCK_SIZE - HEADER_SIZE) as u64)
            .div_ceil(BLOCK_SIZE as u64)
    }

    /// 从完整的块序列还原。块数不足以容纳头部宣称的栈长，
    /// 说明远端状态已经损坏。
    pub fn unpack(blocks: &[DataBlock]) -> FsResult<Self> {
        let Some(first) = blocks.first() else {
            return Err(FsError::corrupt("empty superblock sequence"));
        };
        let stack_len = Self::stack_len(first) as usize;
        let needed = 1 + Self::continuation_blocks(stack_len as u64) as usize;
        if blocks.len() < needed {
            return Err(FsError::corrupt(format!(
                "superblock claims {stack_len} stack bytes but only {} blocks present",
                blocks.len()
            )));
        }

        let mut free_stack = Vec::with_capacity(stack_len);
        let head_take = stack_len.min(BLOCK_SIZE - HEADER_SIZE);
        free_stack.extend_from_slice(&first[HEADER_SIZE..HEADER_SIZE + head_take]);
        let mut left = stack_len - head_take;
        for block in &blocks[1..needed] {
            let take = left.min(BLOCK_SIZE);
            free_stack.extend_from_slice(&block[..take]);
            left -= take;
        }

        Ok(Self {
            inode_last: first[0..8].try_into().unwrap(),
            data_last: first[8..16].try_into().unwrap(),
            root_inode: u64::from_le_bytes(first[16..24].try_into().unwrap()),
            free_stack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::IntStream;

    fn sample(free_stack: Vec<u8>) -> SuperBlock {
        SuperBlock {
            inode_last: 5u64.to_le_bytes(),
            data_last: 9u64.to_le_bytes(),
            root_inode: 1,
            free_stack,
        }
    }

    #[test]
    fn empty_stack_fits_one_block() {
        let packed = sample(Vec::new()).pack();
        assert_eq!(packed.len(), 1);

        let restored = SuperBlock::unpack(&packed).unwrap();
        assert_eq!(restored.inode_last, 5u64.to_le_bytes());
        assert_eq!(restored.data_last, 9u64.to_le_bytes());
        assert_eq!(restored.root_inode, 1);
        assert!(restored.free_stack.is_empty());
    }

    #[test]
    fn large_stack_spans_blocks() {
        // 一万个回收编号：8 万字节，要两个续块
        let mut stream = IntStream::new();
        for n in 2..10_002u64 {
            stream.put(n);
        }
        let stack = stream.serialize_stack();
        assert_eq!(
            SuperBlock::continuation_blocks(stack.len() as u64),
            2
        );

        let packed = sample(stack.clone()).pack();
        assert_eq!(packed.len(), 3);

        let restored = SuperBlock::unpack(&packed).unwrap();
        assert_eq!(restored.free_stack, stack);

        let mut back = IntStream::new();
        back.deserialize_stack(&restored.free_stack).unwrap();
        assert_eq!(back.next(), 10_001);
    }

    #[test]
    fn missing_continuation_is_corrupt() {
        let packed = sample(vec![7u8; BLOCK_SIZE]).pack();
        assert_eq!(packed.len(), 2);
        assert!(matches!(
            SuperBlock::unpack(&packed[..1]),
            Err(FsError::Corrupt(_))
        ));
    }

    #[test]
    fn exact_boundary_stack() {
        // 恰好填满首块，不多一个字节
        let stack = vec![3u8; BLOCK_SIZE - 32];
        let packed = sample(stack.clone()).pack();
        assert_eq!(packed.len(), 1);
        assert_eq!(SuperBlock::unpack(&packed).unwrap().free_stack, stack);
    }
}
