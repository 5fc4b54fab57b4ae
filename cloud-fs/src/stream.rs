//! # 整数流分配器
//!
//! 单调计数器加上一个后进先出的回收栈。全系统有两条流：
//! inode 编号流与数据块编号流，都从 `last = 1` 起步，
//! 因此编号 0 永远不会被发出，可以安全地充当"未分配"。
//!
//! `last` 定宽，总能放进超级块头部；回收栈变长，可能溢出到
//! 后续超级块，所以两者的序列化是分开的两对操作。

use crate::error::{FsError, FsResult};

pub struct IntStream {
    /// 历史上发出过的最大编号
    last: u64,
    /// 归还的编号，栈顶先被复用
    stack: Vec<u64>,
}

impl Default for IntStream {
    fn default() -> Self {
        Self::new()
    }
}

impl IntStream {
    #[inline]
    pub fn new() -> Self {
        Self {
            last: 1,
            stack: Vec::new(),
        }
    }

    /// 优先弹出回收栈，否则递增 `last`
    pub fn next(&mut self) -> u64 {
        match self.stack.pop() {
            Some(n) => n,
            None => {
                self.last += 1;
                debug_assert_ne!(self.last, 0);
                self.last
            }
        }
    }

    /// 归还编号。不做校验，调用者只能归还自己从 `next` 得到的编号。
    #[inline]
    pub fn put(&mut self, n: u64) {
        self.stack.push(n);
    }

    /// `last` 的定宽序列化，不含回收栈
    #[inline]
    pub fn compress(&self) -> [u8; 8] {
        self.last.to_le_bytes()
    }

    #[inline]
    pub fn decompress(&mut self, buf: [u8; 8]) {
        self.last = u64::from_le_bytes(buf);
    }

    /// 回收栈的序列化：栈底在前的小端 u64 序列
    pub fn serialize_stack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.stack.len() * 8);
        for n in &self.stack {
            out.extend_from_slice(&n.to_le_bytes());
        }
        out
    }

    /// 覆盖自身的回收栈
    pub fn deserialize_stack(&mut self, bytes: &[u8]) -> FsResult<()> {
        if bytes.len() % 8 != 0 {
            return Err(FsError::corrupt(format!(
                "free-stack of {} bytes",
                bytes.len()
            )));
        }
        self.stack = bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Ok(())
    }
}
