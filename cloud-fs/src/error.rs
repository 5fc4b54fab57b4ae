//! # 错误类型
//!
//! 上层把 [`FsError::NotFound`] 与 [`FsError::NotEmpty`] 译为标准的
//! 文件系统错误信号；[`FsError::Corrupt`] 与 [`FsError::Exhausted`]
//! 意味着远端状态已不可信，应在边界处终止而非掩盖。

use thiserror::Error;

use crate::store::StoreError;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    /// 名字、inode 或本应存在的块缺失。
    /// 写路径上的缺失块不属于此类，那是"尚未分配"的正常信号。
    #[error("no such entry: {0}")]
    NotFound(String),

    /// 目录表项数不为 2（`.` 与 `..` 之外仍有残留）时的删除
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// 读偏移超出 inode 记录的大小
    #[error("offset past end of file")]
    OffsetPastEnd,

    /// 远端返回的字节无法解码为预期结构
    #[error("corrupt on-store data: {0}")]
    Corrupt(String),

    /// 远端调用失败；当前设计不重试
    #[error("remote store failure: {0}")]
    Transport(#[from] StoreError),

    /// 遍历穷尽了三级间接索引仍有剩余，属实现缺陷
    #[error("traversal exhausted the triply indirect level")]
    Exhausted,
}

impl FsError {
    #[inline]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    #[inline]
    pub fn corrupt(what: impl Into<String>) -> Self {
        Self::Corrupt(what.into())
    }
}
