//! # 远端存储接口层
//!
//! 文件系统把持久化委托给两种远端存储：
//!
//! - [`ObjectStore`]：慢而耐久的对象桶，块的最终归宿；
//! - [`KvTable`]：快的键值表，承载写回缓存的内容。
//!
//! 两者契约同形：`get` 对缺失键返回 `None` 而非错误，
//! 调用者将其解释为"块尚未分配"并以零填充块继续。
//! `describe`/`create` 仅在启动时用于确认或建立存储。
//!
//! 真正的网络客户端由宿主提供；本 crate 只内置
//! [内存与本地目录实现](crate::backends)。

use thiserror::Error;

/// 远端调用的失败。对核心而言一律是 [`Transport`](crate::FsError::Transport)。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 对象桶契约
pub trait ObjectStore: Send + Sync {
    /// 缺失键返回 `Ok(None)`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// 删除缺失键不是错误
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 桶是否已存在且就绪
    fn describe(&self) -> Result<bool, StoreError>;

    fn create(&self) -> Result<(), StoreError>;
}

/// 键值表契约，与 [`ObjectStore`] 同形
pub trait KvTable: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    fn describe(&self) -> Result<bool, StoreError>;

    fn create(&self) -> Result<(), StoreError>;
}
