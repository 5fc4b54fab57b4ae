//! 挂载会话：引导两个远端存储，走完挂载到卸载的生命周期。
//!
//! 真正的对象桶与键值表客户端是外部协作者，本仓库只背靠
//! 它们的契约。随库代用品：桶名解释为本地目录
//! （[`DirBucket`]），表用进程内的 [`MemoryStore`] 顶替——
//! 缓存内容本就不承诺跨进程存活，卸载时会悉数冲进桶里。
//! 接入真客户端时，替换 [`Session::start`] 里的两行构造即可。

use std::sync::Arc;

use log::info;
use thiserror::Error;

use cloud_fs::backends::{DirBucket, MemoryStore};
use cloud_fs::{CloudFileSystem, Dir, FsError, KvTable, ObjectStore, StoreError};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum SessionError {
    /// 桶或表既不存在又建不出来，启动无从谈起
    #[error("store bootstrap failed: {0}")]
    Bootstrap(#[from] StoreError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

pub struct Session {
    fs: Arc<CloudFileSystem>,
}

impl Session {
    /// 按配置引导存储并挂载
    pub fn start(config: &Config, cache_capacity: usize) -> Result<Self, SessionError> {
        let bucket = Arc::new(DirBucket::new(&config.bucket));
        let table = Arc::new(MemoryStore::new());
        info!(
            "bucket {:?} (local directory), table {:?} (in-process)",
            config.bucket, config.table
        );
        Self::with_stores(bucket, table, cache_capacity)
    }

    /// 用任意一对存储挂载；测试与真客户端从这里进来
    pub fn with_stores(
        bucket: Arc<dyn ObjectStore>,
        table: Arc<dyn KvTable>,
        cache_capacity: usize,
    ) -> Result<Self, SessionError> {
        if !bucket.describe()? {
            info!("bucket absent, creating it");
            bucket.create()?;
        }
        if !table.describe()? {
            info!("table absent, creating it");
            table.create()?;
        }

        let fs = CloudFileSystem::mount(bucket, table, cache_capacity)?;
        info!("filesystem mounted");
        Ok(Self { fs })
    }

    pub fn root(&self) -> Result<Dir, FsError> {
        CloudFileSystem::root(&self.fs)
    }

    /// 干净卸载：超级块落盘、缓存清空
    pub fn finish(self) -> Result<(), FsError> {
        self.fs.destroy()
    }
}
