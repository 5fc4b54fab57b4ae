//! # 文件系统管理层
//!
//! 持有两条编号流与块存储（缓存在其中），执行挂载与卸载协议：
//!
//! - 挂载：读 `super0`，缺失则合成全新状态；沿续块读完
//!   inode 回收栈；确保根 inode 存在。
//! - 卸载：压缩两条流的 `last`、序列化回收栈、打包成
//!   `super0..superN` 写入，最后清空缓存。中断这段序列
//!   会损坏远端状态。

use std::sync::Arc;

use log::{error, info};
use spin::Mutex;

use crate::block_store::BlockStore;
use crate::error::{FsError, FsResult};
use crate::layout::{self, Inode, SuperBlock};
use crate::store::{KvTable, ObjectStore};
use crate::stream::IntStream;
use crate::vfs::Dir;
use crate::{DataBlock, ROOT_INODE};

/// 超级块键的公共前缀，`super0` 起步
const SUPERBLOCK_KEY: &str = "super";

pub struct CloudFileSystem {
    pub(crate) store: BlockStore,
    pub(crate) inode_stream: Mutex<IntStream>,
    pub(crate) data_stream: Mutex<IntStream>,
    root_inode: u64,
}

impl CloudFileSystem {
    /// 挂载协议。`cache_capacity` 以块计，必须为正。
    pub fn mount(
        bucket: Arc<dyn ObjectStore>,
        table: Arc<dyn KvTable>,
        cache_capacity: usize,
    ) -> FsResult<Arc<Self>> {
        let store = BlockStore::new(bucket, table, cache_capacity);

        let (inode_stream, data_stream, root_inode) =
            match store.get_by_key(&format!("{SUPERBLOCK_KEY}0"))? {
                Some(first) => Self::restore(&store, first)?,
                None => {
                    info!("no superblock in store, starting a fresh filesystem");
                    (IntStream::new(), IntStream::new(), ROOT_INODE)
                }
            };

        let fs = Arc::new(Self {
            store,
            inode_stream: Mutex::new(inode_stream),
            data_stream: Mutex::new(data_stream),
            root_inode,
        });
        fs.ensure_root()?;
        Ok(fs)
    }

    /// 根目录节点
    pub fn root(fs: &Arc<Self>) -> FsResult<Dir> {
        let inode = layout::get_inode(fs.root_inode, &fs.store)?;
        Ok(Dir::new(inode, fs.root_inode, fs.clone()))
    }

    /// 卸载协议。部分失败各自记录，不重试，最后统一上报首个错误。
    pub fn destroy(&self) -> FsResult<()> {
        info!("beginning filesystem cleanup");
        let superblock = {
            let inode_stream = self.inode_stream.lock();
            SuperBlock {
                inode_last: inode_stream.compress(),
                data_last: self.data_stream.lock().compress(),
                root_inode: self.root_inode,
                free_stack: inode_stream.serialize_stack(),
            }
        };

        let mut first_err = None;
        for (i, block) in superblock.pack().iter().enumerate() {
            let key = format!("{SUPERBLOCK_KEY}{i}");
            if let Err(e) = self.store.put_by_key(&key, block) {
                error!("writing {key} on destroy: {e}");
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.store.flush() {
            error!("emptying cache on destroy: {e}");
            first_err.get_or_insert(e);
        }

        match first_err {
            None => {
                info!("filesystem cleanup successful");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    /// 从 `super0` 出发还原两条编号流与根编号
    fn restore(store: &BlockStore, first: DataBlock) -> FsResult<(IntStream, IntStream, u64)> {
        let continuations = SuperBlock::continuation_blocks(SuperBlock::stack_len(&first));
        let mut blocks = vec![first];
        for i in 1..=continuations {
            let key = format!("{SUPERBLOCK_KEY}{i}");
            let Some(block) = store.get_by_key(&key)? else {
                return Err(FsError::corrupt(format!("superblock {key} missing")));
            };
            blocks.push(block);
        }
        let superblock = SuperBlock::unpack(&blocks)?;

        let mut inode_stream = IntStream::new();
        inode_stream.decompress(superblock.inode_last);
        inode_stream.deserialize_stack(&superblock.free_stack)?;
        let mut data_stream = IntStream::new();
        data_stream.decompress(superblock.data_last);

        Ok((inode_stream, data_stream, superblock.root_inode))
    }

    /// 根 inode 缺失时补一个：目录，父与自身都是根
    fn ensure_root(&self) -> FsResult<()> {
        match layout::get_inode(self.root_inode, &self.store) {
            Ok(_) => Ok(()),
            Err(FsError::NotFound(_)) => {
                info!("creating root inode {}", self.root_inode);
                let mut root = Inode::new(true);
                root.init(
                    self.root_inode,
                    self.root_inode,
                    &self.store,
                    &self.data_stream,
                )?;
                layout::put_inode(self.root_inode, &root, &self.store)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;

    fn stores() -> (MemoryStore, MemoryStore) {
        (MemoryStore::new(), MemoryStore::new())
    }

    fn mount(bucket: &MemoryStore, table: &MemoryStore) -> Arc<CloudFileSystem> {
        CloudFileSystem::mount(Arc::new(bucket.clone()), Arc::new(table.clone()), 32).unwrap()
    }

    #[test]
    fn fresh_mount_builds_root() {
        let (bucket, table) = stores();
        let fs = mount(&bucket, &table);
        let root = CloudFileSystem::root(&fs).unwrap();
        assert_eq!(root.inode_num(), ROOT_INODE);
        // 根目录的 `..` 指向它自己
        assert_eq!(root.lookup("..").unwrap().inode_num(), ROOT_INODE);
        assert_eq!(root.open().unwrap().readdir().unwrap().len(), 2);
    }

    #[test]
    fn files_survive_remount() {
        let (bucket, table) = stores();
        let data: Vec<u8> = (0..10_000).map(|i| (i % 255) as u8).collect();

        {
            let fs = mount(&bucket, &table);
            let mut root = CloudFileSystem::root(&fs).unwrap();
            let (_, mut handle) = root.create("persist.bin").unwrap();
            handle.write(&data, 0).unwrap();
            handle.release().unwrap();
            fs.destroy().unwrap();
        }

        // 停机后快表应当已被清空，一切都落在桶里
        assert!(table.is_empty());
        assert!(!bucket.is_empty());

        let fs = mount(&bucket, &table);
        let root = CloudFileSystem::root(&fs).unwrap();
        let file = root.lookup("persist.bin").unwrap().into_file().unwrap();
        assert_eq!(file.open().read(0, data.len() as u64).unwrap(), data);
    }

    #[test]
    fn allocator_state_survives_remount() {
        let (bucket, table) = stores();

        let freed = {
            let fs = mount(&bucket, &table);
            let mut root = CloudFileSystem::root(&fs).unwrap();
            let (file, _) = root.create("short-lived").unwrap();
            let num = file.inode_num();
            root.remove("short-lived", false).unwrap();
            fs.destroy().unwrap();
            num
        };

        let fs = mount(&bucket, &table);
        let mut root = CloudFileSystem::root(&fs).unwrap();
        // 重新挂载后，回收栈里的编号仍然优先复用
        let (reborn, _) = root.create("newcomer").unwrap();
        assert_eq!(reborn.inode_num(), freed);
    }

    #[test]
    fn long_free_stack_spans_superblocks() {
        let (bucket, table) = stores();

        {
            let fs = mount(&bucket, &table);
            let mut stream = fs.inode_stream.lock();
            // 把 last 抬高后归还一大批编号，栈长超过一个块
            stream.decompress(20_000u64.to_le_bytes());
            for n in 2..6_000u64 {
                stream.put(n);
            }
            drop(stream);
            fs.destroy().unwrap();
        }
        assert!(bucket.contains("super0"));
        assert!(bucket.contains("super1"));

        let fs = mount(&bucket, &table);
        assert_eq!(fs.inode_stream.lock().next(), 5_999);
    }

    #[test]
    fn destroy_then_mount_twice_is_stable() {
        let (bucket, table) = stores();
        {
            let fs = mount(&bucket, &table);
            fs.destroy().unwrap();
        }
        let fs = mount(&bucket, &table);
        assert!(CloudFileSystem::root(&fs).is_ok());
        fs.destroy().unwrap();
    }
}
