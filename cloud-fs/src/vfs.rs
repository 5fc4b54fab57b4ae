//! # 索引节点层
//!
//! 薄薄的节点记录：inode 加上它的编号，按目录/文件分型，
//! 供内核桥接层驱动。目录操作读改写目录表；文件操作委托给
//! inode 的数据遍历。句柄在打开时物化状态，关闭时持久化。
//!
//! 各操作之间由桥接层串行化，节点层自身不设锁。

use std::sync::Arc;

use crate::cfs::CloudFileSystem;
use crate::error::{FsError, FsResult};
use crate::layout::{self, DirTable, Inode};

/// 给桥接层 getattr 用的节点元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub size: u64,
    pub kind: NodeKind,
    pub unix_time: u64,
    pub link_count: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// 查找的结果：目录或文件
pub enum Node {
    Dir(Dir),
    File(File),
}

impl Node {
    pub fn attr(&self) -> NodeAttr {
        match self {
            Node::Dir(dir) => dir.attr(),
            Node::File(file) => file.attr(),
        }
    }

    pub fn inode_num(&self) -> u64 {
        match self {
            Node::Dir(dir) => dir.inode_num(),
            Node::File(file) => file.inode_num(),
        }
    }

    pub fn into_dir(self) -> Option<Dir> {
        match self {
            Node::Dir(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<File> {
        match self {
            Node::File(file) => Some(file),
            Node::Dir(_) => None,
        }
    }
}

fn attr_of(inode: &Inode) -> NodeAttr {
    NodeAttr {
        size: inode.size,
        kind: if inode.is_dir {
            NodeKind::Directory
        } else {
            NodeKind::File
        },
        unix_time: inode.unix_time,
        link_count: inode.link_count,
    }
}

pub struct Dir {
    inode: Inode,
    inode_num: u64,
    fs: Arc<CloudFileSystem>,
}

impl Dir {
    pub(crate) fn new(inode: Inode, inode_num: u64, fs: Arc<CloudFileSystem>) -> Self {
        Self {
            inode,
            inode_num,
            fs,
        }
    }

    #[inline]
    pub fn attr(&self) -> NodeAttr {
        attr_of(&self.inode)
    }

    #[inline]
    pub fn inode_num(&self) -> u64 {
        self.inode_num
    }

    /// 按名字取出子节点
    pub fn lookup(&self, name: &str) -> FsResult<Node> {
        let num = self.read_table()?.lookup(name);
        if num == 0 {
            return Err(FsError::not_found(name));
        }
        let inode = layout::get_inode(num, &self.fs.store)?;
        Ok(if inode.is_dir {
            Node::Dir(Dir::new(inode, num, self.fs.clone()))
        } else {
            Node::File(File::new(inode, num, self.fs.clone()))
        })
    }

    /// 打开目录：把目录表物化进句柄
    pub fn open(&self) -> FsResult<DirHandle> {
        Ok(DirHandle {
            table: self.read_table()?,
            fs: self.fs.clone(),
        })
    }

    /// 新建子目录并挂进自己的目录表
    pub fn mkdir(&mut self, name: &str) -> FsResult<Dir> {
        let num = self.fs.inode_stream.lock().next();
        let mut inode = Inode::new(true);
        inode.init(self.inode_num, num, &self.fs.store, &self.fs.data_stream)?;
        layout::put_inode(num, &inode, &self.fs.store)?;
        self.add_entry(name, num)?;
        Ok(Dir::new(inode, num, self.fs.clone()))
    }

    /// 新建文件。名字已存在时不覆盖，原文件照常打开。
    pub fn create(&mut self, name: &str) -> FsResult<(File, FileHandle)> {
        let existing = self.read_table()?.lookup(name);
        let (inode, num) = if existing == 0 {
            let num = self.fs.inode_stream.lock().next();
            let mut inode = Inode::new(false);
            inode.init(self.inode_num, num, &self.fs.store, &self.fs.data_stream)?;
            layout::put_inode(num, &inode, &self.fs.store)?;
            self.add_entry(name, num)?;
            (inode, num)
        } else {
            (layout::get_inode(existing, &self.fs.store)?, existing)
        };

        let file = File::new(inode.clone(), num, self.fs.clone());
        let handle = FileHandle {
            inode,
            inode_num: num,
            fs: self.fs.clone(),
        };
        Ok((file, handle))
    }

    /// 摘掉一个目录项。链接数归零的 inode 连同数据一起回收，
    /// 编号送回 inode 流。带目录语义的删除要求目标只剩
    /// `.` 与 `..` 两项。
    pub fn remove(&mut self, name: &str, is_dir: bool) -> FsResult<()> {
        let num = self.read_table()?.lookup(name);
        if num == 0 {
            return Err(FsError::not_found(name));
        }
        let mut inode = layout::get_inode(num, &self.fs.store)?;

        if is_dir && inode.is_dir {
            let bytes = inode.read(0, inode.size, &self.fs.store)?;
            if DirTable::from_bytes(&bytes)?.len() != 2 {
                return Err(FsError::NotEmpty(name.to_owned()));
            }
        }

        inode.link_count -= 1;
        if inode.link_count == 0 {
            inode.delete_all_data(&self.fs.store, &self.fs.data_stream)?;
            self.fs.inode_stream.lock().put(num);
        }
        layout::put_inode(num, &inode, &self.fs.store)?;
        self.remove_entry(name)?;
        Ok(())
    }

    /// 把 `old_name` 移交给目标目录（`None` 表示原地改名）。
    /// 顶掉已有的 `new_name` 时，被顶者按 remove 的规则回收。
    pub fn rename(
        &mut self,
        old_name: &str,
        new_dir: Option<&mut Dir>,
        new_name: &str,
    ) -> FsResult<()> {
        let num = self.remove_entry(old_name)?;
        match new_dir {
            Some(dir) => dir.add_entry_reclaiming(new_name, num),
            None => self.add_entry_reclaiming(new_name, num),
        }
    }

    fn read_table(&self) -> FsResult<DirTable> {
        let bytes = self.inode.read(0, self.inode.size, &self.fs.store)?;
        DirTable::from_bytes(&bytes)
    }

    /// 表写回 inode 内容区，大小收敛到表的实际字节数，再持久化
    fn write_table(&mut self, table: &DirTable) -> FsResult<()> {
        let bytes = table.to_bytes()?;
        self.inode
            .write(&bytes, 0, &self.fs.store, &self.fs.data_stream)?;
        self.inode.update_size(bytes.len() as u64);
        layout::put_inode(self.inode_num, &self.inode, &self.fs.store)
    }

    fn add_entry(&mut self, name: &str, num: u64) -> FsResult<()> {
        let mut table = self.read_table()?;
        table.add(name, num);
        self.write_table(&table)
    }

    fn add_entry_reclaiming(&mut self, name: &str, num: u64) -> FsResult<()> {
        let mut table = self.read_table()?;
        let displaced = table.lookup(name);
        if displaced != 0 && displaced != num {
            let mut inode = layout::get_inode(displaced, &self.fs.store)?;
            inode.link_count -= 1;
            if inode.link_count == 0 {
                inode.delete_all_data(&self.fs.store, &self.fs.data_stream)?;
                self.fs.inode_stream.lock().put(displaced);
            }
            layout::put_inode(displaced, &inode, &self.fs.store)?;
        }
        table.add(name, num);
        self.write_table(&table)
    }

    /// 摘表项并返回其编号；名字缺失报 NotFound
    fn remove_entry(&mut self, name: &str) -> FsResult<u64> {
        let mut table = self.read_table()?;
        let num = table.lookup(name);
        if num == 0 {
            return Err(FsError::not_found(name));
        }
        table.delete(name);
        self.write_table(&table)?;
        Ok(num)
    }
}

/// 目录句柄：持有打开瞬间的目录表
pub struct DirHandle {
    table: DirTable,
    fs: Arc<CloudFileSystem>,
}

impl DirHandle {
    /// 列出所有目录项及其分型，按名字排序
    pub fn readdir(&self) -> FsResult<Vec<(String, NodeKind)>> {
        let mut out = Vec::with_capacity(self.table.len());
        for (name, num) in self.table.entries() {
            let inode = layout::get_inode(num, &self.fs.store)?;
            let kind = if inode.is_dir {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            out.push((name.to_owned(), kind));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// 关闭句柄：表与 inode 一起写回
    pub fn release(self, dir: &mut Dir) -> FsResult<()> {
        dir.write_table(&self.table)
    }
}

pub struct File {
    inode: Inode,
    inode_num: u64,
    fs: Arc<CloudFileSystem>,
}

impl File {
    pub(crate) fn new(inode: Inode, inode_num: u64, fs: Arc<CloudFileSystem>) -> Self {
        Self {
            inode,
            inode_num,
            fs,
        }
    }

    #[inline]
    pub fn attr(&self) -> NodeAttr {
        attr_of(&self.inode)
    }

    #[inline]
    pub fn inode_num(&self) -> u64 {
        self.inode_num
    }

    pub fn open(&self) -> FileHandle {
        FileHandle {
            inode: self.inode.clone(),
            inode_num: self.inode_num,
            fs: self.fs.clone(),
        }
    }
}

/// 文件句柄：写入只改块与内存中的 inode，关闭时才写回 inode
pub struct FileHandle {
    inode: Inode,
    inode_num: u64,
    fs: Arc<CloudFileSystem>,
}

impl FileHandle {
    #[inline]
    pub fn attr(&self) -> NodeAttr {
        attr_of(&self.inode)
    }

    pub fn read(&self, offset: u64, size: u64) -> FsResult<Vec<u8>> {
        self.inode.read(offset, size, &self.fs.store)
    }

    /// 返回写入的字节数，恒等于 `data.len()`
    pub fn write(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.inode
            .write(data, offset, &self.fs.store, &self.fs.data_stream)?;
        Ok(data.len())
    }

    pub fn release(&self) -> FsResult<()> {
        layout::put_inode(self.inode_num, &self.inode, &self.fs.store)
    }
}
