//! # 存储布局层
//!
//! 决定远端字节的持久形态：
//! - [`Inode`]：定长元数据记录，内联缓冲加三级间接索引；
//! - [`DirTable`]：目录 inode 的数据负载，文件名到编号的映射；
//! - [`SuperBlock`]：分配器状态与 inode 回收栈的跨块打包。
//!
//! 改动任何一处编码都会改变在存格式，与旧数据不兼容。

mod dir_table;
mod inode;
mod super_block;

pub use dir_table::DirTable;
pub use inode::{get_inode, put_inode, Inode, INODE_BUFFER_SIZE, NUM_DATA_BLOCKS};
pub use super_block::SuperBlock;
