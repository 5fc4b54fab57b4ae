//! # 内置存储后端
//!
//! - [`MemoryStore`]：共享内存表，同时实现桶与键值表契约，用于测试；
//! - [`DirBucket`]：本地目录充当对象桶，键即文件名，用于宿主工具。

mod local;
mod memory;

pub use local::DirBucket;
pub use memory::MemoryStore;
