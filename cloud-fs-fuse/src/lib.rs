//! 宿主侧工具库：配置装载、存储引导、挂载会话与自检套件。
//!
//! 内核桥接层（把 VFS 调用翻译成节点层操作的那一环）不在
//! 本仓库内；[`session`] 定义的就是桥接层要驱动的那段生命周期。

pub mod config;
pub mod selftest;
pub mod session;
