//! 文件系统块 I/O 层
//!
//! 这个模块提供文件系统驱动使用的块读写接口：缓存读写、直接 I/O 和写回。

mod filesystem;
mod types;

pub use filesystem::{DiskBackedFileSystem, FileSystemFlush};
pub use types::{FsConfig, IoDescription, IoFlags};
