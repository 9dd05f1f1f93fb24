//! diskfs_core: 磁盘文件系统的块缓存层
//!
//! 位于文件系统驱动和原始块设备之间的固定容量写回缓存：
//! - **写回语义**：缓存写入只标记为脏，显式刷新或缓存压力时才写回设备
//! - **只驱逐干净行**：被丢弃的数据一定已经在设备上
//! - **直接 I/O**：绕过缓存，访问前先写回该块的脏数据
//! - **完整的错误传播**：所有设备访问都返回 [`Result`]
//!
//! # 示例
//!
//! ```rust,ignore
//! use diskfs_core::{DiskBackedFileSystem, FileSystemFlush, ManualClock, RamDisk, Result};
//!
//! fn main() -> Result<()> {
//!     let device = RamDisk::new(512, 1024)?;
//!     let fs = DiskBackedFileSystem::new(device, ManualClock::new(0))?;
//!
//!     // 写入缓存
//!     let data = vec![0x42u8; 512];
//!     fs.write_block(10, &data, None)?;
//!
//!     // 读取块（缓存命中）
//!     let mut buf = vec![0u8; 512];
//!     fs.read_block(10, &mut buf, None)?;
//!
//!     // 写回设备
//!     fs.flush_writes()?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象
//! - [`cache`] - 块缓存
//! - [`fs`] - 文件系统块 I/O 层
//! - [`time`] - 时间源
//! - [`consts`] - 常量定义

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 时间源
pub mod time;

/// 块设备抽象
pub mod block;

/// 块缓存
pub mod cache;

/// 文件系统块 I/O 层
pub mod fs;

#[cfg(test)]
mod test_utils;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, RamDisk};

// 时间源
pub use time::{Clock, HalClock, ManualClock, SystemHal};
#[cfg(feature = "std")]
pub use time::StdClock;

// 缓存
pub use cache::{CacheEntry, CacheLine, CacheStats, DiskCache, EntryFlags};
pub use consts::DEFAULT_CACHE_ENTRIES;

// 文件系统
pub use fs::{DiskBackedFileSystem, FileSystemFlush, FsConfig, IoDescription, IoFlags};
