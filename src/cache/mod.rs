//! 块缓存模块
//!
//! 固定容量的写回块缓存，位于文件系统和块设备之间。
//!
//! # 主要组件
//!
//! - [`CacheEntry`] - 单个缓存行的元数据（块号、时间戳、状态标志）
//! - [`DiskCache`] - 缓存行池和一整块数据缓冲区，负责查找、驱逐和写回
//! - [`CacheLine`] - `get` 返回的缓存行视图（元数据 + 数据区）
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 设计原理
//!
//! 1. **整块分配**：所有缓存行的数据区来自同一次分配，按槽位号切分，
//!    缓存行之间通过下标而不是指针关联
//! 2. **线性扫描**：容量有限，`get` 用一次扫描同时完成命中判断和驱逐候选选择，
//!    不维护额外的 LRU 链表
//! 3. **只驱逐干净行**：被复用的缓存行一定已经写回设备
//! 4. **有界重试**：缓存全脏时最多强制写回一次，之后仍失败则返回错误
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use diskfs_core::cache::DiskCache;
//!
//! let mut cache = DiskCache::new(10000, 512)?;
//!
//! // 查找或分配缓存行
//! let line = cache.get(100, now, &mut device)?;
//! if !line.entry.has_data() {
//!     device.read_raw(100 * 512, line.data)?;
//!     line.entry.mark_has_data();
//! }
//!
//! // 修改数据
//! line.data[0] = 42;
//! line.entry.mark_dirty();
//! cache.set_dirty(true);
//!
//! // 写回所有脏行
//! cache.flush_all(&mut device)?;
//! ```
//!
//! # 内存分配要求
//!
//! 本模块依赖 `alloc` crate，需要用户提供全局分配器。

mod entry;
mod disk_cache;

pub use entry::{CacheEntry, EntryFlags};
pub use disk_cache::{CacheLine, CacheStats, DiskCache};
