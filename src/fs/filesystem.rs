//! 磁盘文件系统的块 I/O 层
//!
//! [`DiskBackedFileSystem`] 把文件系统的逻辑块读写转换成缓存操作或直接设备 I/O，
//! 并提供写回接口。
//!
//! # 并发
//!
//! 设备和缓存放在同一把 `spin::Mutex` 后面。缓存行的查找、驱逐、数据复制和写回都在
//! 一个临界区内完成，任何两个调用者都不会交错执行缓存行选择。
//! 多块操作（`read_blocks`/`write_blocks`）按块逐个加锁，不保证整体原子。
//!
//! # 示例
//!
//! ```rust,ignore
//! use diskfs_core::{DiskBackedFileSystem, FileSystemFlush, IoDescription, ManualClock};
//!
//! let fs = DiskBackedFileSystem::new(device, ManualClock::new(0))?;
//!
//! fs.write_block(7, &data, None)?;            // 写入缓存，延迟写回
//! fs.read_block(7, &mut buf, None)?;          // 从缓存读取
//! fs.read_block(7, &mut buf, Some(&IoDescription::direct()))?;  // 先写回 7，再直接读设备
//! fs.flush_writes()?;
//! ```

use super::types::{FsConfig, IoDescription};
use crate::{
    block::BlockDevice,
    cache::{CacheStats, DiskCache},
    consts::block_offset,
    error::{Error, ErrorKind, Result},
    time::Clock,
};

use spin::Mutex;

/// 公共写回入口
///
/// 具体文件系统可以覆盖 `flush_writes`（例如先写入自身的元数据），
/// 但最终应委托给 [`DiskBackedFileSystem::flush_writes_impl`]。
/// 缓存压力触发的写回不经过这个 trait。
pub trait FileSystemFlush {
    /// 写回所有脏块
    ///
    /// # 返回
    ///
    /// 写回的块数量
    fn flush_writes(&self) -> Result<usize>;
}

/// 锁保护的状态
struct State<D> {
    device: D,
    /// 首次缓存访问时创建
    cache: Option<DiskCache>,
}

impl<D: BlockDevice> State<D> {
    /// 取得缓存（必要时创建）和设备
    fn split(&mut self, entries: usize, block_size: usize) -> Result<(&mut DiskCache, &mut D)> {
        if self.cache.is_none() {
            log::debug!(
                "[BBFS] creating disk cache: {} entries x {} bytes",
                entries,
                block_size
            );
            self.cache = Some(DiskCache::new(entries, block_size)?);
        }
        match self.cache.as_mut() {
            Some(cache) => Ok((cache, &mut self.device)),
            None => Err(Error::new(ErrorKind::InvalidState, "disk cache unavailable")),
        }
    }

    fn flush_block(&mut self, block_index: u64) -> Result<bool> {
        match self.cache.as_mut() {
            Some(cache) => cache.flush_block(&mut self.device, block_index),
            None => Ok(false),
        }
    }

    fn flush_all(&mut self) -> Result<usize> {
        let cache = match self.cache.as_mut() {
            Some(cache) if cache.is_dirty() => cache,
            _ => return Ok(0),
        };
        let count = cache.flush_all(&mut self.device)?;
        self.device.flush()?;
        Ok(count)
    }
}

/// 基于块设备的文件系统块 I/O 层
pub struct DiskBackedFileSystem<D, C> {
    state: Mutex<State<D>>,
    clock: C,
    config: FsConfig,
    block_size: u32,
}

impl<D: BlockDevice, C: Clock> DiskBackedFileSystem<D, C> {
    /// 使用默认配置创建
    pub fn new(device: D, clock: C) -> Result<Self> {
        Self::with_config(device, clock, FsConfig::default())
    }

    /// 使用指定配置创建
    ///
    /// 缓存本身在第一次缓存访问时才分配。
    pub fn with_config(device: D, clock: C, config: FsConfig) -> Result<Self> {
        let block_size = device.block_size();
        if block_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "device block size is zero"));
        }
        if config.cache_entries == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "cache needs at least one entry"));
        }
        if config.cache_entries.checked_mul(block_size as usize).is_none() {
            return Err(Error::new(ErrorKind::InvalidState, "cache arena size overflows"));
        }

        Ok(Self {
            state: Mutex::new(State {
                device,
                cache: None,
            }),
            clock,
            config,
            block_size,
        })
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// 当前配置
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// 缓存是否已创建
    pub fn has_cache(&self) -> bool {
        self.state.lock().cache.is_some()
    }

    /// 获取缓存统计信息
    ///
    /// 缓存尚未创建时返回 `None`
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.state.lock().cache.as_ref().map(DiskCache::stats)
    }

    /// 在锁内访问底层设备
    ///
    /// 绕过缓存，调用者自行保证与缓存内容的一致性。
    pub fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.state.lock().device)
    }

    /// 读取单个块
    ///
    /// `buf` 至少为一个块大小，只填充前 `block_size` 字节。
    pub fn read_block(
        &self,
        block_index: u64,
        buf: &mut [u8],
        description: Option<&IoDescription>,
    ) -> Result<()> {
        let buf = buf
            .get_mut(..self.block_size as usize)
            .ok_or(Error::new(ErrorKind::InvalidInput, "buffer too small for block"))?;
        self.read_block_at(block_index, 0, buf, description)
    }

    /// 读取块内从 `offset` 开始的 `buf.len()` 字节
    ///
    /// # 直接 I/O
    ///
    /// 先写回该块在缓存中的脏数据，再直接读取设备。
    ///
    /// # 缓存路径
    ///
    /// 取得缓存行，没有数据时先从设备读取整块，然后从缓存行复制。
    pub fn read_block_at(
        &self,
        block_index: u64,
        offset: usize,
        buf: &mut [u8],
        description: Option<&IoDescription>,
    ) -> Result<()> {
        self.check_range(offset, buf.len())?;
        let block_start = self.device_offset(block_index)?;

        let mut state = self.state.lock();

        if is_direct(description) {
            state.flush_block(block_index)?;
            return state.device.read_raw(offset_in_block(block_start, offset)?, buf);
        }

        let now = self.clock.now();
        let (cache, device) = state.split(self.config.cache_entries, self.block_size as usize)?;
        let line = cache.get(block_index, now, device)?;
        if !line.entry.has_data() {
            device.read_raw(block_start, line.data)?;
            line.entry.mark_has_data();
        }
        buf.copy_from_slice(&line.data[offset..offset + buf.len()]);
        Ok(())
    }

    /// 写入单个块
    ///
    /// `data` 至少为一个块大小，只使用前 `block_size` 字节。
    pub fn write_block(
        &self,
        block_index: u64,
        data: &[u8],
        description: Option<&IoDescription>,
    ) -> Result<()> {
        let data = data
            .get(..self.block_size as usize)
            .ok_or(Error::new(ErrorKind::InvalidInput, "buffer too small for block"))?;
        self.write_block_at(block_index, 0, data, description)
    }

    /// 向块内从 `offset` 开始写入 `data`
    ///
    /// # 直接 I/O
    ///
    /// 先写回该块的脏数据，再直接写设备，最后丢弃缓存中该块的旧副本。
    ///
    /// # 缓存路径
    ///
    /// 写入缓存行并标记为脏，不立即访问设备（`SYNC` 描述除外）。
    /// 部分写入一个没有数据的缓存行时，先从设备读取整块。
    pub fn write_block_at(
        &self,
        block_index: u64,
        offset: usize,
        data: &[u8],
        description: Option<&IoDescription>,
    ) -> Result<()> {
        self.check_range(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let block_start = self.device_offset(block_index)?;

        let mut state = self.state.lock();
        if state.device.is_read_only() {
            return Err(Error::new(ErrorKind::ReadOnly, "device is read-only"));
        }

        if is_direct(description) {
            state.flush_block(block_index)?;
            state.device.write_raw(offset_in_block(block_start, offset)?, data)?;
            if let Some(cache) = state.cache.as_mut() {
                if cache.invalidate_block(block_index) {
                    log::trace!("[BBFS] dropped cached copy of block {}", block_index);
                }
            }
            return Ok(());
        }

        let now = self.clock.now();
        let (cache, device) = state.split(self.config.cache_entries, self.block_size as usize)?;
        let line = cache.get(block_index, now, device)?;
        if !line.entry.has_data() && data.len() != line.data.len() {
            device.read_raw(block_start, line.data)?;
            line.entry.mark_has_data();
        }
        line.data[offset..offset + data.len()].copy_from_slice(data);
        line.entry.mark_has_data();
        line.entry.mark_dirty();
        cache.set_dirty(true);

        if description.map_or(false, IoDescription::is_sync) {
            cache.flush_block(device, block_index)?;
        }
        Ok(())
    }

    /// 读取 `count` 个连续块
    ///
    /// 遇到第一个失败的块立即返回错误，之前已读取的块保留在 `buf` 中。
    pub fn read_blocks(
        &self,
        block_index: u64,
        count: u32,
        buf: &mut [u8],
        description: Option<&IoDescription>,
    ) -> Result<()> {
        let len = self.span_len(count, buf.len())?;
        let block_size = self.block_size as usize;
        for (i, chunk) in buf[..len].chunks_exact_mut(block_size).enumerate() {
            self.read_block(self.nth_block(block_index, i)?, chunk, description)?;
        }
        Ok(())
    }

    /// 写入 `count` 个连续块
    ///
    /// 不保证原子：失败时之前的块已写入，之后的块不再尝试。
    pub fn write_blocks(
        &self,
        block_index: u64,
        count: u32,
        data: &[u8],
        description: Option<&IoDescription>,
    ) -> Result<()> {
        let len = self.span_len(count, data.len())?;
        let block_size = self.block_size as usize;
        for (i, chunk) in data[..len].chunks_exact(block_size).enumerate() {
            self.write_block(self.nth_block(block_index, i)?, chunk, description)?;
        }
        Ok(())
    }

    /// 如果块在缓存中是脏的，写回它
    pub fn flush_specific_block_if_needed(&self, block_index: u64) -> Result<()> {
        self.state.lock().flush_block(block_index).map(|_| ())
    }

    /// 写回所有脏块并刷新设备
    ///
    /// 没有脏块时不访问设备。
    ///
    /// # 返回
    ///
    /// 写回的块数量
    pub fn flush_writes_impl(&self) -> Result<usize> {
        let count = self.state.lock().flush_all()?;
        if count > 0 {
            log::info!("[BBFS] Flushed {} blocks to disk", count);
        }
        Ok(count)
    }

    /// 写回所有脏块后释放缓存
    ///
    /// 用于最后一次卸载前；之后的缓存访问会重新创建缓存。
    pub fn remove_disk_cache_before_last_unmount(&self) -> Result<()> {
        let mut state = self.state.lock();
        let count = state.flush_all()?;
        if state.cache.take().is_some() {
            log::debug!("[BBFS] disk cache removed after flushing {} blocks", count);
        }
        Ok(())
    }

    fn device_offset(&self, block_index: u64) -> Result<u64> {
        block_offset(block_index, self.block_size as u64)
            .ok_or(Error::new(ErrorKind::InvalidInput, "block offset overflows"))
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.block_size as usize => Ok(()),
            _ => Err(Error::new(ErrorKind::InvalidInput, "range exceeds block")),
        }
    }

    /// 多块请求的总字节数，`count` 为 0 或缓冲区不足时报错
    fn span_len(&self, count: u32, buf_len: usize) -> Result<usize> {
        if count == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "block count is zero"));
        }
        (count as usize)
            .checked_mul(self.block_size as usize)
            .filter(|len| *len <= buf_len)
            .ok_or(Error::new(ErrorKind::InvalidInput, "buffer too small for blocks"))
    }

    fn nth_block(&self, block_index: u64, n: usize) -> Result<u64> {
        block_index
            .checked_add(n as u64)
            .ok_or(Error::new(ErrorKind::InvalidInput, "block index overflows"))
    }
}

impl<D: BlockDevice, C: Clock> FileSystemFlush for DiskBackedFileSystem<D, C> {
    fn flush_writes(&self) -> Result<usize> {
        self.flush_writes_impl()
    }
}

impl<D, C> core::fmt::Debug for DiskBackedFileSystem<D, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DiskBackedFileSystem")
            .field("block_size", &self.block_size)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn is_direct(description: Option<&IoDescription>) -> bool {
    description.map_or(false, IoDescription::is_direct)
}

fn offset_in_block(block_start: u64, offset: usize) -> Result<u64> {
    block_start
        .checked_add(offset as u64)
        .ok_or(Error::new(ErrorKind::InvalidInput, "device offset overflows"))
}
