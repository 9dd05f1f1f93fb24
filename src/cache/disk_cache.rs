//! 磁盘块缓存实现
//!
//! 固定容量的写回缓存，位于文件系统和原始块设备之间。
//!
//! # 结构
//!
//! ```text
//! struct DiskCache {
//!     entries: Vec<CacheEntry>,   // entry_count 个缓存行，创建后不再调整
//!     data: Vec<u8>,              // entry_count × block_size 的整块缓冲区
//!     dirty: bool,                // 是否存在脏行（刷新前的快速判断）
//! }
//! ```
//!
//! 第 `slot` 个缓存行的数据区固定为
//! `data[slot × block_size .. (slot + 1) × block_size]`。
//!
//! # 驱逐策略
//!
//! `get` 对所有缓存行做一次线性扫描：
//!
//! 1. 命中：刷新时间戳后直接返回
//! 2. 未命中：选择时间戳最旧的**干净**行改作新块（时间戳相同时取槽位最小的）
//! 3. 所有行都是脏的：先把全部脏行写回设备并刷新设备，再重新扫描一次
//!
//! 脏行永远不会被驱逐，被丢弃的数据一定已经在设备上。

use super::entry::CacheEntry;
use crate::{
    block::BlockDevice,
    consts::{block_offset, MAX_PRESSURE_FLUSHES},
    error::{Error, ErrorKind, Result},
};

use alloc::vec;
use alloc::vec::Vec;

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 丢弃已有数据的驱逐次数
    pub evictions: u64,
    /// 脏行写回次数
    pub writebacks: u64,
    /// 因缓存全脏而触发的强制写回次数
    pub pressure_flushes: u64,
    /// 当前脏行数量
    pub dirty_blocks: usize,
    /// 当前持有有效数据的缓存行数量
    pub cached_blocks: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// `get` 返回的缓存行视图
///
/// 同时持有缓存行元数据和它的数据区。
#[derive(Debug)]
pub struct CacheLine<'a> {
    /// 缓存行元数据
    pub entry: &'a mut CacheEntry,
    /// 数据区（恰好一个块）
    pub data: &'a mut [u8],
}

/// 磁盘块缓存
pub struct DiskCache {
    entries: Vec<CacheEntry>,
    data: Vec<u8>,
    block_size: usize,
    dirty: bool,
    stats: CacheStats,
}

impl DiskCache {
    /// 创建缓存，一次性分配全部缓存行和数据区
    ///
    /// # 参数
    ///
    /// * `entry_count` - 缓存行数量
    /// * `block_size` - 块大小（字节）
    pub fn new(entry_count: usize, block_size: usize) -> Result<Self> {
        if entry_count == 0 || block_size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "cache needs at least one entry and a non-zero block size",
            ));
        }
        let arena_len = entry_count.checked_mul(block_size).ok_or(Error::new(
            ErrorKind::InvalidState,
            "cache arena size overflows",
        ))?;

        Ok(Self {
            entries: vec![CacheEntry::default(); entry_count],
            data: vec![0u8; arena_len],
            block_size,
            dirty: false,
            stats: CacheStats::default(),
        })
    }

    /// 缓存行数量
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 是否可能存在脏行
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 设置脏标志汇总
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// 按槽位号查看缓存行
    pub fn entry(&self, slot: usize) -> Option<&CacheEntry> {
        self.entries.get(slot)
    }

    /// 块是否以有效数据的形式在缓存中
    pub fn contains(&self, block_index: u64) -> bool {
        self.entries
            .iter()
            .any(|e| e.block_index == block_index && e.has_data())
    }

    /// 脏行数量
    pub fn dirty_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_dirty()).count()
    }

    /// 持有有效数据的缓存行数量
    pub fn cached_blocks(&self) -> usize {
        self.entries.iter().filter(|e| e.has_data()).count()
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.dirty_blocks = self.dirty_count();
        stats.cached_blocks = self.cached_blocks();
        stats
    }

    /// 查找或分配块对应的缓存行
    ///
    /// 返回的缓存行一定代表 `block_index`。如果是新分配的行，
    /// `has_data` 为 false，调用者负责从设备填充或整块覆盖。
    ///
    /// 缓存全部为脏时会先把所有脏行写回 `device` 并刷新设备，然后重新扫描；
    /// 写回失败直接返回错误，写回之后仍没有可用行返回 `NoSpace`。
    pub fn get<D: BlockDevice + ?Sized>(
        &mut self,
        block_index: u64,
        now: u64,
        device: &mut D,
    ) -> Result<CacheLine<'_>> {
        let mut pressure_flushes = 0;
        loop {
            if let Some(slot) = self.select(block_index, now) {
                return Ok(self.line(slot));
            }

            if pressure_flushes >= MAX_PRESSURE_FLUSHES {
                log::error!(
                    "[DCACHE] no clean entry for block {} after {} forced flush(es)",
                    block_index,
                    pressure_flushes
                );
                return Err(Error::new(
                    ErrorKind::NoSpace,
                    "no evictable cache entry after forced write-back",
                ));
            }

            log::warn!(
                "[DCACHE] all {} entries dirty, flushing before caching block {}",
                self.entries.len(),
                block_index
            );
            self.stats.pressure_flushes += 1;
            pressure_flushes += 1;
            self.flush_all(device)?;
            device.flush()?;
        }
    }

    /// 单次扫描：命中返回该行，否则改用最旧的干净行；没有干净行返回 `None`
    fn select(&mut self, block_index: u64, now: u64) -> Option<usize> {
        let mut oldest_clean: Option<(usize, u64)> = None;

        for (slot, entry) in self.entries.iter_mut().enumerate() {
            if entry.block_index == block_index {
                entry.timestamp = now;
                if entry.has_data() {
                    self.stats.hits += 1;
                    log::trace!("[DCACHE] hit block {} in slot {}", block_index, slot);
                } else {
                    // 新建或已丢弃数据的行，调用者仍需访问设备
                    self.stats.misses += 1;
                    log::trace!("[DCACHE] reuse empty slot {} for block {}", slot, block_index);
                }
                return Some(slot);
            }
            if entry.is_dirty() {
                continue;
            }
            match oldest_clean {
                Some((_, timestamp)) if timestamp <= entry.timestamp => {}
                _ => oldest_clean = Some((slot, entry.timestamp)),
            }
        }

        let (slot, _) = oldest_clean?;
        self.stats.misses += 1;

        let entry = &mut self.entries[slot];
        if entry.has_data() {
            self.stats.evictions += 1;
            log::debug!(
                "[DCACHE] evict block {} from slot {} for block {}",
                entry.block_index,
                slot,
                block_index
            );
        } else {
            log::debug!("[DCACHE] miss block {}, using slot {}", block_index, slot);
        }
        entry.repurpose(block_index, now);
        Some(slot)
    }

    fn line(&mut self, slot: usize) -> CacheLine<'_> {
        let start = slot * self.block_size;
        CacheLine {
            entry: &mut self.entries[slot],
            data: &mut self.data[start..start + self.block_size],
        }
    }

    /// 按槽位顺序遍历所有缓存行
    pub fn for_each_entry<F>(&self, mut f: F)
    where
        F: FnMut(&CacheEntry, &[u8]),
    {
        for (entry, data) in self.entries.iter().zip(self.data.chunks_exact(self.block_size)) {
            f(entry, data);
        }
    }

    /// 按槽位顺序可变遍历所有缓存行
    ///
    /// 回调修改脏标志后，调用者负责维护 [`set_dirty`](Self::set_dirty) 汇总。
    pub fn for_each_entry_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut CacheEntry, &mut [u8]),
    {
        for (entry, data) in self
            .entries
            .iter_mut()
            .zip(self.data.chunks_exact_mut(self.block_size))
        {
            f(entry, data);
        }
    }

    /// 写回指定块（如果它是脏的）
    ///
    /// # 返回
    ///
    /// 是否实际写回了数据
    pub fn flush_block<D: BlockDevice + ?Sized>(
        &mut self,
        device: &mut D,
        block_index: u64,
    ) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let written = self.write_back_where(device, |e| e.block_index == block_index)?;
        if written > 0 {
            log::debug!("[DCACHE] flushed block {}", block_index);
        }
        if !self.entries.iter().any(|e| e.is_dirty()) {
            self.dirty = false;
        }
        Ok(written > 0)
    }

    /// 写回所有脏行
    ///
    /// 某一行写回失败时立即停止：该行和尚未访问的脏行保持为脏，
    /// 脏标志汇总不清除，错误返回给调用者。
    ///
    /// # 返回
    ///
    /// 写回的块数量
    pub fn flush_all<D: BlockDevice + ?Sized>(&mut self, device: &mut D) -> Result<usize> {
        if !self.dirty {
            return Ok(0);
        }

        let count = self.write_back_where(device, |_| true)?;
        self.dirty = false;
        log::debug!("[DCACHE] flushed {} dirty entries", count);
        Ok(count)
    }

    fn write_back_where<D, P>(&mut self, device: &mut D, pred: P) -> Result<usize>
    where
        D: BlockDevice + ?Sized,
        P: Fn(&CacheEntry) -> bool,
    {
        let mut count = 0;
        for (entry, data) in self.entries.iter_mut().zip(self.data.chunks_exact(self.block_size)) {
            if !entry.is_dirty() || !pred(&*entry) {
                continue;
            }
            write_back(device, entry, data)?;
            self.stats.writebacks += 1;
            count += 1;
        }
        Ok(count)
    }

    /// 丢弃块的干净缓存副本，下次读取会重新访问设备
    ///
    /// 脏行不会被丢弃。
    ///
    /// # 返回
    ///
    /// 是否丢弃了数据
    pub fn invalidate_block(&mut self, block_index: u64) -> bool {
        let mut invalidated = false;
        self.for_each_entry_mut(|entry, _| {
            if entry.block_index == block_index && entry.has_data() && !entry.is_dirty() {
                entry.clear_data();
                invalidated = true;
            }
        });
        invalidated
    }
}

fn write_back<D: BlockDevice + ?Sized>(
    device: &mut D,
    entry: &mut CacheEntry,
    data: &[u8],
) -> Result<()> {
    let offset = block_offset(entry.block_index, data.len() as u64)
        .ok_or(Error::new(ErrorKind::InvalidInput, "block offset overflows"))?;
    if let Err(err) = device.write_raw(offset, data) {
        log::error!(
            "[DCACHE] write-back of block {} failed: {}",
            entry.block_index,
            err
        );
        return Err(err);
    }
    entry.mark_clean();
    Ok(())
}

impl core::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DiskCache")
            .field("entry_count", &self.entries.len())
            .field("block_size", &self.block_size)
            .field("dirty", &self.dirty)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockDevice;

    const BS: usize = 512;

    /// 模拟文件系统的缓存写入
    fn write(cache: &mut DiskCache, device: &mut MockDevice, index: u64, now: u64, fill: u8) {
        let line = cache.get(index, now, device).unwrap();
        line.data.fill(fill);
        line.entry.mark_has_data();
        line.entry.mark_dirty();
        cache.set_dirty(true);
    }

    fn slot_of(cache: &DiskCache, index: u64) -> Option<usize> {
        (0..cache.entry_count()).find(|slot| {
            let e = cache.entry(*slot).unwrap();
            e.block_index == index && e.has_data()
        })
    }

    #[test]
    fn test_cache_creation() {
        let cache = DiskCache::new(8, BS).unwrap();
        assert_eq!(cache.entry_count(), 8);
        assert_eq!(cache.block_size(), BS);
        assert!(!cache.is_dirty());
        assert_eq!(cache.cached_blocks(), 0);
        assert_eq!(cache.dirty_count(), 0);
    }

    #[test]
    fn test_cache_rejects_empty_config() {
        assert_eq!(DiskCache::new(0, BS).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(DiskCache::new(4, 0).unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_hit_refreshes_timestamp() {
        let mut cache = DiskCache::new(4, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        write(&mut cache, &mut device, 3, 10, 0xAA);
        let line = cache.get(3, 20, &mut device).unwrap();
        assert!(line.entry.has_data());
        assert_eq!(line.entry.timestamp, 20);
        assert!(line.data.iter().all(|b| *b == 0xAA));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_miss_uses_oldest_clean_entry() {
        let mut cache = DiskCache::new(3, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        for (t, index) in [(1, 10), (2, 11), (3, 12)] {
            let line = cache.get(index, t, &mut device).unwrap();
            line.entry.mark_has_data();
        }
        // 刷新 10 的时间戳，最旧的变为 11
        cache.get(10, 4, &mut device).unwrap();

        let line = cache.get(13, 5, &mut device).unwrap();
        assert_eq!(line.entry.block_index, 13);
        assert!(!line.entry.has_data());
        assert!(!line.entry.is_dirty());

        assert!(!cache.contains(11));
        assert!(cache.contains(10));
        assert!(cache.contains(12));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_equal_timestamps_prefer_first_slot() {
        let mut cache = DiskCache::new(3, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        for index in [20, 21, 22] {
            let line = cache.get(index, 7, &mut device).unwrap();
            line.entry.mark_has_data();
        }

        cache.get(23, 7, &mut device).unwrap();
        assert_eq!(cache.entry(0).unwrap().block_index, 23);
        assert_eq!(cache.entry(1).unwrap().block_index, 21);
        assert_eq!(cache.entry(2).unwrap().block_index, 22);
    }

    #[test]
    fn test_dirty_entries_are_never_evicted() {
        let mut cache = DiskCache::new(3, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        write(&mut cache, &mut device, 1, 1, 0x11);
        write(&mut cache, &mut device, 2, 2, 0x22);
        let line = cache.get(3, 3, &mut device).unwrap();
        line.entry.mark_has_data();

        // 1 和 2 更旧但都是脏的，只能驱逐 3
        cache.get(4, 4, &mut device).unwrap();
        assert!(cache.contains(1));
        assert!(cache.contains(2));
        assert!(!cache.contains(3));
        assert_eq!(device.raw_writes, 0);
        assert_eq!(cache.stats().pressure_flushes, 0);
    }

    #[test]
    fn test_full_dirty_cache_flushes_then_evicts() {
        let mut cache = DiskCache::new(2, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        write(&mut cache, &mut device, 0, 1, 0xA0);
        write(&mut cache, &mut device, 1, 2, 0xB0);
        assert_eq!(cache.dirty_count(), 2);

        write(&mut cache, &mut device, 2, 3, 0xC0);

        // 0 和 1 被强制写回，最旧的 0 被改作 2
        assert_eq!(device.raw_writes, 2);
        assert!(device.block(0).iter().all(|b| *b == 0xA0));
        assert!(device.block(1).iter().all(|b| *b == 0xB0));
        assert_eq!(slot_of(&cache, 2), Some(0));
        assert_eq!(slot_of(&cache, 1), Some(1));
        assert!(!cache.entry(1).unwrap().is_dirty());
        assert!(cache.entry(0).unwrap().is_dirty());
        assert_eq!(cache.stats().pressure_flushes, 1);
        assert_eq!(device.flushes, 1);

        cache.flush_all(&mut device).unwrap();
        assert!(device.block(2).iter().all(|b| *b == 0xC0));
    }

    #[test]
    fn test_pressure_flush_failure_propagates() {
        let mut cache = DiskCache::new(2, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        write(&mut cache, &mut device, 0, 1, 0xA0);
        write(&mut cache, &mut device, 1, 2, 0xB0);

        device.fail_writes = true;
        let err = cache.get(2, 3, &mut device).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        // 没有任何数据丢失
        assert_eq!(cache.dirty_count(), 2);
        assert!(cache.is_dirty());
        assert!(cache.contains(0));
        assert!(cache.contains(1));
    }

    #[test]
    fn test_flush_all_is_idempotent() {
        let mut cache = DiskCache::new(4, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        write(&mut cache, &mut device, 5, 1, 0x55);
        write(&mut cache, &mut device, 6, 1, 0x66);

        assert_eq!(cache.flush_all(&mut device).unwrap(), 2);
        assert_eq!(device.raw_writes, 2);
        assert!(!cache.is_dirty());

        assert_eq!(cache.flush_all(&mut device).unwrap(), 0);
        assert_eq!(device.raw_writes, 2);
    }

    #[test]
    fn test_flush_all_partial_failure_keeps_remaining_dirty() {
        let mut cache = DiskCache::new(4, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        write(&mut cache, &mut device, 5, 1, 0x55);
        write(&mut cache, &mut device, 6, 2, 0x66);
        write(&mut cache, &mut device, 7, 3, 0x77);

        device.fail_write_at = Some(6 * BS as u64);
        assert!(cache.flush_all(&mut device).is_err());
        assert!(cache.is_dirty());
        assert_eq!(device.write_log, [5 * BS as u64]);
        assert_eq!(cache.dirty_count(), 2);

        device.fail_write_at = None;
        assert_eq!(cache.flush_all(&mut device).unwrap(), 2);
        assert_eq!(cache.dirty_count(), 0);
    }

    #[test]
    fn test_flush_block_only_touches_target() {
        let mut cache = DiskCache::new(4, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        write(&mut cache, &mut device, 1, 1, 0x11);
        write(&mut cache, &mut device, 2, 1, 0x22);

        assert!(cache.flush_block(&mut device, 2).unwrap());
        assert_eq!(device.write_log, [2 * BS as u64]);
        assert!(cache.is_dirty());

        // 已经干净的块不会重复写
        assert!(!cache.flush_block(&mut device, 2).unwrap());

        assert!(cache.flush_block(&mut device, 1).unwrap());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_for_each_entry_in_slot_order() {
        let mut cache = DiskCache::new(3, 4).unwrap();
        let mut device = MockDevice::new(4, 16);

        for (t, index) in [(1, 9), (2, 8), (3, 7)] {
            let line = cache.get(index, t, &mut device).unwrap();
            line.data.fill(index as u8);
            line.entry.mark_has_data();
        }

        let mut seen = Vec::new();
        cache.for_each_entry(|entry, data| {
            assert_eq!(data, [entry.block_index as u8; 4]);
            seen.push(entry.block_index);
        });
        assert_eq!(seen, [9, 8, 7]);
    }

    #[test]
    fn test_invalidate_block_skips_dirty() {
        let mut cache = DiskCache::new(4, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        let line = cache.get(4, 1, &mut device).unwrap();
        line.entry.mark_has_data();
        write(&mut cache, &mut device, 5, 1, 0x55);

        assert!(cache.invalidate_block(4));
        assert!(!cache.contains(4));
        assert!(!cache.invalidate_block(5));
        assert!(cache.contains(5));
    }

    #[test]
    fn test_capacity_bound() {
        let mut cache = DiskCache::new(4, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 64);

        for index in 0..40u64 {
            if index % 3 == 0 {
                write(&mut cache, &mut device, index, index, index as u8);
            } else {
                let line = cache.get(index, index, &mut device).unwrap();
                line.entry.mark_has_data();
            }
            assert!(cache.cached_blocks() <= cache.entry_count());
        }
    }

    #[test]
    fn test_stats_hit_rate() {
        let mut cache = DiskCache::new(4, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        assert_eq!(cache.stats().hit_rate(), 0.0);
        let line = cache.get(9, 1, &mut device).unwrap();
        line.entry.mark_has_data();
        cache.get(9, 2, &mut device).unwrap();
        assert_eq!(cache.stats().hit_rate(), 0.5);
    }

    #[test]
    fn test_empty_matching_slot_counts_as_miss() {
        let mut cache = DiskCache::new(2, BS).unwrap();
        let mut device = MockDevice::new(BS as u32, 16);

        // 新缓存的所有行都是块 0，但没有数据
        let line = cache.get(0, 1, &mut device).unwrap();
        assert!(!line.entry.has_data());
        line.entry.mark_has_data();
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 0);

        cache.get(0, 2, &mut device).unwrap();
        assert_eq!(cache.stats().hits, 1);

        // 丢弃数据后再次访问同一行也是未命中
        assert!(cache.invalidate_block(0));
        let line = cache.get(0, 3, &mut device).unwrap();
        assert!(!line.entry.has_data());
        assert_eq!(line.entry.timestamp, 3);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(slot_of(&cache, 0), None);
    }
}
