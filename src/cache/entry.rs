//! 缓存行结构

use bitflags::bitflags;

bitflags! {
    /// 缓存行状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u8 {
        /// 数据区已由设备读取或完整写入填充
        const HAS_DATA = 0x01;
        /// 内存中的数据比设备上的新
        const DIRTY    = 0x02;
    }
}

/// 缓存行
///
/// 缓存行本身不持有数据：它的数据区是 [`DiskCache`](super::DiskCache)
/// 整块缓冲区中由槽位号决定的一段，在缓存创建时确定且互不重叠。
///
/// 没有单独的"空闲"状态，`block_index` 为 0 也是合法的块号；数据是否有效只看
/// [`EntryFlags::HAS_DATA`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheEntry {
    /// 当前代表的逻辑块号
    pub block_index: u64,

    /// 最近一次访问时间（秒）
    pub timestamp: u64,

    /// 状态标志
    pub flags: EntryFlags,
}

impl CacheEntry {
    /// 是否已有有效数据
    pub fn has_data(&self) -> bool {
        self.flags.contains(EntryFlags::HAS_DATA)
    }

    /// 标记数据有效
    pub fn mark_has_data(&mut self) {
        self.flags.insert(EntryFlags::HAS_DATA);
    }

    /// 丢弃数据（下次读取会重新从设备加载）
    pub fn clear_data(&mut self) {
        self.flags.remove(EntryFlags::HAS_DATA);
    }

    /// 是否是脏行
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    /// 标记为脏
    pub fn mark_dirty(&mut self) {
        self.flags.insert(EntryFlags::DIRTY);
    }

    /// 标记为干净（已写回设备）
    pub fn mark_clean(&mut self) {
        self.flags.remove(EntryFlags::DIRTY);
    }

    /// 将缓存行改作新块使用
    pub(super) fn repurpose(&mut self, block_index: u64, now: u64) {
        self.block_index = block_index;
        self.timestamp = now;
        self.flags = EntryFlags::empty();
    }
}
