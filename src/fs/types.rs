//! 文件系统公共类型

use crate::consts::DEFAULT_CACHE_ENTRIES;
use bitflags::bitflags;

/// 文件系统配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    /// 块缓存行数量
    pub cache_entries: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            cache_entries: DEFAULT_CACHE_ENTRIES,
        }
    }
}

bitflags! {
    /// I/O 请求标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IoFlags: u32 {
        /// 绕过缓存直接访问设备
        const DIRECT = 0x01;
        /// 写入缓存后立即写回该块
        const SYNC   = 0x02;
    }
}

/// I/O 请求描述
///
/// 对应打开文件描述中与块缓存相关的部分。未提供描述时按普通缓存 I/O 处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoDescription {
    flags: IoFlags,
}

impl IoDescription {
    /// 以给定标志创建描述
    pub const fn new(flags: IoFlags) -> Self {
        Self { flags }
    }

    /// 直接 I/O 描述
    pub const fn direct() -> Self {
        Self::new(IoFlags::DIRECT)
    }

    /// 同步写描述
    pub const fn sync() -> Self {
        Self::new(IoFlags::SYNC)
    }

    /// 请求标志
    pub const fn flags(&self) -> IoFlags {
        self.flags
    }

    /// 是否绕过缓存
    pub fn is_direct(&self) -> bool {
        self.flags.contains(IoFlags::DIRECT)
    }

    /// 是否要求同步写回
    pub fn is_sync(&self) -> bool {
        self.flags.contains(IoFlags::SYNC)
    }
}
