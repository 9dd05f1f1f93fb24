//! 块设备核心接口

use crate::error::Result;

/// 块设备接口
///
/// 缓存层只通过字节偏移访问设备：偏移总是 `block_index × block_size`，
/// 长度等于缓冲区长度（通常恰好一个块）。
///
/// # 示例
///
/// ```rust,ignore
/// use diskfs_core::{BlockDevice, Result};
///
/// struct MyDevice {
///     // ...
/// }
///
/// impl BlockDevice for MyDevice {
///     fn block_size(&self) -> u32 {
///         512
///     }
///
///     fn read_raw(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
///         // 从 offset 处读取 buf.len() 字节
///         Ok(())
///     }
///
///     fn write_raw(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
///         // 向 offset 处写入 buf.len() 字节
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 块大小（字节），在文件系统实例的生命周期内固定
    fn block_size(&self) -> u32;

    /// 从字节偏移 `offset` 处读取 `buf.len()` 字节
    fn read_raw(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// 向字节偏移 `offset` 处写入 `buf.len()` 字节
    fn write_raw(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// 刷新设备自身的写缓存（如 fsync）
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for alloc::boxed::Box<T> {
    fn block_size(&self) -> u32 {
        (**self).block_size()
    }

    fn read_raw(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_raw(offset, buf)
    }

    fn write_raw(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_raw(offset, buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }
}
