//! 内存块设备
//!
//! 用一段固定大小的内存模拟磁盘，适合宿主机测试和无盘环境。

use super::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use alloc::boxed::Box;
use alloc::vec;

/// 内存块设备
#[derive(Debug)]
pub struct RamDisk {
    block_size: u32,
    data: Box<[u8]>,
    read_only: bool,
}

impl RamDisk {
    /// 创建全零的内存盘
    ///
    /// # 参数
    ///
    /// * `block_size` - 块大小（字节）
    /// * `block_count` - 块数量
    ///
    /// 容量超出地址空间时返回 `InvalidInput`
    pub fn new(block_size: u32, block_count: u64) -> Result<Self> {
        let capacity = usize::try_from(block_count)
            .ok()
            .and_then(|count| count.checked_mul(block_size as usize))
            .ok_or(Error::new(ErrorKind::InvalidInput, "ram disk capacity overflows"))?;
        Ok(Self {
            block_size,
            data: vec![0u8; capacity].into_boxed_slice(),
            read_only: false,
        })
    }

    /// 设置只读模式
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// 总容量（字节）
    pub fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    /// 直接查看设备内容
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// 查看某个块的内容
    pub fn block(&self, block_index: u64) -> Option<&[u8]> {
        let offset = crate::consts::block_offset(block_index, self.block_size as u64)?;
        let range = self.range(offset, self.block_size as usize).ok()?;
        Some(&self.data[range])
    }

    fn range(&self, offset: u64, len: usize) -> Result<core::ops::Range<usize>> {
        let start = usize::try_from(offset)
            .map_err(|_| Error::new(ErrorKind::Io, "offset beyond ram disk"))?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(Error::new(ErrorKind::Io, "access beyond end of ram disk"))?;
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn read_raw(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_raw(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnly, "ram disk is read-only"));
        }
        let range = self.range(offset, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
