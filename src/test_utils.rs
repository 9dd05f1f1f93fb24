//! 测试用块设备

use crate::block::{BlockDevice, RamDisk};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;

/// 带调用计数和故障注入的内存设备
pub(crate) struct MockDevice {
    pub disk: RamDisk,
    pub raw_reads: usize,
    pub raw_writes: usize,
    pub flushes: usize,
    /// 每次成功写入的字节偏移
    pub write_log: Vec<u64>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub fail_write_at: Option<u64>,
}

impl MockDevice {
    pub fn new(block_size: u32, block_count: u64) -> Self {
        Self {
            disk: RamDisk::new(block_size, block_count).unwrap(),
            raw_reads: 0,
            raw_writes: 0,
            flushes: 0,
            write_log: Vec::new(),
            fail_reads: false,
            fail_writes: false,
            fail_write_at: None,
        }
    }

    /// 设备上某个块的当前内容
    pub fn block(&self, block_index: u64) -> &[u8] {
        self.disk.block(block_index).unwrap()
    }

    /// 预先往设备上写入数据（不计入写计数）
    pub fn preload(&mut self, block_index: u64, fill: u8) {
        let block_size = self.disk.block_size() as usize;
        let data = alloc::vec![fill; block_size];
        self.disk
            .write_raw(block_index * block_size as u64, &data)
            .unwrap();
    }
}

impl BlockDevice for MockDevice {
    fn block_size(&self) -> u32 {
        self.disk.block_size()
    }

    fn read_raw(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if self.fail_reads {
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }
        self.raw_reads += 1;
        self.disk.read_raw(offset, buf)
    }

    fn write_raw(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.fail_writes || self.fail_write_at == Some(offset) {
            return Err(Error::new(ErrorKind::Io, "injected write failure"));
        }
        self.disk.write_raw(offset, buf)?;
        self.raw_writes += 1;
        self.write_log.push(offset);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.disk.is_read_only()
    }
}
