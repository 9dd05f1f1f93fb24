//! 块设备抽象
//!
//! block/device.rs 定义缓存层使用的设备接口（按字节偏移读写原始块）
//! block/ram.rs 提供一个内存盘实现

mod device;
mod ram;

pub use device::BlockDevice;
pub use ram::RamDisk;
