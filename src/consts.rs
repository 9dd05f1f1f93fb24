//! 常量定义

/// 默认缓存行数量
pub const DEFAULT_CACHE_ENTRIES: usize = 10000;

/// 缓存满且全部为脏时，单次 `get` 最多执行的强制写回次数
///
/// 一次成功的全量写回之后所有缓存行都是干净的，因此第二次扫描必然能找到
/// 可驱逐的缓存行；再失败只可能是状态被破坏，直接返回错误。
pub const MAX_PRESSURE_FLUSHES: u32 = 1;

/// 计算块在设备上的字节偏移
///
/// 乘法溢出时返回 `None`
#[inline]
pub const fn block_offset(block_index: u64, block_size: u64) -> Option<u64> {
    block_index.checked_mul(block_size)
}
