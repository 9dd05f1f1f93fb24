//! 时间源
//!
//! 缓存行的时间戳（秒）用于挑选最旧的干净缓存行。时间源通过 [`Clock`]
//! 注入，测试可以精确控制时间而不需要 sleep。

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

/// 时间源接口
pub trait Clock: Send + Sync {
    /// 当前时间（秒）
    fn now(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// 系统硬件抽象层
///
/// 平台提供的静态时间接口，通过 [`HalClock`] 适配为 [`Clock`]。
///
/// # 示例
///
/// ```ignore
/// struct MyHal;
/// impl SystemHal for MyHal {
///     fn now() -> Option<Duration> {
///         Some(Duration::from_secs(get_unix_timestamp()))
///     }
/// }
///
/// let clock = HalClock::<MyHal>::new();
/// ```
pub trait SystemHal {
    /// 获取当前系统时间
    ///
    /// - `Some(Duration)` - 当前时间（从 UNIX 纪元开始）
    /// - `None` - 时间不可用（例如在没有RTC的嵌入式系统中）
    fn now() -> Option<Duration>;
}

/// 基于 [`SystemHal`] 的时间源
///
/// 时间不可用时返回 0，此时所有缓存行时间戳相同，驱逐退化为按槽位顺序。
pub struct HalClock<H> {
    _hal: PhantomData<fn() -> H>,
}

impl<H> HalClock<H> {
    /// 创建时间源
    pub const fn new() -> Self {
        Self { _hal: PhantomData }
    }
}

impl<H> Default for HalClock<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: SystemHal> Clock for HalClock<H> {
    fn now(&self) -> u64 {
        H::now().map(|d| d.as_secs()).unwrap_or(0)
    }
}

/// 手动推进的时间源
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    /// 以给定秒数为起点
    pub const fn new(start: u64) -> Self {
        Self {
            secs: AtomicU64::new(start),
        }
    }

    /// 设置当前时间
    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    /// 前进若干秒
    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

/// 标准库系统时钟
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
