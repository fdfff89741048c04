//! 等待队列接口
//!
//! 进程上下文在缓冲块加锁、等待空闲请求项、等待请求完成时挂起，
//! 中断上下文只负责唤醒，从不挂起。
//!
//! 挂起采用票据协议：先 `prepare()` 取得票据，再检查条件，
//! 条件不满足才 `sleep(ticket)`。只要取票之后发生过 `wake_up()`，
//! `sleep` 就会立即返回，检查与挂起之间的唤醒不会丢失。
//! 醒来后调用方必须重新检查条件。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 挂起前取得的票据（队列的唤醒代数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTicket(usize);

impl WaitTicket {
    /// 票据对应的唤醒代数
    pub fn generation(self) -> usize {
        self.0
    }
}

/// 等待队列 trait
///
/// 实现此 trait 的类型由调度器提供挂起/唤醒原语：
/// - `SpinWaitQueue` - 忙等实现，无需调度器（默认）
/// - `CondvarWaitQueue` - 基于 `std::sync::Condvar`（需要 `std` 特性或测试）
/// - 内核可以提供基于任务队列的实现
pub trait WaitQueue: Send + Sync {
    /// 取得票据，必须在检查等待条件之前调用
    fn prepare(&self) -> WaitTicket;

    /// 挂起调用方，直到取票之后发生了一次 `wake_up`
    fn sleep(&self, ticket: WaitTicket);

    /// 唤醒所有等待者
    fn wake_up(&self);
}

/// 忙等实现
///
/// 适合没有调度器的环境：唤醒来自中断处理或其它处理器。
#[derive(Debug, Default)]
pub struct SpinWaitQueue {
    generation: AtomicUsize,
}

impl SpinWaitQueue {
    /// 创建等待队列
    pub const fn new() -> Self {
        Self {
            generation: AtomicUsize::new(0),
        }
    }
}

impl WaitQueue for SpinWaitQueue {
    #[inline]
    fn prepare(&self) -> WaitTicket {
        WaitTicket(self.generation.load(Ordering::Acquire))
    }

    fn sleep(&self, ticket: WaitTicket) {
        while self.generation.load(Ordering::Acquire) == ticket.0 {
            core::hint::spin_loop();
        }
    }

    #[inline]
    fn wake_up(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }
}

#[cfg(any(test, feature = "std"))]
mod std_queue {
    use super::*;
    use std::sync::{Condvar, Mutex, PoisonError};

    /// Condvar 实现
    #[derive(Debug, Default)]
    pub struct CondvarWaitQueue {
        generation: Mutex<usize>,
        cond: Condvar,
    }

    impl CondvarWaitQueue {
        /// 创建等待队列
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl WaitQueue for CondvarWaitQueue {
        fn prepare(&self) -> WaitTicket {
            WaitTicket(*self.generation.lock().unwrap_or_else(PoisonError::into_inner))
        }

        fn sleep(&self, ticket: WaitTicket) {
            let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            while *generation == ticket.0 {
                generation = self
                    .cond
                    .wait(generation)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        fn wake_up(&self) {
            let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *generation = generation.wrapping_add(1);
            self.cond.notify_all();
        }
    }
}

#[cfg(any(test, feature = "std"))]
pub use std_queue::CondvarWaitQueue;
