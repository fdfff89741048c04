//! 请求完成令牌
//!
//! 请求不持有等待进程的指针，只持有一个 `Completion`。
//! 请求结束时由中断上下文调用 `complete`，等待方在自己的上下文里 `wait`。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU8, Ordering};

use super::wait::{SpinWaitQueue, WaitQueue};
use crate::error::{Error, ErrorKind, Result};

const PENDING: u8 = 0;
const DONE: u8 = 1;
const FAILED: u8 = 2;

/// 完成令牌
pub struct Completion {
    state: AtomicU8,
    wait: Arc<dyn WaitQueue>,
}

impl core::fmt::Debug for Completion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Completion")
            .field("state", &self.state.load(Ordering::Acquire))
            .finish()
    }
}

impl Completion {
    /// 使用忙等队列创建
    pub fn new() -> Self {
        Self::with_wait_queue(Arc::new(SpinWaitQueue::new()))
    }

    /// 使用指定的等待队列创建
    pub fn with_wait_queue(wait: Arc<dyn WaitQueue>) -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            wait,
        }
    }

    /// 标记完成并唤醒等待者（中断上下文安全，不会挂起）
    pub fn complete(&self, ok: bool) {
        self.state
            .store(if ok { DONE } else { FAILED }, Ordering::Release);
        self.wait.wake_up();
    }

    /// 请求是否已经结束（无论成功与否）
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) != PENDING
    }

    /// 挂起直到请求结束
    ///
    /// # 错误
    ///
    /// 请求以失败结束时返回 `ErrorKind::Io`
    pub fn wait(&self) -> Result<()> {
        loop {
            let ticket = self.wait.prepare();
            match self.state.load(Ordering::Acquire) {
                DONE => return Ok(()),
                FAILED => return Err(Error::new(ErrorKind::Io, "request completed with I/O error")),
                _ => self.wait.sleep(ticket),
            }
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
