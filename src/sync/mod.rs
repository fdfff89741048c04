//! 同步原语
//!
//! 单处理器、进程上下文 + 中断上下文的模型：
//! - 共享的请求池与请求链表由 `spin::Mutex` 保护，相当于关中断的临界区，
//!   临界区内从不挂起
//! - [`WaitQueue`] 提供挂起/唤醒，挂起只发生在进程上下文
//! - [`Completion`] 是请求完成时唤醒等待方的令牌

mod completion;
mod wait;

pub use completion::Completion;
pub use wait::{SpinWaitQueue, WaitQueue, WaitTicket};

#[cfg(any(test, feature = "std"))]
pub use wait::CondvarWaitQueue;
