//! AT 硬盘驱动
//!
//! - [`regs`] - 端口地址、状态位、命令码与 [`PortIo`] 边界
//! - [`geometry`] - 驱动器参数、CHS 转换、分区
//! - [`HdController`] - 中断驱动的状态机，作为主设备号 3 的 [`RequestHandler`]
//!
//! 次设备号 `minor` 对应驱动器 `minor / 5`；`minor % 5 == 0` 为整盘，
//! 其余为分区 1..4。
//!
//! [`RequestHandler`]: crate::request::RequestHandler

mod controller;
pub mod geometry;
pub mod regs;
#[cfg(test)]
pub(crate) mod sim;

use alloc::sync::Arc;

pub use controller::{Event, HdController, PendingIrq};
pub use geometry::{Chs, DriveInfo, Partition};
pub use regs::{HdCommand, HdStatus, PortIo};

use crate::consts::HD_MAJOR;
use crate::error::Result;
use crate::request::RequestQueue;

/// 把硬盘驱动注册到请求队列
///
/// # 错误
///
/// 主设备号 3 已被注册时返回 `AlreadyExists`
pub fn hd_init<P: PortIo + 'static>(
    queue: &RequestQueue,
    controller: Arc<HdController<P>>,
) -> Result<()> {
    queue.register(HD_MAJOR, controller)?;
    log::info!("[HD] hard disk driver registered");
    Ok(())
}
