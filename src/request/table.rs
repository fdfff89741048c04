//! 块设备表
//!
//! 按主设备号登记设备的请求处理函数。请求链表头放在队列状态里，
//! 与请求池在同一个临界区中更新。

use alloc::sync::Arc;

use spin::Mutex;

use crate::consts::NR_BLK_DEV;
use crate::error::{Error, ErrorKind, Result};

use super::queue::RequestQueue;

/// 块设备请求处理函数
///
/// 设备链表由空变为非空时，队列在进程上下文中同步调用 `do_request`；
/// 驱动在中断处理中推进链表时自行继续处理，不再经过这里。
/// 实现不能在其中挂起。
pub trait RequestHandler: Send + Sync {
    /// 处理设备链表头的请求
    fn do_request(&self, queue: &RequestQueue);
}

/// 块设备表
pub struct DeviceTable {
    handlers: Mutex<[Option<Arc<dyn RequestHandler>>; NR_BLK_DEV]>,
}

impl DeviceTable {
    /// 创建空设备表
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(core::array::from_fn(|_| None)),
        }
    }

    /// 登记请求处理函数
    ///
    /// # 错误
    ///
    /// - 主设备号超出设备表：`InvalidInput`
    /// - 该主设备号已经登记过：`AlreadyExists`
    pub fn register(&self, major: u8, handler: Arc<dyn RequestHandler>) -> Result<()> {
        let mut handlers = self.handlers.lock();
        let slot = handlers
            .get_mut(major as usize)
            .ok_or(Error::new(ErrorKind::InvalidInput, "block major out of range"))?;
        if slot.is_some() {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                "request function already registered",
            ));
        }
        *slot = Some(handler);
        log::debug!("[BLK] registered request function for major {}", major);
        Ok(())
    }

    /// 取得请求处理函数
    pub fn handler(&self, major: u8) -> Option<Arc<dyn RequestHandler>> {
        self.handlers
            .lock()
            .get(major as usize)
            .and_then(|slot| slot.clone())
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}
