//! 块设备请求层
//!
//! - [`Request`] - 请求项：设备、命令、扇区游标、传输缓冲区、完成令牌
//! - [`RequestPool`] - 固定大小的请求池，写请求只能使用前 2/3
//! - [`DeviceTable`] / [`RequestHandler`] - 主设备号到请求处理函数的映射
//! - [`RequestQueue`] - 提交与完成：电梯排序插入、请求池等待、`end_request`
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use hd_blk::{RequestQueue, RwMode, BlockBuffer, DeviceId};
//!
//! let queue = RequestQueue::new();
//! hd_blk::hd::hd_init(&queue, controller.clone())?;
//!
//! let bh = Arc::new(BlockBuffer::new(DeviceId::new(3, 0), 0));
//! queue.ll_rw_block(RwMode::Read, &bh)?;
//! bh.wait_on();
//! ```

mod pool;
mod queue;
#[allow(clippy::module_inception)]
mod request;
mod table;

pub use pool::RequestPool;
pub use queue::RequestQueue;
pub use request::{in_order, Command, Request, RequestInfo, RwMode};
pub use table::{DeviceTable, RequestHandler};
