//! 缓冲块接口
//!
//! 缓冲块（块缓存）本身属于上层的缓存子系统，这里只提供请求层消费的部分：
//!
//! - [`BlockBuffer`] - 单个缓冲块：设备号、块号、数据、标志、等待队列
//! - [`BufferFlags`] - LOCKED / DIRTY / UPTODATE
//! - [`SectorBuf`] - 缓冲块与请求共享的数据区
//!
//! # 使用示例
//!
//! ```rust,ignore
//! let bh = Arc::new(BlockBuffer::new(DeviceId::new(3, 0), 10));
//! queue.ll_rw_block(RwMode::Read, &bh)?;
//! bh.wait_on();
//! if !bh.is_uptodate() {
//!     // I/O 错误
//! }
//! ```

mod block;

pub use block::{BlockBuffer, BufferFlags, SectorBuf};
