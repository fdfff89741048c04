//! hd_blk: 块设备请求队列与 AT 硬盘驱动
//!
//! 这是一个面向教学内核的块设备层，提供：
//! - **固定大小的请求池**，写请求不能占满
//! - **电梯排序**的每设备请求链表
//! - **中断驱动**的硬盘控制器状态机，带错误重试与控制器复位
//! - 端口 I/O 与等待队列抽象，可在裸机与测试环境下运行
//!
//! # 示例
//!
//! ```rust,ignore
//! use alloc::sync::Arc;
//! use hd_blk::{BlockBuffer, DeviceId, RequestQueue, RwMode, Result};
//! use hd_blk::hd::{hd_init, DriveInfo, HdController};
//!
//! fn boot(ports: MyPorts) -> Result<()> {
//!     let queue = RequestQueue::new();
//!     let hd = Arc::new(HdController::new(ports));
//!     hd.set_drive(0, DriveInfo::new(16, 63, 1024))?;
//!     hd_init(&queue, hd.clone())?;
//!
//!     // 中断处理函数里调用 hd.interrupt(&queue)
//!
//!     let bh = Arc::new(BlockBuffer::new(DeviceId::new(3, 0), 0));
//!     queue.ll_rw_block(RwMode::Read, &bh)?;
//!     bh.wait_on();
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`device`] - 设备号
//! - [`sync`] - 等待队列与完成令牌
//! - [`buffer`] - 缓冲块
//! - [`request`] - 请求池、电梯队列、`end_request`
//! - [`hd`] - AT 硬盘驱动

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 设备号
pub mod device;

/// 等待队列与完成令牌
pub mod sync;

/// 缓冲块
pub mod buffer;

/// 块设备请求层
pub mod request;

/// AT 硬盘驱动
pub mod hd;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 设备号
pub use device::DeviceId;

// 同步
pub use sync::{Completion, SpinWaitQueue, WaitQueue, WaitTicket};

// 缓冲块
pub use buffer::{BlockBuffer, BufferFlags, SectorBuf};

// 请求层
pub use request::{
    Command, DeviceTable, Request, RequestHandler, RequestInfo, RequestPool, RequestQueue, RwMode,
};

// 硬盘
pub use hd::{hd_init, DriveInfo, HdController, Partition, PortIo};
