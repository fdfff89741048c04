//! 缓冲块结构
//!
//! 请求层只消费缓冲块的这几项：设备号、块号、数据区、
//! LOCKED/DIRTY/UPTODATE 标志，以及"该块状态变化"的等待队列。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;
use spin::{Mutex, MutexGuard};

use crate::consts::BLOCK_SIZE;
use crate::device::DeviceId;
use crate::sync::{SpinWaitQueue, WaitQueue};

/// 传输缓冲区：缓冲块与处理它的请求共享同一块数据区
pub type SectorBuf = Arc<Mutex<Vec<u8>>>;

bitflags! {
    /// 缓冲块标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u8 {
        /// 已加锁（有 I/O 正在进行或即将进行）
        const LOCKED   = 0x01;
        /// 数据已修改（脏）
        const DIRTY    = 0x02;
        /// 数据与磁盘一致（有效）
        const UPTODATE = 0x04;
    }
}

/// 缓冲块
///
/// # 字段说明
///
/// - `dev`: 所在设备
/// - `block_nr`: 逻辑块号（以 `BLOCK_SIZE` 为单位）
/// - `flags`: 块状态标志，原子更新，中断上下文可以直接修改
/// - `data`: 块数据
/// - `wait`: 等待该块解锁的队列
pub struct BlockBuffer {
    dev: DeviceId,
    block_nr: u32,
    flags: AtomicU8,
    data: SectorBuf,
    wait: Arc<dyn WaitQueue>,
}

impl core::fmt::Debug for BlockBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockBuffer")
            .field("dev", &self.dev)
            .field("block_nr", &self.block_nr)
            .field("flags", &self.flags())
            .finish()
    }
}

impl BlockBuffer {
    /// 创建缓冲块（忙等队列，数据清零）
    pub fn new(dev: DeviceId, block_nr: u32) -> Self {
        Self::with_wait_queue(dev, block_nr, Arc::new(SpinWaitQueue::new()))
    }

    /// 创建使用指定等待队列的缓冲块
    pub fn with_wait_queue(dev: DeviceId, block_nr: u32, wait: Arc<dyn WaitQueue>) -> Self {
        Self {
            dev,
            block_nr,
            flags: AtomicU8::new(0),
            data: Arc::new(Mutex::new(alloc::vec![0u8; BLOCK_SIZE])),
            wait,
        }
    }

    /// 所在设备
    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    /// 逻辑块号
    pub fn block_nr(&self) -> u32 {
        self.block_nr
    }

    /// 当前标志
    pub fn flags(&self) -> BufferFlags {
        BufferFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    fn insert(&self, flag: BufferFlags) -> BufferFlags {
        BufferFlags::from_bits_truncate(self.flags.fetch_or(flag.bits(), Ordering::AcqRel))
    }

    fn remove(&self, flag: BufferFlags) -> BufferFlags {
        BufferFlags::from_bits_truncate(self.flags.fetch_and(!flag.bits(), Ordering::AcqRel))
    }

    /// 是否已加锁
    pub fn is_locked(&self) -> bool {
        self.flags().contains(BufferFlags::LOCKED)
    }

    /// 是否是脏块
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(BufferFlags::DIRTY)
    }

    /// 标记为脏（已修改）
    pub fn mark_dirty(&self) {
        self.insert(BufferFlags::DIRTY);
    }

    /// 清除脏标志
    pub fn clear_dirty(&self) {
        self.remove(BufferFlags::DIRTY);
    }

    /// 数据是否有效
    pub fn is_uptodate(&self) -> bool {
        self.flags().contains(BufferFlags::UPTODATE)
    }

    /// 设置数据有效标志
    pub fn set_uptodate(&self, uptodate: bool) {
        if uptodate {
            self.insert(BufferFlags::UPTODATE);
        } else {
            self.remove(BufferFlags::UPTODATE);
        }
    }

    /// 尝试加锁，不挂起
    pub fn try_lock(&self) -> bool {
        !self.insert(BufferFlags::LOCKED).contains(BufferFlags::LOCKED)
    }

    /// 加锁
    ///
    /// 块被别人锁住时挂起在块的等待队列上，醒来后重新检查。
    pub fn lock(&self) {
        loop {
            let ticket = self.wait.prepare();
            if self.try_lock() {
                return;
            }
            self.wait.sleep(ticket);
        }
    }

    /// 解锁并唤醒等待者（中断上下文安全）
    pub fn unlock(&self) {
        if !self.remove(BufferFlags::LOCKED).contains(BufferFlags::LOCKED) {
            log::warn!(
                "[BLK] free buffer being unlocked: dev {} block {}",
                self.dev,
                self.block_nr
            );
        }
        self.wait.wake_up();
    }

    /// 挂起直到块解锁
    ///
    /// 提交请求后调用它即可得到同步读写语义。
    pub fn wait_on(&self) {
        loop {
            let ticket = self.wait.prepare();
            if !self.is_locked() {
                return;
            }
            self.wait.sleep(ticket);
        }
    }

    /// 访问块数据
    pub fn data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }

    /// 与请求共享的数据区
    pub(crate) fn sector_buf(&self) -> SectorBuf {
        Arc::clone(&self.data)
    }
}
