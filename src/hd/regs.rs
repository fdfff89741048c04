//! AT 硬盘控制器寄存器与端口 I/O 边界

use alloc::sync::Arc;

use bitflags::bitflags;

/// 数据端口（16 位）
pub const HD_DATA: u16 = 0x1f0;
/// 错误寄存器（读）/ 写预补偿（写）
pub const HD_ERROR: u16 = 0x1f1;
/// 扇区数
pub const HD_NSECTOR: u16 = 0x1f2;
/// 起始扇区
pub const HD_SECTOR: u16 = 0x1f3;
/// 柱面低 8 位
pub const HD_LCYL: u16 = 0x1f4;
/// 柱面高 8 位
pub const HD_HCYL: u16 = 0x1f5;
/// 驱动器/磁头：101dhhhh
pub const HD_CURRENT: u16 = 0x1f6;
/// 状态寄存器（读）/ 命令寄存器（写）
pub const HD_STATUS: u16 = 0x1f7;
/// 命令寄存器（写）
pub const HD_COMMAND: u16 = HD_STATUS;
/// 控制寄存器
pub const HD_CMD: u16 = 0x3f6;

/// 控制寄存器：软件复位位
pub const HD_CTL_RESET: u8 = 0x04;

bitflags! {
    /// 状态寄存器
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HdStatus: u8 {
        /// 上一条命令出错，错误码在 `HD_ERROR`
        const ERR   = 0x01;
        /// 索引脉冲
        const INDEX = 0x02;
        /// 已纠正的 ECC 错误
        const ECC   = 0x04;
        /// 数据请求：可以读写数据端口
        const DRQ   = 0x08;
        /// 寻道完成
        const SEEK  = 0x10;
        /// 写故障
        const WRERR = 0x20;
        /// 驱动器就绪
        const READY = 0x40;
        /// 控制器忙
        const BUSY  = 0x80;
    }
}

impl HdStatus {
    /// 判断命令结果的位
    pub const RESULT_MASK: HdStatus = HdStatus::BUSY
        .union(HdStatus::READY)
        .union(HdStatus::WRERR)
        .union(HdStatus::SEEK)
        .union(HdStatus::ERR);

    /// 命令成功：就绪且寻道完成，没有忙、写故障和错误
    pub fn is_ok(self) -> bool {
        self.intersection(Self::RESULT_MASK) == HdStatus::READY | HdStatus::SEEK
    }

    /// 控制器可以接收命令
    pub fn controller_ready(self) -> bool {
        self.intersection(HdStatus::BUSY | HdStatus::READY) == HdStatus::READY
    }
}

/// 控制器命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HdCommand {
    /// 磁头归零（重新校准）
    Restore = 0x10,
    /// 读扇区
    Read = 0x20,
    /// 写扇区
    Write = 0x30,
    /// 设置驱动器参数
    Specify = 0x91,
}

/// 端口 I/O
///
/// 实现此 trait 以提供对控制器端口的访问。裸机上是 `in`/`out` 指令，
/// 测试中是模拟控制器。端口访问本身没有 Rust 意义上的可变状态，
/// 所以方法都取 `&self`。
pub trait PortIo: Send + Sync {
    /// 读一个字节
    fn inb(&self, port: u16) -> u8;

    /// 写一个字节
    fn outb(&self, port: u16, value: u8);

    /// 连续读 `buf.len()` 个 16 位字
    fn read_words(&self, port: u16, buf: &mut [u16]);

    /// 连续写 `buf.len()` 个 16 位字
    fn write_words(&self, port: u16, buf: &[u16]);

    /// 读状态寄存器
    fn status(&self) -> HdStatus {
        HdStatus::from_bits_retain(self.inb(HD_STATUS))
    }
}

impl<T: PortIo + ?Sized> PortIo for Arc<T> {
    fn inb(&self, port: u16) -> u8 {
        (**self).inb(port)
    }

    fn outb(&self, port: u16, value: u8) {
        (**self).outb(port, value)
    }

    fn read_words(&self, port: u16, buf: &mut [u16]) {
        (**self).read_words(port, buf)
    }

    fn write_words(&self, port: u16, buf: &[u16]) {
        (**self).write_words(port, buf)
    }
}
