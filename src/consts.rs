//! 常量定义
//!
//! 这个模块包含了请求层与硬盘驱动使用的所有常量，包括：
//! - 请求池与设备表大小
//! - 块与扇区大小
//! - 重试与忙等待上限

//=============================================================================
// 请求队列
//=============================================================================

/// 请求池中请求项的数量
///
/// 写请求只能使用前 2/3 的请求项，读请求优先。
pub const NR_REQUEST: usize = 32;

/// 写请求可扫描的请求项数量（前 2/3）
pub const NR_WRITE_REQUEST: usize = (NR_REQUEST * 2) / 3;

/// 设备表项数量（主设备号 0..7）
pub const NR_BLK_DEV: usize = 7;

//=============================================================================
// 主设备号
//=============================================================================

/// 内存盘
pub const RAMDISK_MAJOR: u8 = 1;

/// 软盘
pub const FLOPPY_MAJOR: u8 = 2;

/// 硬盘
pub const HD_MAJOR: u8 = 3;

//=============================================================================
// 块与扇区
//=============================================================================

/// 缓冲块大小（字节）
pub const BLOCK_SIZE: usize = 1024;

/// 硬件扇区大小（字节）
pub const SECTOR_SIZE: usize = 512;

/// 每个缓冲块包含的扇区数
pub const SECTORS_PER_BLOCK: u32 = (BLOCK_SIZE / SECTOR_SIZE) as u32;

/// 每个扇区包含的 16 位字数（数据端口按字传输）
pub const WORDS_PER_SECTOR: usize = SECTOR_SIZE / 2;

/// 单个请求的最大扇区数（扇区数寄存器写 0 表示 256）
pub const MAX_SECTORS_PER_REQUEST: u32 = 256;

//=============================================================================
// 硬盘
//=============================================================================

/// 每个扇区允许的最大读写错误次数
pub const MAX_ERRORS: u32 = 7;

/// 支持的硬盘数量
pub const MAX_HD: usize = 2;

/// 每个硬盘的次设备号数量（整盘 + 4 个分区）
pub const HD_MINORS_PER_DRIVE: usize = 5;

/// 等待控制器就绪的轮询次数
pub const CONTROLLER_READY_RETRIES: u32 = 10000;

/// 复位后等待驱动器就绪的轮询次数
pub const DRIVE_BUSY_RETRIES: u32 = 10000;

/// 写命令发出后等待 DRQ 的轮询次数
pub const DRQ_RETRIES: u32 = 3000;

/// 软件复位后的空转次数
pub const RESET_DELAY: u32 = 100;
