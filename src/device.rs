//! 设备号

use core::fmt;

use crate::consts::NR_BLK_DEV;

/// 设备号：高 8 位为主设备号，低 8 位为次设备号
///
/// 电梯算法直接比较原始设备号，所以 `Ord` 按 `raw()` 排序。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u16);

impl DeviceId {
    /// 由主、次设备号构造
    pub const fn new(major: u8, minor: u8) -> Self {
        Self(((major as u16) << 8) | minor as u16)
    }

    /// 由原始设备号构造（例如 0x300 为第一个硬盘整盘）
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// 原始设备号
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// 主设备号
    pub const fn major(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// 次设备号
    pub const fn minor(self) -> u8 {
        self.0 as u8
    }

    /// 主设备号是否落在设备表内
    pub const fn has_valid_major(self) -> bool {
        (self.major() as usize) < NR_BLK_DEV
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({:04x})", self.0)
    }
}
