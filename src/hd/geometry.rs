//! 驱动器几何参数与分区

use crate::error::{Error, ErrorKind, Result};

/// 驱动器参数
///
/// 启动时由 BIOS 参数表或配置给出。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveInfo {
    /// 磁头数（每柱面磁道数）
    pub head: u32,
    /// 每磁道扇区数
    pub sect: u32,
    /// 柱面数
    pub cyl: u32,
    /// 写预补偿起始柱面
    pub wpcom: u32,
    /// 磁头停放柱面
    pub lzone: u32,
    /// 控制字节（磁头数大于 8 时第 3 位置位）
    pub ctl: u8,
}

/// 物理地址（柱面/磁头/扇区），扇区号从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    /// 柱面
    pub cyl: u32,
    /// 磁头
    pub head: u32,
    /// 扇区（1 起）
    pub sect: u32,
}

impl DriveInfo {
    /// 按磁头数、每磁道扇区数、柱面数构造，其余参数取常用值
    pub const fn new(head: u32, sect: u32, cyl: u32) -> Self {
        Self {
            head,
            sect,
            cyl,
            wpcom: 0xffff,
            lzone: cyl,
            ctl: if head > 8 { 8 } else { 0 },
        }
    }

    /// 驱动器是否存在（参数全部非零）
    pub fn is_present(&self) -> bool {
        self.head != 0 && self.sect != 0 && self.cyl != 0
    }

    /// 总扇区数
    pub fn capacity(&self) -> u32 {
        self.head * self.sect * self.cyl
    }

    /// 线性扇区号转换为物理地址
    ///
    /// `cylinder, head = divmod(lba / sect, head)`，`sector = lba % sect + 1`
    pub fn translate(&self, lba: u32) -> Chs {
        let track = lba / self.sect;
        Chs {
            cyl: track / self.head,
            head: track % self.head,
            sect: lba % self.sect + 1,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.is_present() {
            return Err(Error::new(ErrorKind::InvalidInput, "drive geometry must be non-zero"));
        }
        if self.head > 16 {
            return Err(Error::new(ErrorKind::InvalidInput, "at most 16 heads"));
        }
        if self.sect > 255 || self.cyl > 0xffff {
            return Err(Error::new(ErrorKind::InvalidInput, "drive geometry out of range"));
        }
        Ok(())
    }
}

/// 分区：起始扇区与扇区数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Partition {
    /// 起始扇区（相对整盘）
    pub start_sect: u32,
    /// 扇区数
    pub nr_sects: u32,
}

impl Partition {
    /// 构造分区
    pub const fn new(start_sect: u32, nr_sects: u32) -> Self {
        Self {
            start_sect,
            nr_sects,
        }
    }

    /// 从 `sector` 开始的 `count` 个扇区是否都在分区内
    pub fn contains(&self, sector: u32, count: u32) -> bool {
        sector
            .checked_add(count)
            .is_some_and(|end| end <= self.nr_sects)
    }
}
