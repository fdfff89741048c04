//! 请求项与电梯排序

use alloc::sync::Arc;

use crate::buffer::{BlockBuffer, SectorBuf};
use crate::device::DeviceId;
use crate::error::{Error, ErrorKind};
use crate::sync::Completion;

/// 读写命令
///
/// 读排在写前面：`Read < Write`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Command {
    /// 读
    Read,
    /// 写
    Write,
}

/// 提交模式
///
/// 预读/预写是投机性的：缓冲块被锁住或请求池满时直接丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    /// 读
    Read,
    /// 写
    Write,
    /// 预读
    ReadAhead,
    /// 预写
    WriteAhead,
}

impl RwMode {
    /// 是否是预读/预写
    pub fn is_ahead(self) -> bool {
        matches!(self, RwMode::ReadAhead | RwMode::WriteAhead)
    }

    /// 降级为普通命令
    pub fn command(self) -> Command {
        match self {
            RwMode::Read | RwMode::ReadAhead => Command::Read,
            RwMode::Write | RwMode::WriteAhead => Command::Write,
        }
    }
}

impl TryFrom<u8> for RwMode {
    type Error = Error;

    /// 原始命令码：0 读，1 写，2 预读，3 预写
    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(RwMode::Read),
            1 => Ok(RwMode::Write),
            2 => Ok(RwMode::ReadAhead),
            3 => Ok(RwMode::WriteAhead),
            _ => Err(Error::new(
                ErrorKind::InvalidInput,
                "Bad block dev command, must be R/W/RA/WA",
            )),
        }
    }
}

/// 请求项
///
/// 链表拓扑由请求池持有：`next` 只是池内下标，不拥有任何东西。
pub struct Request {
    pub(crate) dev: DeviceId,
    pub(crate) cmd: Command,
    pub(crate) errors: u32,
    /// 当前扇区（绝对扇区号，随传输前进）
    pub(crate) sector: u32,
    /// 剩余扇区数
    pub(crate) nr_sectors: u32,
    pub(crate) buffer: SectorBuf,
    /// 下一个扇区在 `buffer` 中的字节偏移
    pub(crate) offset: usize,
    pub(crate) waiting: Option<Arc<Completion>>,
    pub(crate) bh: Option<Arc<BlockBuffer>>,
    pub(crate) next: Option<usize>,
}

impl core::fmt::Debug for Request {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Request")
            .field("dev", &self.dev)
            .field("cmd", &self.cmd)
            .field("errors", &self.errors)
            .field("sector", &self.sector)
            .field("nr_sectors", &self.nr_sectors)
            .field("offset", &self.offset)
            .field("bh", &self.bh.as_ref().map(|bh| bh.block_nr()))
            .field("next", &self.next)
            .finish()
    }
}

impl Request {
    /// 设备号
    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    /// 命令
    pub fn cmd(&self) -> Command {
        self.cmd
    }

    /// 已累计的错误次数
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// 当前扇区
    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// 剩余扇区数
    pub fn nr_sectors(&self) -> u32 {
        self.nr_sectors
    }

    /// 服务的缓冲块（分页类请求为 `None`）
    pub fn buffer_head(&self) -> Option<&Arc<BlockBuffer>> {
        self.bh.as_ref()
    }

    /// 快照
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            dev: self.dev,
            cmd: self.cmd,
            sector: self.sector,
            nr_sectors: self.nr_sectors,
            errors: self.errors,
        }
    }
}

/// 请求快照，用于观察队列内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestInfo {
    /// 设备号
    pub dev: DeviceId,
    /// 命令
    pub cmd: Command,
    /// 当前扇区
    pub sector: u32,
    /// 剩余扇区数
    pub nr_sectors: u32,
    /// 错误次数
    pub errors: u32,
}

/// 电梯排序：`a` 是否排在 `b` 之前
///
/// 读先于写；命令相同时按设备号升序；设备相同时按扇区升序。
pub fn in_order(a: &Request, b: &Request) -> bool {
    (a.cmd, a.dev, a.sector) < (b.cmd, b.dev, b.sector)
}

#[cfg(test)]
pub(crate) fn test_request(cmd: Command, dev: DeviceId, sector: u32) -> Request {
    Request {
        dev,
        cmd,
        errors: 0,
        sector,
        nr_sectors: crate::consts::SECTORS_PER_BLOCK,
        buffer: Arc::new(spin::Mutex::new(alloc::vec![0u8; crate::consts::BLOCK_SIZE])),
        offset: 0,
        waiting: None,
        bh: None,
        next: None,
    }
}
