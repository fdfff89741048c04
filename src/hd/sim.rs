//! 测试用的模拟控制器
//!
//! 按端口语义模拟一个驱动器：命令写入后立即"完成"并锁存中断，
//! 测试代码通过 [`SimDisk::take_irq`] 取出中断再调用驱动的中断入口。

use alloc::vec;
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};
use spin::Mutex;

use crate::consts::{SECTOR_SIZE, WORDS_PER_SECTOR};
use crate::request::RequestQueue;

use super::controller::HdController;
use super::geometry::DriveInfo;
use super::regs::{
    HdCommand, HdStatus, PortIo, HD_CMD, HD_COMMAND, HD_CTL_RESET, HD_CURRENT, HD_DATA, HD_ERROR,
    HD_HCYL, HD_LCYL, HD_NSECTOR, HD_SECTOR,
};

/// 故障注入
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Faults {
    /// 接下来多少次读命令失败
    pub fail_reads: u32,
    /// 接下来多少个写扇区失败
    pub fail_writes: u32,
    /// 接下来多少次 specify/restore 失败
    pub fail_setup: u32,
    /// 控制器一直忙
    pub stuck_busy: bool,
    /// 写命令之后不给 DRQ
    pub no_drq: bool,
}

#[derive(Debug, Clone, Copy)]
enum Transfer {
    None,
    Read { lba: usize, remaining: u32 },
    Write { lba: usize, remaining: u32 },
}

struct SimState {
    geometry: DriveInfo,
    storage: Vec<u8>,
    status: HdStatus,
    error: u8,
    nsect: u8,
    sect: u8,
    lcyl: u8,
    hcyl: u8,
    current: u8,
    transfer: Transfer,
    fifo: [u16; WORDS_PER_SECTOR],
    irq: bool,
    commands: Vec<u8>,
    /// (命令, 起始扇区)
    transfers: Vec<(u8, usize)>,
    resets: usize,
    faults: Faults,
}

impl SimState {
    fn lba(&self) -> usize {
        let head = (self.current & 0x0f) as usize;
        let cyl = self.lcyl as usize | (self.hcyl as usize) << 8;
        let heads = self.geometry.head as usize;
        let spt = self.geometry.sect as usize;
        (cyl * heads + head) * spt + self.sect as usize - 1
    }

    fn count(&self) -> u32 {
        if self.nsect == 0 {
            256
        } else {
            self.nsect as u32
        }
    }

    fn load(&mut self, lba: usize) {
        let start = lba * SECTOR_SIZE;
        LittleEndian::read_u16_into(&self.storage[start..start + SECTOR_SIZE], &mut self.fifo);
    }

    fn fail(&mut self, error: u8) {
        self.transfer = Transfer::None;
        self.status = HdStatus::READY | HdStatus::SEEK | HdStatus::ERR;
        self.error = error;
        self.irq = true;
    }

    fn command(&mut self, cmd: u8) {
        self.commands.push(cmd);
        self.error = 0;
        match cmd {
            c if c == HdCommand::Specify as u8 || c == HdCommand::Restore as u8 => {
                if self.faults.fail_setup > 0 {
                    self.faults.fail_setup -= 1;
                    self.fail(0x04);
                    return;
                }
                self.status = HdStatus::READY | HdStatus::SEEK;
                self.irq = true;
            }
            c if c == HdCommand::Read as u8 => {
                let lba = self.lba();
                self.transfers.push((cmd, lba));
                if self.faults.fail_reads > 0 {
                    self.faults.fail_reads -= 1;
                    self.fail(0x40);
                    return;
                }
                self.load(lba);
                self.transfer = Transfer::Read {
                    lba,
                    remaining: self.count(),
                };
                self.status = HdStatus::READY | HdStatus::SEEK | HdStatus::DRQ;
                self.irq = true;
            }
            c if c == HdCommand::Write as u8 => {
                let lba = self.lba();
                self.transfers.push((cmd, lba));
                self.transfer = Transfer::Write {
                    lba,
                    remaining: self.count(),
                };
                self.status = if self.faults.no_drq {
                    HdStatus::READY | HdStatus::SEEK
                } else {
                    HdStatus::READY | HdStatus::SEEK | HdStatus::DRQ
                };
            }
            _ => self.fail(0x04),
        }
    }
}

/// 模拟控制器
pub(crate) struct SimDisk {
    inner: Mutex<SimState>,
}

impl SimDisk {
    pub fn new(geometry: DriveInfo) -> Self {
        Self {
            inner: Mutex::new(SimState {
                geometry,
                storage: vec![0; geometry.capacity() as usize * SECTOR_SIZE],
                status: HdStatus::READY | HdStatus::SEEK,
                error: 0,
                nsect: 0,
                sect: 0,
                lcyl: 0,
                hcyl: 0,
                current: 0,
                transfer: Transfer::None,
                fifo: [0; WORDS_PER_SECTOR],
                irq: false,
                commands: Vec::new(),
                transfers: Vec::new(),
                resets: 0,
                faults: Faults::default(),
            }),
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        self.inner.lock().faults = faults;
    }

    /// 取出并清除锁存的中断
    pub fn take_irq(&self) -> bool {
        core::mem::take(&mut self.inner.lock().irq)
    }

    /// 命令寄存器收到的所有命令
    pub fn commands(&self) -> Vec<u8> {
        self.inner.lock().commands.clone()
    }

    /// 某条命令发出的次数
    pub fn count_of(&self, cmd: HdCommand) -> usize {
        self.inner
            .lock()
            .commands
            .iter()
            .filter(|&&c| c == cmd as u8)
            .count()
    }

    /// 读写命令及其起始扇区
    pub fn transfers(&self) -> Vec<(u8, usize)> {
        self.inner.lock().transfers.clone()
    }

    pub fn resets(&self) -> usize {
        self.inner.lock().resets
    }

    pub fn sector(&self, lba: usize) -> Vec<u8> {
        let state = self.inner.lock();
        state.storage[lba * SECTOR_SIZE..(lba + 1) * SECTOR_SIZE].to_vec()
    }

    pub fn fill_sector(&self, lba: usize, data: &[u8]) {
        let mut state = self.inner.lock();
        state.storage[lba * SECTOR_SIZE..(lba + 1) * SECTOR_SIZE].copy_from_slice(data);
    }
}

impl PortIo for SimDisk {
    fn inb(&self, port: u16) -> u8 {
        let state = self.inner.lock();
        match port {
            HD_ERROR => state.error,
            HD_COMMAND if state.faults.stuck_busy => HdStatus::BUSY.bits(),
            HD_COMMAND => state.status.bits(),
            HD_NSECTOR => state.nsect,
            HD_SECTOR => state.sect,
            HD_LCYL => state.lcyl,
            HD_HCYL => state.hcyl,
            HD_CURRENT => state.current,
            _ => 0xff,
        }
    }

    fn outb(&self, port: u16, value: u8) {
        let mut state = self.inner.lock();
        match port {
            HD_CMD if value & HD_CTL_RESET != 0 => {
                state.resets += 1;
                state.transfer = Transfer::None;
                state.irq = false;
                state.status = HdStatus::READY | HdStatus::SEEK;
                // 诊断码 1：没有错误
                state.error = 1;
            }
            HD_CMD | HD_ERROR => {}
            HD_NSECTOR => state.nsect = value,
            HD_SECTOR => state.sect = value,
            HD_LCYL => state.lcyl = value,
            HD_HCYL => state.hcyl = value,
            HD_CURRENT => state.current = value,
            HD_COMMAND => state.command(value),
            _ => {}
        }
    }

    fn read_words(&self, port: u16, buf: &mut [u16]) {
        assert_eq!(port, HD_DATA);
        let mut state = self.inner.lock();
        buf.copy_from_slice(&state.fifo[..buf.len()]);
        if let Transfer::Read { lba, remaining } = state.transfer {
            if remaining > 1 {
                state.load(lba + 1);
                state.transfer = Transfer::Read {
                    lba: lba + 1,
                    remaining: remaining - 1,
                };
                state.irq = true;
            } else {
                state.transfer = Transfer::None;
                state.status = HdStatus::READY | HdStatus::SEEK;
            }
        }
    }

    fn write_words(&self, port: u16, buf: &[u16]) {
        assert_eq!(port, HD_DATA);
        let mut state = self.inner.lock();
        let Transfer::Write { lba, remaining } = state.transfer else {
            return;
        };
        if state.faults.fail_writes > 0 {
            state.faults.fail_writes -= 1;
            state.fail(0x40);
            return;
        }
        let start = lba * SECTOR_SIZE;
        LittleEndian::write_u16_into(buf, &mut state.storage[start..start + SECTOR_SIZE]);
        if remaining > 1 {
            state.transfer = Transfer::Write {
                lba: lba + 1,
                remaining: remaining - 1,
            };
            state.status = HdStatus::READY | HdStatus::SEEK | HdStatus::DRQ;
        } else {
            state.transfer = Transfer::None;
            state.status = HdStatus::READY | HdStatus::SEEK;
        }
        state.irq = true;
    }
}

/// 把锁存的中断逐个交给驱动，直到控制器安静下来；返回处理的中断数
pub(crate) fn run_interrupts<P: PortIo>(
    hd: &HdController<P>,
    queue: &RequestQueue,
    sim: &SimDisk,
) -> usize {
    let mut handled = 0;
    while sim.take_irq() {
        hd.interrupt(queue);
        handled += 1;
        assert!(handled < 10_000, "interrupt storm");
    }
    handled
}
