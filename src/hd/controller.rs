//! 硬盘控制器状态机
//!
//! 驱动在中断之间跳转：每条命令发出前登记"下一次中断该做什么"
//! （[`PendingIrq`]），中断到来时据此继续。所有处理都可能发生在中断上下文，
//! 不能挂起。
//!
//! 设备链表头的请求按以下顺序推进：
//! 1. `reset` 置位：复位控制器，设置驱动器参数，完成后进入 `AfterRecalibrate`
//! 2. `recalibrate` 置位：磁头归零，完成后进入 `AfterRecalibrate`
//! 3. 发出读/写命令，每完成一个扇区中断一次
//!
//! 出错时累计请求的错误次数：超过 `MAX_ERRORS / 2` 次后下一轮先复位，
//! 达到 `MAX_ERRORS` 次时以失败结束请求。

use byteorder::{ByteOrder, LittleEndian};
use spin::Mutex;

use crate::consts::{
    CONTROLLER_READY_RETRIES, DRIVE_BUSY_RETRIES, DRQ_RETRIES, HD_MAJOR, HD_MINORS_PER_DRIVE,
    MAX_ERRORS, MAX_HD, RESET_DELAY, SECTOR_SIZE, WORDS_PER_SECTOR,
};
use crate::device::DeviceId;
use crate::error::{Error, ErrorKind, Result};
use crate::request::{Command, Request, RequestHandler, RequestQueue};

use super::geometry::{DriveInfo, Partition};
use super::regs::{
    HdCommand, HdStatus, PortIo, HD_CMD, HD_COMMAND, HD_CTL_RESET, HD_CURRENT, HD_DATA, HD_ERROR,
    HD_HCYL, HD_LCYL, HD_NSECTOR, HD_SECTOR,
};

/// 下一次中断的处理函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingIrq {
    /// 没有命令在执行
    Idle,
    /// 复位/归零完成
    AfterRecalibrate,
    /// 读完一个扇区
    AfterRead,
    /// 写完一个扇区
    AfterWrite,
}

/// 驱动状态机的输入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// 设备链表由空变为非空（进程上下文，同步调用）
    Request,
    /// 硬盘中断
    Interrupt,
}

const NR_MINORS: usize = MAX_HD * HD_MINORS_PER_DRIVE;

struct HdState {
    drives: [DriveInfo; MAX_HD],
    /// 次设备号 -> 分区；`drive * 5` 为整盘
    parts: [Partition; NR_MINORS],
    reset: bool,
    recalibrate: bool,
    pending: PendingIrq,
}

/// 链表头请求的快照
struct Current {
    dev: DeviceId,
    cmd: Command,
    sector: u32,
    nr_sectors: u32,
    block_locked: Option<bool>,
    /// 缓冲区放得下剩余的扇区
    buffer_fits: bool,
}

/// AT 硬盘控制器
pub struct HdController<P: PortIo> {
    ports: P,
    state: Mutex<HdState>,
}

impl<P: PortIo> HdController<P> {
    /// 创建控制器（尚未配置驱动器）
    ///
    /// 第一次处理请求前总是先复位并归零。
    pub fn new(ports: P) -> Self {
        Self {
            ports,
            state: Mutex::new(HdState {
                drives: [DriveInfo::default(); MAX_HD],
                parts: [Partition::default(); NR_MINORS],
                reset: true,
                recalibrate: true,
                pending: PendingIrq::Idle,
            }),
        }
    }

    /// 端口
    pub fn ports(&self) -> &P {
        &self.ports
    }

    /// 配置驱动器参数，同时把该驱动器的整盘设备设为整个磁盘
    ///
    /// # 错误
    ///
    /// 驱动器号越界或参数无效时返回 `InvalidInput`
    pub fn set_drive(&self, drive: usize, info: DriveInfo) -> Result<()> {
        if drive >= MAX_HD {
            return Err(Error::new(ErrorKind::InvalidInput, "drive number out of range"));
        }
        info.validate()?;
        let mut st = self.state.lock();
        st.drives[drive] = info;
        st.parts[drive * HD_MINORS_PER_DRIVE] = Partition::new(0, info.capacity());
        log::info!(
            "[HD] drive {}: {} heads, {} sectors, {} cylinders",
            drive,
            info.head,
            info.sect,
            info.cyl
        );
        Ok(())
    }

    /// 配置次设备号对应的分区
    ///
    /// # 错误
    ///
    /// 次设备号越界、驱动器未配置或分区超出磁盘时返回 `InvalidInput`
    pub fn set_partition(&self, minor: usize, part: Partition) -> Result<()> {
        if minor >= NR_MINORS {
            return Err(Error::new(ErrorKind::InvalidInput, "minor number out of range"));
        }
        let mut st = self.state.lock();
        let info = st.drives[minor / HD_MINORS_PER_DRIVE];
        if !info.is_present() {
            return Err(Error::new(ErrorKind::InvalidInput, "drive not configured"));
        }
        if !Partition::new(0, info.capacity()).contains(part.start_sect, part.nr_sects) {
            return Err(Error::new(ErrorKind::InvalidInput, "partition exceeds disk"));
        }
        st.parts[minor] = part;
        Ok(())
    }

    /// 驱动器参数
    pub fn drive(&self, drive: usize) -> Option<DriveInfo> {
        self.state.lock().drives.get(drive).copied()
    }

    /// 分区
    pub fn partition(&self, minor: usize) -> Option<Partition> {
        self.state.lock().parts.get(minor).copied()
    }

    /// 下一轮是否先复位控制器
    pub fn needs_reset(&self) -> bool {
        self.state.lock().reset
    }

    /// 下一轮是否先归零
    pub fn needs_recalibrate(&self) -> bool {
        self.state.lock().recalibrate
    }

    /// 当前登记的中断处理
    pub fn pending(&self) -> PendingIrq {
        self.state.lock().pending
    }

    /// 硬盘中断入口
    pub fn interrupt(&self, queue: &RequestQueue) {
        self.advance(queue, Event::Interrupt);
    }

    /// 推进状态机
    pub fn advance(&self, queue: &RequestQueue, event: Event) {
        let mut st = self.state.lock();
        let mut session = Session {
            ports: &self.ports,
            st: &mut *st,
            queue,
        };
        match event {
            Event::Request => {
                // 已有命令在执行，中断处理完成后会自己接着处理链表
                if session.st.pending != PendingIrq::Idle {
                    log::trace!("[HD] request while {:?} is armed", session.st.pending);
                    return;
                }
                session.do_request();
            }
            Event::Interrupt => session.on_interrupt(),
        }
    }
}

impl<P: PortIo> RequestHandler for HdController<P> {
    fn do_request(&self, queue: &RequestQueue) {
        self.advance(queue, Event::Request);
    }
}

/// 一次状态机推进期间持有的上下文
struct Session<'a, P: PortIo> {
    ports: &'a P,
    st: &'a mut HdState,
    queue: &'a RequestQueue,
}

impl<P: PortIo> Session<'_, P> {
    fn current(&self) -> Option<Current> {
        self.queue.with_current(HD_MAJOR, |req| Current {
            dev: req.dev(),
            cmd: req.cmd(),
            sector: req.sector(),
            nr_sectors: req.nr_sectors(),
            block_locked: req.buffer_head().map(|bh| bh.is_locked()),
            buffer_fits: sector_span(req.offset, req.nr_sectors, req.buffer.lock().len())
                .is_some(),
        })
    }

    /// 处理链表头的请求，直到发出一条命令或链表为空
    fn do_request(&mut self) {
        loop {
            let Some(cur) = self.current() else {
                self.st.pending = PendingIrq::Idle;
                return;
            };
            if cur.dev.major() != HD_MAJOR {
                panic!("harddisk: request list destroyed");
            }
            if cur.block_locked == Some(false) {
                panic!("harddisk: block not locked");
            }

            let minor = cur.dev.minor() as usize;
            let drive = minor / HD_MINORS_PER_DRIVE;
            let part = match self.st.parts.get(minor) {
                Some(part)
                    if self.st.drives[drive].is_present()
                        && part.contains(cur.sector, cur.nr_sectors) =>
                {
                    *part
                }
                _ => {
                    log::error!(
                        "[HD] dev {} sector {}+{} out of range",
                        cur.dev,
                        cur.sector,
                        cur.nr_sectors
                    );
                    self.queue.end_request(HD_MAJOR, false);
                    continue;
                }
            };

            if !cur.buffer_fits {
                log::error!("[HD] dev {} buffer too small for {} sectors", cur.dev, cur.nr_sectors);
                self.queue.end_request(HD_MAJOR, false);
                continue;
            }

            let info = self.st.drives[drive];
            let chs = info.translate(part.start_sect + cur.sector);

            if self.st.reset {
                self.st.reset = false;
                self.st.recalibrate = true;
                if self.reset_hd(drive).is_err() {
                    self.bad_rw_intr();
                    continue;
                }
                return;
            }
            if self.st.recalibrate {
                self.st.recalibrate = false;
                if self
                    .hd_out(drive, info.sect, 0, 0, 0, HdCommand::Restore, PendingIrq::AfterRecalibrate)
                    .is_err()
                {
                    self.bad_rw_intr();
                    continue;
                }
                return;
            }

            match cur.cmd {
                Command::Write => {
                    let issued = self.hd_out(
                        drive,
                        cur.nr_sectors,
                        chs.sect,
                        chs.head,
                        chs.cyl,
                        HdCommand::Write,
                        PendingIrq::AfterWrite,
                    );
                    if issued.is_err() || !self.wait_drq() {
                        self.bad_rw_intr();
                        continue;
                    }
                    let ports = self.ports;
                    if self.queue.with_current(HD_MAJOR, |req| write_sector(ports, req))
                        == Some(false)
                    {
                        self.abort_transfer();
                        continue;
                    }
                    return;
                }
                Command::Read => {
                    let issued = self.hd_out(
                        drive,
                        cur.nr_sectors,
                        chs.sect,
                        chs.head,
                        chs.cyl,
                        HdCommand::Read,
                        PendingIrq::AfterRead,
                    );
                    if issued.is_err() {
                        self.bad_rw_intr();
                        continue;
                    }
                    return;
                }
            }
        }
    }

    fn on_interrupt(&mut self) {
        match core::mem::replace(&mut self.st.pending, PendingIrq::Idle) {
            PendingIrq::Idle => log::warn!("[HD] Unexpected HD interrupt"),
            PendingIrq::AfterRecalibrate => {
                if self.win_result().is_err() {
                    self.bad_rw_intr();
                }
                self.do_request();
            }
            PendingIrq::AfterRead => self.read_intr(),
            PendingIrq::AfterWrite => self.write_intr(),
        }
    }

    fn read_intr(&mut self) {
        if self.win_result().is_err() {
            self.bad_rw_intr();
            self.do_request();
            return;
        }
        let ports = self.ports;
        let remaining = self.queue.with_current(HD_MAJOR, |req| {
            if !read_sector(ports, req) {
                return None;
            }
            req.errors = 0;
            req.offset += SECTOR_SIZE;
            req.sector += 1;
            req.nr_sectors -= 1;
            Some(req.nr_sectors)
        });
        match remaining {
            Some(Some(0)) => {
                self.queue.end_request(HD_MAJOR, true);
                self.do_request();
            }
            Some(Some(left)) => {
                log::trace!("[HD] read sector done, {} left", left);
                self.st.pending = PendingIrq::AfterRead;
            }
            Some(None) => {
                self.abort_transfer();
                self.do_request();
            }
            None => self.do_request(),
        }
    }

    fn write_intr(&mut self) {
        if self.win_result().is_err() {
            self.bad_rw_intr();
            self.do_request();
            return;
        }
        // 下一个扇区的数据送出之前就登记好中断处理
        self.st.pending = PendingIrq::AfterWrite;
        let ports = self.ports;
        let remaining = self.queue.with_current(HD_MAJOR, |req| {
            req.nr_sectors -= 1;
            if req.nr_sectors > 0 {
                req.sector += 1;
                req.offset += SECTOR_SIZE;
                if !write_sector(ports, req) {
                    return None;
                }
            }
            Some(req.nr_sectors)
        });
        match remaining {
            Some(Some(0)) => {
                self.queue.end_request(HD_MAJOR, true);
                self.do_request();
            }
            Some(Some(left)) => log::trace!("[HD] write sector done, {} left", left),
            Some(None) => {
                self.abort_transfer();
                self.do_request();
            }
            None => self.do_request(),
        }
    }

    /// 缓冲区在传输途中变小：以失败结束请求，控制器还停在传输中途，下一轮先复位
    fn abort_transfer(&mut self) {
        log::error!("[HD] request buffer shrank during transfer");
        self.st.reset = true;
        self.queue.end_request(HD_MAJOR, false);
    }

    /// 出错处理：累计错误次数，不负责继续处理链表
    ///
    /// 返回当前请求累计后的错误次数；设备空闲时返回 `None`。
    fn bad_rw_intr(&mut self) -> Option<u32> {
        let errors = self.queue.with_current(HD_MAJOR, |req| {
            req.errors += 1;
            req.errors
        })?;
        if errors >= MAX_ERRORS {
            log::error!("[HD] giving up after {} errors", errors);
            self.queue.end_request(HD_MAJOR, false);
        }
        if errors > MAX_ERRORS / 2 {
            self.st.reset = true;
        }
        Some(errors)
    }

    /// 读取命令结果
    fn win_result(&self) -> Result<()> {
        let status = self.ports.status();
        if status.is_ok() {
            return Ok(());
        }
        if status.contains(HdStatus::ERR) {
            let error = self.ports.inb(HD_ERROR);
            log::error!("[HD] status {:#04x}, error {:#04x}", status.bits(), error);
        } else {
            log::error!("[HD] status {:#04x}", status.bits());
        }
        Err(Error::new(ErrorKind::Io, "hard disk command failed"))
    }

    fn controller_ready(&self) -> bool {
        (0..CONTROLLER_READY_RETRIES).any(|_| self.ports.status().controller_ready())
    }

    fn wait_drq(&self) -> bool {
        let ready = (0..DRQ_RETRIES).any(|_| self.ports.status().contains(HdStatus::DRQ));
        if !ready {
            log::error!("[HD] no data request after write command");
        }
        ready
    }

    /// 等待驱动器就绪，超时返回 `false`
    fn drive_ready(&self) -> bool {
        for _ in 0..DRIVE_BUSY_RETRIES {
            if self.ports.status().controller_ready() {
                break;
            }
        }
        let status = self.ports.status() & (HdStatus::BUSY | HdStatus::READY | HdStatus::SEEK);
        if status == HdStatus::READY | HdStatus::SEEK {
            return true;
        }
        log::error!("[HD] HD controller times out");
        false
    }

    fn reset_controller(&self) {
        self.ports.outb(HD_CMD, HD_CTL_RESET);
        for _ in 0..RESET_DELAY {
            core::hint::spin_loop();
        }
        self.ports.outb(HD_CMD, self.st.drives[0].ctl & 0x0f);
        if !self.drive_ready() {
            log::error!("[HD] HD-controller still busy");
        }
        let error = self.ports.inb(HD_ERROR);
        if error != 1 {
            log::error!("[HD] HD-controller reset failed: {:02x}", error);
        }
    }

    fn reset_hd(&mut self, drive: usize) -> Result<()> {
        log::debug!("[HD] resetting controller for drive {}", drive);
        self.reset_controller();
        let info = self.st.drives[drive];
        self.hd_out(
            drive,
            info.sect,
            info.sect,
            info.head - 1,
            info.cyl,
            HdCommand::Specify,
            PendingIrq::AfterRecalibrate,
        )
    }

    /// 写命令块并登记中断处理
    ///
    /// 控制器一直忙时返回 `Timeout`，由调用方按普通错误处理。
    #[allow(clippy::too_many_arguments)]
    fn hd_out(
        &mut self,
        drive: usize,
        nsect: u32,
        sect: u32,
        head: u32,
        cyl: u32,
        cmd: HdCommand,
        intr: PendingIrq,
    ) -> Result<()> {
        if drive >= MAX_HD || head > 15 {
            panic!("harddisk: trying to write bad sector");
        }
        if !self.controller_ready() {
            log::error!("[HD] HD controller not ready");
            return Err(Error::new(ErrorKind::Timeout, "HD controller not ready"));
        }
        log::debug!(
            "[HD] {:?} drive {} chs {}/{}/{} nsect {}",
            cmd,
            drive,
            cyl,
            head,
            sect,
            nsect
        );
        self.st.pending = intr;
        let info = self.st.drives[drive];
        self.ports.outb(HD_CMD, info.ctl);
        self.ports.outb(HD_ERROR, (info.wpcom >> 2) as u8);
        self.ports.outb(HD_NSECTOR, nsect as u8);
        self.ports.outb(HD_SECTOR, sect as u8);
        self.ports.outb(HD_LCYL, cyl as u8);
        self.ports.outb(HD_HCYL, (cyl >> 8) as u8);
        self.ports
            .outb(HD_CURRENT, 0xa0 | ((drive as u8) << 4) | head as u8);
        self.ports.outb(HD_COMMAND, cmd as u8);
        Ok(())
    }
}

/// 从 `offset` 起 `count` 个扇区的字节范围，超出 `len` 返回 `None`
fn sector_span(offset: usize, count: u32, len: usize) -> Option<core::ops::Range<usize>> {
    let end = (count as usize)
        .checked_mul(SECTOR_SIZE)
        .and_then(|bytes| offset.checked_add(bytes))?;
    (end <= len).then_some(offset..end)
}

/// 从数据端口读一个扇区到请求的当前位置；缓冲区放不下时不碰端口，返回 `false`
fn read_sector<P: PortIo>(ports: &P, req: &mut Request) -> bool {
    let mut data = req.buffer.lock();
    let Some(dst) = sector_span(req.offset, 1, data.len()).and_then(|span| data.get_mut(span))
    else {
        return false;
    };
    let mut words = [0u16; WORDS_PER_SECTOR];
    ports.read_words(HD_DATA, &mut words);
    LittleEndian::write_u16_into(&words, dst);
    true
}

/// 把请求当前位置的一个扇区写到数据端口；缓冲区不够时返回 `false`
fn write_sector<P: PortIo>(ports: &P, req: &Request) -> bool {
    let mut words = [0u16; WORDS_PER_SECTOR];
    {
        let data = req.buffer.lock();
        let Some(src) = sector_span(req.offset, 1, data.len()).and_then(|span| data.get(span))
        else {
            return false;
        };
        LittleEndian::read_u16_into(src, &mut words);
    }
    ports.write_words(HD_DATA, &words);
    true
}
