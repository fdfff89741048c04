//! 请求队列管理
//!
//! 所有块设备共用一个请求池。每个主设备号一条按电梯顺序排列的单链表，
//! 链表头就是设备正在处理的请求。
//!
//! 提交路径（进程上下文，可能挂起）：
//! 1. 缓冲块加锁（被别人锁住时挂起）
//! 2. 请求多余时直接返回：写一个干净块，或读一个有效块
//! 3. 在请求池里找空闲项（没有则挂起在 `wait_for_request` 上，醒来重试）
//! 4. 填写请求并按电梯顺序插入设备链表；链表原来为空时同步调用设备的请求处理函数
//!
//! 完成路径（中断上下文，从不挂起）：`end_request`。
//!
//! 请求池与链表头在同一把自旋锁里更新，锁从不跨越挂起点，
//! 也不在持锁时调用请求处理函数。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::buffer::{BlockBuffer, SectorBuf};
use crate::consts::{MAX_SECTORS_PER_REQUEST, NR_BLK_DEV, SECTORS_PER_BLOCK, SECTOR_SIZE};
use crate::device::DeviceId;
use crate::error::{Error, ErrorKind, Result};
use crate::sync::{Completion, SpinWaitQueue, WaitQueue};

use super::pool::RequestPool;
use super::request::{in_order, Command, Request, RequestInfo, RwMode};
use super::table::{DeviceTable, RequestHandler};

/// 临界区内的共享状态
struct QueueState {
    pool: RequestPool,
    /// 每个主设备号的链表头（当前请求）
    current: [Option<usize>; NR_BLK_DEV],
}

impl QueueState {
    fn head(&self, major: u8) -> Option<usize> {
        self.current.get(major as usize).copied().flatten()
    }

    /// 链表上的节点一定占用着请求项
    fn node(&self, idx: usize) -> &Request {
        match self.pool.get(idx) {
            Some(req) => req,
            None => panic!("request list destroyed: free slot {} is linked", idx),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Request {
        match self.pool.get_mut(idx) {
            Some(req) => req,
            None => panic!("request list destroyed: free slot {} is linked", idx),
        }
    }

    /// 把 `idx` 处的新请求插入设备链表
    ///
    /// 从链表头开始找第一个节点 `t`：`t` 排在新请求之前或 `t` 是一次扫描的折返点，
    /// 并且新请求排在 `t.next` 之前；插在 `t` 之后，找不到就接在表尾。
    /// 链表头正在被处理，新请求永远不会插到它前面。
    ///
    /// 返回链表原来是否为空。
    fn add_request(&mut self, major: u8, idx: usize, mut req: Request) -> bool {
        req.next = None;
        if let Some(bh) = &req.bh {
            bh.clear_dirty();
        }
        self.pool.fill(idx, req);

        let Some(mut tmp) = self.head(major) else {
            self.current[major as usize] = Some(idx);
            return true;
        };

        while let Some(next) = self.node(tmp).next {
            let t = self.node(tmp);
            let n = self.node(next);
            let r = self.node(idx);
            if (in_order(t, r) || !in_order(t, n)) && in_order(r, n) {
                break;
            }
            tmp = next;
        }

        let after = self.node(tmp).next;
        self.node_mut(idx).next = after;
        self.node_mut(tmp).next = Some(idx);
        false
    }

    fn linked(&self, major: u8) -> Vec<usize> {
        let mut list = Vec::new();
        let mut cursor = self.head(major);
        while let Some(idx) = cursor {
            list.push(idx);
            cursor = self.node(idx).next;
        }
        list
    }
}

/// 请求队列
pub struct RequestQueue {
    state: Mutex<QueueState>,
    table: DeviceTable,
    /// 等待空闲请求项的进程挂在这里，每次 `end_request` 都会唤醒
    wait_for_request: Arc<dyn WaitQueue>,
}

impl RequestQueue {
    /// 创建请求队列（所有请求项空闲，忙等队列）
    pub fn new() -> Self {
        Self::with_wait_queue(Arc::new(SpinWaitQueue::new()))
    }

    /// 创建使用指定等待队列的请求队列
    pub fn with_wait_queue(wait_for_request: Arc<dyn WaitQueue>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pool: RequestPool::new(),
                current: [None; NR_BLK_DEV],
            }),
            table: DeviceTable::new(),
            wait_for_request,
        }
    }

    /// 登记主设备号的请求处理函数
    pub fn register(&self, major: u8, handler: Arc<dyn RequestHandler>) -> Result<()> {
        self.table.register(major, handler)
    }

    fn check_device(&self, dev: DeviceId) -> Result<u8> {
        let major = dev.major();
        if !dev.has_valid_major() || self.table.handler(major).is_none() {
            log::error!("[BLK] Trying to read nonexistent block-device {}", dev);
            return Err(Error::new(ErrorKind::NoDevice, "nonexistent block-device"));
        }
        Ok(major)
    }

    /// 为缓冲块提交读写请求
    ///
    /// 调用方可能挂起（等待缓冲块解锁、等待空闲请求项）。
    /// 返回时请求已经入队（或被判定为多余/被丢弃），但不一定已经完成；
    /// 需要同步语义时随后调用 [`BlockBuffer::wait_on`]。
    ///
    /// # 错误
    ///
    /// - 主设备号不存在或没有登记请求处理函数：`NoDevice`
    /// - 块号换算成扇区号溢出：`InvalidInput`
    pub fn ll_rw_block(&self, mode: RwMode, bh: &Arc<BlockBuffer>) -> Result<()> {
        let major = self.check_device(bh.dev())?;
        let Some(sector) = bh.block_nr().checked_mul(SECTORS_PER_BLOCK) else {
            log::error!("[BLK] block {} out of sector range, dev {}", bh.block_nr(), bh.dev());
            return Err(Error::new(ErrorKind::InvalidInput, "block number out of range"));
        };
        self.make_request(major, mode, bh, sector);
        Ok(())
    }

    fn make_request(&self, major: u8, mode: RwMode, bh: &Arc<BlockBuffer>, sector: u32) {
        // 预读/预写不是必需的，块被锁住就不做了
        if mode.is_ahead() && bh.is_locked() {
            log::trace!("[BLK] drop {:?} on locked block {}", mode, bh.block_nr());
            return;
        }
        let cmd = mode.command();

        bh.lock();
        if (cmd == Command::Write && !bh.is_dirty()) || (cmd == Command::Read && bh.is_uptodate()) {
            bh.unlock();
            return;
        }

        let req = Request {
            dev: bh.dev(),
            cmd,
            errors: 0,
            sector,
            nr_sectors: SECTORS_PER_BLOCK,
            buffer: bh.sector_buf(),
            offset: 0,
            waiting: None,
            bh: Some(Arc::clone(bh)),
            next: None,
        };

        if self.queue_request(major, req, mode.is_ahead()).is_some() {
            bh.unlock();
        }
    }

    /// 提交不经过缓冲块的请求（分页类请求）
    ///
    /// `buffer` 至少要容纳 `nr_sectors` 个扇区；请求结束时通过 `waiting` 通知。
    ///
    /// # 错误
    ///
    /// - 主设备号不存在：`NoDevice`
    /// - 扇区数为 0、超过 `MAX_SECTORS_PER_REQUEST` 或缓冲区太小：`InvalidInput`
    pub fn submit_direct(
        &self,
        dev: DeviceId,
        cmd: Command,
        sector: u32,
        nr_sectors: u32,
        buffer: SectorBuf,
        waiting: Option<Arc<Completion>>,
    ) -> Result<()> {
        let major = self.check_device(dev)?;
        if nr_sectors == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "empty request"));
        }
        if nr_sectors > MAX_SECTORS_PER_REQUEST {
            return Err(Error::new(ErrorKind::InvalidInput, "too many sectors in one request"));
        }
        if buffer.lock().len() < nr_sectors as usize * SECTOR_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for requested sectors",
            ));
        }

        let req = Request {
            dev,
            cmd,
            errors: 0,
            sector,
            nr_sectors,
            buffer,
            offset: 0,
            waiting,
            bh: None,
            next: None,
        };
        let dropped = self.queue_request(major, req, false);
        debug_assert!(dropped.is_none());
        Ok(())
    }

    /// 申请请求项并入队
    ///
    /// 请求池满时：`droppable` 的请求原样返回，其余挂起等待后重试。
    fn queue_request(&self, major: u8, req: Request, droppable: bool) -> Option<Request> {
        loop {
            let ticket = self.wait_for_request.prepare();
            let mut state = self.state.lock();
            if let Some(idx) = state.pool.find_free(req.cmd) {
                log::debug!(
                    "[BLK] queue {:?} dev {} sector {} in slot {}",
                    req.cmd,
                    req.dev,
                    req.sector,
                    idx
                );
                let was_idle = state.add_request(major, idx, req);
                drop(state);
                if was_idle {
                    self.run_handler(major);
                }
                return None;
            }
            drop(state);

            if droppable {
                log::trace!("[BLK] request pool full, drop ahead request");
                self.wait_for_request.wake_up();
                return Some(req);
            }
            log::debug!("[BLK] request pool full, waiting for a free slot");
            self.wait_for_request.sleep(ticket);
        }
    }

    fn run_handler(&self, major: u8) {
        if let Some(handler) = self.table.handler(major) {
            handler.do_request(self);
        }
    }

    /// 结束设备的当前请求（中断上下文安全）
    ///
    /// 依次：释放请求项并把链表头推进到下一个请求；更新缓冲块的有效标志、
    /// 解锁并唤醒等待者；失败时输出诊断；通知请求的完成令牌；
    /// 唤醒等待空闲请求项的进程。
    pub fn end_request(&self, major: u8, uptodate: bool) {
        let req = {
            let mut state = self.state.lock();
            let Some(idx) = state.head(major) else {
                log::warn!("[BLK] end_request on idle major {}", major);
                return;
            };
            let Some(req) = state.pool.release(idx) else {
                panic!("request list destroyed: current slot {} is free", idx);
            };
            state.current[major as usize] = req.next;
            req
        };

        if let Some(bh) = &req.bh {
            bh.set_uptodate(uptodate);
            bh.unlock();
        }
        if !uptodate {
            match &req.bh {
                Some(bh) => log::error!("[BLK] I/O error, dev {}, block {}", req.dev, bh.block_nr()),
                None => log::error!("[BLK] I/O error, dev {}, sector {}", req.dev, req.sector),
            }
        }
        if let Some(done) = &req.waiting {
            done.complete(uptodate);
        }
        self.wait_for_request.wake_up();
    }

    /// 在临界区内访问设备的当前请求
    ///
    /// 设备空闲时返回 `None`。闭包内不能再调用队列的方法。
    pub fn with_current<R>(&self, major: u8, f: impl FnOnce(&mut Request) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let idx = state.head(major)?;
        Some(f(state.node_mut(idx)))
    }

    /// 设备当前没有请求
    pub fn is_idle(&self, major: u8) -> bool {
        self.state.lock().head(major).is_none()
    }

    /// 已占用的请求项数量
    pub fn in_use(&self) -> usize {
        self.state.lock().pool.in_use()
    }

    /// 所有设备链表上的请求总数
    pub fn linked(&self) -> usize {
        let state = self.state.lock();
        (0..NR_BLK_DEV as u8).map(|major| state.linked(major).len()).sum()
    }

    /// 设备链表快照（链表头在前）
    pub fn queued(&self, major: u8) -> Vec<RequestInfo> {
        let state = self.state.lock();
        state
            .linked(major)
            .into_iter()
            .map(|idx| state.node(idx).info())
            .collect()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{BLOCK_SIZE, HD_MAJOR, NR_REQUEST, NR_WRITE_REQUEST};
    use crate::sync::CondvarWaitQueue;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    const HD0: DeviceId = DeviceId::new(HD_MAJOR, 0);

    /// 只记录调用次数，不处理请求
    #[derive(Default)]
    struct Recorder {
        calls: AtomicUsize,
    }

    impl RequestHandler for Recorder {
        fn do_request(&self, _queue: &RequestQueue) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (RequestQueue, Arc<Recorder>) {
        let queue = RequestQueue::new();
        let recorder = Arc::new(Recorder::default());
        queue.register(HD_MAJOR, recorder.clone()).unwrap();
        (queue, recorder)
    }

    fn block(block_nr: u32) -> Arc<BlockBuffer> {
        Arc::new(BlockBuffer::new(HD0, block_nr))
    }

    fn dirty_block(block_nr: u32) -> Arc<BlockBuffer> {
        let bh = block(block_nr);
        bh.mark_dirty();
        bh
    }

    fn sectors(queue: &RequestQueue) -> Vec<(Command, u32)> {
        queue
            .queued(HD_MAJOR)
            .iter()
            .map(|info| (info.cmd, info.sector))
            .collect()
    }

    #[test]
    fn test_nonexistent_device() {
        let (queue, _) = setup();
        let unregistered = Arc::new(BlockBuffer::new(DeviceId::new(2, 0), 0));
        let err = queue.ll_rw_block(RwMode::Read, &unregistered).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDevice);

        let out_of_range = Arc::new(BlockBuffer::new(DeviceId::new(9, 0), 0));
        assert!(queue.ll_rw_block(RwMode::Read, &out_of_range).is_err());
        assert!(!unregistered.is_locked());
        assert_eq!(queue.in_use(), 0);
    }

    #[test]
    fn test_first_request_starts_device() {
        let (queue, recorder) = setup();
        let bh = block(10);
        queue.ll_rw_block(RwMode::Read, &bh).unwrap();

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert!(bh.is_locked());
        assert_eq!(queue.in_use(), 1);
        let head = queue.with_current(HD_MAJOR, |req| req.info()).unwrap();
        assert_eq!(head.sector, 20);
        assert_eq!(head.nr_sectors, SECTORS_PER_BLOCK);

        // 设备忙时不再调用请求处理函数
        queue.ll_rw_block(RwMode::Read, &block(11)).unwrap();
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_elevator_orders_pending_requests() {
        let (queue, _) = setup();
        queue.ll_rw_block(RwMode::Read, &block(0)).unwrap();
        // 扇区 100，再扇区 50
        queue.ll_rw_block(RwMode::Read, &block(50)).unwrap();
        queue.ll_rw_block(RwMode::Read, &block(25)).unwrap();

        assert_eq!(
            sectors(&queue),
            [(Command::Read, 0), (Command::Read, 50), (Command::Read, 100)]
        );
    }

    #[test]
    fn test_current_request_is_never_displaced() {
        let (queue, _) = setup();
        queue.ll_rw_block(RwMode::Read, &block(50)).unwrap();
        queue.ll_rw_block(RwMode::Read, &block(25)).unwrap();
        assert_eq!(sectors(&queue), [(Command::Read, 100), (Command::Read, 50)]);
    }

    #[test]
    fn test_sweep_discontinuity() {
        let (queue, _) = setup();
        queue.ll_rw_block(RwMode::Read, &block(250)).unwrap();
        queue.ll_rw_block(RwMode::Read, &block(5)).unwrap();
        queue.ll_rw_block(RwMode::Read, &block(10)).unwrap();
        // 折返点（500 -> 10）之后插入
        queue.ll_rw_block(RwMode::Read, &block(2)).unwrap();

        assert_eq!(
            sectors(&queue),
            [
                (Command::Read, 500),
                (Command::Read, 4),
                (Command::Read, 10),
                (Command::Read, 20)
            ]
        );
    }

    #[test]
    fn test_reads_go_ahead_of_writes() {
        let (queue, _) = setup();
        queue.ll_rw_block(RwMode::Read, &block(0)).unwrap();
        queue.ll_rw_block(RwMode::Write, &dirty_block(20)).unwrap();
        queue.ll_rw_block(RwMode::Read, &block(40)).unwrap();

        assert_eq!(
            sectors(&queue),
            [(Command::Read, 0), (Command::Read, 80), (Command::Write, 40)]
        );
    }

    #[test]
    fn test_completion_order_follows_elevator() {
        let (queue, _) = setup();
        let blocks: Vec<_> = [3u32, 60, 15, 40, 7, 90].iter().map(|&nr| block(nr)).collect();
        for bh in &blocks {
            queue.ll_rw_block(RwMode::Read, bh).unwrap();
        }

        let mut completed = Vec::new();
        while let Some(sector) = queue.with_current(HD_MAJOR, |req| req.sector()) {
            completed.push(sector / SECTORS_PER_BLOCK);
            queue.end_request(HD_MAJOR, true);
        }
        assert_eq!(completed, [3, 7, 15, 40, 60, 90]);
        assert!(blocks.iter().all(|bh| bh.is_uptodate() && !bh.is_locked()));
        assert!(queue.is_idle(HD_MAJOR));
        assert_eq!(queue.in_use(), 0);
    }

    #[test]
    fn test_redundant_requests_are_noops() {
        let (queue, recorder) = setup();

        let clean = block(1);
        queue.ll_rw_block(RwMode::Write, &clean).unwrap();

        let cached = block(2);
        cached.set_uptodate(true);
        queue.ll_rw_block(RwMode::Read, &cached).unwrap();

        assert_eq!(queue.in_use(), 0);
        assert!(queue.queued(HD_MAJOR).is_empty());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
        assert!(!clean.is_locked());
        assert!(!cached.is_locked());
    }

    #[test]
    fn test_write_clears_dirty() {
        let (queue, _) = setup();
        let bh = dirty_block(4);
        queue.ll_rw_block(RwMode::Write, &bh).unwrap();
        assert!(!bh.is_dirty());
        assert!(bh.is_locked());
        assert_eq!(queue.queued(HD_MAJOR)[0].cmd, Command::Write);
    }

    #[test]
    fn test_ahead_dropped_on_locked_block() {
        let (queue, _) = setup();
        let bh = block(3);
        assert!(bh.try_lock());
        queue.ll_rw_block(RwMode::ReadAhead, &bh).unwrap();
        assert_eq!(queue.in_use(), 0);
        // 锁仍然属于原持有者
        assert!(bh.is_locked());
    }

    #[test]
    fn test_ahead_downgrades_when_unlocked() {
        let (queue, _) = setup();
        let bh = dirty_block(3);
        queue.ll_rw_block(RwMode::WriteAhead, &bh).unwrap();
        assert_eq!(queue.queued(HD_MAJOR)[0].cmd, Command::Write);
    }

    #[test]
    fn test_ahead_dropped_when_pool_full() {
        let (queue, _) = setup();
        for nr in 0..NR_REQUEST as u32 {
            queue.ll_rw_block(RwMode::Read, &block(nr)).unwrap();
        }
        assert_eq!(queue.in_use(), NR_REQUEST);

        let bh = block(1000);
        queue.ll_rw_block(RwMode::ReadAhead, &bh).unwrap();
        assert_eq!(queue.in_use(), NR_REQUEST);
        assert!(!bh.is_locked());
    }

    /// 统计唤醒次数的等待队列
    #[derive(Default)]
    struct CountingWaitQueue {
        inner: SpinWaitQueue,
        wakes: AtomicUsize,
    }

    impl WaitQueue for CountingWaitQueue {
        fn prepare(&self) -> crate::sync::WaitTicket {
            self.inner.prepare()
        }

        fn sleep(&self, ticket: crate::sync::WaitTicket) {
            self.inner.sleep(ticket)
        }

        fn wake_up(&self) {
            self.wakes.fetch_add(1, Ordering::SeqCst);
            self.inner.wake_up()
        }
    }

    #[test]
    fn test_dropped_ahead_wakes_pool_waiters() {
        let wait = Arc::new(CountingWaitQueue::default());
        let queue = RequestQueue::with_wait_queue(wait.clone());
        queue.register(HD_MAJOR, Arc::new(Recorder::default())).unwrap();
        for nr in 0..NR_REQUEST as u32 {
            queue.ll_rw_block(RwMode::Read, &block(nr)).unwrap();
        }
        assert_eq!(wait.wakes.load(Ordering::SeqCst), 0);

        queue.ll_rw_block(RwMode::ReadAhead, &block(1000)).unwrap();
        assert_eq!(wait.wakes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_gets_reserved_slot_under_read_load() {
        let (queue, _) = setup();
        // 读请求占满除写窗口最低一项外的所有请求项
        for nr in 0..(NR_REQUEST - 1) as u32 {
            queue.ll_rw_block(RwMode::Read, &block(nr)).unwrap();
        }
        assert_eq!(queue.in_use(), NR_REQUEST - 1);

        let bh = dirty_block(500);
        queue.ll_rw_block(RwMode::Write, &bh).unwrap();
        assert_eq!(queue.in_use(), NR_REQUEST);
        assert!(queue.queued(HD_MAJOR).iter().any(|info| info.cmd == Command::Write));
    }

    #[test]
    fn test_end_request_failure() {
        let (queue, _) = setup();
        let first = block(1);
        let second = block(2);
        queue.ll_rw_block(RwMode::Read, &first).unwrap();
        queue.ll_rw_block(RwMode::Read, &second).unwrap();

        queue.end_request(HD_MAJOR, false);
        assert!(!first.is_uptodate());
        assert!(!first.is_locked());
        assert_eq!(queue.queued(HD_MAJOR)[0].sector, 4);
        assert_eq!(queue.in_use(), 1);

        queue.end_request(HD_MAJOR, true);
        assert!(second.is_uptodate());
        assert!(queue.is_idle(HD_MAJOR));

        // 空闲设备上的 end_request 只记录警告
        queue.end_request(HD_MAJOR, true);
        assert_eq!(queue.in_use(), 0);
    }

    #[test]
    fn test_direct_request() {
        let (queue, _) = setup();
        let buffer: SectorBuf = Arc::new(Mutex::new(alloc::vec![0u8; 4 * SECTOR_SIZE]));
        let done = Arc::new(Completion::new());
        queue
            .submit_direct(HD0, Command::Read, 8, 4, buffer, Some(done.clone()))
            .unwrap();
        let head = queue.queued(HD_MAJOR)[0];
        assert_eq!((head.sector, head.nr_sectors), (8, 4));

        queue.end_request(HD_MAJOR, false);
        assert!(done.is_done());
        assert_eq!(done.wait().unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn test_direct_request_validation() {
        let (queue, _) = setup();
        let small: SectorBuf = Arc::new(Mutex::new(alloc::vec![0u8; BLOCK_SIZE]));
        let err = queue
            .submit_direct(HD0, Command::Write, 0, 4, small.clone(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = queue
            .submit_direct(HD0, Command::Write, 0, 0, small, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(queue.in_use(), 0);
    }

    #[test]
    fn test_direct_request_sector_limit() {
        let (queue, _) = setup();
        let len = (MAX_SECTORS_PER_REQUEST as usize + 44) * SECTOR_SIZE;
        let big: SectorBuf = Arc::new(Mutex::new(alloc::vec![0u8; len]));

        // 300 个扇区写进 8 位寄存器会变成 44
        let err = queue
            .submit_direct(HD0, Command::Read, 0, 300, big.clone(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(queue.in_use(), 0);

        queue
            .submit_direct(HD0, Command::Read, 0, MAX_SECTORS_PER_REQUEST, big, None)
            .unwrap();
        assert_eq!(queue.in_use(), 1);
    }

    #[test]
    fn test_block_number_overflowing_sector_range() {
        let (queue, recorder) = setup();
        let bh = block(0x8000_0005);
        let err = queue.ll_rw_block(RwMode::Read, &bh).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!bh.is_locked());
        assert_eq!(queue.in_use(), 0);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);

        // 最大的可换算块号仍然可以提交
        let last = block(u32::MAX / SECTORS_PER_BLOCK);
        queue.ll_rw_block(RwMode::Read, &last).unwrap();
        assert_eq!(queue.in_use(), 1);
    }

    #[test]
    fn test_pool_conservation() {
        let (queue, _) = setup();
        for nr in 0..10u32 {
            queue.ll_rw_block(RwMode::Read, &block(nr * 7 % 10)).unwrap();
            queue.ll_rw_block(RwMode::Write, &dirty_block(100 + nr)).unwrap();
            assert_eq!(queue.in_use(), queue.linked());
        }
        for _ in 0..5 {
            queue.end_request(HD_MAJOR, true);
            assert_eq!(queue.in_use(), queue.linked());
        }
        assert_eq!(queue.in_use(), 15);
    }

    #[test]
    fn test_write_blocks_when_write_window_full() {
        let queue = Arc::new(RequestQueue::with_wait_queue(Arc::new(CondvarWaitQueue::new())));
        queue.register(HD_MAJOR, Arc::new(Recorder::default())).unwrap();

        for nr in 0..NR_WRITE_REQUEST as u32 {
            queue.ll_rw_block(RwMode::Write, &dirty_block(nr)).unwrap();
        }
        assert_eq!(queue.in_use(), NR_WRITE_REQUEST);

        let queued = Arc::new(AtomicBool::new(false));
        let handle = {
            let queue = Arc::clone(&queue);
            let queued = Arc::clone(&queued);
            thread::spawn(move || {
                queue
                    .ll_rw_block(RwMode::Write, &dirty_block(NR_WRITE_REQUEST as u32))
                    .unwrap();
                queued.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!queued.load(Ordering::SeqCst));
        assert_eq!(queue.in_use(), NR_WRITE_REQUEST);

        queue.end_request(HD_MAJOR, true);
        handle.join().unwrap();
        assert!(queued.load(Ordering::SeqCst));
        assert_eq!(queue.in_use(), NR_WRITE_REQUEST);
        assert_eq!(queue.in_use(), queue.linked());
    }
}
