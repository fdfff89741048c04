//! 请求池
//!
//! 固定 `NR_REQUEST` 个请求项，`None` 表示空闲。
//! 空闲项从后往前找：读请求扫描整个池，写请求只扫描前 2/3，
//! 后 1/3 只留给读请求，写请求占满队列时读请求不会被饿死。

use crate::consts::{NR_REQUEST, NR_WRITE_REQUEST};

use super::request::{Command, Request};

/// 请求池
pub struct RequestPool {
    slots: [Option<Request>; NR_REQUEST],
}

impl RequestPool {
    /// 创建空请求池（所有请求项空闲）
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// 查找空闲请求项
    ///
    /// 返回扫描窗口内下标最大的空闲项；窗口内没有空闲项返回 `None`。
    pub fn find_free(&self, cmd: Command) -> Option<usize> {
        let window = match cmd {
            Command::Read => NR_REQUEST,
            Command::Write => NR_WRITE_REQUEST,
        };
        self.slots[..window].iter().rposition(Option::is_none)
    }

    /// 占用请求项
    ///
    /// 调用方必须先通过 `find_free` 确认该项空闲。
    pub(crate) fn fill(&mut self, idx: usize, req: Request) {
        debug_assert!(self.slots[idx].is_none(), "request slot {} already in use", idx);
        self.slots[idx] = Some(req);
    }

    /// 释放请求项并取出其中的请求
    pub(crate) fn release(&mut self, idx: usize) -> Option<Request> {
        self.slots[idx].take()
    }

    /// 访问请求项
    pub fn get(&self, idx: usize) -> Option<&Request> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// 可变访问请求项
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Request> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// 已占用的请求项数量
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for RequestPool {
    fn default() -> Self {
        Self::new()
    }
}
