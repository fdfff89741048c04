//! 错误类型定义
//!
//! 提供块设备请求层与硬盘驱动的可恢复错误类型。
//! 队列损坏一类的一致性错误不走这里，直接 panic。

use core::fmt;

/// 块设备操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（请求以失败结束）
    Io,
    /// 无效参数
    InvalidInput,
    /// 主设备号不存在或没有注册请求处理函数
    NoDevice,
    /// 已存在
    AlreadyExists,
    /// 控制器超时
    Timeout,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
