//! 子系统对外的错误类型

use crate::page_table::PagingError;
use uapi::errno;

/// 内存映射操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapError {
    /// 策略错误：以可写+共享方式映射只读文件
    NotWritable,
    /// 策略错误：文件偏移未页对齐
    UnalignedOffset,
    /// 前置条件错误：长度为 0
    InvalidLength,
    /// 资源耗尽：VMA 描述符池已满
    TableExhausted,
    /// 资源耗尽：物理帧分配失败
    FrameAllocFailed,
    /// 地址不属于任何有效映射
    NotMapped,
    /// 前置条件错误：范围越界或算术溢出
    BadRange,
    /// 前置条件错误：试图在映射中间打洞
    HolePunch,
    /// 后备文件 I/O 失败
    Io,
    /// 页表操作失败
    Paging(PagingError),
}

/// 内存映射操作的结果类型
pub type MmapResult<T> = Result<T, MmapError>;

impl From<PagingError> for MmapError {
    fn from(e: PagingError) -> Self {
        MmapError::Paging(e)
    }
}

impl MmapError {
    /// 转换为系统调用层使用的 errno
    pub fn errno(&self) -> i32 {
        match self {
            MmapError::NotWritable => errno::EACCES,
            MmapError::UnalignedOffset
            | MmapError::InvalidLength
            | MmapError::BadRange
            | MmapError::HolePunch => errno::EINVAL,
            MmapError::TableExhausted | MmapError::FrameAllocFailed => errno::ENOMEM,
            MmapError::NotMapped => errno::EFAULT,
            MmapError::Io => errno::EIO,
            MmapError::Paging(PagingError::OutOfMemory) => errno::ENOMEM,
            MmapError::Paging(_) => errno::EFAULT,
        }
    }
}
