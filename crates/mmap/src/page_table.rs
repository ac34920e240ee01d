//! 页表适配器接口
//!
//! 本子系统不直接操纵页表的硬件格式；它只依赖地址空间子系统提供的
//! 查询/保留/装入/失效四个原语。
//!
//! ## 三态页表项
//!
//! 一个 mmap 范围内的页在页表中有三种状态：
//!
//! - **缺失**：没有页表项，访问它是真正的段错误；
//! - **保留待装入**：存在页表项且带 [`PteFlags::MMAPPED`] 软件位，
//!   但 [`PteFlags::VALID`] 清零——缺页处理路径据此把"待装入的 mmap
//!   页"与非法访问区分开；
//! - **常驻**：`VALID` 置位并指向物理页帧。
//!
//! [`PageTable::install`] 对已经 `VALID` 的项返回
//! [`PagingError::AlreadyMapped`]，这是"先装入者获胜"竞争裁决的基础。

use bitflags::bitflags;
use uapi::mm::ProtFlags;

bitflags! {
    /// 架构无关的页表项标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: usize {
        /// 有效（常驻物理内存）
        const VALID = 1 << 0;
        /// 可读
        const READABLE = 1 << 1;
        /// 可写
        const WRITEABLE = 1 << 2;
        /// 可执行
        const EXECUTABLE = 1 << 3;
        /// 用户态可访问
        const USER = 1 << 4;
        /// 软件位：此页属于一个（可能尚未装入的）文件映射
        const MMAPPED = 1 << 5;
    }
}

impl From<ProtFlags> for PteFlags {
    fn from(prot: ProtFlags) -> Self {
        let mut flags = PteFlags::empty();
        if prot.contains(ProtFlags::READ) {
            flags |= PteFlags::READABLE;
        }
        if prot.contains(ProtFlags::WRITE) {
            flags |= PteFlags::WRITEABLE;
        }
        if prot.contains(ProtFlags::EXEC) {
            flags |= PteFlags::EXECUTABLE;
        }
        flags
    }
}

/// 一个页表项的架构无关视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtEntry {
    /// 物理页帧的起始地址（保留待装入的项为 0）
    pub pa: usize,
    /// 标志位
    pub flags: PteFlags,
}

/// 页表操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// 虚拟地址未被映射
    NotMapped,
    /// 虚拟地址已被映射
    AlreadyMapped,
    /// 提供了无效的地址
    InvalidAddress,
    /// 页表自身的内存耗尽
    OutOfMemory,
}

/// 页表操作的结果类型
pub type PagingResult<T> = Result<T, PagingError>;

/// 页表适配器接口
///
/// 由地址空间子系统实现；实现自带内部锁，单次调用是原子的。
/// 所有地址参数都必须页对齐。
pub trait PageTable: Send + Sync {
    /// 查询虚拟地址对应的页表项；缺失时返回 None
    fn lookup(&self, vaddr: usize) -> Option<PtEntry>;

    /// 登记一个"保留待装入"的页表项
    ///
    /// `flags` 不得包含 [`PteFlags::VALID`]；已存在页表项时返回
    /// [`PagingError::AlreadyMapped`]。
    fn reserve(&self, vaddr: usize, flags: PteFlags) -> PagingResult<()>;

    /// 将物理页帧装入页表，置位 `VALID`
    ///
    /// 若当前项已经 `VALID`，返回 [`PagingError::AlreadyMapped`]
    /// 且不修改任何状态——调用者据此丢弃自己的帧。
    fn install(&self, vaddr: usize, pa: usize, flags: PteFlags) -> PagingResult<()>;

    /// 移除页表项（常驻或保留均可），并使对应 TLB 条目失效
    fn invalidate(&self, vaddr: usize) -> PagingResult<()>;
}
