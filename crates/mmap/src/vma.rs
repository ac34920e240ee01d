//! VMA 描述符与定长描述符池
//!
//! 一个 [`Vma`] 记录一段连续的文件映射区间：起始虚拟地址、字节长度、
//! 文件内偏移、访问权限、映射类型，以及对后备文件的引用计数句柄。
//! 句柄在 VMA 的整个生命周期内持有——即使进程随后关闭了自己的文件
//! 描述符，文件也不会被真正释放。
//!
//! 描述符存放在一个定长的池（[`VmaTable`]）里，按"首个空闲槽"线性
//! 扫描分配。池本身不含锁；调用方（[`crate::memory_space::MemorySpace`]）
//! 统一持锁。

use crate::config::{PAGE_SIZE, page_round_down, page_round_up};
use crate::file::BackingFile;
use crate::frame_allocator::FrameTracker;
use alloc::collections::btree_map::BTreeMap;
use alloc::sync::Arc;
use uapi::mm::{MapFlags, ProtFlags};

pub use crate::config::VMA_CAPACITY;

/// 一个虚拟内存区域（Virtual Memory Area）描述符
pub struct Vma {
    /// 槽位是否在用
    pub(crate) valid: bool,
    /// 映射区间的起始虚拟地址（页对齐）
    pub(crate) addr: usize,
    /// 映射区间的字节长度
    pub(crate) len: usize,
    /// 起始地址对应的文件内字节偏移
    pub(crate) offset: usize,
    /// 访问权限
    pub(crate) prot: ProtFlags,
    /// 映射类型（共享/私有）
    pub(crate) flags: MapFlags,
    /// 后备文件句柄；valid 为真时必定存在
    pub(crate) file: Option<Arc<dyn BackingFile>>,
    /// 已装入页的物理帧，按页虚拟地址索引
    ///
    /// 帧的所有权在这里：从 map 中移除即释放（RAII）。
    pub(crate) frames: BTreeMap<usize, FrameTracker>,
}

impl Vma {
    /// 创建一个空闲槽位
    pub(crate) const fn empty() -> Self {
        Vma {
            valid: false,
            addr: 0,
            len: 0,
            offset: 0,
            prot: ProtFlags::empty(),
            flags: MapFlags::empty(),
            file: None,
            frames: BTreeMap::new(),
        }
    }

    /// 槽位是否在用
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// 映射区间的起始虚拟地址
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// 映射区间的字节长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 映射区间是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 起始地址对应的文件内偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 访问权限
    pub fn prot(&self) -> ProtFlags {
        self.prot
    }

    /// 映射类型
    pub fn flags(&self) -> MapFlags {
        self.flags
    }

    /// 已装入的页数
    pub fn resident_pages(&self) -> usize {
        self.frames.len()
    }

    /// 此映射占据的页范围是否覆盖给定的页地址
    ///
    /// 占据的页集合是 `[floor(addr), ceil(addr + len))`。
    pub(crate) fn spans_page(&self, page_va: usize) -> bool {
        debug_assert!(page_va % PAGE_SIZE == 0);
        self.valid
            && page_va >= page_round_down(self.addr)
            && page_va < page_round_up(self.addr + self.len)
    }

    /// 给定字节地址是否落在映射区间内
    pub(crate) fn contains(&self, addr: usize) -> bool {
        self.valid && addr >= self.addr && addr < self.addr + self.len
    }
}

impl core::fmt::Debug for Vma {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Vma")
            .field("valid", &self.valid)
            .field("addr", &self.addr)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("prot", &self.prot)
            .field("flags", &self.flags)
            .field("resident", &self.frames.len())
            .finish()
    }
}

/// 定长的 VMA 描述符池
///
/// 容量为 [`VMA_CAPACITY`]；分配是对池的 O(N) 线性扫描。
pub struct VmaTable {
    slots: [Vma; VMA_CAPACITY],
}

impl VmaTable {
    /// 创建一个全空闲的描述符池
    pub fn new() -> Self {
        VmaTable {
            slots: core::array::from_fn(|_| Vma::empty()),
        }
    }

    /// 认领第一个空闲槽位，返回其句柄（下标）；池满时返回 None
    pub fn allocate(&mut self) -> Option<usize> {
        for (idx, vma) in self.slots.iter_mut().enumerate() {
            if !vma.valid {
                vma.valid = true;
                return Some(idx);
            }
        }
        None
    }

    /// 按句柄取槽位
    pub fn get(&self, idx: usize) -> &Vma {
        &self.slots[idx]
    }

    /// 按句柄取槽位（可变）
    pub fn get_mut(&mut self, idx: usize) -> &mut Vma {
        &mut self.slots[idx]
    }

    /// 查找页范围覆盖给定页地址的 VMA
    pub fn find_page(&self, page_va: usize) -> Option<usize> {
        self.slots.iter().position(|v| v.spans_page(page_va))
    }

    /// 查找区间包含给定字节地址的 VMA
    pub fn find_containing(&self, addr: usize) -> Option<usize> {
        self.slots.iter().position(|v| v.contains(addr))
    }

    /// 释放一个槽位：归还文件引用、丢弃残余帧、清空全部字段
    ///
    /// 只能经由拆除路径调用，且每个 VMA 生命周期内只调用一次；
    /// 对已空闲槽位调用是调用方的编程错误。
    pub fn close(&mut self, idx: usize) {
        let vma = &mut self.slots[idx];
        assert!(vma.valid, "VmaTable::close: slot already free");

        vma.file = None; // 释放文件引用计数
        vma.frames.clear(); // 残余帧经 RAII 归还
        vma.addr = 0;
        vma.len = 0;
        vma.offset = 0;
        vma.prot = ProtFlags::empty();
        vma.flags = MapFlags::empty();
        vma.valid = false;
    }

    /// 当前在用的槽位数
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|v| v.valid).count()
    }
}

impl Default for VmaTable {
    fn default() -> Self {
        Self::new()
    }
}
