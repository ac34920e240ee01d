//! 物理帧分配器
//!
//! 为缺页装入提供单页物理帧的分配与回收。
//!
//! ## 分配策略（位图）
//!
//! 分配器使用位图跟踪每个物理帧的分配状态：
//!
//! - **bitmap**：每个 bit 表示一个物理帧（0=空闲，1=已分配）
//! - **last_alloc_hint**：上次分配位置提示，利用局部性加速查找
//!
//! ## RAII：自动回收
//!
//! [`FrameTracker`] 是单帧的 RAII 封装，`Drop` 时自动归还位图。
//! 这使得异常路径（装入竞争失败、文件读取出错）上的帧不会泄漏。
//!
//! 帧在分配时清零——文件尾部不足一页的"短读"因此天然获得
//! 零填充语义，无需额外处理。

use crate::config::PAGE_SIZE;
use crate::phys::phys_ops;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use sync::SpinLock;

/// 物理帧跟踪器。
/// 实现了 RAII 模式：当此结构体被 drop 时，它所管理的物理页帧会被自动回收。
#[derive(Debug)]
pub struct FrameTracker(usize);

impl FrameTracker {
    /// 创建一个新的 FrameTracker。
    /// 在创建时，会自动将该物理页帧清零。
    fn new(pa: usize) -> Self {
        clear_frame(pa);
        FrameTracker(pa)
    }

    /// 获取此帧跟踪器所管理的物理页起始地址。
    pub fn pa(&self) -> usize {
        self.0
    }
}

impl Drop for FrameTracker {
    /// 自动回收物理页帧。
    fn drop(&mut self) {
        dealloc_frame(self);
    }
}

/// 将指定的物理页帧清零。
fn clear_frame(pa: usize) {
    unsafe {
        let va = phys_ops().paddr_to_vaddr(pa) as *mut u8;
        core::ptr::write_bytes(va, 0, PAGE_SIZE);
    }
}

lazy_static! {
    /// 全局物理帧分配器，由自旋锁保护。
    static ref FRAME_ALLOCATOR: SpinLock<FrameAllocator> = SpinLock::new(FrameAllocator::new());
}

/// 物理帧分配器。
/// 采用位图策略跟踪每个物理帧的分配状态。
pub struct FrameAllocator {
    /// 物理帧的起始地址（页对齐）。
    start: usize,
    /// 位图数据（每个 bit 表示一个帧：0=空闲，1=已分配）。
    bitmap: Vec<u64>,
    /// 总帧数。
    total_frames: usize,
    /// 已分配帧数（用于快速统计）。
    allocated_count: usize,
    /// 上次分配的位置提示（用于加速查找）。
    last_alloc_hint: usize,
}

impl FrameAllocator {
    /// 创建一个新的帧分配器实例（未初始化状态）。
    pub fn new() -> Self {
        FrameAllocator {
            start: usize::MAX,
            bitmap: Vec::new(),
            total_frames: 0,
            allocated_count: 0,
            last_alloc_hint: 0,
        }
    }

    /// 初始化帧分配器，设置可用的物理内存范围。
    pub fn init(&mut self, start: usize, end: usize) {
        debug_assert!(start % PAGE_SIZE == 0 && end % PAGE_SIZE == 0);
        self.start = start;
        self.total_frames = (end - start) / PAGE_SIZE;

        let bitmap_u64_count = self.total_frames.div_ceil(64);
        self.bitmap = alloc::vec![0u64; bitmap_u64_count];

        self.allocated_count = 0;
        self.last_alloc_hint = 0;
    }

    /// 检查帧是否空闲
    #[inline]
    fn is_free(&self, frame_idx: usize) -> bool {
        (self.bitmap[frame_idx / 64] & (1u64 << (frame_idx % 64))) == 0
    }

    /// 标记帧为已分配
    #[inline]
    fn mark_allocated(&mut self, frame_idx: usize) {
        self.bitmap[frame_idx / 64] |= 1u64 << (frame_idx % 64);
    }

    /// 标记帧为空闲
    #[inline]
    fn mark_free(&mut self, frame_idx: usize) {
        self.bitmap[frame_idx / 64] &= !(1u64 << (frame_idx % 64));
    }

    /// 分配一个物理帧，返回其起始物理地址。
    /// 从 last_alloc_hint 开始循环查找第一个空闲位。
    ///
    /// 低层接口：不清零、不跟踪。通常应使用 [`alloc_frame`] 获取
    /// RAII 封装的帧。
    pub fn alloc_frame(&mut self) -> Option<usize> {
        let bitmap_len = self.bitmap.len();
        if bitmap_len == 0 {
            return None;
        }

        let start_idx = self.last_alloc_hint;

        // 循环查找：[hint, end) + [0, hint)
        for offset in 0..bitmap_len {
            let idx = (start_idx + offset) % bitmap_len;
            let word = self.bitmap[idx];

            // 快速跳过全满的 u64
            if word == u64::MAX {
                continue;
            }

            let bit_pos = (!word).trailing_zeros() as usize;
            if bit_pos < 64 {
                let frame_idx = idx * 64 + bit_pos;
                if frame_idx >= self.total_frames {
                    continue;
                }

                self.mark_allocated(frame_idx);
                self.allocated_count += 1;
                self.last_alloc_hint = idx;

                return Some(self.start + frame_idx * PAGE_SIZE);
            }
        }

        None // 物理内存耗尽
    }

    /// 回收一个物理帧。
    pub fn dealloc_frame(&mut self, pa: usize) {
        debug_assert!(
            pa >= self.start && pa < self.start + self.total_frames * PAGE_SIZE,
            "dealloc_frame: frame out of range"
        );

        let frame_idx = (pa - self.start) / PAGE_SIZE;

        debug_assert!(
            !self.is_free(frame_idx),
            "dealloc_frame: double free detected"
        );

        self.mark_free(frame_idx);
        self.allocated_count -= 1;
    }

    /// 获取总的物理帧数
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 获取已分配的帧数
    pub fn allocated_frames(&self) -> usize {
        self.allocated_count
    }

    /// 获取空闲的帧数
    pub fn free_frames(&self) -> usize {
        self.total_frames - self.allocated_count
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// 使用可用的物理内存范围初始化全局帧分配器。
///
/// # 参数
///
/// * `start_addr` - 可用物理内存的起始地址（向上取整到页边界）
/// * `end_addr` - 可用物理内存的结束地址（向下取整到页边界）
pub fn init_frame_allocator(start_addr: usize, end_addr: usize) {
    let start = crate::config::page_round_up(start_addr);
    let end = crate::config::page_round_down(end_addr);

    FRAME_ALLOCATOR.lock().init(start, end);
}

/// 分配一个物理帧。
///
/// 返回的 [`FrameTracker`] 在 drop 时自动归还该帧；分配成功时
/// 帧内容已清零。物理内存耗尽时返回 `None`。
pub fn alloc_frame() -> Option<FrameTracker> {
    let pa = FRAME_ALLOCATOR.lock().alloc_frame()?;
    Some(FrameTracker::new(pa))
}

/// 回收一个物理帧。此函数由 FrameTracker 的 Drop 实现调用。
fn dealloc_frame(frame: &FrameTracker) {
    FRAME_ALLOCATOR.lock().dealloc_frame(frame.pa());
}
