//! 内存映射子系统的配置常量与对齐辅助函数

/// 页大小（字节）
pub const PAGE_SIZE: usize = 4096;

/// VMA 描述符池的容量
///
/// 池采用定长数组加线性扫描；容量为个位数到几十之间时，
/// 这比更复杂的分配器更快也更易加锁。
pub const VMA_CAPACITY: usize = 16;

/// 新建地址空间时 mmap 区域的默认起始地址
pub const MMAP_MIN_BASE: usize = 0x4000_0000;

/// 将地址向下对齐到页边界
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// 将地址向上对齐到页边界
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// 检查地址是否页对齐
#[inline]
pub const fn is_page_aligned(addr: usize) -> bool {
    addr & (PAGE_SIZE - 1) == 0
}
