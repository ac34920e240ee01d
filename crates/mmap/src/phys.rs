//! 物理内存窗口操作的 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 物理内存窗口操作
///
/// 此 trait 抽象了物理地址与内核直接映射区虚拟地址的互转，
/// 使本子系统可以按物理页帧寻址而不依赖具体架构。
/// 内核入口 crate 需要为具体架构实现此 trait。
pub trait PhysMemOps: Send + Sync {
    /// 将虚拟地址转换为物理地址（直接映射区域）
    ///
    /// # Safety
    /// 调用者必须确保虚拟地址已经映射
    unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize;

    /// 将物理地址转换为虚拟地址（直接映射区域）
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;
}

static PHYS_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static PHYS_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册物理内存窗口实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_phys_ops(ops: &'static dyn PhysMemOps) {
    let ptr = ops as *const dyn PhysMemOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn PhysMemOps, (usize, usize)>(ptr) };
    PHYS_OPS_DATA.store(data, Ordering::Release);
    PHYS_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的物理内存窗口实现
///
/// # Panics
/// 如果尚未调用 [`register_phys_ops`] 注册实现，则 panic
#[inline]
pub fn phys_ops() -> &'static dyn PhysMemOps {
    let data = PHYS_OPS_DATA.load(Ordering::Acquire);
    let vtable = PHYS_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("mmap: PhysMemOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn PhysMemOps>((data, vtable)) }
}
