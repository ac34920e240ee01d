//! 内存管理相关操作的 Mock 实现
//!
//! 宿主机测试采用"恒等映射"（paddr == vaddr）：物理帧取自一块
//! 泄漏的字节缓冲区，其地址直接当作物理地址使用。

/// Mock 的物理内存窗口操作（恒等映射）
pub struct MockPhysMemOps;

impl MockPhysMemOps {
    pub const fn new() -> Self {
        Self
    }

    /// 将虚拟地址转换为物理地址（测试默认：恒等映射）
    ///
    /// # Safety
    /// 仅用于测试环境的可控输入。
    pub unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        vaddr
    }

    /// 将物理地址转换为虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }
}

/// 全局 Mock 实例
pub static MOCK_PHYS_MEM_OPS: MockPhysMemOps = MockPhysMemOps::new();
