//! 架构相关操作的 Mock 实现

use core::sync::atomic::AtomicBool;

/// Mock 架构操作
///
/// 宿主机测试中没有真正的中断，仅记录"中断开/关"状态。
pub struct MockArchOps {
    pub interrupt_state: AtomicBool,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
        }
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
