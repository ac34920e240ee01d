//! 中断保护器
//!
//! 基于 RAII 实现中断保护，在创建时禁用中断，销毁时恢复。
//!
//! 注意：禁用中断只能阻止**本地 CPU** 的"任务 vs 本地中断"并发，
//! 并不能阻止其他 CPU 的并行访问；多核共享数据仍需要配合自旋锁。

use crate::arch_ops;

/// 中断保护器，基于 RAII 实现中断保护。
///
/// 在创建时原子地禁用中断并保存之前的状态；
/// 在销毁时自动恢复之前的中断状态。
pub struct IntrGuard {
    flags: usize,
}

impl IntrGuard {
    /// 原子地禁用中断并返回一个 IntrGuard 实例。
    pub fn new() -> Self {
        // SAFETY: 仅保存并关闭本地中断，Drop 时按保存值恢复。
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };
        IntrGuard { flags }
    }

    /// 检查进入临界区前，中断是否处于启用状态。
    #[allow(dead_code)]
    pub fn was_enabled(&self) -> bool {
        arch_ops().interrupts_enabled(self.flags)
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    /// 当 IntrGuard 离开作用域时，自动恢复中断状态。
    fn drop(&mut self) {
        // SAFETY: flags 是在创建 IntrGuard 时保存的。
        unsafe { arch_ops().restore_interrupts(self.flags) };
    }
}
