//! 内存映射相关的标志位定义

use bitflags::bitflags;

bitflags! {
    /// mmap 的内存保护标志（`PROT_*`）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtFlags: u32 {
        /// 可读
        const READ = 1 << 0;
        /// 可写
        const WRITE = 1 << 1;
        /// 可执行
        const EXEC = 1 << 2;
    }
}

impl ProtFlags {
    /// `PROT_NONE`：不可访问
    pub const NONE: ProtFlags = ProtFlags::empty();
}

bitflags! {
    /// mmap 的映射类型标志（`MAP_*`）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        /// 共享映射：修改对文件可见，解除映射时写回
        const SHARED = 1 << 0;
        /// 私有映射：修改不落盘
        const PRIVATE = 1 << 1;
    }
}
