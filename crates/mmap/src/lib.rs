//! 文件内存映射子系统
//!
//! 将文件的一段区间投影到进程虚拟地址空间：建立映射时只在页表中
//! 登记"保留待装入"的页表项，物理页帧推迟到首次访问（缺页）时才
//! 分配并从后备文件读入；解除映射时对共享可写映射执行写回。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与外部协作者解耦：
//! - [`PageTable`]: 页表查询/保留/装入/失效原语（地址空间子系统持有）
//! - [`BackingFile`]: 后备文件的读写（文件系统持有，自带锁）
//! - [`PhysMemOps`]: 物理地址与内核虚拟地址的互转窗口
//!
//! 使用前必须调用 [`register_phys_ops`] 注册物理内存窗口实现。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod error;
mod phys;

pub mod config;
pub mod file;
pub mod frame_allocator;
pub mod memory_space;
pub mod page_table;
pub mod vma;

#[cfg(test)]
mod tests;

pub use error::{MmapError, MmapResult};
pub use file::BackingFile;
pub use frame_allocator::{FrameTracker, alloc_frame, init_frame_allocator};
pub use memory_space::{MemorySpace, VmaInfo};
pub use page_table::{PageTable, PagingError, PagingResult, PtEntry, PteFlags};
pub use phys::{PhysMemOps, phys_ops, register_phys_ops};
pub use vma::{Vma, VmaTable};
