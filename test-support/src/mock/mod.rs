//! Mock 实现
//!
//! 注意：这里不直接依赖其它 crate（避免循环依赖）。
//! 各 crate 在 `cfg(test)` 下为这些类型实现自己的 trait
//! （例如 `sync::ArchOps`、`mmap::PhysMemOps`）。

mod arch;
mod mm;

pub use arch::*;
pub use mm::*;
