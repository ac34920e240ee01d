//! 与用户空间共用的定义和声明
//!
//! 包含 mmap 标志位与 errno 常量，确保内核和用户空间的一致性

#![no_std]
#![allow(dead_code)]
// uapi 中的常量逐项与 Linux 对齐；逐项补 `///` 噪声较大。
#![allow(missing_docs)]

pub mod errno;
pub mod mm;
