//! errno 常量
//!
//! 系统调用失败时返回 `-errno`；数值与 Linux 保持一致。

pub const EPERM: i32 = 1;
pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EACCES: i32 = 13;
pub const EFAULT: i32 = 14;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const ENFILE: i32 = 23;
pub const ENOSYS: i32 = 38;
