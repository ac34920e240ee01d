//! 后备文件接口 trait 定义

/// 可作为内存映射后备存储的文件接口
///
/// 此 trait 抽象了文件映射所需的最小接口。
/// 实现自带内部锁；读写都可能是短操作（返回的字节数小于请求）。
pub trait BackingFile: Send + Sync {
    /// 从指定偏移读取数据到缓冲区，返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 将缓冲区数据写入指定偏移，返回实际写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;

    /// 文件是否以可写方式打开
    ///
    /// 可写+共享映射要求后备文件可写，否则建立映射即失败。
    fn writable(&self) -> bool;
}
