//! mmap 子系统的宿主机单元测试
//!
//! 测试环境约定见 test-support crate：物理内存是一块泄漏的字节
//! 缓冲区，物理地址与虚拟地址恒等映射；页表与后备文件用内存数据
//! 结构模拟。按照 test-support 的说明，本 crate 在这里为 mock
//! 类型实现自己的 trait。


use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::{MMAP_MIN_BASE, PAGE_SIZE, page_round_down};
use crate::file::BackingFile;
use crate::memory_space::MemorySpace;
use crate::page_table::{PageTable, PagingError, PagingResult, PtEntry, PteFlags};
use alloc::collections::btree_map::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;
use test_support::mock::{MOCK_ARCH_OPS, MOCK_PHYS_MEM_OPS, MockPhysMemOps};

impl crate::phys::PhysMemOps for MockPhysMemOps {
    unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        unsafe { MockPhysMemOps::vaddr_to_paddr(self, vaddr) }
    }

    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        MockPhysMemOps::paddr_to_vaddr(self, paddr)
    }
}

/// sync::ArchOps 是外部 trait，不能直接为 test-support 的类型实现
/// （孤儿规则），用本地 newtype 转发到全局 mock 状态。
struct TestArchOps;

impl sync::ArchOps for TestArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        MOCK_ARCH_OPS.interrupt_state.swap(false, Ordering::SeqCst) as usize
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        MOCK_ARCH_OPS.interrupt_state.store(flags != 0, Ordering::SeqCst);
    }

    fn interrupts_enabled(&self, flags: usize) -> bool {
        flags != 0
    }
}

static TEST_ARCH_OPS: TestArchOps = TestArchOps;

/// 测试用"物理内存"的大小（1024 帧）
const ARENA_BYTES: usize = 4 * 1024 * 1024;

/// 一次性初始化：注册 mock 实现并建立全局帧分配器
///
/// cargo test 并发运行测试，第一个到达的线程执行初始化，
/// 其余线程自旋等待完成。
pub(crate) fn setup() {
    static STARTED: AtomicBool = AtomicBool::new(false);
    static READY: AtomicBool = AtomicBool::new(false);

    if STARTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        // SAFETY: CAS 保证只有一个线程走到这里
        unsafe {
            sync::register_arch_ops(&TEST_ARCH_OPS);
            crate::register_phys_ops(&MOCK_PHYS_MEM_OPS);
        }
        let arena = alloc::vec![0u8; ARENA_BYTES].leak();
        let start = arena.as_ptr() as usize;
        crate::init_frame_allocator(start, start + ARENA_BYTES);
        READY.store(true, Ordering::SeqCst);
    }
    while !READY.load(Ordering::SeqCst) {
        core::hint::spin_loop();
    }
}

/// 内存页表 mock：BTreeMap 按页虚拟地址索引页表项
pub(crate) struct MockPageTable {
    entries: SpinLock<BTreeMap<usize, PtEntry>>,
    installs: AtomicUsize,
}

impl MockPageTable {
    pub(crate) fn new() -> Self {
        MockPageTable {
            entries: SpinLock::new(BTreeMap::new()),
            installs: AtomicUsize::new(0),
        }
    }

    /// 当前页表项总数（常驻 + 保留）
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// 成功装入的累计次数
    pub(crate) fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

impl PageTable for MockPageTable {
    fn lookup(&self, vaddr: usize) -> Option<PtEntry> {
        self.entries.lock().get(&vaddr).copied()
    }

    fn reserve(&self, vaddr: usize, flags: PteFlags) -> PagingResult<()> {
        assert!(
            !flags.contains(PteFlags::VALID),
            "reserve must not set VALID"
        );
        let mut entries = self.entries.lock();
        if entries.contains_key(&vaddr) {
            return Err(PagingError::AlreadyMapped);
        }
        entries.insert(vaddr, PtEntry { pa: 0, flags });
        Ok(())
    }

    fn install(&self, vaddr: usize, pa: usize, flags: PteFlags) -> PagingResult<()> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&vaddr)
            && entry.flags.contains(PteFlags::VALID)
        {
            return Err(PagingError::AlreadyMapped);
        }
        entries.insert(vaddr, PtEntry { pa, flags });
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn invalidate(&self, vaddr: usize) -> PagingResult<()> {
        match self.entries.lock().remove(&vaddr) {
            Some(_) => Ok(()),
            None => Err(PagingError::NotMapped),
        }
    }
}

/// 内存后备文件 mock
pub(crate) struct MockBackingFile {
    data: SpinLock<Vec<u8>>,
    writable: bool,
}

impl MockBackingFile {
    pub(crate) fn new(data: Vec<u8>, writable: bool) -> Arc<Self> {
        Arc::new(MockBackingFile {
            data: SpinLock::new(data),
            writable,
        })
    }

    /// 文件当前内容的快照
    pub(crate) fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl BackingFile for MockBackingFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        let data = self.data.lock();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = core::cmp::min(buf.len(), data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        if !self.writable {
            return Err(-1);
        }
        let mut data = self.data.lock();
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn writable(&self) -> bool {
        self.writable
    }
}

/// 在指定文件偏移注入 I/O 错误的后备文件 mock
pub(crate) struct FailingBackingFile {
    data: SpinLock<Vec<u8>>,
    fail_read_at: Option<usize>,
    fail_write_at: Option<usize>,
}

impl FailingBackingFile {
    pub(crate) fn new(
        data: Vec<u8>,
        fail_read_at: Option<usize>,
        fail_write_at: Option<usize>,
    ) -> Arc<Self> {
        Arc::new(FailingBackingFile {
            data: SpinLock::new(data),
            fail_read_at,
            fail_write_at,
        })
    }

    /// 文件当前内容的快照
    pub(crate) fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl BackingFile for FailingBackingFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        if self.fail_read_at == Some(offset) {
            return Err(-(uapi::errno::EIO as isize));
        }
        let data = self.data.lock();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = core::cmp::min(buf.len(), data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        if self.fail_write_at == Some(offset) {
            return Err(-(uapi::errno::EIO as isize));
        }
        let mut data = self.data.lock();
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn writable(&self) -> bool {
        true
    }
}

/// 建一个空的地址空间，基址取默认的 mmap 区域起点
pub(crate) fn space_with_table() -> (MemorySpace, Arc<MockPageTable>) {
    setup();
    let pt = Arc::new(MockPageTable::new());
    let space = MemorySpace::new(pt.clone(), MMAP_MIN_BASE);
    (space, pt)
}

/// 生成确定性的测试数据
pub(crate) fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// 拷出一个常驻页的内容（恒等映射下物理地址即指针）
pub(crate) fn resident_page(pt: &MockPageTable, page_va: usize) -> Vec<u8> {
    let entry = pt.lookup(page_va).expect("page table entry missing");
    assert!(entry.flags.contains(PteFlags::VALID), "page not resident");
    unsafe { core::slice::from_raw_parts(entry.pa as *const u8, PAGE_SIZE).to_vec() }
}

/// 模拟用户态对已装入页的一次写访问
pub(crate) fn write_resident_byte(pt: &MockPageTable, vaddr: usize, value: u8) {
    let page = page_round_down(vaddr);
    let entry = pt.lookup(page).expect("page table entry missing");
    assert!(entry.flags.contains(PteFlags::VALID), "page not resident");
    unsafe {
        *((entry.pa + (vaddr - page)) as *mut u8) = value;
    }
}
