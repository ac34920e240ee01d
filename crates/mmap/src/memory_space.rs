//! 文件映射地址空间核心实现
//!
//! [`MemorySpace`] 聚合一个进程 mmap 区域的全部状态：VMA 描述符池、
//! 地址空间高水位，以及指向页表适配器的句柄。三个对外操作对应
//! 三条内核路径：
//!
//! - [`MemorySpace::mmap`]：系统调用路径，建立懒加载映射；
//! - [`MemorySpace::handle_page_fault`]：缺页路径，按页装入文件内容；
//! - [`MemorySpace::munmap`]：系统调用路径，收缩或销毁映射并写回。
//!
//! ## 加锁纪律
//!
//! 一把粗粒度自旋锁保护描述符池与高水位；持锁期间只做表内状态变更
//! 与页表原语调用，**任何后备文件 I/O 都在放锁之后进行**，避免磁盘
//! 延迟阻塞无关的映射操作。放锁期间丢失的竞争（映射被并发解除、
//! 同页被并发装入）在重新持锁后裁决：先装入者获胜，后到者丢弃
//! 自己的帧。

use core::cmp::min;

use crate::config::{PAGE_SIZE, page_round_down, page_round_up};
use crate::error::{MmapError, MmapResult};
use crate::file::BackingFile;
use crate::frame_allocator::{FrameTracker, alloc_frame};
use crate::page_table::{PageTable, PagingError, PteFlags};
use crate::phys::phys_ops;
use crate::vma::VmaTable;
use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;
use uapi::mm::{MapFlags, ProtFlags};

/// 锁内状态：描述符池与 mmap 区域高水位
struct SpaceInner {
    vmas: VmaTable,
    /// 下一个映射的候选基址；只增不减（bump 分配）
    high_water: usize,
}

/// 一个进程的文件映射地址空间
pub struct MemorySpace {
    page_table: Arc<dyn PageTable>,
    inner: SpinLock<SpaceInner>,
}

/// VMA 元数据的只读快照（用于诊断与测试）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmaInfo {
    /// 起始虚拟地址
    pub addr: usize,
    /// 字节长度
    pub len: usize,
    /// 文件内偏移
    pub offset: usize,
    /// 访问权限
    pub prot: ProtFlags,
    /// 映射类型
    pub flags: MapFlags,
    /// 已装入的页数
    pub resident_pages: usize,
}

impl MemorySpace {
    /// 创建一个新的文件映射地址空间
    ///
    /// `mmap_base` 是首个映射的候选基址（向上取整到页边界）。
    pub fn new(page_table: Arc<dyn PageTable>, mmap_base: usize) -> Self {
        MemorySpace {
            page_table,
            inner: SpinLock::new(SpaceInner {
                vmas: VmaTable::new(),
                high_water: mmap_base,
            }),
        }
    }

    /// 建立一个懒加载的文件映射，返回起始虚拟地址
    ///
    /// 只在页表中登记"保留待装入"的页表项，不分配任何物理帧；
    /// 首次访问触发缺页后才由 [`Self::handle_page_fault`] 逐页装入。
    ///
    /// 任一步骤失败时，已获取的资源按相反顺序全部回退，不留下
    /// 任何部分状态。
    pub fn mmap(
        &self,
        file: Arc<dyn BackingFile>,
        length: usize,
        prot: ProtFlags,
        flags: MapFlags,
        offset: usize,
    ) -> MmapResult<usize> {
        if length == 0 {
            return Err(MmapError::InvalidLength);
        }
        if offset % PAGE_SIZE != 0 {
            return Err(MmapError::UnalignedOffset);
        }
        // 不可写的文件不能以 WRITE + SHARED 方式映射：写回将无处可去
        if prot.contains(ProtFlags::WRITE) && flags.contains(MapFlags::SHARED) && !file.writable() {
            return Err(MmapError::NotWritable);
        }

        let map_len = length
            .checked_add(PAGE_SIZE - 1)
            .ok_or(MmapError::BadRange)?
            & !(PAGE_SIZE - 1);

        let mut inner = self.inner.lock();

        let idx = inner.vmas.allocate().ok_or(MmapError::TableExhausted)?;
        let base = page_round_up(inner.high_water);
        let end = match base.checked_add(map_len) {
            Some(end) => end,
            None => {
                inner.vmas.close(idx);
                return Err(MmapError::BadRange);
            }
        };

        let perm = PteFlags::from(prot) | PteFlags::USER | PteFlags::MMAPPED;
        let mut va = base;
        while va < end {
            if let Err(e) = self.page_table.reserve(va, perm) {
                // 回退：撤销已登记的保留项，归还槽位
                let mut undo = base;
                while undo < va {
                    let _ = self.page_table.invalidate(undo);
                    undo += PAGE_SIZE;
                }
                inner.vmas.close(idx);
                return Err(MmapError::Paging(e));
            }
            va += PAGE_SIZE;
        }

        let vma = inner.vmas.get_mut(idx);
        vma.addr = base;
        vma.len = length;
        vma.offset = offset;
        vma.prot = prot;
        vma.flags = flags;
        vma.file = Some(file);

        inner.high_water = end;

        log::debug!(
            "mmap: [{:#x}, {:#x}) offset {:#x} prot {:?} flags {:?}",
            base,
            end,
            offset,
            prot,
            flags
        );
        Ok(base)
    }

    /// 缺页路径：装入一页文件内容
    ///
    /// 由页错误处理程序在访问命中"保留待装入"页时调用。找不到
    /// 对应映射（或页表项并非 mmap 所属）时返回
    /// [`MmapError::NotMapped`]——那是一次真正的非法访问，由调用方
    /// 按段错误处理。
    ///
    /// 对同一页的并发缺页是安全的：帧分配与文件读取在锁外进行，
    /// 重新持锁后由 [`PageTable::install`] 裁决，先装入者获胜，
    /// 后到者的帧经 RAII 归还。
    pub fn handle_page_fault(&self, vaddr: usize) -> MmapResult<()> {
        let page = page_round_down(vaddr);

        // 第一段：持锁解析所属 VMA 与页表项，拷出锁外所需的值
        let (file, file_off, perm) = {
            let inner = self.inner.lock();
            let idx = inner.vmas.find_page(page).ok_or(MmapError::NotMapped)?;
            let vma = inner.vmas.get(idx);

            let entry = self.page_table.lookup(page).ok_or(MmapError::NotMapped)?;
            if entry.flags.contains(PteFlags::VALID) {
                // 其它线程已经装入
                return Ok(());
            }
            if !entry.flags.contains(PteFlags::MMAPPED) {
                return Err(MmapError::NotMapped);
            }

            let file = match &vma.file {
                Some(f) => f.clone(),
                None => panic!("mmap: valid vma without backing file"),
            };
            // addr 与 offset 同步收缩，先加后减：起点收缩后 page 可能
            // 低于（非页对齐的）addr，先减会下溢
            (file, vma.offset + page - vma.addr, entry.flags | PteFlags::VALID)
        };

        // 第二段：锁外分配帧并读入一整页；帧已清零，短读即零填充
        let frame = alloc_frame().ok_or(MmapError::FrameAllocFailed)?;
        let buf = unsafe {
            core::slice::from_raw_parts_mut(phys_ops().paddr_to_vaddr(frame.pa()) as *mut u8, PAGE_SIZE)
        };
        let read = file.read_at(file_off, buf).map_err(|_| MmapError::Io)?;
        if read < PAGE_SIZE {
            log::debug!(
                "page fault: short read at offset {:#x}: got {}, zero-filled",
                file_off,
                read
            );
        }

        // 第三段：重新持锁提交
        let mut inner = self.inner.lock();
        let idx = match inner.vmas.find_page(page) {
            Some(idx) => idx,
            // 放锁期间映射被解除
            None => return Err(MmapError::NotMapped),
        };
        match self.page_table.install(page, frame.pa(), perm) {
            Ok(()) => {
                inner.vmas.get_mut(idx).frames.insert(page, frame);
                Ok(())
            }
            // 同页竞争：先装入者获胜，本帧随 frame 的 Drop 归还
            Err(PagingError::AlreadyMapped) => Ok(()),
            Err(e) => Err(MmapError::Paging(e)),
        }
    }

    /// 解除映射的一个子区间，必要时写回并销毁 VMA
    ///
    /// 子区间必须完整落在某个映射内，且触及映射的起点或终点
    /// （或两者，即整段解除）；在中间打洞会被拒绝——VMA 模型是
    /// 单段连续区间，无法分裂成两段。与存留区间共享的边界页不被
    /// 移除：只要页上还有映射内的字节，页表项和帧就保持原状。
    ///
    /// 对每个被移除的页：常驻且属于共享可写映射的先写回文件，再
    /// 使页表项失效并释放物理帧；从未装入的页只清除保留项。写回
    /// 是尽力而为的：某页写回失败不影响其余页的写回，每页随后仍
    /// 会失效并释放（页表一致性优先），首个错误最终上报——整段
    /// 范围不保证原子性。
    pub fn munmap(&self, addr: usize, length: usize) -> MmapResult<()> {
        if length == 0 {
            return Err(MmapError::InvalidLength);
        }
        let end = addr.checked_add(length).ok_or(MmapError::BadRange)?;

        struct PendingPage {
            va: usize,
            file_off: usize,
            frame: Option<FrameTracker>,
        }

        let mut inner = self.inner.lock();

        let idx = inner.vmas.find_containing(addr).ok_or(MmapError::NotMapped)?;
        let vma = inner.vmas.get_mut(idx);
        let vma_start = vma.addr;
        let vma_end = vma.addr + vma.len;

        if end > vma_end {
            return Err(MmapError::BadRange);
        }
        if addr != vma_start && end != vma_end {
            return Err(MmapError::HolePunch);
        }

        let old_addr = vma.addr;
        let old_off = vma.offset;
        let old_end = vma_end;
        let file = match &vma.file {
            Some(f) => f.clone(),
            None => panic!("munmap: valid vma without backing file"),
        };
        let writeback =
            vma.flags.contains(MapFlags::SHARED) && vma.prot.contains(ProtFlags::WRITE);

        // 先收缩元数据，并发缺页从此不再命中被移除的范围
        if addr == vma_start && end == vma_end {
            vma.len = 0;
        } else if addr == vma_start {
            vma.addr += length;
            vma.offset += length;
            vma.len -= length;
        } else {
            vma.len -= length;
        }

        // 摘下被移除范围内的帧所有权，I/O 留到锁外。
        // 仍被存留区间占用的边界页不在移除之列。
        let first = if addr == vma_start {
            page_round_down(addr)
        } else {
            page_round_up(addr)
        };
        let last = if end == vma_end {
            page_round_up(end)
        } else {
            page_round_down(end)
        };
        let mut pending = Vec::with_capacity(last.saturating_sub(first) / PAGE_SIZE);
        let mut va = first;
        while va < last {
            pending.push(PendingPage {
                va,
                // 先加后减，防止非页对齐起点下的下溢
                file_off: old_off + va - old_addr,
                frame: vma.frames.remove(&va),
            });
            va += PAGE_SIZE;
        }

        if vma.len == 0 {
            // 文件句柄已在上面克隆，写回不受槽位释放影响
            inner.vmas.close(idx);
        }
        drop(inner);

        // 锁外逐页处理：写回 → 失效 → 释放
        let mut first_err: Option<MmapError> = None;
        for page in pending {
            let Some(entry) = self.page_table.lookup(page.va) else {
                // 页表项缺失：既无可写回也无可释放
                debug_assert!(page.frame.is_none());
                continue;
            };

            if entry.flags.contains(PteFlags::VALID) {
                let frame = match page.frame {
                    Some(f) => f,
                    None => panic!("munmap: resident page without owned frame"),
                };

                if writeback {
                    // 写回长度收敛到原映射的字节末尾，不写出映射之外
                    let wlen = min(PAGE_SIZE, old_end - page.va);
                    let src = unsafe {
                        core::slice::from_raw_parts(
                            phys_ops().paddr_to_vaddr(frame.pa()) as *const u8,
                            wlen,
                        )
                    };
                    match file.write_at(page.file_off, src) {
                        Ok(written) if written == wlen => {}
                        Ok(written) => {
                            log::error!(
                                "munmap: partial write at offset {:#x}: expected {}, got {}",
                                page.file_off,
                                wlen,
                                written
                            );
                            first_err.get_or_insert(MmapError::Io);
                        }
                        Err(_) => {
                            log::error!("munmap: write back failed at offset {:#x}", page.file_off);
                            first_err.get_or_insert(MmapError::Io);
                        }
                    }
                }

                if let Err(e) = self.page_table.invalidate(page.va) {
                    first_err.get_or_insert(MmapError::Paging(e));
                }
                drop(frame); // 物理帧归还分配器
            } else {
                // 保留但从未装入：清除保留项即可
                debug_assert!(page.frame.is_none());
                if let Err(e) = self.page_table.invalidate(page.va) {
                    first_err.get_or_insert(MmapError::Paging(e));
                }
            }
        }

        log::debug!("munmap: [{:#x}, {:#x})", addr, end);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 拆除整个地址空间的全部映射（进程退出路径）
    ///
    /// 对每个有效 VMA 做整段解除，因此共享可写映射在进程退出时
    /// 同样得到写回。遇到错误继续处理其余映射，最后上报第一个错误。
    pub fn close_all(&self) -> MmapResult<()> {
        let ranges: Vec<(usize, usize)> = {
            let inner = self.inner.lock();
            (0..crate::config::VMA_CAPACITY)
                .filter(|&i| inner.vmas.get(i).is_valid())
                .map(|i| {
                    let vma = inner.vmas.get(i);
                    (vma.addr(), vma.len())
                })
                .collect()
        };

        let mut first_err = None;
        for (addr, len) in ranges {
            if let Err(e) = self.munmap(addr, len) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 当前 mmap 区域的高水位（下一个映射的候选基址）
    pub fn high_water(&self) -> usize {
        self.inner.lock().high_water
    }

    /// 当前在用的 VMA 数
    pub fn region_count(&self) -> usize {
        self.inner.lock().vmas.in_use()
    }

    /// 查询包含给定字节地址的映射的元数据快照
    pub fn region_at(&self, addr: usize) -> Option<VmaInfo> {
        let inner = self.inner.lock();
        let idx = inner.vmas.find_containing(addr)?;
        let vma = inner.vmas.get(idx);
        Some(VmaInfo {
            addr: vma.addr(),
            len: vma.len(),
            offset: vma.offset(),
            prot: vma.prot(),
            flags: vma.flags(),
            resident_pages: vma.resident_pages(),
        })
    }
}
