//! 自旋锁封装
//!
//! 提供对数据的互斥访问的自旋锁结构体。

use core::cell::UnsafeCell;

use crate::raw_spin_lock::{RawSpinLock, RawSpinLockGuard};

/// 提供对数据的互斥访问的自旋锁结构体。
///
/// 内部包含一个 RawSpinLock 和一个 UnsafeCell 用于存储数据。
///
/// # 注意
/// SpinLock 不是可重入的。当持有锁时，尝试再次获取锁将导致死锁。
/// 此外，SpinLock 通过禁用中断来保护临界区，持有锁时应避免长时间运行的
/// 操作（尤其是文件 I/O）。
#[derive(Debug)]
pub struct SpinLock<T> {
    raw_lock: RawSpinLock,
    data: UnsafeCell<T>,
}

impl<T> SpinLock<T> {
    /// 创建一个新的 SpinLock 实例，初始化内部数据。
    pub const fn new(data: T) -> Self {
        SpinLock {
            raw_lock: RawSpinLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// 获取自旋锁，并返回一个 RAII 保护器，用于访问和修改内部数据。
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let _raw_guard = self.raw_lock.lock();
        SpinLockGuard {
            _raw_guard,
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// 尝试获取自旋锁，如果成功则返回 RAII 保护器，否则返回 None。
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.raw_lock.try_lock().map(|_raw_guard| SpinLockGuard {
            _raw_guard,
            data: unsafe { &mut *self.data.get() },
        })
    }
}

/// SpinLock 的 RAII 保护器，提供对锁定数据的访问。
///
/// 当保护器离开作用域时，自动释放锁。
pub struct SpinLockGuard<'a, T> {
    _raw_guard: RawSpinLockGuard<'a>,
    data: &'a mut T,
}

impl<T> core::ops::Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T> core::ops::DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

// Safety: SpinLock 可以在线程间安全共享，
// 因为它通过 RawSpinLock 保证了对数据的互斥访问。
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

#[cfg(test)]
mod tests {
    // NOTE: These run on the host with `cargo test`; the mock arch ops come
    // from `test-support` and this crate implements `ArchOps` for them here.

    use super::SpinLock;
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use test_support::mock::{MOCK_ARCH_OPS, MockArchOps};

    impl crate::ArchOps for MockArchOps {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            self.interrupt_state.swap(false, Ordering::SeqCst) as usize
        }

        unsafe fn restore_interrupts(&self, flags: usize) {
            self.interrupt_state.store(flags != 0, Ordering::SeqCst);
        }

        fn interrupts_enabled(&self, flags: usize) -> bool {
            flags != 0
        }
    }

    fn setup() {
        static REGISTERED: AtomicBool = AtomicBool::new(false);
        if REGISTERED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            unsafe { crate::register_arch_ops(&MOCK_ARCH_OPS) };
        }
    }

    #[test]
    fn test_lock_guards_data() {
        setup();
        let lock = SpinLock::new(0usize);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_raw_lock_flag_tracks_guard() {
        setup();
        let lock = crate::RawSpinLock::new();
        assert!(!lock.is_locked());

        let guard = lock.lock();
        assert!(lock.is_locked());

        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        setup();
        let lock = SpinLock::new(());
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        setup();
        let lock = Arc::new(SpinLock::new(0usize));
        let mut handles = std::vec::Vec::new();

        for _ in 0..4 {
            let lock = lock.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*lock.lock(), 4000);
    }
}
