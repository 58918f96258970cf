//! Reusable scratch buffers for the per-frame path.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Buffers that can be emptied for reuse while keeping their allocation.
pub trait Recycle: Default {
    fn recycle(&mut self);
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl Recycle for String {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Bounded free list of scratch buffers, shareable across threads.
#[derive(Debug)]
pub struct ScratchPool<T: Recycle> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Recycle> ScratchPool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Takes a buffer, allocating only when the free list is empty.
    ///
    /// The buffer goes back to the pool when the guard drops.
    pub fn acquire(&self) -> PoolGuard<'_, T> {
        let item = self.free.lock().pop().unwrap_or_default();
        PoolGuard { pool: self, item }
    }

    /// Runs `f` with a pooled buffer.
    pub fn with_resource<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.acquire();
        f(&mut guard)
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn clear(&self) {
        self.free.lock().clear();
    }

    fn release(&self, mut item: T) {
        item.recycle();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(item);
        }
    }
}

pub struct PoolGuard<'a, T: Recycle> {
    pool: &'a ScratchPool<T>,
    item: T,
}

impl<T: Recycle> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Recycle> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T: Recycle> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_returns_cleared_with_capacity() {
        let pool: ScratchPool<Vec<f64>> = ScratchPool::new(2);
        {
            let mut buf = pool.acquire();
            buf.extend([1.0, 2.0, 3.0]);
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 3);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_returned_on_early_exit() {
        let pool: ScratchPool<String> = ScratchPool::new(4);
        let result: Result<(), &str> = pool.with_resource(|s| {
            s.push_str("partial");
            Err("bail")
        });
        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_idle_list_is_bounded() {
        let pool: ScratchPool<Vec<u8>> = ScratchPool::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_pool_is_shareable_across_threads() {
        let pool: ScratchPool<String> = ScratchPool::new(8);
        std::thread::scope(|s| {
            for i in 0..4 {
                let pool = &pool;
                s.spawn(move || {
                    pool.with_resource(|text| {
                        text.push_str(&i.to_string());
                        text.len()
                    })
                });
            }
        });
        assert!(pool.idle() >= 1 && pool.idle() <= 4);
    }
}
