//! Minimal lock abstraction with scope-bound release.
//!
//! `acquire` hands back a guard; dropping the guard is the release, so every
//! exit path from the holder's scope releases exactly once.

/// A lock whose guard may carry a debug level for the writes made under it.
pub trait SyncObject {
    type Guard<'a>
    where
        Self: 'a;

    /// Acquires at level 0, which always passes any level filter.
    fn acquire(&self) -> Self::Guard<'_> {
        self.acquire_with_level(0)
    }

    fn acquire_with_level(&self, level: u32) -> Self::Guard<'_>;
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct CountingLock {
        held: Cell<u32>,
        last_level: Cell<u32>,
    }

    struct CountingGuard<'a>(&'a CountingLock);

    impl Drop for CountingGuard<'_> {
        fn drop(&mut self) {
            self.0.held.set(self.0.held.get() - 1);
        }
    }

    impl SyncObject for CountingLock {
        type Guard<'a> = CountingGuard<'a>;

        fn acquire_with_level(&self, level: u32) -> CountingGuard<'_> {
            self.held.set(self.held.get() + 1);
            self.last_level.set(level);
            CountingGuard(self)
        }
    }

    #[test]
    fn test_guard_releases_on_scope_exit() {
        let lock = CountingLock {
            held: Cell::new(0),
            last_level: Cell::new(99),
        };

        {
            let _g = lock.acquire();
            assert_eq!(lock.held.get(), 1);
            assert_eq!(lock.last_level.get(), 0);
        }

        assert_eq!(lock.held.get(), 0);
    }
}
