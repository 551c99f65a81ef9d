//! Mutex and condition-variable primitives used by the pool.
//!
//! These wrap [`std::sync`] with two additions the pool depends on: the lock
//! guard reports and changes its own ownership (so the queue mutex can be
//! released around a task call and re-acquired on every exit path), and all
//! lock and wait sites recover from poisoning. A worker that panics must not
//! cascade that panic into every other thread touching the same state; the
//! pool keeps its counters consistent through scope guards instead.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{self, PoisonError, TryLockError},
    time::{Duration, Instant},
};

use crate::{error::LockError, guard::ScopeGuard};

/// A mutual-exclusion primitive protecting a value of type `T`.
///
/// Locking produces a [`UniqueLock`] rather than a plain guard, so the lock
/// can be released and re-acquired through the same handle.
///
/// # Examples
///
/// ```
/// use threadcrew::sync::Mutex;
///
/// let m = Mutex::new(5);
/// let mut lock = m.lock();
/// assert!(lock.owns_lock());
/// *lock += 1;
/// lock.unlock().unwrap();
/// assert!(!lock.owns_lock());
/// ```
pub struct Mutex<T> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: sync::Mutex::new(value),
        }
    }

    /// Block until the mutex is acquired.
    pub fn lock(&self) -> UniqueLock<'_, T> {
        UniqueLock {
            mutex: self,
            guard: Some(self.raw_lock()),
        }
    }

    /// Create a guard without acquiring the mutex yet.
    pub fn lock_deferred(&self) -> UniqueLock<'_, T> {
        UniqueLock {
            mutex: self,
            guard: None,
        }
    }

    /// Acquire the mutex only if it is free right now.
    pub fn try_lock(&self) -> Option<UniqueLock<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(UniqueLock {
                mutex: self,
                guard: Some(guard),
            }),
            Err(TryLockError::Poisoned(e)) => Some(UniqueLock {
                mutex: self,
                guard: Some(e.into_inner()),
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn raw_lock(&self) -> sync::MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(lock) => s.field("data", &*lock),
            None => s.field("data", &format_args!("<locked>")),
        }
        .finish()
    }
}

/// A lock guard that knows whether it currently owns its mutex.
///
/// Dereferencing a guard that does not own the lock panics; inside the pool
/// that panic is treated as a worker-fatal failure and routed to the panic
/// policy.
pub struct UniqueLock<'a, T> {
    mutex: &'a Mutex<T>,
    guard: Option<sync::MutexGuard<'a, T>>,
}

impl<'a, T> UniqueLock<'a, T> {
    /// Whether this guard currently owns the mutex.
    pub fn owns_lock(&self) -> bool {
        self.guard.is_some()
    }

    /// Acquire the mutex through this guard.
    ///
    /// Fails with [`LockError::AlreadyOwned`] when the guard already holds
    /// the lock.
    pub fn lock(&mut self) -> Result<(), LockError> {
        if self.guard.is_some() {
            return Err(LockError::AlreadyOwned);
        }
        self.guard = Some(self.mutex.raw_lock());
        Ok(())
    }

    /// Release the mutex while keeping the guard usable.
    ///
    /// Fails with [`LockError::NotOwned`] when the guard does not hold the
    /// lock.
    pub fn unlock(&mut self) -> Result<(), LockError> {
        match self.guard.take() {
            Some(guard) => {
                drop(guard);
                Ok(())
            }
            None => Err(LockError::NotOwned),
        }
    }

    /// Acquire the mutex if it is free, reporting whether it was taken.
    pub fn try_lock(&mut self) -> Result<bool, LockError> {
        if self.guard.is_some() {
            return Err(LockError::AlreadyOwned);
        }
        match self.mutex.inner.try_lock() {
            Ok(guard) => {
                self.guard = Some(guard);
                Ok(true)
            }
            Err(TryLockError::Poisoned(e)) => {
                self.guard = Some(e.into_inner());
                Ok(true)
            }
            Err(TryLockError::WouldBlock) => Ok(false),
        }
    }

    /// Run `f` with the mutex released, re-acquiring it afterwards.
    ///
    /// The re-acquisition rides in a [`ScopeGuard`], so it happens even when
    /// `f` unwinds.
    ///
    /// # Panics
    ///
    /// Panics if the guard does not own the lock.
    pub fn unlocked<R>(&mut self, f: impl FnOnce() -> R) -> R {
        assert!(
            self.guard.take().is_some(),
            "unlocked() requires a held lock"
        );
        let relock = ScopeGuard::new(&mut *self, |lock| {
            let _ = lock.lock();
        });
        let value = f();
        relock.perform();
        value
    }
}

impl<'a, T> Deref for UniqueLock<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.as_deref().expect("lock is not held")
    }
}

impl<'a, T> DerefMut for UniqueLock<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().expect("lock is not held")
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for UniqueLock<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("UniqueLock");
        match self.guard.as_deref() {
            Some(data) => s.field("data", data),
            None => s.field("data", &format_args!("<released>")),
        }
        .finish()
    }
}

/// Outcome of a timed wait that carries no predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The wait returned because of a notification (or spuriously).
    NoTimeout,
    /// The wait returned because the timeout elapsed.
    Timeout,
}

/// A condition variable usable with [`UniqueLock`].
///
/// All waits expect a guard that owns its lock and hand the lock back in the
/// owned state. A single condition variable must always be used with the
/// same mutex. Waits without a predicate are subject to spurious wake-ups;
/// the predicate forms re-check and are safe against them.
pub struct Condvar {
    inner: sync::Condvar,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            inner: sync::Condvar::new(),
        }
    }

    /// Wake one thread blocked on this condition variable.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wake every thread blocked on this condition variable.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }

    /// Block until notified.
    ///
    /// # Panics
    ///
    /// Panics if `lock` does not own its mutex.
    pub fn wait<T>(&self, lock: &mut UniqueLock<'_, T>) {
        let guard = lock.guard.take().expect("waiting requires a held lock");
        let guard = self
            .inner
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner);
        lock.guard = Some(guard);
    }

    /// Block until `condition` returns `false`.
    pub fn wait_while<T, F>(&self, lock: &mut UniqueLock<'_, T>, mut condition: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *lock) {
            self.wait(lock);
        }
    }

    /// Block until notified or until `timeout` elapses.
    pub fn wait_timeout<T>(&self, lock: &mut UniqueLock<'_, T>, timeout: Duration) -> WaitStatus {
        let guard = lock.guard.take().expect("waiting requires a held lock");
        let (guard, result) = self
            .inner
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        lock.guard = Some(guard);

        if result.timed_out() {
            WaitStatus::Timeout
        } else {
            WaitStatus::NoTimeout
        }
    }

    /// Block until notified or until `deadline` passes.
    pub fn wait_deadline<T>(&self, lock: &mut UniqueLock<'_, T>, deadline: Instant) -> WaitStatus {
        self.wait_timeout(lock, deadline.saturating_duration_since(Instant::now()))
    }

    /// Block until `condition` returns `false` or `timeout` elapses.
    ///
    /// Returns whether the condition was satisfied at the final wake.
    pub fn wait_timeout_while<T, F>(
        &self,
        lock: &mut UniqueLock<'_, T>,
        timeout: Duration,
        condition: F,
    ) -> bool
    where
        F: FnMut(&mut T) -> bool,
    {
        self.wait_deadline_while(lock, Instant::now() + timeout, condition)
    }

    /// Block until `condition` returns `false` or `deadline` passes.
    ///
    /// Returns whether the condition was satisfied at the final wake.
    pub fn wait_deadline_while<T, F>(
        &self,
        lock: &mut UniqueLock<'_, T>,
        deadline: Instant,
        mut condition: F,
    ) -> bool
    where
        F: FnMut(&mut T) -> bool,
    {
        loop {
            if !condition(&mut *lock) {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            self.wait_timeout(lock, remaining);
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condvar")
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn ownership_transitions() {
        let m = Mutex::new(1);
        let mut lock = m.lock();
        assert!(lock.owns_lock());

        assert_eq!(lock.lock(), Err(crate::LockError::AlreadyOwned));
        lock.unlock().unwrap();
        assert!(!lock.owns_lock());
        assert_eq!(lock.unlock(), Err(crate::LockError::NotOwned));

        lock.lock().unwrap();
        *lock += 1;
        assert_eq!(*lock, 2);
    }

    #[test]
    fn deferred_guard_starts_unowned() {
        let m = Mutex::new("hi");
        let mut lock = m.lock_deferred();
        assert!(!lock.owns_lock());
        assert!(lock.try_lock().unwrap());
        assert_eq!(*lock, "hi");
    }

    #[test]
    fn try_lock_reports_contention() {
        let m = Mutex::new(0);

        thread::scope(|s| {
            let held = m.lock();

            s.spawn(|| {
                assert!(m.try_lock().is_none());
            })
            .join()
            .unwrap();

            drop(held);
        });

        assert!(m.try_lock().is_some());
    }

    #[test]
    fn unlocked_releases_and_reacquires() {
        let m = Mutex::new(0);
        let mut lock = m.lock();

        let observed = lock.unlocked(|| {
            thread::scope(|s| s.spawn(|| *m.lock()).join().unwrap())
        });

        assert_eq!(observed, 0);
        assert!(lock.owns_lock());
    }

    #[test]
    fn timed_wait_reports_timeout() {
        let m = Mutex::new(());
        let cv = Condvar::new();
        let mut lock = m.lock();

        let status = cv.wait_timeout(&mut lock, Duration::from_millis(10));
        assert_eq!(status, WaitStatus::Timeout);
        assert!(lock.owns_lock());
    }

    #[test]
    fn predicate_wait_sees_the_notification() {
        let m = Mutex::new(false);
        let cv = Condvar::new();

        thread::scope(|s| {
            s.spawn(|| {
                let mut lock = m.lock();
                *lock = true;
                cv.notify_one();
            });

            let mut lock = m.lock();
            cv.wait_while(&mut lock, |ready| !*ready);
            assert!(*lock);
        });
    }

    #[test]
    fn timed_predicate_wait_gives_up() {
        let m = Mutex::new(false);
        let cv = Condvar::new();
        let mut lock = m.lock();

        let satisfied = cv.wait_timeout_while(&mut lock, Duration::from_millis(10), |ready| !*ready);
        assert!(!satisfied);
    }
}
