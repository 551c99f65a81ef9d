use std::{error::Error, fmt, io};

/// An error returned by pool operations.
#[derive(Debug)]
pub enum PoolError {
    /// The operation needs at least one live worker, but the pool has none.
    ///
    /// Returned by [`remove_thread`](crate::ThreadPool::remove_thread),
    /// [`resume`](crate::ThreadPool::resume) and a client call to
    /// [`clear`](crate::ThreadPool::clear) on an empty pool.
    NoWorkers,

    /// Spawning a worker thread failed.
    ///
    /// Workers that were already spawned by the same call are unaffected and
    /// stay in the pool.
    Spawn(io::Error),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWorkers => f.write_str("pool has no worker threads"),
            Self::Spawn(e) => write!(f, "failed to spawn a worker thread: {}", e),
        }
    }
}

impl Error for PoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NoWorkers => None,
            Self::Spawn(e) => Some(e),
        }
    }
}

impl From<io::Error> for PoolError {
    fn from(e: io::Error) -> Self {
        Self::Spawn(e)
    }
}

/// An error returned when a [`UniqueLock`](crate::sync::UniqueLock) is asked
/// to change to an ownership state it is already in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The guard does not own its mutex.
    NotOwned,

    /// The guard already owns its mutex; acquiring again would deadlock.
    AlreadyOwned,
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOwned => f.write_str("guard does not own the mutex"),
            Self::AlreadyOwned => f.write_str("guard already owns the mutex"),
        }
    }
}

impl Error for LockError {}

/// An error returned when the common pool was configured after it had
/// already been initialized.
pub struct AlreadyInitializedError(());

impl AlreadyInitializedError {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

impl Error for AlreadyInitializedError {}

impl fmt::Debug for AlreadyInitializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AlreadyInitializedError")
    }
}

impl fmt::Display for AlreadyInitializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("common pool is already initialized")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(PoolError::NoWorkers.to_string(), "pool has no worker threads");
        assert_eq!(LockError::NotOwned.to_string(), "guard does not own the mutex");
        assert_eq!(
            LockError::AlreadyOwned.to_string(),
            "guard already owns the mutex"
        );
    }

    #[test]
    fn spawn_keeps_its_source() {
        let e = PoolError::from(io::Error::new(io::ErrorKind::Other, "out of threads"));
        assert!(e.source().is_some());
        assert!(e.to_string().contains("out of threads"));
    }
}
