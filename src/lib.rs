//! A priority-aware worker pool with a pluggable task queue and a pluggable
//! panic policy.
//!
//! The pool runs heterogeneous tasks on a fleet of detached worker threads
//! that can be resized, paused, resumed and drained at runtime. The order
//! tasks are selected in belongs entirely to the queue: [`FifoQueue`] gives
//! insertion order, [`PriorityQueue`] gives priority order, and any type
//! implementing [`TaskQueue`] can replace them. A worker that dies outside a
//! task reports to the pool's [`PanicPolicy`]; a panic inside a task is
//! contained and the worker keeps going.
//!
//! The synchronization the pool is built on lives in [`sync`]: a mutex whose
//! guard reports and changes its own ownership, and a condition variable
//! whose waits compose with that guard. [`ScopeGuard`] provides the
//! guaranteed-release cleanup the lifecycle operations rely on.
//!
//! # Examples
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use threadcrew::{BoxedTask, FifoQueue, ThreadPool};
//!
//! let pool: ThreadPool<FifoQueue<BoxedTask>> = ThreadPool::new(4).unwrap();
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! for _ in 0..100 {
//!     let counter = counter.clone();
//!     pool.enqueue(Box::new(move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }));
//! }
//!
//! pool.join();
//! assert_eq!(counter.load(Ordering::SeqCst), 100);
//! ```
//!
//! Prioritized work with a single worker:
//!
//! ```
//! use threadcrew::{BoxedTask, Prioritized, PriorityQueue, ThreadPool};
//!
//! let pool: ThreadPool<PriorityQueue<Prioritized<BoxedTask>>> =
//!     ThreadPool::new(1).unwrap();
//!
//! pool.enqueue(Prioritized::new(1, Box::new(|| { /* later */ })));
//! pool.enqueue(Prioritized::new(5, Box::new(|| { /* sooner */ })));
//! pool.join();
//! ```

mod common;
mod error;
mod guard;
mod policy;
mod pool;
mod queue;
pub mod sync;
mod task;
mod worker;

pub use crate::{
    common::{common, configure_common, CommonPool},
    error::{AlreadyInitializedError, LockError, PoolError},
    guard::ScopeGuard,
    policy::{PanicPolicy, Rethrow, TryLog},
    pool::{Builder, ThreadPool},
    queue::{FifoQueue, PriorityQueue, TaskQueue},
    task::{BoxedTask, Prioritized, Task},
};
