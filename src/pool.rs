use std::{
    cell::Cell,
    fmt, io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use log::{debug, trace};

use crate::{
    error::PoolError,
    guard::ScopeGuard,
    policy::{PanicPolicy, Rethrow},
    queue::TaskQueue,
    sync::{Condvar, Mutex},
    worker::Worker,
};

/// A builder for constructing a customized thread pool.
pub struct Builder<P = Rethrow> {
    size: Option<usize>,
    name: Option<String>,
    stack_size: Option<usize>,
    policy: P,
}

impl Builder<Rethrow> {
    pub fn new() -> Self {
        Self {
            size: None,
            name: None,
            stack_size: None,
            policy: Rethrow,
        }
    }
}

impl Default for Builder<Rethrow> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PanicPolicy> Builder<P> {
    /// Set the number of worker threads the pool starts with.
    ///
    /// If not set, one thread per CPU core is used. A size of zero is valid:
    /// the pool starts paused and empty, and workers can be added later with
    /// [`ThreadPool::add_threads`].
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Set a custom thread name for threads spawned by this thread pool.
    ///
    /// # Panics
    ///
    /// Panics if the name contains null bytes (`\0`).
    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        let name = name.into();

        if name.as_bytes().contains(&0) {
            panic!("thread pool name must not contain null bytes");
        }

        self.name = Some(name);
        self
    }

    /// Set the size of the stack (in bytes) for threads in this thread pool.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// enforces a larger minimum stack size.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Replace the panic policy the pool stores.
    pub fn policy<P2: PanicPolicy>(self, policy: P2) -> Builder<P2> {
        Builder {
            size: self.size,
            name: self.name,
            stack_size: self.stack_size,
            policy,
        }
    }

    /// Create a thread pool with a default-constructed queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use threadcrew::{BoxedTask, Builder, FifoQueue};
    ///
    /// let pool = Builder::new()
    ///     .size(2)
    ///     .name("crew")
    ///     .build::<FifoQueue<BoxedTask>>()
    ///     .unwrap();
    ///
    /// pool.enqueue(Box::new(|| {}));
    /// pool.join();
    /// ```
    pub fn build<Q>(self) -> Result<ThreadPool<Q, P>, PoolError>
    where
        Q: TaskQueue + Default + 'static,
        P: 'static,
    {
        self.build_with_queue(Q::default())
    }

    /// Create a thread pool around an existing queue value.
    pub fn build_with_queue<Q>(self, queue: Q) -> Result<ThreadPool<Q, P>, PoolError>
    where
        Q: TaskQueue + 'static,
        P: 'static,
    {
        let size = self.size.unwrap_or_else(|| num_cpus::get().max(1));

        ThreadPool::construct(size, queue, self.policy, self.name, self.stack_size)
    }
}

impl<P> fmt::Debug for Builder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("size", &self.size)
            .field("name", &self.name)
            .field("stack_size", &self.stack_size)
            .finish()
    }
}

/// Whether workers are currently allowed to dequeue tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PoolState {
    Paused,
    Executing,
}

/// Exit requests posted to the workers by structural operations.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Actions {
    /// One worker should exit and consume this flag.
    pub(crate) finish: bool,
    /// Every worker that sees `finish` should exit; the flags stay up until
    /// the last worker is gone.
    pub(crate) finish_all: bool,
}

impl Actions {
    pub(crate) fn is_empty(self) -> bool {
        !self.finish && !self.finish_all
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Everything guarded by the queue mutex.
pub(crate) struct Inner<Q> {
    pub(crate) queue: Q,
    pub(crate) thread_count: usize,
    pub(crate) active_count: usize,
    pub(crate) state: PoolState,
    pub(crate) actions: Actions,
}

/// Pool state shared between the owner and the worker threads.
pub(crate) struct Shared<Q, P> {
    pub(crate) inner: Mutex<Inner<Q>>,
    /// Serializes structural operations. Always taken before `inner`.
    pub(crate) op: Mutex<()>,
    /// Wakes workers: work arrived, the pool resumed, or an action flag went
    /// up.
    pub(crate) queue_cv: Condvar,
    /// Wakes clients waiting on counter or queue-emptiness predicates.
    pub(crate) client_cv: Condvar,
    pub(crate) policy: P,
    pub(crate) completed_tasks: AtomicU64,
    pub(crate) panicked_tasks: AtomicU64,
}

/// A worker pool running heterogeneous tasks on a resizable fleet of
/// threads.
///
/// The pool is generic over its [`TaskQueue`], which alone decides the order
/// tasks are selected in, and over its [`PanicPolicy`], which receives the
/// payload of any worker that dies outside a task.
///
/// Workers are detached; the pool tracks their liveness through a counter
/// rather than join handles. Dropping the pool discards the backlog, waits
/// for in-flight tasks to finish and shuts every worker down.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use threadcrew::{BoxedTask, FifoQueue, ThreadPool};
///
/// let pool: ThreadPool<FifoQueue<BoxedTask>> = ThreadPool::new(2).unwrap();
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..8 {
///     let counter = counter.clone();
///     pool.enqueue(Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }));
/// }
///
/// pool.join();
/// assert_eq!(counter.load(Ordering::SeqCst), 8);
/// ```
pub struct ThreadPool<Q: TaskQueue, P: PanicPolicy = Rethrow> {
    shared: Arc<Shared<Q, P>>,
    thread_name: Option<String>,
    stack_size: Option<usize>,
}

impl<Q, P> ThreadPool<Q, P>
where
    Q: TaskQueue + 'static,
    P: PanicPolicy + 'static,
{
    /// Create a pool with `threads` workers and default queue and policy.
    ///
    /// A pool created with zero threads starts paused.
    pub fn new(threads: usize) -> Result<Self, PoolError>
    where
        Q: Default,
        P: Default,
    {
        Self::with_policy(threads, P::default())
    }

    /// Create a pool with `threads` workers and the given panic policy.
    pub fn with_policy(threads: usize, policy: P) -> Result<Self, PoolError>
    where
        Q: Default,
    {
        Self::construct(threads, Q::default(), policy, None, None)
    }

    pub(crate) fn construct(
        threads: usize,
        queue: Q,
        policy: P,
        thread_name: Option<String>,
        stack_size: Option<usize>,
    ) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue,
                thread_count: 0,
                active_count: 0,
                state: if threads == 0 {
                    PoolState::Paused
                } else {
                    PoolState::Executing
                },
                actions: Actions::default(),
            }),
            op: Mutex::new(()),
            queue_cv: Condvar::new(),
            client_cv: Condvar::new(),
            policy,
            completed_tasks: AtomicU64::new(0),
            panicked_tasks: AtomicU64::new(0),
        });

        let pool = Self {
            shared,
            thread_name,
            stack_size,
        };

        // On failure the partially built pool is dropped here, which shuts
        // down whatever workers did spawn before the error reaches the
        // caller.
        pool.add_threads_inner(threads, false)?;

        Ok(pool)
    }

    /// Add `n` fresh workers to the pool, resuming it if it was paused.
    ///
    /// Blocks until every spawned worker has registered itself. If a spawn
    /// fails partway, the error is returned after the workers that did spawn
    /// have registered; those workers stay in the pool.
    pub fn add_threads(&self, n: usize) -> Result<(), PoolError> {
        self.add_threads_inner(n, true)
    }

    /// Add `n` fresh workers without changing a paused pool's state.
    pub fn add_threads_paused(&self, n: usize) -> Result<(), PoolError> {
        self.add_threads_inner(n, false)
    }

    fn add_threads_inner(&self, n: usize, resume_if_paused: bool) -> Result<(), PoolError> {
        let _op = self.shared.op.lock();
        let mut lock = self.shared.inner.lock();

        let previous = lock.thread_count;
        let mut spawned = 0;
        let mut failure = None;

        for _ in 0..n {
            match self.spawn_worker() {
                Ok(()) => spawned += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // Wait for registration even on the failure path. A worker that has
        // been spawned but not yet counted could otherwise race against a
        // caller that drops the pool in response to the error.
        let target = previous + spawned;
        self.shared
            .client_cv
            .wait_while(&mut lock, |inner| inner.thread_count != target);

        if let Some(e) = failure {
            return Err(PoolError::Spawn(e));
        }

        if resume_if_paused && spawned > 0 && lock.state == PoolState::Paused {
            lock.state = PoolState::Executing;
            self.shared.queue_cv.notify_all();
        }

        Ok(())
    }

    fn spawn_worker(&self) -> io::Result<()> {
        let mut builder = thread::Builder::new();

        if let Some(name) = self.thread_name.as_ref() {
            builder = builder.name(name.clone());
        }

        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        let worker = Worker::new(self.shared.clone());

        // The handle is dropped on purpose: liveness is tracked through
        // `thread_count`, and shutdown is coordinated through the action
        // flags rather than joins.
        builder.spawn(move || worker.run())?;
        trace!("spawned a pool worker");

        Ok(())
    }
}

impl<Q: TaskQueue, P: PanicPolicy> ThreadPool<Q, P> {
    /// Get a builder for creating a customized thread pool.
    #[inline]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Stop one worker and wait for it to exit.
    ///
    /// Which worker exits is up to the scheduler. The pool is paused while
    /// the exit token is outstanding and restored to its previous state
    /// afterwards, whatever way this call returns.
    ///
    /// Must not be called from a task running on this pool.
    pub fn remove_thread(&self) -> Result<(), PoolError> {
        let _op = self.shared.op.lock();
        let mut lock = self.shared.inner.lock();

        if lock.thread_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let target = lock.thread_count - 1;
        let prev_state = lock.state;
        lock.state = PoolState::Paused;

        let shared = &self.shared;
        let mut lock = ScopeGuard::new(lock, move |mut lock| {
            if target != 0 {
                lock.state = prev_state;
                shared.queue_cv.notify_all();
            }
        });

        // A worker must be parked at its selection point before the exit
        // token goes up, otherwise an active worker could consume it while
        // holding a task.
        shared
            .client_cv
            .wait_while(&mut lock, |inner| inner.active_count >= inner.thread_count);

        lock.actions.finish = true;
        shared.queue_cv.notify_one();

        shared
            .client_cv
            .wait_while(&mut lock, |inner| inner.thread_count != target);

        debug!("removed a pool worker; {} remain", target);

        Ok(())
    }

    /// Shut down every worker, discarding the backlog.
    ///
    /// In-flight tasks run to completion first. Once they have drained, the
    /// exit flags go up and everything queued so far is dropped without
    /// running; a task survives the shutdown only if it is enqueued after
    /// that point, while the workers exit.
    ///
    /// Calling this on a pool that has no workers is an error; the pool's
    /// own destructor performs the same shutdown but tolerates an already
    /// empty pool.
    ///
    /// Must not be called from a task running on this pool.
    pub fn clear(&self) -> Result<(), PoolError> {
        self.shutdown(false)
    }

    fn shutdown(&self, during_drop: bool) -> Result<(), PoolError> {
        let _op = self.shared.op.lock();
        let mut lock = self.shared.inner.lock();

        if lock.thread_count == 0 {
            if during_drop {
                return Ok(());
            }
            return Err(PoolError::NoWorkers);
        }

        lock.state = PoolState::Paused;

        self.shared
            .client_cv
            .wait_while(&mut lock, |inner| inner.active_count != 0);

        lock.actions.finish = true;
        lock.actions.finish_all = true;
        lock.queue.clear();
        self.shared.queue_cv.notify_all();

        self.shared
            .client_cv
            .wait_while(&mut lock, |inner| inner.thread_count != 0);

        // The last worker clears the flags when it can see it is last; when
        // several workers race out at once none of them may have been able
        // to tell, so the flags are re-armed down here under the same op
        // lock that any later structural call would contend on.
        lock.actions.clear();

        debug!("pool cleared; every worker exited");

        Ok(())
    }

    /// Push one task and wake one worker.
    ///
    /// May be called from a task already running on this pool.
    pub fn enqueue(&self, task: Q::Task) {
        let mut lock = self.shared.inner.lock();
        lock.queue.push(task);
        self.shared.queue_cv.notify_one();
    }

    /// Push a batch of tasks, waking all workers once at the end.
    ///
    /// If producing the tasks fails partway, the workers are still woken for
    /// whatever was pushed before the failure propagates.
    pub fn enqueue_all<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = Q::Task>,
    {
        let mut lock = self.shared.inner.lock();

        let pushed = Cell::new(0_usize);
        let _notify = ScopeGuard::new((), |()| {
            if pushed.get() > 0 {
                self.shared.queue_cv.notify_all();
            }
        });

        for task in tasks {
            lock.queue.push(task);
            pushed.set(pushed.get() + 1);
        }
    }

    /// Drop every queued task. Tasks already running are unaffected.
    pub fn discard_queue(&self) {
        let mut lock = self.shared.inner.lock();
        lock.queue.clear();
        // Emptiness changed without a worker involved; waiters in `join`
        // re-check here.
        self.shared.client_cv.notify_all();
        debug!("discarded the pending task queue");
    }

    /// Stop workers from picking up new tasks.
    ///
    /// Returns `false` if the pool was already paused. Tasks already running
    /// are unaffected.
    pub fn pause(&self) -> bool {
        let mut lock = self.shared.inner.lock();

        if lock.state == PoolState::Paused {
            return false;
        }

        lock.state = PoolState::Paused;
        debug!("pool paused");
        true
    }

    /// Let workers pick up tasks again.
    ///
    /// Returns `false` if the pool was already executing, and
    /// [`PoolError::NoWorkers`] if there is no worker to resume.
    pub fn resume(&self) -> Result<bool, PoolError> {
        let mut lock = self.shared.inner.lock();

        if lock.state == PoolState::Executing {
            debug_assert!(lock.thread_count != 0);
            return Ok(false);
        }

        if lock.thread_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        lock.state = PoolState::Executing;
        self.shared.queue_cv.notify_all();
        debug!("pool resumed");
        Ok(true)
    }

    /// Block until the queue is empty and no task is running.
    ///
    /// Idempotent and state-preserving; a paused pool with a backlog will
    /// block until someone resumes it. Must not be called from a task
    /// running on this pool.
    pub fn join(&self) {
        let mut lock = self.shared.inner.lock();
        self.shared
            .client_cv
            .wait_while(&mut lock, |inner| {
                !inner.queue.is_empty() || inner.active_count != 0
            });
    }

    /// Number of live worker threads.
    pub fn threads(&self) -> usize {
        self.shared.inner.lock().thread_count
    }

    /// Number of workers currently running a task.
    pub fn active_tasks(&self) -> usize {
        self.shared.inner.lock().active_count
    }

    /// Whether the pool is currently paused.
    pub fn is_paused(&self) -> bool {
        self.shared.inner.lock().state == PoolState::Paused
    }

    /// Number of tasks finished by this pool, panicked ones included.
    pub fn completed_tasks(&self) -> u64 {
        self.shared.completed_tasks.load(Ordering::SeqCst)
    }

    /// Number of tasks that panicked since the pool was created.
    pub fn panicked_tasks(&self) -> u64 {
        self.shared.panicked_tasks.load(Ordering::SeqCst)
    }

    /// The panic policy this pool stores.
    pub fn panic_policy(&self) -> &P {
        &self.shared.policy
    }
}

impl<Q: TaskQueue, P: PanicPolicy> Drop for ThreadPool<Q, P> {
    fn drop(&mut self) {
        let _ = self.shutdown(true);
    }
}

impl<Q: TaskQueue, P: PanicPolicy> fmt::Debug for ThreadPool<Q, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.threads())
            .field("active_tasks", &self.active_tasks())
            .field("paused", &self.is_paused())
            .field("completed_tasks", &self.completed_tasks())
            .field("panicked_tasks", &self.panicked_tasks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{queue::FifoQueue, task::BoxedTask};

    type FifoPool = ThreadPool<FifoQueue<BoxedTask>>;

    #[test]
    #[should_panic(expected = "thread pool name must not contain null bytes")]
    fn name_with_null_bytes_panics() {
        let _ = Builder::new().name("uh\0oh");
    }

    #[test]
    fn new_pool_reports_its_size() {
        let pool = FifoPool::new(3).unwrap();
        assert_eq!(pool.threads(), 3);
        assert!(!pool.is_paused());
    }

    #[test]
    fn zero_sized_pool_starts_paused() {
        let pool = FifoPool::new(0).unwrap();
        assert_eq!(pool.threads(), 0);
        assert!(pool.is_paused());
        assert!(matches!(pool.resume(), Err(PoolError::NoWorkers)));
        assert!(matches!(pool.remove_thread(), Err(PoolError::NoWorkers)));
        assert!(matches!(pool.clear(), Err(PoolError::NoWorkers)));
    }

    #[test]
    fn completed_counter_tracks_tasks() {
        let pool = FifoPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = counter.clone();
            pool.enqueue(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(pool.completed_tasks(), 4);
    }

    #[test]
    fn debug_output_mentions_the_fleet() {
        let pool = FifoPool::new(2).unwrap();
        let rendered = format!("{:?}", pool);
        assert!(rendered.contains("threads: 2"));
    }
}
