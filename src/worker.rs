use std::{
    cell::Cell,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{atomic::Ordering, Arc},
};

use log::{error, trace};

use crate::{
    guard::ScopeGuard,
    policy::PanicPolicy,
    pool::{PoolState, Shared},
    queue::TaskQueue,
    task::Task,
};

/// The routine run by a single pool thread, from spawn to exit.
pub(crate) struct Worker<Q, P> {
    shared: Arc<Shared<Q, P>>,
}

impl<Q: TaskQueue, P: PanicPolicy> Worker<Q, P> {
    pub(crate) fn new(shared: Arc<Shared<Q, P>>) -> Self {
        Self { shared }
    }

    pub(crate) fn run(self) {
        trace!("worker thread started");

        // A panic coming out of a task is contained inside the loop, so
        // anything that lands here escaped the management code itself. The
        // exit bookkeeping has already run by the time the policy is called.
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.work())) {
            error!("worker thread died outside of a task; invoking the panic policy");
            self.shared.policy.handle(payload);
        }

        trace!("worker thread exiting");
    }

    fn work(&self) {
        let shared = &*self.shared;

        // Whether this worker is counted in `active_count` right now.
        let was_active = Cell::new(false);

        // Declared before the lock so it fires after the loop's lock is
        // released, on every exit path including unwinds: deregister, give
        // back an active slot if one is held, and let clients re-check
        // their predicates.
        let _exit = ScopeGuard::new((), |()| {
            let mut lock = shared.inner.lock();
            lock.thread_count = lock.thread_count.saturating_sub(1);
            if was_active.get() {
                lock.active_count = lock.active_count.saturating_sub(1);
            }
            shared.client_cv.notify_all();
        });

        let mut lock = shared.inner.lock();
        lock.thread_count += 1;

        loop {
            if was_active.replace(false) {
                lock.active_count -= 1;
            }
            shared.client_cv.notify_all();

            shared.queue_cv.wait_while(&mut lock, |inner| {
                inner.actions.is_empty()
                    && (inner.state == PoolState::Paused || inner.queue.is_empty())
            });

            if lock.actions.finish {
                if !lock.actions.finish_all {
                    // A single-exit token; consuming it keeps the other
                    // workers alive.
                    lock.actions.finish = false;
                } else if lock.thread_count == 1 {
                    lock.actions.clear();
                }
                break;
            }

            let task = lock
                .queue
                .pop()
                .expect("task queue reported tasks pending but yielded none");

            was_active.set(true);
            lock.active_count += 1;
            debug_assert!(lock.active_count <= lock.thread_count);
            shared.client_cv.notify_all();

            lock.unlocked(|| {
                if catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
                    shared.panicked_tasks.fetch_add(1, Ordering::SeqCst);
                }
                shared.completed_tasks.fetch_add(1, Ordering::SeqCst);
            });
        }
    }
}
