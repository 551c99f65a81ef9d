use once_cell::sync::OnceCell;

use crate::{
    error::AlreadyInitializedError, policy::Rethrow, pool::Builder, pool::ThreadPool,
    queue::FifoQueue, task::BoxedTask,
};

/// The type of the process-wide common pool: boxed tasks in FIFO order,
/// worker deaths abort the process.
pub type CommonPool = ThreadPool<FifoQueue<BoxedTask>, Rethrow>;

static COMMON: OnceCell<CommonPool> = OnceCell::new();

/// Get a shared reference to a common thread pool for the entire process.
///
/// # Examples
///
/// ```
/// threadcrew::common().enqueue(Box::new(|| {
///     // background work
/// }));
///
/// threadcrew::common().join();
/// ```
pub fn common() -> &'static CommonPool {
    COMMON.get_or_init(|| {
        common_builder()
            .build()
            .expect("failed to spawn the common pool")
    })
}

/// Configure the common thread pool.
///
/// Call this near the start of the program, before anything touches
/// [`common`]: once the common pool exists its configuration is fixed and
/// this function returns an error.
///
/// This is a knob for applications, not for libraries. A library that needs
/// particular pool settings should create its own [`ThreadPool`] instance
/// rather than impose a configuration on the whole process.
///
/// # Examples
///
/// ```
/// threadcrew::configure_common(|builder| builder.size(3)).unwrap();
///
/// assert_eq!(threadcrew::common().threads(), 3);
/// ```
pub fn configure_common<F>(f: F) -> Result<(), AlreadyInitializedError>
where
    F: FnOnce(Builder) -> Builder,
{
    let mut was_initialized = true;

    COMMON.get_or_init(|| {
        was_initialized = false;
        f(common_builder())
            .build()
            .expect("failed to spawn the common pool")
    });

    if was_initialized {
        Err(AlreadyInitializedError::new())
    } else {
        Ok(())
    }
}

fn common_builder() -> Builder {
    Builder::new().name("common-pool")
}
