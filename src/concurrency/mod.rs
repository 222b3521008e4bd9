//! Concurrency substrate: worker pool, level signals and a blocking bridge
//! for callback-style operations.

mod signal;
mod thread_pool;

pub use signal::Signal;
pub use thread_pool::ThreadPool;

use parking_lot::Mutex;
use std::sync::Arc;

/// One-shot completion handle passed to a callback-style operation.
///
/// The waiting side is released when the handle is completed or dropped.
pub struct Completion<T> {
    slot: Arc<Mutex<Option<T>>>,
    signal: Arc<Signal>,
}

impl<T> Completion<T> {
    /// Deliver the result and release the waiter
    pub fn complete(self, value: T) {
        *self.slot.lock() = Some(value);
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        self.signal.signal_level(0);
    }
}

/// Start an asynchronous operation and block until it completes.
///
/// Returns `None` if the operation dropped its completion without
/// delivering a value.
///
/// ```ignore
/// let response = block_on(|done| tree.commit(move |r| done.complete(r)));
/// ```
pub fn block_on<T, F>(start: F) -> Option<T>
where
    F: FnOnce(Completion<T>),
{
    let signal = Arc::new(Signal::new(1));
    let slot = Arc::new(Mutex::new(None));

    start(Completion {
        slot: slot.clone(),
        signal: signal.clone(),
    });

    signal.wait_for_level(0);
    let value = slot.lock().take();
    value
}
