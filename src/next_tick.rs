//! Cooperative tick queue.
//!
//! The engine never flushes on its own. Work deferred to "the next tick"
//! (scheduler flushes, host callbacks) waits here until the host calls
//! [`tick`], typically once per event-loop turn or after applying a render
//! patch.
//!
//! ```ignore
//! next_tick(|| {
//!     println!("after the flush");
//!     Ok(())
//! });
//! tick()?;
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::Result;

type TickCallback = Box<dyn FnOnce() -> Result<()>>;

thread_local! {
    static CALLBACKS: RefCell<VecDeque<TickCallback>> = const { RefCell::new(VecDeque::new()) };
}

/// Defer `callback` to the next [`tick`].
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() -> Result<()> + 'static,
{
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().push_back(Box::new(callback)));
}

/// Future that resolves once the next [`tick`] has reached it.
///
/// Everything deferred before it (including a pending scheduler flush) has
/// run by then.
pub fn next_tick_future() -> NextTick {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
        Ok(())
    });
    NextTick { rx }
}

/// Future returned by [`next_tick_future`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct NextTick {
    rx: oneshot::Receiver<()>,
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A dropped sender means the queue was discarded; resolve anyway.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

/// Run the callbacks queued before this call, in FIFO order.
///
/// Callbacks queued while the tick runs wait for the following tick. Every
/// callback runs even if an earlier one fails; the first error is returned.
/// Returns how many callbacks ran.
pub fn tick() -> Result<usize> {
    let batch: Vec<TickCallback> =
        CALLBACKS.with(|callbacks| callbacks.borrow_mut().drain(..).collect());
    let count = batch.len();
    let mut first_error = None;
    for callback in batch {
        if let Err(err) = callback() {
            first_error.get_or_insert(err);
        }
    }
    if count > 0 {
        tracing::trace!(count, "tick ran callbacks");
    }
    first_error.map_or(Ok(count), Err)
}

/// Whether callbacks are waiting for the next tick.
pub fn is_tick_pending() -> bool {
    CALLBACKS.with(|callbacks| !callbacks.borrow().is_empty())
}
