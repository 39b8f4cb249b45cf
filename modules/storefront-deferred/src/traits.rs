//! Seams between the engine and its embedding system.

use std::rc::Rc;

/// A continuation handed to the scheduler.
pub type Task = Box<dyn FnOnce()>;

/// Settlement callback passed to a [`Thenable`].
pub type Callback<V> = Box<dyn FnMut(V)>;

/// Decides when continuations run.
///
/// Implementations must invoke every task exactly once, never from inside the
/// `schedule` call itself, and in the order tasks were scheduled. Whether that
/// happens on a queue, a timer, or a host event loop is up to the embedder.
pub trait Scheduler {
    fn schedule(&self, task: Task);
}

/// Receives every failure produced by a handler.
///
/// A side channel for logging only. It cannot alter propagation.
pub trait ExceptionHandler<V> {
    fn handle(&self, error: &V);
}

/// Anything a promise can adopt.
///
/// Foreign implementations may call either callback, both, or one of them
/// several times; only the first call is honoured.
pub trait Thenable<V> {
    fn subscribe(self: Box<Self>, on_fulfilled: Callback<V>, on_rejected: Callback<V>);
}

// ---------------------------------------------------------------------------
// Blankets: callers keep a handle on the scheduler they hand over
// ---------------------------------------------------------------------------

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule(&self, task: Task) {
        (**self).schedule(task)
    }
}

impl<V, F: Fn(&V)> ExceptionHandler<V> for F {
    fn handle(&self, error: &V) {
        self(error)
    }
}
