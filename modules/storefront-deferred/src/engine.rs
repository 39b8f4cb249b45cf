//! The engine: promise construction, the `ref` adapter, and `when`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::all::Aggregate;
use crate::deferred::Deferred;
use crate::promise::{Outcome, Promise};
use crate::traits::{Callback, ExceptionHandler, Scheduler, Task, Thenable};
use crate::types::{Collection, Handler, PromiseId, PromiseValue, Resolution};

/// Deferred/promise engine.
///
/// Cheap to clone; every promise keeps a handle to the engine that created it.
/// Single-threaded: all promises of an engine must be used from one thread.
pub struct Engine<V> {
    inner: Rc<EngineInner<V>>,
}

struct EngineInner<V> {
    scheduler: Box<dyn Scheduler>,
    exception_handler: Box<dyn ExceptionHandler<V>>,
    next_id: Cell<u64>,
}

impl<V> Clone for Engine<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: PromiseValue> Engine<V> {
    pub fn new(
        scheduler: impl Scheduler + 'static,
        exception_handler: impl ExceptionHandler<V> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                scheduler: Box::new(scheduler),
                exception_handler: Box::new(exception_handler),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Engine that logs handler failures through `tracing`.
    pub fn with_scheduler(scheduler: impl Scheduler + 'static) -> Self {
        Self::new(scheduler, TracingExceptionHandler)
    }

    /// A fresh pending promise together with the capability to settle it.
    pub fn defer(&self) -> Deferred<V> {
        Deferred::new(Promise::pending(self))
    }

    /// A promise that is rejected from the start.
    pub fn reject(&self, reason: V) -> Promise<V> {
        Promise::settled(self, Outcome::Rejected(reason))
    }

    /// A promise that is fulfilled from the start.
    pub fn resolved(&self, value: V) -> Promise<V> {
        Promise::settled(self, Outcome::Fulfilled(value))
    }

    /// Admit anything promise-like as a promise of this engine (`ref`).
    ///
    /// Engine promises come back unchanged, plain values become fulfilled
    /// promises, and foreign thenables are adopted.
    pub fn adapt(&self, resolution: Resolution<V>) -> Promise<V> {
        match resolution {
            Resolution::Value(v) => self.resolved(v),
            Resolution::Promise(p) => p,
            thenable @ Resolution::Thenable(_) => {
                let deferred = self.defer();
                deferred.resolve_with(thenable);
                deferred.promise()
            }
        }
    }

    /// Adopt `value` and apply the optional handlers to its outcome exactly
    /// once.
    ///
    /// If the source reports more than one settlement (a foreign thenable
    /// calling both callbacks, say), only the first is honoured. The handlers
    /// run from a scheduled task, never inside the source's own callback.
    pub fn when(
        &self,
        value: Resolution<V>,
        on_fulfilled: Option<Handler<V>>,
        on_rejected: Option<Handler<V>>,
    ) -> Promise<V> {
        let result = Promise::pending(self);
        let done = Rc::new(Cell::new(false));
        let handlers = Rc::new(RefCell::new(Some((on_fulfilled, on_rejected))));

        let on_ok = {
            let (result, done, handlers) = (result.clone(), done.clone(), handlers.clone());
            let engine = self.clone();
            Box::new(move |v: V| {
                if done.replace(true) {
                    trace!(promise = %result.id(), "Ignoring repeated settlement in when");
                    return;
                }
                let handler = handlers.borrow_mut().take().and_then(|(callback, _)| callback);
                let target = result.clone();
                engine.schedule(Box::new(move || target.settle_through(handler, Outcome::Fulfilled(v))));
            }) as Callback<V>
        };
        let on_err = {
            let result = result.clone();
            let engine = self.clone();
            Box::new(move |r: V| {
                if done.replace(true) {
                    trace!(promise = %result.id(), "Ignoring repeated settlement in when");
                    return;
                }
                let handler = handlers.borrow_mut().take().and_then(|(_, errback)| errback);
                let target = result.clone();
                engine.schedule(Box::new(move || target.settle_through(handler, Outcome::Rejected(r))));
            }) as Callback<V>
        };

        self.subscribe_later(self.admit(value), on_ok, on_err);
        result
    }

    /// Wait for every entry of a list or map.
    ///
    /// Fulfils with a value of the same shape once all entries fulfil, or
    /// rejects with the first rejection. Plain values count as fulfilled.
    /// An empty collection fulfils the returned promise before this returns;
    /// handlers attached to it still run through the scheduler.
    pub fn all(&self, collection: impl Into<Collection<V>>) -> Promise<V> {
        let deferred = self.defer();
        let (keys, entries) = match collection.into() {
            Collection::List(items) => (None, items),
            Collection::Map(entries) => {
                let (keys, items): (Vec<String>, Vec<Resolution<V>>) = entries.into_iter().unzip();
                (Some(keys), items)
            }
        };

        let aggregate = Rc::new(RefCell::new(Aggregate::new(keys, entries.len(), deferred.clone())));
        if entries.is_empty() {
            aggregate.borrow().finish();
            return deferred.promise();
        }
        debug!(promise = %deferred.promise().id(), entries = entries.len(), "Waiting on all entries");

        for (slot, entry) in entries.into_iter().enumerate() {
            let on_ok = {
                let aggregate = Rc::clone(&aggregate);
                Box::new(move |v: V| aggregate.borrow_mut().fill(slot, v)) as Callback<V>
            };
            let on_err = {
                let aggregate = Rc::clone(&aggregate);
                Box::new(move |r: V| aggregate.borrow_mut().fail(slot, r)) as Callback<V>
            };
            self.subscribe_later(self.admit(entry), on_ok, on_err);
        }
        deferred.promise()
    }

    // -----------------------------------------------------------------------
    // Internals shared with promises and combinators
    // -----------------------------------------------------------------------

    /// `ref` at the subscription level: keeps foreign thenables as they are so
    /// that their repeated settlements stay visible to the caller's guard.
    fn admit(&self, resolution: Resolution<V>) -> Box<dyn Thenable<V>> {
        match resolution {
            Resolution::Value(v) => Box::new(self.resolved(v)),
            Resolution::Promise(p) => Box::new(p),
            Resolution::Thenable(t) => t,
        }
    }

    fn subscribe_later(&self, thenable: Box<dyn Thenable<V>>, on_ok: Callback<V>, on_err: Callback<V>) {
        self.schedule(Box::new(move || thenable.subscribe(on_ok, on_err)));
    }

    pub(crate) fn schedule(&self, task: Task) {
        self.inner.scheduler.schedule(task);
    }

    pub(crate) fn report(&self, error: &V) {
        self.inner.exception_handler.handle(error);
    }

    pub(crate) fn next_id(&self) -> PromiseId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        PromiseId(id)
    }
}

/// Default exception handler: logs every handler failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExceptionHandler;

impl<V: PromiseValue> ExceptionHandler<V> for TracingExceptionHandler {
    fn handle(&self, error: &V) {
        warn!(error = ?error, "Promise handler failed");
    }
}
