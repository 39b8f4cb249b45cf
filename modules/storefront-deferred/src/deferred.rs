use crate::promise::Promise;
use crate::types::{PromiseValue, Resolution};

/// The capability to settle one promise.
///
/// Only the first `resolve`/`resolve_with`/`reject` call has an effect. A
/// promise that is never settled stays pending forever; there is no timeout.
pub struct Deferred<V> {
    promise: Promise<V>,
}

impl<V> Clone for Deferred<V> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<V: PromiseValue> Deferred<V> {
    pub(crate) fn new(promise: Promise<V>) -> Self {
        Self { promise }
    }

    /// Fulfil with a plain value.
    pub fn resolve(&self, value: V) {
        self.promise.resolve(Resolution::Value(value));
    }

    /// Resolve with a value, an engine promise, or a foreign thenable. The
    /// latter two are adopted: the promise settles when they do.
    pub fn resolve_with(&self, resolution: Resolution<V>) {
        self.promise.resolve(resolution);
    }

    pub fn reject(&self, reason: V) {
        self.promise.reject_with(reason);
    }

    /// Handle to the promise this deferred settles.
    pub fn promise(&self) -> Promise<V> {
        self.promise.clone()
    }

    /// Whether a settlement call has already been accepted. True while the
    /// promise is still adopting another source.
    pub fn is_resolved(&self) -> bool {
        self.promise.is_resolved()
    }
}

impl<V: PromiseValue> std::fmt::Debug for Deferred<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .finish()
    }
}
