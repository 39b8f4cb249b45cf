//! Bookkeeping for `Engine::all`.

use std::collections::BTreeMap;

use tracing::trace;

use crate::deferred::Deferred;
use crate::types::PromiseValue;

/// Result slots of one `all` call.
///
/// Each slot is written at most once. A slot that already holds a value
/// ignores later settlements of the same entry, and a rejection only reaches
/// the aggregate while the aggregate is still unresolved.
pub(crate) struct Aggregate<V> {
    keys: Option<Vec<String>>,
    values: Vec<Option<V>>,
    remaining: usize,
    deferred: Deferred<V>,
}

impl<V: PromiseValue> Aggregate<V> {
    /// `keys` is `Some` for keyed input, in slot order.
    pub(crate) fn new(keys: Option<Vec<String>>, len: usize, deferred: Deferred<V>) -> Self {
        Self {
            keys,
            values: vec![None; len],
            remaining: len,
            deferred,
        }
    }

    pub(crate) fn fill(&mut self, slot: usize, value: V) {
        if self.values[slot].is_some() {
            trace!(slot, "Ignoring repeated fulfilment of all entry");
            return;
        }
        self.values[slot] = Some(value);
        self.remaining -= 1;
        if self.remaining == 0 {
            self.finish();
        }
    }

    pub(crate) fn fail(&mut self, slot: usize, reason: V) {
        if self.values[slot].is_some() {
            trace!(slot, "Ignoring rejection of already fulfilled all entry");
            return;
        }
        self.deferred.reject(reason);
    }

    /// Resolve with every slot, shaped like the input.
    pub(crate) fn finish(&self) {
        let values = self.values.iter().flatten().cloned();
        let result = match &self.keys {
            None => V::from_list(values.collect()),
            Some(keys) => V::from_map(keys.iter().cloned().zip(values).collect::<BTreeMap<_, _>>()),
        };
        self.deferred.resolve(result);
    }
}
