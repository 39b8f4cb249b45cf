//! Core types shared by the engine, promises, and combinators.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::promise::Promise;
use crate::traits::Thenable;

/// Per-engine promise identifier. Assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PromiseId(pub u64);

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p#{}", self.0)
    }
}

/// Observable state of a promise.
///
/// A promise that is still waiting on an adopted source reports `Pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum PromiseState<V> {
    Pending,
    Fulfilled(V),
    Rejected(V),
}

impl<V> PromiseState<V> {
    pub fn is_settled(&self) -> bool {
        !matches!(self, PromiseState::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PromiseState::Rejected(_))
    }
}

/// Payload carried by promises of an engine, used for both fulfilment values
/// and rejection reasons.
pub trait PromiseValue: Clone + fmt::Debug + 'static {
    /// Build the fulfilment value of `all` over a list.
    fn from_list(items: Vec<Self>) -> Self;

    /// Build the fulfilment value of `all` over a keyed map.
    fn from_map(entries: BTreeMap<String, Self>) -> Self;

    /// Turn an engine error into a rejection reason.
    fn from_engine_error(err: &EngineError) -> Self;
}

impl PromiseValue for serde_json::Value {
    fn from_list(items: Vec<Self>) -> Self {
        serde_json::Value::Array(items)
    }

    fn from_map(entries: BTreeMap<String, Self>) -> Self {
        serde_json::Value::Object(entries.into_iter().collect())
    }

    fn from_engine_error(err: &EngineError) -> Self {
        serde_json::Value::String(err.to_string())
    }
}

/// What a promise is resolved with.
///
/// Only `Value` settles immediately; the other two variants make the
/// receiving promise adopt the outcome of the given source.
pub enum Resolution<V> {
    Value(V),
    Promise(Promise<V>),
    Thenable(Box<dyn Thenable<V>>),
}

impl<V> Resolution<V> {
    pub fn value(value: V) -> Self {
        Resolution::Value(value)
    }

    pub fn thenable(thenable: impl Thenable<V> + 'static) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<V> From<Promise<V>> for Resolution<V> {
    fn from(promise: Promise<V>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<V: fmt::Debug> fmt::Debug for Resolution<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolution::Promise(p) => f.debug_tuple("Promise").field(&p.id()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// Result of running a handler. `Err` carries the reason the handler failed
/// with and rejects the chained promise.
pub type HandlerResult<V> = Result<Resolution<V>, V>;

/// A one-shot `then` handler.
pub struct Handler<V>(Box<dyn FnOnce(V) -> HandlerResult<V>>);

impl<V> Handler<V> {
    pub fn new(f: impl FnOnce(V) -> HandlerResult<V> + 'static) -> Self {
        Handler(Box::new(f))
    }

    pub(crate) fn call(self, value: V) -> HandlerResult<V> {
        (self.0)(value)
    }
}

impl<V> fmt::Debug for Handler<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// Input of `all`: an ordered list or a keyed map of promise-like entries.
#[derive(Debug)]
pub enum Collection<V> {
    List(Vec<Resolution<V>>),
    Map(BTreeMap<String, Resolution<V>>),
}

impl<V> Collection<V> {
    pub fn len(&self) -> usize {
        match self {
            Collection::List(items) => items.len(),
            Collection::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> From<Vec<Promise<V>>> for Collection<V> {
    fn from(promises: Vec<Promise<V>>) -> Self {
        Collection::List(promises.into_iter().map(Resolution::Promise).collect())
    }
}

impl<V> From<BTreeMap<String, Promise<V>>> for Collection<V> {
    fn from(promises: BTreeMap<String, Promise<V>>) -> Self {
        Collection::Map(
            promises
                .into_iter()
                .map(|(key, p)| (key, Resolution::Promise(p)))
                .collect(),
        )
    }
}
